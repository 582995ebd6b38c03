//! Static replica configuration: `N >= 2F + 1`, heartbeat period and
//! election-timeout window are configurable via `cluster.toml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub id: u64,
    pub host: String,
    pub client_port: u16,
    pub peer_port: u16,
}

impl ReplicaInfo {
    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.host, self.client_port)
    }

    pub fn peer_addr(&self) -> String {
        format!("{}:{}", self.host, self.peer_port)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub replicas: Vec<ReplicaInfo>,
    #[serde(default = "default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,
    #[serde(default = "default_election_timeout_ms")]
    pub election_timeout_ms: (u64, u64),
}

fn default_heartbeat_period_ms() -> u64 {
    40
}

fn default_election_timeout_ms() -> (u64, u64) {
    (200, 400)
}

impl ClusterConfig {
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn majority(&self) -> usize {
        self.replicas.len() / 2 + 1
    }

    pub fn replica(&self, id: u64) -> Option<&ReplicaInfo> {
        self.replicas.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
            heartbeat_period_ms = 40
            election_timeout_ms = [200, 400]

            [[replicas]]
            id = 0
            host = "127.0.0.1"
            client_port = 20000
            peer_port = 30000

            [[replicas]]
            id = 1
            host = "127.0.0.1"
            client_port = 20010
            peer_port = 30010

            [[replicas]]
            id = 2
            host = "127.0.0.1"
            client_port = 20020
            peer_port = 30020
        "#;
        let cfg = ClusterConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.replicas.len(), 3);
        assert_eq!(cfg.majority(), 2);
    }
}
