//! MessagePack marshal/unmarshal helpers shared by every RPC layer.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::TransportError;

pub fn marshal<T: Serialize>(value: &T) -> Result<Vec<u8>, TransportError> {
    rmp_serde::to_vec(value).map_err(|e| TransportError::Decode(e.to_string()))
}

pub fn unmarshal<T: DeserializeOwned>(buf: &[u8]) -> Result<T, TransportError> {
    rmp_serde::from_slice(buf).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;

    /// Cross-checks the MessagePack round trip against `serde_json`'s
    /// independently-implemented encoder: if `rmp_serde` ever silently
    /// dropped a field, a detour through JSON on the same value would
    /// still see it.
    #[test]
    fn msgpack_round_trip_agrees_with_json_round_trip() {
        let command = Command::Login { username: "alice".into(), address: "127.0.0.1:9000".into() };

        let packed = marshal(&command).unwrap();
        let unpacked: Command = unmarshal(&packed).unwrap();

        let via_json = serde_json::to_string(&command).unwrap();
        let via_json_back: Command = serde_json::from_str(&via_json).unwrap();

        assert_eq!(serde_json::to_string(&unpacked).unwrap(), serde_json::to_string(&via_json_back).unwrap());
    }
}
