//! Per-process stub cache: resolves a username to its last-known
//! `host:port` via `GET_USER_ADDRESS`, and keeps the answer around so
//! outbound live-auction RPCs don't re-resolve on every call.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::command::{Command, ReplyPayload};
use crate::platform_client::PlatformClient;

#[derive(Default)]
pub struct AddressCache {
    addrs: Mutex<HashMap<String, String>>,
}

impl AddressCache {
    pub fn new() -> Self {
        AddressCache::default()
    }

    pub fn get(&self, username: &str) -> Option<String> {
        self.addrs.lock().unwrap().get(username).cloned()
    }

    pub fn insert(&self, username: String, addr: String) {
        self.addrs.lock().unwrap().insert(username, addr);
    }

    /// Resolves `username` through the Platform, refreshing the cache on
    /// success. Returns the last cached address if the lookup fails rather
    /// than erroring, since the reconciliation loop is the normal refresh
    /// path and callers in the hot path should still be able to use a
    /// stale-but-present entry.
    pub async fn resolve(&self, platform: &PlatformClient, username: &str) -> Option<String> {
        let command = Command::GetUserAddress { username: username.to_string() };
        match platform.submit(&command).await {
            Ok(reply) if reply.success => {
                if let ReplyPayload::Address(addr) = reply.payload {
                    self.insert(username.to_string(), addr.clone());
                    return Some(addr);
                }
                self.get(username)
            }
            _ => self.get(username),
        }
    }
}
