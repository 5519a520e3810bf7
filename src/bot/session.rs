//! Per-contact conversation state.
//!
//! Counterpart of the provider: created once and reused across reloads. A
//! session stores the contact's position in the flow tree as an index path;
//! positions are re-resolved against the current flow set on every message,
//! so a stale path after a reload simply falls back to root matching.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Conversation-position store keyed by contact.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn position(&self, contact: &str) -> Option<Vec<usize>>;
    async fn set_position(&self, contact: &str, path: Vec<usize>);
    async fn clear(&self, contact: &str);
}

/// Volatile in-process session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    positions: RwLock<HashMap<String, Vec<usize>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn position(&self, contact: &str) -> Option<Vec<usize>> {
        self.positions.read().await.get(contact).cloned()
    }

    async fn set_position(&self, contact: &str, path: Vec<usize>) {
        self.positions
            .write()
            .await
            .insert(contact.to_string(), path);
    }

    async fn clear(&self, contact: &str) {
        self.positions.write().await.remove(contact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_clears_positions() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.position("555").await, None);

        store.set_position("555", vec![0, 2]).await;
        assert_eq!(store.position("555").await, Some(vec![0, 2]));

        store.clear("555").await;
        assert_eq!(store.position("555").await, None);
    }
}
