use anyhow::Result;
use std::sync::Arc;

use crate::storage::KeyValueStore;

pub const TOKEN_KEY: &str = "token";

/// Bearer credential kept in local storage between runs.
#[derive(Clone)]
pub struct Session {
    storage: Arc<dyn KeyValueStore>,
}

impl Session {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    pub fn token(&self) -> Option<String> {
        match self.storage.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!("failed to read credential: {e:#}");
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn store(&self, token: &str) -> Result<()> {
        self.storage.set(TOKEN_KEY, token)
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove(TOKEN_KEY)
    }

    /// Drops a credential the server no longer accepts.
    pub fn expire(&self) {
        tracing::info!("credential rejected by server, clearing it");
        if let Err(e) = self.clear() {
            tracing::warn!("failed to clear expired credential: {e:#}");
        }
    }
}
