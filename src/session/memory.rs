use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{SessionId, SessionStore, StoreError};
use crate::types::Credential;

/// In-process session store. Credentials are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Credential>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<Credential>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn set(&self, id: &SessionId, credential: Credential) -> Result<(), StoreError> {
        self.sessions.write().await.insert(id.clone(), credential);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        id: &SessionId,
        expected: Option<&Credential>,
        new: Option<Credential>,
    ) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.get(id) != expected {
            return Ok(false);
        }

        match new {
            Some(credential) => sessions.insert(id.clone(), credential),
            None => sessions.remove(id),
        };
        Ok(true)
    }

    async fn remove(&self, id: &SessionId) -> Result<(), StoreError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}
