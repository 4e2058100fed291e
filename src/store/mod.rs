use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::pipeline::models::QueryAttempt;

#[derive(Debug)]
pub enum StoreError {
    NotFound(Uuid),
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Query attempt {} not found", id),
            StoreError::Unavailable(msg) => write!(f, "Attempt store unavailable: {}", msg),
        }
    }
}

impl Error for StoreError {}

/// Durable, strongly consistent storage for query attempts. A refinement
/// must always be able to load its exact parent.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn save(&self, attempt: &QueryAttempt) -> Result<(), StoreError>;
    async fn load(&self, id: Uuid) -> Result<QueryAttempt, StoreError>;

    /// Loads the refinement chain as an ordered list from the root attempt
    /// down to (and including) the given attempt.
    async fn load_chain(&self, id: Uuid) -> Result<Vec<QueryAttempt>, StoreError> {
        let mut chain = vec![self.load(id).await?];
        while let Some(parent_id) = chain.last().and_then(|a| a.parent_id) {
            chain.push(self.load(parent_id).await?);
        }
        chain.reverse();
        Ok(chain)
    }
}

/// In-process attempt store.
pub struct MemoryAttemptStore {
    attempts: RwLock<HashMap<Uuid, QueryAttempt>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryAttemptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn save(&self, attempt: &QueryAttempt) -> Result<(), StoreError> {
        let mut attempts = self.attempts.write().await;
        attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<QueryAttempt, StoreError> {
        let attempts = self.attempts.read().await;
        attempts.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }
}
