use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use bibrelay_model::ParsedMessage;
use parking_lot::Mutex;

use super::{MessageRepository, RepositoryError};

/// Process-local backend used when no database is configured.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    rows: Mutex<HashMap<String, ParsedMessage>>,
}

impl fmt::Debug for InMemoryMessageRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryMessageRepository");
        match self.rows.try_lock() {
            Some(rows) => debug.field("rows", &rows.len()),
            None => debug.field("rows", &"<locked>"),
        };
        debug.finish()
    }
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, message_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.rows.lock().contains_key(message_id))
    }

    async fn insert(
        &self,
        message: &ParsedMessage,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&message.message_id) {
            return Err(RepositoryError::Conflict(message.message_id.clone()));
        }
        rows.insert(message.message_id.clone(), message.clone());
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.rows.lock().len() as u64)
    }
}
