//! Durable storage port for accepted messages.

mod memory;
mod postgres;

pub use memory::InMemoryMessageRepository;
pub use postgres::PostgresMessageRepository;

use async_trait::async_trait;
use bibrelay_model::ParsedMessage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Another writer stored the same message id first.
    #[error("message {0} already stored")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Contract every persistence backend fulfils.
#[async_trait]
pub trait MessageRepository: Send + Sync + std::fmt::Debug {
    /// Short backend label for logs and service info.
    fn backend(&self) -> &'static str;

    async fn exists(&self, message_id: &str) -> Result<bool, RepositoryError>;

    /// Store the message and its records atomically.
    async fn insert(
        &self,
        message: &ParsedMessage,
    ) -> Result<(), RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;
}
