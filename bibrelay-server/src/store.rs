//! Idempotent message store.
//!
//! Acceptance happens in two independent steps. The in-memory collection
//! rejects any message whose identity is already present. Accepted
//! messages are then persisted under a separate gate that checks the
//! durable store by message id. The two checks are not one transaction.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bibrelay_model::{MessageIdentity, ParsedMessage};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::repository::{MessageRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence failed: {0}")]
    Repository(#[from] RepositoryError),
}

/// What the durable step did with an accepted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    /// The durable store already holds this message id.
    AlreadyPresent,
    /// A concurrent writer won the insert; this copy was dropped.
    Conflict,
    Failed,
    /// The message was a duplicate and never reached persistence.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub accepted: bool,
    pub persisted: PersistOutcome,
}

impl AcceptOutcome {
    pub fn duplicate() -> Self {
        Self {
            accepted: false,
            persisted: PersistOutcome::Skipped,
        }
    }

    pub fn persistence_failed(&self) -> bool {
        self.persisted == PersistOutcome::Failed
    }
}

#[derive(Default)]
struct Collection {
    messages: Vec<ParsedMessage>,
    identities: HashSet<MessageIdentity>,
}

impl Collection {
    fn insert(&mut self, message: ParsedMessage) -> bool {
        if !self.identities.insert(message.identity()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    fn remove(&mut self, identity: &MessageIdentity) -> bool {
        if !self.identities.remove(identity) {
            return false;
        }
        self.messages.retain(|message| message.identity() != *identity);
        true
    }
}

pub struct MessageStore {
    collection: RwLock<Collection>,
    repository: Arc<dyn MessageRepository>,
    persist_gate: Mutex<()>,
}

impl fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MessageStore");
        match self.collection.try_read() {
            Some(guard) => debug.field("messages", &guard.messages.len()),
            None => debug.field("messages", &"<locked>"),
        };
        debug.field("repository", &self.repository).finish()
    }
}

impl MessageStore {
    pub fn new(repository: Arc<dyn MessageRepository>) -> Self {
        Self {
            collection: RwLock::new(Collection::default()),
            repository,
            persist_gate: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.repository.backend()
    }

    pub async fn accept(&self, message: ParsedMessage) -> AcceptOutcome {
        let identity = message.identity();
        let admitted = self.collection.write().insert(message.clone());
        if !admitted {
            warn!(
                message_id = %identity.message_id,
                origin_host = %identity.origin_host,
                "duplicate message ignored"
            );
            return AcceptOutcome::duplicate();
        }

        let persisted = match self.persist(&message).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    message_id = %message.message_id,
                    backend = self.backend(),
                    error = %err,
                    "message kept in memory but not persisted"
                );
                PersistOutcome::Failed
            }
        };

        AcceptOutcome {
            accepted: true,
            persisted,
        }
    }

    /// Durable step on its own: existence check then transactional insert.
    pub async fn persist(
        &self,
        message: &ParsedMessage,
    ) -> Result<PersistOutcome, StoreError> {
        let _gate = self.persist_gate.lock().await;

        if self.repository.exists(&message.message_id).await? {
            info!(
                message_id = %message.message_id,
                "message already persisted; skipping"
            );
            return Ok(PersistOutcome::AlreadyPresent);
        }

        match self.repository.insert(message).await {
            Ok(()) => {
                debug!(message_id = %message.message_id, "message persisted");
                Ok(PersistOutcome::Inserted)
            }
            Err(RepositoryError::Conflict(id)) => {
                warn!(message_id = %id, "write conflict; record dropped");
                Ok(PersistOutcome::Conflict)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Drop an accepted message from memory so a resubmission is accepted
    /// again. The durable row, if any, is kept.
    pub fn forget(&self, identity: &MessageIdentity) -> bool {
        let removed = self.collection.write().remove(identity);
        if removed {
            debug!(message_id = %identity.message_id, "message forgotten");
        }
        removed
    }

    /// Load messages into memory only. Returns how many were new.
    pub fn rehydrate(&self, messages: Vec<ParsedMessage>) -> usize {
        let mut collection = self.collection.write();
        messages
            .into_iter()
            .filter(|message| !message.is_empty())
            .map(|message| collection.insert(message))
            .filter(|inserted| *inserted)
            .count()
    }

    /// Accepted messages in arrival order.
    pub fn messages(&self) -> Vec<ParsedMessage> {
        self.collection.read().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.collection.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn persisted_count(&self) -> Result<u64, StoreError> {
        Ok(self.repository.count().await?)
    }
}
