//! Event bus contract and an in-memory implementation.
//!
//! The engine publishes authentication lifecycle events and consumes
//! session lifecycle events for cache invalidation. The transport is
//! external; this module defines the seam plus a process-local bus
//! suitable for single-process hosts and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::account::IdentifierCollection;

/// Topics published and consumed by the engine.
pub mod topics {
    pub const AUTHENTICATION_PROGRESS: &str = "AUTHENTICATION.PROGRESS";
    pub const AUTHENTICATION_SUCCEEDED: &str = "AUTHENTICATION.SUCCEEDED";
    pub const AUTHENTICATION_FAILED: &str = "AUTHENTICATION.FAILED";
    pub const AUTHENTICATION_ACCOUNT_NOT_FOUND: &str = "AUTHENTICATION.ACCOUNT_NOT_FOUND";
    pub const AUTHENTICATION_ACCOUNT_LOCKED: &str = "AUTHENTICATION.ACCOUNT_LOCKED";
    pub const SESSION_EXPIRE: &str = "SESSION.EXPIRE";
    pub const SESSION_STOP: &str = "SESSION.STOP";
}

/// Payload carried on the bus. Authentication events carry a single
/// identifier; session events carry the full identifier collection.
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub identifier: Option<String>,
    pub identifiers: Option<IdentifierCollection>,
}

impl Event {
    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            identifiers: None,
        }
    }

    pub fn with_identifiers(identifiers: IdentifierCollection) -> Self {
        Self {
            identifier: None,
            identifiers: Some(identifiers),
        }
    }
}

#[derive(Debug, Error)]
#[error("event bus publication failed: {0}")]
pub struct EventBusError(pub String);

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, topic: &str, event: &Event);
}

/// Publish/subscribe seam to the external bus transport.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, event: Event) -> Result<(), EventBusError>;

    async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>);
}

/// Process-local bus: handlers run inline on the publisher's task, in
/// subscription order.
#[derive(Default)]
pub struct InMemoryEventBus {
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, event: Event) -> Result<(), EventBusError> {
        let handlers = {
            let subscribers = self.subscribers.read().await;
            subscribers.get(topic).cloned().unwrap_or_default()
        };
        for handler in handlers {
            handler.handle(topic, &event).await;
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(topic.to_string()).or_default().push(handler);
    }
}
