//! Subtitle / status feed
//!
//! Every component reports user-visible progress through a `StatusFeed`: the
//! latest line is kept for `/status` snapshots and every update is broadcast
//! to subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// What kind of line is being shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// System status (loading, errors, device changes)
    System,
    /// Live recognition hypothesis from the user
    Heard,
    /// Companion reply, possibly still streaming
    Reply,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct StatusFeed {
    latest: Arc<RwLock<Option<StatusEvent>>>,
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            latest: Arc::new(RwLock::new(None)),
            tx,
        }
    }

    pub fn publish(&self, kind: StatusKind, text: impl Into<String>) {
        let event = StatusEvent {
            kind,
            text: text.into(),
            timestamp: Utc::now(),
        };
        debug!("status [{:?}] {}", event.kind, event.text);

        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(event.clone());
        }
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn system(&self, text: impl Into<String>) {
        self.publish(StatusKind::System, text);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<StatusEvent> {
        self.latest.read().ok().and_then(|latest| latest.clone())
    }
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new()
    }
}
