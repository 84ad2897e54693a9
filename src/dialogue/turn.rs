use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One user utterance and the companion's reply to it
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub user_text: String,
    /// Reply accumulated so far; only ever appended to
    pub reply_text: String,
    /// Set once the terminal envelope has arrived
    pub is_final: bool,
    pub started_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_text: user_text.into(),
            reply_text: String::new(),
            is_final: false,
            started_at: Utc::now(),
        }
    }

    /// Append a streamed fragment. Ignored once the turn is final.
    pub fn append_delta(&mut self, delta: &str) {
        if !self.is_final {
            self.reply_text.push_str(delta);
        }
    }

    /// Freeze the reply with the terminal text
    ///
    /// The terminal text is authoritative; it normally equals what the
    /// deltas already built up.
    pub fn finish(&mut self, full: impl Into<String>) {
        if !self.is_final {
            self.reply_text = full.into();
            self.is_final = true;
        }
    }
}
