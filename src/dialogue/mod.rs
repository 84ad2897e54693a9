//! Conversation turns
//!
//! Finalized transcripts become one `ConversationTurn` at a time: load a
//! model if needed, ask the worker, show the reply as it streams, speak it,
//! and only then take the next transcript.

mod ladder;
mod orchestrator;
mod turn;

pub use ladder::{BrainStatus, ModelLadder};
pub use orchestrator::{DialogueOrchestrator, TurnOutcome};
pub use turn::ConversationTurn;
