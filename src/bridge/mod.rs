//! Worker bridge
//!
//! Model loading and generation run in a dedicated worker task that only
//! talks envelopes (`messages`). `BrainBridge` turns that into two async
//! calls, `init` and `chat`, with progress and delta callbacks.

pub mod client;
pub mod messages;
pub mod worker;

pub use client::{BrainBridge, BridgeError};
pub use messages::{
    ChatMessage, ChatRequest, GenerationParams, Role, WorkerRequest, WorkerResponse,
    DEFAULT_MAX_GEN_LEN, DEFAULT_TEMPERATURE,
};
pub use worker::spawn_worker;
