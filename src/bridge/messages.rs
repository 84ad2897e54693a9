use serde::{Deserialize, Serialize};

/// Sampling temperature used when a chat request leaves it out
pub const DEFAULT_TEMPERATURE: f32 = 0.9;

/// Generation length cap used when a chat request leaves it out
pub const DEFAULT_MAX_GEN_LEN: u32 = 160;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Envelope sent to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    /// Load a model; answered by `ready` or `error`
    Init { model: String },
    /// Generate a reply; answered by `delta`* then `done` or `error`
    Chat {
        messages: Vec<ChatMessage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_gen_len: Option<u32>,
    },
}

/// Envelope sent back by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerResponse {
    /// Human-readable model loading status
    Progress { text: String },
    /// Model loaded
    Ready { model: String },
    /// New fragment of the reply plus everything generated so far
    Delta { delta: String, full: String },
    /// Generation finished
    Done { full: String },
    /// The pending `init` or `chat` failed
    Error { error: String },
}

impl WorkerResponse {
    /// Whether this envelope settles the pending request
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerResponse::Ready { .. } | WorkerResponse::Done { .. } | WorkerResponse::Error { .. }
        )
    }
}

/// A chat call as issued by the dialogue layer
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_gen_len: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_gen_len: None,
        }
    }
}

impl From<ChatRequest> for WorkerRequest {
    fn from(req: ChatRequest) -> Self {
        WorkerRequest::Chat {
            messages: req.messages,
            temperature: req.temperature,
            max_gen_len: req.max_gen_len,
        }
    }
}

/// Generation parameters with defaults applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_gen_len: u32,
}

impl GenerationParams {
    pub fn resolve(temperature: Option<f32>, max_gen_len: Option<u32>) -> Self {
        Self {
            temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_gen_len: max_gen_len.unwrap_or(DEFAULT_MAX_GEN_LEN),
        }
    }
}
