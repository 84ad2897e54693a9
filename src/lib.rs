pub mod bridge;
pub mod companion;
pub mod config;
pub mod devices;
pub mod dialogue;
pub mod engine;
pub mod http;
pub mod playback;
pub mod preferences;
pub mod speech;
pub mod state;
pub mod status;
pub mod visibility;
pub mod vision;

pub use bridge::{BrainBridge, BridgeError, ChatMessage, ChatRequest, WorkerRequest, WorkerResponse};
pub use companion::{Companion, CompanionStatus, Devices, Expression};
pub use config::Config;
pub use dialogue::{BrainStatus, DialogueOrchestrator, TurnOutcome};
pub use engine::{InferenceEngine, OllamaEngine};
pub use http::{create_router, AppState};
pub use playback::PlaybackController;
pub use preferences::{DeviceKind, JsonPreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use speech::{RecognitionState, SpeechSupervisor};
pub use state::{CompanionState, SharedState};
pub use status::{StatusEvent, StatusFeed, StatusKind};
pub use visibility::VisibilityGate;
pub use vision::{CameraHandle, CameraSupervisor};
