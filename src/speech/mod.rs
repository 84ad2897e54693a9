//! Speech capture supervision
//!
//! - `state`: pure recognition state machine (transition table)
//! - `backoff`: restart delay policy for recognition errors
//! - `supervisor`: owns the recognizer, executes the machine's actions and
//!   turns final results into transcripts

mod backoff;
mod state;
mod supervisor;

pub use backoff::{BackoffPolicy, BackoffStrategy};
pub use state::{Action, CaptureEvent, Conditions, RecognitionMachine, RecognitionState};
pub use supervisor::SpeechSupervisor;
