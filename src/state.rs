//! Process-wide orchestrator state
//!
//! One record holds everything more than one component reads: page
//! visibility, the speaking flag and the recognition machine. It sits behind
//! a single `std::sync::Mutex` that is only held for a transition and the
//! synchronous device call that goes with it, never across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::speech::{Conditions, RecognitionMachine};

#[derive(Debug, Clone)]
pub struct CompanionState {
    /// Page / window is in the foreground. Written by the visibility gate.
    pub visible: bool,
    /// An utterance is audible. Written by the playback controller.
    pub speaking: bool,
    /// Speech capture state. Written through the speech supervisor.
    pub recognition: RecognitionMachine,
}

impl CompanionState {
    pub fn conditions(&self) -> Conditions {
        Conditions {
            speaking: self.speaking,
            visible: self.visible,
        }
    }
}

impl Default for CompanionState {
    fn default() -> Self {
        Self {
            visible: true,
            speaking: false,
            recognition: RecognitionMachine::new(),
        }
    }
}

/// Handle to the shared state
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<Mutex<CompanionState>>);

impl SharedState {
    pub fn new(state: CompanionState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    /// Lock the state. A panic while holding the lock leaves the state as
    /// the last completed transition wrote it, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, CompanionState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> CompanionState {
        self.lock().clone()
    }
}
