//! Speech capture state machine
//!
//! Every recognizer callback, user toggle and playback hook is an event fed
//! through `RecognitionMachine::on_event`. The machine decides the next state
//! and the single device action to perform; it never touches the device
//! itself, so the restart/backoff policy can be tested without one.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;

/// Run state of the recognition engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionState {
    /// Not running and not trying to
    #[default]
    Idle,
    /// Engine session running
    Listening,
    /// Paused because the companion is talking; playback resumes us
    StoppedForSpeech,
    /// Engine errored; a retry timer is armed
    Backoff { attempt: u32 },
    /// Retry cap exceeded; only an explicit enable leaves this state
    Failed,
}

impl RecognitionState {
    /// Listening, or expected to be listening again without user action
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RecognitionState::Listening
                | RecognitionState::StoppedForSpeech
                | RecognitionState::Backoff { .. }
        )
    }
}

/// Inputs to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Auto-listen switched on (user toggle or restored preference)
    Enable,
    /// Auto-listen switched off by the user
    Disable,
    /// Page hidden; same as `Disable` until the gate re-enables
    Suspend,
    /// Playback is about to become audible
    SpeechStarted,
    /// Playback finished or failed
    SpeechFinished,
    /// Engine `end` callback
    EngineEnded,
    /// Engine `error` callback, or a failed `start`
    EngineError(String),
    /// Backoff timer fired
    RetryElapsed,
}

/// What the supervisor must do to the device after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Start,
    Stop,
    ScheduleRetry(Duration),
    CancelRetry,
}

/// Outside facts the transitions depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conditions {
    pub speaking: bool,
    pub visible: bool,
}

/// Recognition state plus the "listening is wanted" flag
#[derive(Debug, Clone, Default)]
pub struct RecognitionMachine {
    state: RecognitionState,
    wanted: bool,
    attempts: u32,
}

impl RecognitionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecognitionState {
        self.state
    }

    /// Whether auto-listen is currently wanted
    pub fn is_wanted(&self) -> bool {
        self.wanted
    }

    pub fn is_listening(&self) -> bool {
        self.state == RecognitionState::Listening
    }

    /// Consecutive recognition failures since the last healthy result
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// A recognition result arrived, so the engine is healthy again
    pub fn note_result(&mut self) {
        self.attempts = 0;
    }

    /// Apply an event and return the device action it requires
    pub fn on_event(
        &mut self,
        event: &CaptureEvent,
        cond: Conditions,
        policy: &BackoffPolicy,
    ) -> Action {
        use RecognitionState::*;

        let previous = self.state;
        let (next, action) = match (previous, event) {
            (_, CaptureEvent::Enable) => {
                self.wanted = true;
                match previous {
                    Idle | Failed if !cond.visible => (Idle, Action::None),
                    Idle | Failed if cond.speaking => (StoppedForSpeech, Action::None),
                    Idle | Failed => {
                        self.attempts = 0;
                        (Listening, Action::Start)
                    }
                    other => (other, Action::None),
                }
            }

            (_, CaptureEvent::Disable | CaptureEvent::Suspend) => {
                self.wanted = false;
                match previous {
                    Listening => (Idle, Action::Stop),
                    Backoff { .. } => (Idle, Action::CancelRetry),
                    _ => (Idle, Action::None),
                }
            }

            (Listening, CaptureEvent::SpeechStarted) => (StoppedForSpeech, Action::Stop),
            (Backoff { .. }, CaptureEvent::SpeechStarted) => {
                (StoppedForSpeech, Action::CancelRetry)
            }

            (StoppedForSpeech, CaptureEvent::SpeechFinished) => self.resume(cond),

            (Listening, CaptureEvent::EngineEnded) => self.resume(cond),

            (Listening, CaptureEvent::EngineError(_)) => {
                if !self.wanted || !cond.visible {
                    (Idle, Action::None)
                } else if cond.speaking {
                    (StoppedForSpeech, Action::None)
                } else {
                    self.attempts += 1;
                    if policy.is_exhausted(self.attempts) {
                        (Failed, Action::None)
                    } else {
                        (
                            Backoff {
                                attempt: self.attempts,
                            },
                            Action::ScheduleRetry(policy.delay_for_attempt(self.attempts)),
                        )
                    }
                }
            }

            (Backoff { .. }, CaptureEvent::RetryElapsed) => self.resume(cond),

            // Late callbacks from a session we already gave up on, stale
            // timers, and speech hooks while not listening
            (state, _) => (state, Action::None),
        };

        self.state = next;

        if next != previous {
            match (next, event) {
                (Failed, CaptureEvent::EngineError(message)) => warn!(
                    "Recognition gave up after {} attempts: {}",
                    self.attempts, message
                ),
                (Backoff { attempt }, CaptureEvent::EngineError(message)) => warn!(
                    "Recognition error (attempt {}): {}; retrying",
                    attempt, message
                ),
                _ => info!(
                    "Recognition state transition: {:?} -> {:?} (event: {:?})",
                    previous, next, event
                ),
            }
        } else if action != Action::None {
            debug!("Recognition {:?} on {:?}: {:?}", next, event, action);
        }

        action
    }

    /// Start listening again if everything allows it
    fn resume(&self, cond: Conditions) -> (RecognitionState, Action) {
        if !self.wanted || !cond.visible {
            (RecognitionState::Idle, Action::None)
        } else if cond.speaking {
            (RecognitionState::StoppedForSpeech, Action::None)
        } else {
            (RecognitionState::Listening, Action::Start)
        }
    }
}
