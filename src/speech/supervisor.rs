use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backoff::BackoffPolicy;
use super::state::{Action, CaptureEvent, RecognitionState};
use crate::devices::{DeviceError, RecognitionEvent, SpeechRecognizer};
use crate::state::{CompanionState, SharedState};
use crate::status::{StatusFeed, StatusKind};

/// Owns the speech recognizer session
///
/// All recognizer callbacks, toggles and playback hooks go through the
/// recognition machine; the supervisor performs the action it returns while
/// still holding the state lock, so the device can never be started after a
/// concurrent transition has decided it must be stopped.
#[derive(Clone)]
pub struct SpeechSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    state: SharedState,
    recognizer: Arc<dyn SpeechRecognizer>,
    policy: BackoffPolicy,
    status: StatusFeed,
    /// Armed backoff timer
    retry: Mutex<Option<JoinHandle<()>>>,
    /// Recognizer callbacks, taken by `spawn`
    events: Mutex<Option<mpsc::UnboundedReceiver<RecognitionEvent>>>,
}

impl SpeechSupervisor {
    pub fn new(
        state: SharedState,
        recognizer: Arc<dyn SpeechRecognizer>,
        policy: BackoffPolicy,
        status: StatusFeed,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        recognizer.attach(tx);

        info!(
            "Speech supervisor using recognizer '{}' (retry {:?}, max attempts {:?})",
            recognizer.name(),
            policy.base_delay,
            policy.max_attempts
        );

        Self {
            inner: Arc::new(Inner {
                state,
                recognizer,
                policy,
                status,
                retry: Mutex::new(None),
                events: Mutex::new(Some(rx)),
            }),
        }
    }

    /// Start consuming recognizer callbacks
    ///
    /// Final, non-empty transcripts are forwarded to `transcripts`; interim
    /// hypotheses only go to the status feed. A transcript that finds the
    /// queue full is dropped. Returns `None` if the pump is already running.
    pub fn spawn(&self, transcripts: mpsc::Sender<String>) -> Option<JoinHandle<()>> {
        let mut events = self.inner.events.lock().ok()?.take()?;
        let supervisor = self.clone();

        Some(tokio::spawn(async move {
            info!("Recognition event pump started");

            while let Some(event) = events.recv().await {
                match event {
                    RecognitionEvent::Result {
                        transcript,
                        is_final,
                    } => {
                        let Some(text) = supervisor.accept_result(&transcript, is_final) else {
                            continue;
                        };
                        // Never wait on the dialogue loop; engine callbacks queue behind us
                        match transcripts.try_send(text) {
                            Ok(()) => {}
                            Err(TrySendError::Full(text)) => {
                                warn!("Transcript queue full; dropping \"{}\"", text);
                            }
                            Err(TrySendError::Closed(_)) => {
                                warn!("Transcript receiver dropped; stopping event pump");
                                break;
                            }
                        }
                    }
                    RecognitionEvent::End => supervisor.dispatch(CaptureEvent::EngineEnded),
                    RecognitionEvent::Error(message) => {
                        supervisor.dispatch(CaptureEvent::EngineError(message))
                    }
                }
            }

            info!("Recognition event pump stopped");
        }))
    }

    /// Auto-listen on
    pub fn enable(&self) {
        self.dispatch(CaptureEvent::Enable);
    }

    /// Auto-listen off
    pub fn disable(&self) {
        self.dispatch(CaptureEvent::Disable);
    }

    /// Page hidden
    pub fn suspend(&self) {
        self.dispatch(CaptureEvent::Suspend);
    }

    pub fn state(&self) -> RecognitionState {
        self.inner.state.lock().recognition.state()
    }

    /// Feed one event through the machine and act on it
    pub fn dispatch(&self, event: CaptureEvent) {
        let mut state = self.inner.state.lock();
        self.step(&mut state, event);
    }

    /// Feed an event while the caller already holds the state lock
    ///
    /// Used by the playback controller so that flipping the speaking flag
    /// and stopping/resuming recognition happen in one critical section.
    pub fn step(&self, state: &mut CompanionState, event: CaptureEvent) {
        let mut next = Some(event);
        while let Some(event) = next.take() {
            let cond = state.conditions();
            let action = state
                .recognition
                .on_event(&event, cond, &self.inner.policy);

            if state.recognition.state() == RecognitionState::Failed
                && matches!(event, CaptureEvent::EngineError(_))
            {
                self.inner.status.system(format!(
                    "Speech recognition stopped after {} failed restarts. Turn the mic on again to retry.",
                    state.recognition.attempts()
                ));
            }

            next = self.perform(action);
        }
    }

    /// Execute a device action. A failed start comes back as an engine error.
    fn perform(&self, action: Action) -> Option<CaptureEvent> {
        match action {
            Action::None => None,
            Action::Start => match self.inner.recognizer.start() {
                Ok(()) => {
                    debug!("Recognizer '{}' started", self.inner.recognizer.name());
                    None
                }
                // The end of an earlier stop can overtake a restart
                Err(DeviceError::AlreadyStarted) => {
                    debug!("Recognizer '{}' already running", self.inner.recognizer.name());
                    None
                }
                Err(e) => {
                    warn!("Recognizer failed to start: {}", e);
                    Some(CaptureEvent::EngineError(e.to_string()))
                }
            },
            Action::Stop => {
                self.inner.recognizer.stop();
                debug!("Recognizer '{}' stopped", self.inner.recognizer.name());
                None
            }
            Action::ScheduleRetry(delay) => {
                self.arm_retry(delay);
                None
            }
            Action::CancelRetry => {
                self.cancel_retry();
                None
            }
        }
    }

    fn arm_retry(&self, delay: Duration) {
        let supervisor = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            supervisor.dispatch(CaptureEvent::RetryElapsed);
        });

        match self.inner.retry.lock() {
            Ok(mut slot) => {
                if let Some(previous) = slot.replace(timer) {
                    previous.abort();
                }
            }
            Err(e) => error!("Retry timer slot poisoned: {}", e),
        }
    }

    fn cancel_retry(&self) {
        if let Ok(mut slot) = self.inner.retry.lock() {
            if let Some(timer) = slot.take() {
                timer.abort();
                debug!("Recognition retry cancelled");
            }
        }
    }

    /// Decide whether a recognition result becomes a transcript
    fn accept_result(&self, transcript: &str, is_final: bool) -> Option<String> {
        let text = transcript.trim();

        {
            let mut state = self.inner.state.lock();
            // Results still in flight after we stopped for speech or were
            // disabled are dropped so the companion never hears itself
            if !state.recognition.is_listening() {
                debug!("Dropping recognition result while {:?}", state.recognition.state());
                return None;
            }
            state.recognition.note_result();
        }

        if text.is_empty() {
            return None;
        }

        self.inner
            .status
            .publish(StatusKind::Heard, format!("You: {}", text));

        is_final.then(|| text.to_string())
    }
}
