use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::DeviceError;

/// Callbacks emitted by a speech recognition engine
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// A hypothesis for the current utterance
    Result {
        transcript: String,
        /// Final hypothesis for this utterance (interim otherwise)
        is_final: bool,
    },
    /// The engine ended its session (it may do so at any time)
    End,
    /// The engine reported an error; treated as transient
    Error(String),
}

/// Where a recognizer delivers its callbacks
pub type RecognitionEvents = mpsc::UnboundedSender<RecognitionEvent>;

/// Continuous speech recognition engine
///
/// `start` and `stop` only request a state change; the engine answers
/// asynchronously through the attached event channel, and may emit `End`
/// on its own at any time.
pub trait SpeechRecognizer: Send + Sync {
    /// Install the event channel. Called once by the supervisor.
    fn attach(&self, events: RecognitionEvents);

    /// Begin a recognition session
    ///
    /// Engines that refuse a second `start` while a session runs report
    /// `DeviceError::AlreadyStarted`; the supervisor treats that as started.
    fn start(&self) -> Result<(), DeviceError>;

    /// End the current session; an `End` event normally follows
    fn stop(&self);

    /// Engine name for logging
    fn name(&self) -> &str;
}

/// One thing to say
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
}

/// Speech synthesis engine: one audible utterance at a time
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Play an utterance, resolving when it finishes or fails
    async fn speak(&self, utterance: Utterance) -> Result<(), DeviceError>;

    /// Drop whatever is queued or playing. Its `speak` future resolves
    /// with `DeviceError::Interrupted`.
    fn cancel(&self);

    /// Engine name for logging
    fn name(&self) -> &str;
}
