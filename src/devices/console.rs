//! Terminal stand-ins for the browser devices
//!
//! - `ConsoleRecognizer`: each line typed on stdin is a final transcript
//! - `ConsoleSynthesizer`: prints replies and "speaks" for a duration
//!   proportional to their length
//! - `NoCamera` / `NoFaceDetector`: no video on a terminal

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::camera::{CameraDevice, CameraStream, FaceDetector, FaceResult, VideoFrame};
use super::error::DeviceError;
use super::speech::{RecognitionEvent, RecognitionEvents, SpeechRecognizer, SpeechSynthesizer, Utterance};

/// Reads stdin lines as final recognition results
pub struct ConsoleRecognizer {
    events: Mutex<Option<RecognitionEvents>>,
    listening: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleRecognizer {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(None),
            listening: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }
}

impl Default for ConsoleRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn attach(&self, events: RecognitionEvents) {
        if let Ok(mut slot) = self.events.lock() {
            *slot = Some(events);
        }
    }

    fn start(&self) -> Result<(), DeviceError> {
        let events = self
            .events
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or_else(|| DeviceError::Failed("recognizer not attached".to_string()))?;

        self.listening.store(true, Ordering::SeqCst);

        let mut reader = self
            .reader
            .lock()
            .map_err(|_| DeviceError::Failed("reader lock poisoned".to_string()))?;
        if reader.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        // stdin can only be read by one task, so the reader outlives sessions
        // and drops lines typed while not listening
        let listening = Arc::clone(&self.listening);
        *reader = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !listening.load(Ordering::SeqCst) {
                    debug!("Ignoring console input while not listening");
                    continue;
                }
                let event = RecognitionEvent::Result {
                    transcript: line,
                    is_final: true,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            let _ = events.send(RecognitionEvent::End);
        }));

        Ok(())
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
        let events = self.events.lock().ok().and_then(|slot| slot.clone());
        if let Some(events) = events {
            let _ = events.send(RecognitionEvent::End);
        }
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// Prints utterances; playback time scales with word count
pub struct ConsoleSynthesizer {
    per_word: Duration,
    cancelled: Notify,
}

impl ConsoleSynthesizer {
    pub fn new(per_word: Duration) -> Self {
        Self {
            per_word,
            cancelled: Notify::new(),
        }
    }
}

impl Default for ConsoleSynthesizer {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    async fn speak(&self, utterance: Utterance) -> Result<(), DeviceError> {
        println!("🔊 {}", utterance.text);

        let words = utterance.text.split_whitespace().count() as f32;
        let rate = if utterance.rate > 0.0 { utterance.rate } else { 1.0 };
        let duration = self.per_word.mul_f32(words / rate);

        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled.notified() => Err(DeviceError::Interrupted),
        }
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// A machine without a camera
pub struct NoCamera;

#[async_trait]
impl CameraDevice for NoCamera {
    async fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError> {
        info!("No camera available on this host");
        Err(DeviceError::Unavailable("no camera on this host".to_string()))
    }
}

/// Face model that never finds a face
pub struct NoFaceDetector;

impl FaceDetector for NoFaceDetector {
    fn detect(
        &mut self,
        _frame: &VideoFrame,
        _timestamp_ms: f64,
    ) -> anyhow::Result<Option<FaceResult>> {
        Ok(None)
    }
}
