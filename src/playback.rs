//! Speech playback
//!
//! `speak` is the only writer of the speaking flag. Raising the flag and
//! stopping recognition happen in one critical section (flag first), and so
//! do lowering it and resuming recognition (flag first), so the microphone
//! is never live while the companion's own voice is audible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::VoiceConfig;
use crate::devices::{DeviceError, SpeechSynthesizer, Utterance};
use crate::speech::{CaptureEvent, SpeechSupervisor};
use crate::state::SharedState;

pub struct PlaybackController {
    state: SharedState,
    speech: SpeechSupervisor,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: VoiceConfig,
    /// Bumped per utterance; only the newest one may lower the flag
    generation: AtomicU64,
}

impl PlaybackController {
    pub fn new(
        state: SharedState,
        speech: SpeechSupervisor,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        voice: VoiceConfig,
    ) -> Self {
        Self {
            state,
            speech,
            synthesizer,
            voice,
            generation: AtomicU64::new(0),
        }
    }

    /// Say `text`, preempting anything already playing
    ///
    /// Never fails: returns `false` if playback errored or was preempted,
    /// so the dialogue flow carries on either way.
    pub async fn speak(&self, text: &str) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut state = self.state.lock();
            state.speaking = true;
            self.speech.step(&mut state, CaptureEvent::SpeechStarted);
        }

        self.synthesizer.cancel();

        let utterance = Utterance {
            text: text.to_string(),
            rate: self.voice.rate,
            pitch: self.voice.pitch,
        };

        debug!(
            "Speaking utterance #{} via '{}' ({} chars)",
            generation,
            self.synthesizer.name(),
            text.len()
        );

        let spoke = match self.synthesizer.speak(utterance).await {
            Ok(()) => true,
            Err(DeviceError::Interrupted) => {
                info!("Utterance #{} interrupted", generation);
                false
            }
            Err(e) => {
                warn!("Playback failed: {}", e);
                false
            }
        };

        {
            let mut state = self.state.lock();
            if self.generation.load(Ordering::SeqCst) == generation {
                state.speaking = false;
                self.speech.step(&mut state, CaptureEvent::SpeechFinished);
            } else {
                debug!("Utterance #{} superseded; leaving speaking flag up", generation);
            }
        }

        spoke
    }

    pub fn is_speaking(&self) -> bool {
        self.state.lock().speaking
    }
}
