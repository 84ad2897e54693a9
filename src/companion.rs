//! Top-level wiring
//!
//! `Companion` builds every component around one shared state record and
//! exposes the user-facing toggles (mic/cam auto, visibility, brain load).

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bridge::BrainBridge;
use crate::config::Config;
use crate::devices::{CameraDevice, FaceDetector, FaceResult, SpeechRecognizer, SpeechSynthesizer, VideoSink};
use crate::dialogue::{BrainStatus, ConversationTurn, DialogueOrchestrator};
use crate::engine::InferenceEngine;
use crate::playback::PlaybackController;
use crate::preferences::{DeviceKind, PreferenceStore};
use crate::speech::{RecognitionState, SpeechSupervisor};
use crate::state::{CompanionState, SharedState};
use crate::status::{StatusEvent, StatusFeed};
use crate::vision::{blendshape_score, CameraHandle, CameraSupervisor};
use crate::visibility::VisibilityGate;

/// Capacity of the finalized-transcript queue
const TRANSCRIPT_QUEUE: usize = 16;

/// The external collaborators the companion drives
pub struct Devices {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub camera: Arc<dyn CameraDevice>,
    pub face_detector: Box<dyn FaceDetector>,
    pub video_sink: Option<Arc<dyn VideoSink>>,
}

/// Facial expression summary derived from the latest face result
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Expression {
    pub smile: f32,
    pub jaw_open: f32,
    pub blink: f32,
}

impl Expression {
    pub fn from_face(face: &FaceResult) -> Self {
        let face = Some(face);
        Self {
            smile: (blendshape_score(face, "mouthSmileLeft")
                + blendshape_score(face, "mouthSmileRight"))
                / 2.0,
            jaw_open: blendshape_score(face, "jawOpen"),
            blink: (blendshape_score(face, "eyeBlinkLeft")
                + blendshape_score(face, "eyeBlinkRight"))
                / 2.0,
        }
    }
}

/// Point-in-time view for the control API
#[derive(Debug, Clone, Serialize)]
pub struct CompanionStatus {
    pub visible: bool,
    pub speaking: bool,
    pub recognition: RecognitionState,
    pub mic_auto: bool,
    pub cam_auto: bool,
    pub camera: Option<CameraHandle>,
    pub expression: Option<Expression>,
    pub brain: BrainStatus,
    pub subtitle: Option<StatusEvent>,
    pub current_turn: Option<ConversationTurn>,
    pub last_turn: Option<ConversationTurn>,
}

pub struct Companion {
    state: SharedState,
    status: StatusFeed,
    preferences: Arc<dyn PreferenceStore>,
    speech: SpeechSupervisor,
    camera: Arc<CameraSupervisor>,
    playback: Arc<PlaybackController>,
    gate: VisibilityGate,
    dialogue: Arc<DialogueOrchestrator>,
    expression: Arc<Mutex<Option<Expression>>>,
    transcripts: mpsc::Sender<String>,
    pending_transcripts: Mutex<Option<mpsc::Receiver<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Companion {
    /// Wire everything up. Spawns the inference worker, so this must run
    /// inside a Tokio runtime.
    pub fn new(
        config: &Config,
        devices: Devices,
        engine: Box<dyn InferenceEngine>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        let state = SharedState::new(CompanionState::default());
        let status = StatusFeed::new();

        let speech = SpeechSupervisor::new(
            state.clone(),
            devices.recognizer,
            config.speech.retry.policy(),
            status.clone(),
        );

        let camera = Arc::new(CameraSupervisor::new(
            devices.camera,
            devices.face_detector,
            devices.video_sink,
            config.camera.frame_interval(),
        ));

        let expression: Arc<Mutex<Option<Expression>>> = Arc::new(Mutex::new(None));
        let latest = Arc::clone(&expression);
        camera.set_results_callback(move |face| {
            let next = face.map(Expression::from_face);
            let mut slot = latest
                .lock()
                .map_err(|_| anyhow::anyhow!("expression lock poisoned"))?;
            *slot = next;
            Ok(())
        });

        let playback = Arc::new(PlaybackController::new(
            state.clone(),
            speech.clone(),
            devices.synthesizer,
            config.voice.clone(),
        ));

        let gate = VisibilityGate::new(
            state.clone(),
            speech.clone(),
            Arc::clone(&camera),
            Arc::clone(&preferences),
            status.clone(),
        );

        let bridge = Arc::new(BrainBridge::spawn(engine));
        let dialogue = Arc::new(DialogueOrchestrator::new(
            bridge,
            Arc::clone(&playback),
            &config.brain,
            config.persona.clone(),
            status.clone(),
        ));

        let (transcripts, pending) = mpsc::channel(TRANSCRIPT_QUEUE);

        Self {
            state,
            status,
            preferences,
            speech,
            camera,
            playback,
            gate,
            dialogue,
            expression,
            transcripts,
            pending_transcripts: Mutex::new(Some(pending)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the recognition pump and dialogue loop, then apply the
    /// persisted preferences through the visibility gate
    pub async fn start(&self) -> Result<()> {
        let pending = self
            .pending_transcripts
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        let Some(pending) = pending else {
            bail!("Companion already started");
        };

        let pump = self
            .speech
            .spawn(self.transcripts.clone())
            .context("Recognition event pump already running")?;
        let dialogue = tokio::spawn(Arc::clone(&self.dialogue).run(pending));

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(pump);
            tasks.push(dialogue);
        }

        let visible = self.state.lock().visible;
        self.gate.apply_visibility(visible).await;

        info!("Companion started");
        Ok(())
    }

    /// Auto-listen toggle
    pub fn set_mic_auto(&self, enabled: bool) -> Result<()> {
        self.preferences
            .set(DeviceKind::Mic, enabled)
            .context("Failed to save mic preference")?;

        if enabled {
            self.speech.enable();
        } else {
            self.speech.disable();
        }
        Ok(())
    }

    /// Auto-camera toggle. Returns whether the camera is running afterwards.
    pub async fn set_cam_auto(&self, enabled: bool) -> Result<bool> {
        self.preferences
            .set(DeviceKind::Cam, enabled)
            .context("Failed to save camera preference")?;

        if enabled {
            Ok(self.gate.start_camera().await)
        } else {
            self.camera.stop().await;
            Ok(false)
        }
    }

    /// Page visibility changed (or the page was re-shown)
    pub async fn set_visibility(&self, visible: bool) {
        self.gate.apply_visibility(visible).await;
    }

    pub async fn load_brain(&self) -> Option<String> {
        self.dialogue.load_brain().await
    }

    /// Queue a finalized transcript as if it had been heard
    pub async fn submit_transcript(&self, text: impl Into<String>) -> Result<()> {
        self.transcripts
            .send(text.into())
            .await
            .context("Dialogue loop is not running")
    }

    pub async fn status(&self) -> CompanionStatus {
        let camera = self.camera.current().await;
        let expression = self.expression.lock().ok().and_then(|e| *e);
        let state = self.state.snapshot();
        CompanionStatus {
            visible: state.visible,
            speaking: state.speaking,
            recognition: state.recognition.state(),
            mic_auto: self.preferences.get(DeviceKind::Mic),
            cam_auto: self.preferences.get(DeviceKind::Cam),
            camera,
            expression,
            brain: self.dialogue.brain_status(),
            subtitle: self.status.latest(),
            current_turn: self.dialogue.current_turn(),
            last_turn: self.dialogue.last_turn(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    pub fn status_feed(&self) -> &StatusFeed {
        &self.status
    }

    pub fn dialogue(&self) -> &Arc<DialogueOrchestrator> {
        &self.dialogue
    }

    pub fn playback(&self) -> &Arc<PlaybackController> {
        &self.playback
    }

    pub fn speech(&self) -> &SpeechSupervisor {
        &self.speech
    }

    pub fn camera(&self) -> &Arc<CameraSupervisor> {
        &self.camera
    }

    /// Stop capture and background tasks
    pub async fn shutdown(&self) {
        self.speech.suspend();
        self.camera.stop().await;

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .map(|mut tasks| tasks.drain(..).collect())
            .unwrap_or_default();
        for task in tasks {
            task.abort();
        }

        debug!("Companion shut down");
    }
}
