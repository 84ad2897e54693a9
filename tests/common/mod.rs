#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use companion::bridge::{ChatMessage, GenerationParams};
use companion::config::Config;
use companion::devices::{
    BlendshapeCategory, CameraDevice, CameraStream, DeviceError, FaceDetector, FaceResult,
    RecognitionEvent, RecognitionEvents, SpeechRecognizer, SpeechSynthesizer, Utterance,
    VideoFrame, VideoSink,
};
use companion::engine::{DeltaStream, InferenceEngine, ProgressFn};
use companion::speech::{BackoffPolicy, BackoffStrategy, SpeechSupervisor};
use companion::{Companion, Devices, MemoryPreferenceStore, SharedState, StatusFeed};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Poll `check` until it holds or two seconds pass
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

pub fn fast_policy() -> BackoffPolicy {
    BackoffPolicy {
        base_delay: Duration::from_millis(20),
        strategy: BackoffStrategy::Fixed,
        max_delay: Duration::from_millis(100),
        max_attempts: None,
    }
}

// ============================================================================
// Speech recognition
// ============================================================================

#[derive(Default)]
pub struct FakeRecognizer {
    events: Mutex<Option<RecognitionEvents>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    running: AtomicBool,
    fail_start: AtomicBool,
    reject_double_start: AtomicBool,
}

impl FakeRecognizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, event: RecognitionEvent) {
        let events = self.events.lock().unwrap().clone();
        events.expect("recognizer not attached").send(event).unwrap();
    }

    pub fn say(&self, text: &str, is_final: bool) {
        self.emit(RecognitionEvent::Result {
            transcript: text.to_string(),
            is_final,
        });
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn fail_starts(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Refuse `start` while a session runs, like a browser engine
    pub fn reject_double_start(&self, reject: bool) {
        self.reject_double_start.store(reject, Ordering::SeqCst);
    }
}

impl SpeechRecognizer for FakeRecognizer {
    fn attach(&self, events: RecognitionEvents) {
        *self.events.lock().unwrap() = Some(events);
    }

    fn start(&self) -> Result<(), DeviceError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DeviceError::Failed("engine busy".to_string()));
        }
        if self.reject_double_start.load(Ordering::SeqCst) && self.is_running() {
            return Err(DeviceError::AlreadyStarted);
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Speech synthesis
// ============================================================================

pub struct FakeSynth {
    duration: Mutex<Duration>,
    fail: AtomicBool,
    spoken: Mutex<Vec<String>>,
    cancelled: Notify,
    /// Set if the watched recognizer was running when speech began
    mic_live_while_speaking: AtomicBool,
    watch: Option<Arc<FakeRecognizer>>,
}

impl FakeSynth {
    pub fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self::build(duration, None))
    }

    pub fn watching(duration: Duration, recognizer: Arc<FakeRecognizer>) -> Arc<Self> {
        Arc::new(Self::build(duration, Some(recognizer)))
    }

    fn build(duration: Duration, watch: Option<Arc<FakeRecognizer>>) -> Self {
        Self {
            duration: Mutex::new(duration),
            fail: AtomicBool::new(false),
            spoken: Mutex::new(Vec::new()),
            cancelled: Notify::new(),
            mic_live_while_speaking: AtomicBool::new(false),
            watch,
        }
    }

    pub fn set_duration(&self, duration: Duration) {
        *self.duration.lock().unwrap() = duration;
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn mic_was_live(&self) -> bool {
        self.mic_live_while_speaking.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    async fn speak(&self, utterance: Utterance) -> Result<(), DeviceError> {
        if let Some(recognizer) = &self.watch {
            if recognizer.is_running() {
                self.mic_live_while_speaking.store(true, Ordering::SeqCst);
            }
        }
        self.spoken.lock().unwrap().push(utterance.text);

        if self.fail.load(Ordering::SeqCst) {
            return Err(DeviceError::Failed("audio device lost".to_string()));
        }

        let duration = *self.duration.lock().unwrap();
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled.notified() => Err(DeviceError::Interrupted),
        }
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Camera and face model
// ============================================================================

#[derive(Default)]
pub struct FakeCamera {
    deny: AtomicBool,
    opens: AtomicUsize,
    releases: Arc<AtomicUsize>,
    frame: Arc<Mutex<Option<VideoFrame>>>,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denied() -> Arc<Self> {
        let camera = Self::default();
        camera.deny.store(true, Ordering::SeqCst);
        Arc::new(camera)
    }

    /// Publish a new video frame at `media_time`
    pub fn show_frame(&self, media_time: f64) {
        *self.frame.lock().unwrap() = Some(VideoFrame {
            media_time,
            width: 4,
            height: 4,
            data: Arc::new(vec![0; 16]),
        });
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(DeviceError::PermissionDenied(
                "camera permission denied".to_string(),
            ));
        }
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(FakeStream {
            id: format!("stream-{}", n),
            frame: Arc::clone(&self.frame),
            releases: Arc::clone(&self.releases),
        }))
    }
}

pub struct FakeStream {
    id: String,
    frame: Arc<Mutex<Option<VideoFrame>>>,
    releases: Arc<AtomicUsize>,
}

impl CameraStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.frame.lock().unwrap().clone()
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts detections; optionally fails every call
#[derive(Clone, Default)]
pub struct FakeDetector {
    pub detections: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
}

impl FakeDetector {
    pub fn count(&self) -> usize {
        self.detections.load(Ordering::SeqCst)
    }
}

impl FaceDetector for FakeDetector {
    fn detect(&mut self, _frame: &VideoFrame, _timestamp_ms: f64) -> Result<Option<FaceResult>> {
        self.detections.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("model crashed"));
        }
        Ok(Some(FaceResult {
            blendshapes: vec![
                BlendshapeCategory {
                    name: "jawOpen".to_string(),
                    score: 0.4,
                },
                BlendshapeCategory {
                    name: "mouthSmileLeft".to_string(),
                    score: 0.8,
                },
                BlendshapeCategory {
                    name: "mouthSmileRight".to_string(),
                    score: 0.6,
                },
            ],
            transform: None,
        }))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub attached: Mutex<Vec<String>>,
    pub detaches: AtomicUsize,
}

impl VideoSink for RecordingSink {
    fn attach(&self, stream_id: &str) {
        self.attached.lock().unwrap().push(stream_id.to_string());
    }

    fn detach(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Inference engine
// ============================================================================

/// Loads only the listed models and replies with fixed deltas
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    pub loadable: Vec<String>,
    pub deltas: Vec<String>,
    pub delta_delay: Duration,
    pub loads: Arc<Mutex<Vec<String>>>,
    pub prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    pub params: Arc<Mutex<Vec<GenerationParams>>>,
}

impl ScriptedEngine {
    pub fn new(loadable: &[&str], deltas: &[&str]) -> Self {
        Self {
            loadable: loadable.iter().map(|m| m.to_string()).collect(),
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn load(&mut self, model: &str, progress: ProgressFn<'_>) -> Result<()> {
        self.loads.lock().unwrap().push(model.to_string());
        progress(format!("fetching {}", model));
        if self.loadable.iter().any(|m| m == model) {
            progress(format!("{} ready", model));
            Ok(())
        } else {
            Err(anyhow!("model {} does not fit on this device", model))
        }
    }

    async fn generate(
        &mut self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<DeltaStream> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.params.lock().unwrap().push(params);

        let delay = self.delta_delay;
        let deltas = self.deltas.clone();
        Ok(futures::stream::iter(deltas)
            .then(move |delta| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, anyhow::Error>(delta)
            })
            .boxed())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Rigs
// ============================================================================

pub struct SpeechRig {
    pub state: SharedState,
    pub status: StatusFeed,
    pub recognizer: Arc<FakeRecognizer>,
    pub speech: SpeechSupervisor,
}

pub fn speech_rig(policy: BackoffPolicy) -> SpeechRig {
    let state = SharedState::default();
    let status = StatusFeed::new();
    let recognizer = FakeRecognizer::new();
    let speech = SpeechSupervisor::new(state.clone(), recognizer.clone(), policy, status.clone());
    SpeechRig {
        state,
        status,
        recognizer,
        speech,
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.brain.ladder = vec!["big".to_string(), "small".to_string()];
    config.speech.retry.base_delay_ms = 20;
    config.camera.frame_interval_ms = 5;
    config
}

pub struct CompanionRig {
    pub companion: Arc<Companion>,
    pub recognizer: Arc<FakeRecognizer>,
    pub synth: Arc<FakeSynth>,
    pub camera: Arc<FakeCamera>,
    pub detector: FakeDetector,
    pub engine: ScriptedEngine,
    pub preferences: Arc<MemoryPreferenceStore>,
}

pub fn companion_rig(
    camera: Arc<FakeCamera>,
    engine: ScriptedEngine,
    preferences: MemoryPreferenceStore,
) -> CompanionRig {
    let recognizer = FakeRecognizer::new();
    let synth = FakeSynth::watching(Duration::from_millis(20), recognizer.clone());
    let detector = FakeDetector::default();
    let preferences = Arc::new(preferences);

    let devices = Devices {
        recognizer: recognizer.clone(),
        synthesizer: synth.clone(),
        camera: camera.clone(),
        face_detector: Box::new(detector.clone()),
        video_sink: None,
    };

    let companion = Arc::new(Companion::new(
        &test_config(),
        devices,
        Box::new(engine.clone()),
        preferences.clone(),
    ));

    CompanionRig {
        companion,
        recognizer,
        synth,
        camera,
        detector,
        engine,
        preferences,
    }
}
