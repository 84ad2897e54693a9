use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::devices::{CameraDevice, CameraStream, DeviceError, FaceDetector, FaceResult, VideoSink};

/// Receives the face model output for every new frame
pub type FaceResultsCallback =
    Arc<dyn Fn(Option<&FaceResult>) -> anyhow::Result<()> + Send + Sync>;

/// Identifies the running capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraHandle {
    pub stream_id: String,
}

struct CameraRun {
    handle: CameraHandle,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Owns the camera stream and the detection loop
pub struct CameraSupervisor {
    camera: Arc<dyn CameraDevice>,
    detector: Arc<Mutex<Box<dyn FaceDetector>>>,
    sink: Option<Arc<dyn VideoSink>>,
    callback: Arc<Mutex<Option<FaceResultsCallback>>>,
    frame_interval: Duration,
    run: tokio::sync::Mutex<Option<CameraRun>>,
}

impl CameraSupervisor {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        detector: Box<dyn FaceDetector>,
        sink: Option<Arc<dyn VideoSink>>,
        frame_interval: Duration,
    ) -> Self {
        Self {
            camera,
            detector: Arc::new(Mutex::new(detector)),
            sink,
            callback: Arc::new(Mutex::new(None)),
            frame_interval,
            run: tokio::sync::Mutex::new(None),
        }
    }

    /// Install the per-frame results callback (replaces any previous one)
    pub fn set_results_callback(
        &self,
        callback: impl Fn(Option<&FaceResult>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(Arc::new(callback));
        }
    }

    /// Open the camera and start the detection loop
    ///
    /// Calling this while already running returns the existing handle.
    pub async fn start(&self) -> Result<CameraHandle, DeviceError> {
        let mut run = self.run.lock().await;
        if let Some(existing) = run.as_ref() {
            debug!("Camera already running ({})", existing.handle.stream_id);
            return Ok(existing.handle.clone());
        }

        let stream = self.camera.open().await?;
        let handle = CameraHandle {
            stream_id: stream.id().to_string(),
        };

        if let Some(sink) = &self.sink {
            sink.attach(&handle.stream_id);
        }

        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(frame_loop(
            stream,
            Arc::clone(&self.detector),
            Arc::clone(&self.callback),
            Arc::clone(&running),
            self.frame_interval,
        ));

        info!("Camera started ({})", handle.stream_id);
        *run = Some(CameraRun {
            handle: handle.clone(),
            running,
            task,
        });

        Ok(handle)
    }

    /// Stop the loop, release the stream and detach the preview
    ///
    /// Safe to call when not running. Once this returns no further results
    /// callback will fire for the stopped session.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let Some(current) = run.take() else {
            return;
        };

        current.running.store(false, Ordering::SeqCst);
        if let Err(e) = current.task.await {
            error!("Camera loop panicked: {}", e);
        }

        if let Some(sink) = &self.sink {
            sink.detach();
        }

        info!("Camera stopped ({})", current.handle.stream_id);
    }

    /// Handle of the running session, if any
    pub async fn current(&self) -> Option<CameraHandle> {
        self.run.lock().await.as_ref().map(|run| run.handle.clone())
    }
}

/// Detection loop: one tick per display frame, one detection per new frame
async fn frame_loop(
    mut stream: Box<dyn CameraStream>,
    detector: Arc<Mutex<Box<dyn FaceDetector>>>,
    callback: Arc<Mutex<Option<FaceResultsCallback>>>,
    running: Arc<AtomicBool>,
    frame_interval: Duration,
) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_media_time: Option<f64> = None;

    while running.load(Ordering::SeqCst) {
        ticker.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let Some(frame) = stream.latest_frame() else {
            continue;
        };
        if last_media_time == Some(frame.media_time) {
            continue;
        }
        last_media_time = Some(frame.media_time);

        let timestamp_ms = started.elapsed().as_secs_f64() * 1000.0;
        let detection = {
            let mut detector = detector.lock().unwrap_or_else(|p| p.into_inner());
            detector.detect(&frame, timestamp_ms)
        };

        let face = match detection {
            Ok(face) => face,
            Err(e) => {
                warn!("Face detection failed at {:.3}s: {:#}", frame.media_time, e);
                continue;
            }
        };

        let callback = callback.lock().ok().and_then(|slot| slot.clone());
        if let Some(callback) = callback {
            match catch_unwind(AssertUnwindSafe(|| callback(face.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Face results callback failed: {:#}", e),
                Err(_) => warn!("Face results callback panicked"),
            }
        }
    }

    stream.release();
    debug!("Camera frame loop exited");
}
