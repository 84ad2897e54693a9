use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::DeviceError;

/// A decoded camera frame as presented to the face model
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Media time of the frame in seconds; unchanged while the video has not advanced
    pub media_time: f64,
    pub width: u32,
    pub height: u32,
    /// Pixel data, layout defined by the camera implementation
    pub data: Arc<Vec<u8>>,
}

/// Camera that grants a stream on request
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Ask for a user-facing video stream
    ///
    /// Denied permission or a missing camera must be reported as
    /// `PermissionDenied` / `Unavailable` so callers can stop retrying.
    async fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError>;
}

/// A live camera stream. Owned by the vision supervisor's frame loop.
pub trait CameraStream: Send {
    /// Stable identifier for logging and the preview sink
    fn id(&self) -> &str;

    /// Most recent frame, if one has been decoded yet
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Stop all tracks. The stream is unusable afterwards.
    fn release(&mut self);
}

/// Preview surface the camera stream is shown on
pub trait VideoSink: Send + Sync {
    fn attach(&self, stream_id: &str);
    fn detach(&self);
}

/// One named blendshape coefficient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendshapeCategory {
    pub name: String,
    pub score: f32,
}

/// Face tracking output for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceResult {
    pub blendshapes: Vec<BlendshapeCategory>,
    /// Row-major 4x4 facial transformation matrix, if the model provides one
    pub transform: Option<[f32; 16]>,
}

/// Face landmark model
pub trait FaceDetector: Send {
    /// Run detection on a frame. `Ok(None)` means no face was found.
    fn detect(
        &mut self,
        frame: &VideoFrame,
        timestamp_ms: f64,
    ) -> anyhow::Result<Option<FaceResult>>;
}
