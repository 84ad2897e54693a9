//! Camera capture and face tracking
//!
//! `CameraSupervisor` owns the camera stream and a per-frame detection loop
//! that never runs the face model twice on the same video frame.

mod blendshapes;
mod supervisor;

pub use blendshapes::blendshape_score;
pub use supervisor::{CameraHandle, CameraSupervisor, FaceResultsCallback};
