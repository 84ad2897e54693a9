//! Device seams
//!
//! The orchestrator never talks to hardware directly. Speech recognition,
//! speech synthesis, the camera and the face model are reached through the
//! traits in this module so the supervisors can be driven by fakes in tests
//! and by console devices in the binary.

pub mod camera;
pub mod console;
pub mod error;
pub mod speech;

pub use camera::{
    BlendshapeCategory, CameraDevice, CameraStream, FaceDetector, FaceResult, VideoFrame,
    VideoSink,
};
pub use console::{ConsoleRecognizer, ConsoleSynthesizer, NoCamera, NoFaceDetector};
pub use error::DeviceError;
pub use speech::{RecognitionEvent, RecognitionEvents, SpeechRecognizer, SpeechSynthesizer, Utterance};
