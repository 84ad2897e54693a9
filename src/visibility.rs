//! Foreground/background gate for capture devices
//!
//! `apply_visibility` is called on every visibility change and page re-show.
//! Hidden always wins: both devices stop regardless of preferences. Visible
//! re-derives the wanted device state from the persisted preferences alone,
//! so calling it redundantly is harmless.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::preferences::{DeviceKind, PreferenceStore};
use crate::speech::{CaptureEvent, SpeechSupervisor};
use crate::state::SharedState;
use crate::status::StatusFeed;
use crate::vision::CameraSupervisor;

pub struct VisibilityGate {
    state: SharedState,
    speech: SpeechSupervisor,
    camera: Arc<CameraSupervisor>,
    preferences: Arc<dyn PreferenceStore>,
    status: StatusFeed,
}

impl VisibilityGate {
    pub fn new(
        state: SharedState,
        speech: SpeechSupervisor,
        camera: Arc<CameraSupervisor>,
        preferences: Arc<dyn PreferenceStore>,
        status: StatusFeed,
    ) -> Self {
        Self {
            state,
            speech,
            camera,
            preferences,
            status,
        }
    }

    pub async fn apply_visibility(&self, visible: bool) {
        if !visible {
            info!("Page hidden: stopping capture");
            {
                let mut state = self.state.lock();
                state.visible = false;
                self.speech.step(&mut state, CaptureEvent::Suspend);
            }
            self.camera.stop().await;
            return;
        }

        self.state.lock().visible = true;

        if self.preferences.get(DeviceKind::Cam) {
            self.start_camera().await;
        } else {
            self.camera.stop().await;
        }

        if self.preferences.get(DeviceKind::Mic) {
            self.speech.enable();
        }

        info!(
            "Page visible: mic_auto={} cam_auto={}",
            self.preferences.get(DeviceKind::Mic),
            self.preferences.get(DeviceKind::Cam)
        );
    }

    /// Start the camera if the page is visible
    ///
    /// On failure the camera preference is switched off instead of being
    /// retried on every visibility change. Returns whether the camera runs.
    pub async fn start_camera(&self) -> bool {
        if !self.state.lock().visible {
            return false;
        }

        match self.camera.start().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Camera start failed: {}", e);
                if let Err(e) = self.preferences.set(DeviceKind::Cam, false) {
                    error!("Failed to persist camera preference: {:#}", e);
                }
                self.status
                    .system(format!("Camera unavailable ({}). Auto camera turned off.", e));
                self.camera.stop().await;
                false
            }
        }
    }
}
