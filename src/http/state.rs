use crate::companion::Companion;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub companion: Arc<Companion>,
}

impl AppState {
    pub fn new(companion: Arc<Companion>) -> Self {
        Self { companion }
    }
}
