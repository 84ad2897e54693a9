//! HTTP control API
//!
//! Stands in for the on-page buttons:
//! - GET /health - Health check
//! - GET /status - Companion snapshot (devices, brain, subtitle, last turn)
//! - POST /mic/auto - Toggle auto-listen
//! - POST /cam/auto - Toggle auto-camera
//! - POST /visibility - Report page visibility
//! - POST /brain/load - Walk the model ladder
//! - POST /say - Inject a finalized transcript

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
