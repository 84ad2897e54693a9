//! The background side of the bridge
//!
//! Runs an `InferenceEngine` in its own task and speaks only envelopes. One
//! request is handled at a time; every request gets exactly one terminal
//! envelope, after all of its progress/delta envelopes.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::messages::{GenerationParams, WorkerRequest, WorkerResponse};
use crate::engine::InferenceEngine;

/// Error text sent when `chat` arrives before a model is loaded
pub const NOT_LOADED: &str = "not loaded";

/// Spawn the worker task
///
/// Returns the request sender, the response receiver and the task handle.
/// The worker exits when the request sender is dropped.
pub fn spawn_worker(
    engine: Box<dyn InferenceEngine>,
) -> (
    mpsc::UnboundedSender<WorkerRequest>,
    mpsc::UnboundedReceiver<WorkerResponse>,
    JoinHandle<()>,
) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(run_worker(engine, request_rx, response_tx));

    (request_tx, response_rx, handle)
}

async fn run_worker(
    mut engine: Box<dyn InferenceEngine>,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) {
    info!("Inference worker started ({})", engine.name());

    let mut loaded: Option<String> = None;

    while let Some(request) = requests.recv().await {
        let reply = match request {
            WorkerRequest::Init { model } => {
                // A failed init leaves nothing loaded
                loaded = None;

                let progress_tx = responses.clone();
                let progress = move |text: String| {
                    let _ = progress_tx.send(WorkerResponse::Progress { text });
                };

                match engine.load(&model, &progress).await {
                    Ok(()) => {
                        info!("Worker loaded model {}", model);
                        loaded = Some(model.clone());
                        WorkerResponse::Ready { model }
                    }
                    Err(e) => {
                        warn!("Worker failed to load {}: {:#}", model, e);
                        WorkerResponse::Error {
                            error: format!("{:#}", e),
                        }
                    }
                }
            }

            WorkerRequest::Chat {
                messages,
                temperature,
                max_gen_len,
            } => {
                if loaded.is_none() {
                    WorkerResponse::Error {
                        error: NOT_LOADED.to_string(),
                    }
                } else {
                    let params = GenerationParams::resolve(temperature, max_gen_len);
                    generate(engine.as_mut(), &messages, params, &responses).await
                }
            }
        };

        if responses.send(reply).is_err() {
            warn!("Bridge dropped the response channel; stopping worker");
            break;
        }
    }

    info!("Inference worker stopped");
}

/// Stream one reply as deltas; returns the terminal envelope
async fn generate(
    engine: &mut dyn InferenceEngine,
    messages: &[super::messages::ChatMessage],
    params: GenerationParams,
    responses: &mpsc::UnboundedSender<WorkerResponse>,
) -> WorkerResponse {
    let mut deltas = match engine.generate(messages, params).await {
        Ok(deltas) => deltas,
        Err(e) => {
            error!("Generation failed to start: {:#}", e);
            return WorkerResponse::Error {
                error: format!("{:#}", e),
            };
        }
    };

    let mut full = String::new();
    while let Some(delta) = deltas.next().await {
        match delta {
            Ok(delta) if delta.is_empty() => continue,
            Ok(delta) => {
                full.push_str(&delta);
                let _ = responses.send(WorkerResponse::Delta {
                    delta,
                    full: full.clone(),
                });
            }
            Err(e) => {
                error!("Generation failed mid-stream: {:#}", e);
                return WorkerResponse::Error {
                    error: format!("{:#}", e),
                };
            }
        }
    }

    WorkerResponse::Done { full }
}
