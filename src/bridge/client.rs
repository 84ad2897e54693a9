use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{ChatRequest, WorkerRequest, WorkerResponse};
use super::worker::{spawn_worker, NOT_LOADED};
use crate::engine::InferenceEngine;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// `chat` issued before any `init` succeeded
    #[error("brain not loaded")]
    NotLoaded,

    /// The worker answered with an `error` envelope
    #[error("worker error: {0}")]
    Worker(String),

    /// The worker task is gone
    #[error("worker is not running")]
    WorkerGone,
}

pub type ProgressHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type DeltaHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Response side of the worker channel
///
/// `outstanding` counts requests sent whose terminal envelope has not been
/// read yet. It only exceeds one after a caller gave up on a request, and
/// the extra terminals at the head of the queue belong to those requests.
struct Inbox {
    responses: mpsc::UnboundedReceiver<WorkerResponse>,
    outstanding: usize,
}

/// Request/response client for the inference worker
///
/// Envelopes carry no request IDs: the inbox is held for the whole of an
/// `init` or `chat`, so a second call waits until the first one's terminal
/// envelope has been seen and never has its envelope sent early. A call
/// that is dropped mid-flight leaves its envelopes queued; the next call
/// discards them before taking its own reply.
pub struct BrainBridge {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    inbox: tokio::sync::Mutex<Inbox>,
    model: Mutex<Option<String>>,
    on_progress: Mutex<ProgressHandler>,
    on_delta: Mutex<DeltaHandler>,
}

impl BrainBridge {
    /// Talk to an existing worker over the given channels
    pub fn new(
        requests: mpsc::UnboundedSender<WorkerRequest>,
        responses: mpsc::UnboundedReceiver<WorkerResponse>,
    ) -> Self {
        let on_progress: ProgressHandler = Arc::new(|_: &str| {});
        let on_delta: DeltaHandler = Arc::new(|_: &str, _: &str| {});

        Self {
            requests,
            inbox: tokio::sync::Mutex::new(Inbox {
                responses,
                outstanding: 0,
            }),
            model: Mutex::new(None),
            on_progress: Mutex::new(on_progress),
            on_delta: Mutex::new(on_delta),
        }
    }

    /// Start a worker around `engine` and connect to it
    pub fn spawn(engine: Box<dyn InferenceEngine>) -> Self {
        let (requests, responses, _handle) = spawn_worker(engine);
        Self::new(requests, responses)
    }

    /// Receives every `progress` text
    pub fn set_progress_handler(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.on_progress.lock() {
            *slot = Arc::new(handler);
        }
    }

    /// Receives every `delta` as `(fragment, full_so_far)`
    pub fn set_delta_handler(&self, handler: impl Fn(&str, &str) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.on_delta.lock() {
            *slot = Arc::new(handler);
        }
    }

    /// Model confirmed by the last successful `init`
    pub fn loaded_model(&self) -> Option<String> {
        self.model.lock().ok().and_then(|model| model.clone())
    }

    /// Load `model` in the worker
    ///
    /// Resolves with the model name on `ready`; rejects with the worker's
    /// message on `error`. The bridge stays usable either way.
    pub async fn init(&self, model: &str) -> Result<String, BridgeError> {
        let mut inbox = self.inbox.lock().await;

        // The worker drops its current model as soon as it sees `init`
        self.set_model(None);

        info!("Bridge init: {}", model);
        self.send(
            &mut inbox,
            WorkerRequest::Init {
                model: model.to_string(),
            },
        )?;

        match self.await_terminal(&mut inbox).await? {
            WorkerResponse::Ready { model } => {
                self.set_model(Some(model.clone()));
                Ok(model)
            }
            WorkerResponse::Error { error } => {
                self.set_model(None);
                Err(BridgeError::Worker(error))
            }
            other => Err(BridgeError::Worker(format!(
                "unexpected reply to init: {:?}",
                other
            ))),
        }
    }

    /// Run one chat completion
    ///
    /// Deltas go to the delta handler as they arrive; resolves with the
    /// full text on `done`.
    pub async fn chat(&self, request: ChatRequest) -> Result<String, BridgeError> {
        if self.loaded_model().is_none() {
            return Err(BridgeError::NotLoaded);
        }

        let mut inbox = self.inbox.lock().await;

        debug!("Bridge chat: {} messages", request.messages.len());
        self.send(&mut inbox, request.into())?;

        match self.await_terminal(&mut inbox).await? {
            WorkerResponse::Done { full } => Ok(full),
            WorkerResponse::Error { error } if error == NOT_LOADED => Err(BridgeError::NotLoaded),
            WorkerResponse::Error { error } => Err(BridgeError::Worker(error)),
            other => Err(BridgeError::Worker(format!(
                "unexpected reply to chat: {:?}",
                other
            ))),
        }
    }

    fn send(&self, inbox: &mut Inbox, request: WorkerRequest) -> Result<(), BridgeError> {
        self.requests
            .send(request)
            .map_err(|_| BridgeError::WorkerGone)?;
        inbox.outstanding += 1;
        Ok(())
    }

    /// Route progress/delta envelopes until this call's terminal one arrives
    ///
    /// Envelopes of abandoned requests are dropped without reaching the
    /// handlers. A late `ready` still records the model the worker loaded.
    async fn await_terminal(&self, inbox: &mut Inbox) -> Result<WorkerResponse, BridgeError> {
        loop {
            let response = inbox.responses.recv().await.ok_or_else(|| {
                warn!("Worker channel closed while a request was pending");
                BridgeError::WorkerGone
            })?;

            let stale = inbox.outstanding > 1;
            match response {
                WorkerResponse::Progress { .. } | WorkerResponse::Delta { .. } if stale => {}
                WorkerResponse::Progress { text } => {
                    let handler = self.on_progress.lock().ok().map(|h| (*h).clone());
                    if let Some(handler) = handler {
                        handler(&text);
                    }
                }
                WorkerResponse::Delta { delta, full } => {
                    let handler = self.on_delta.lock().ok().map(|h| (*h).clone());
                    if let Some(handler) = handler {
                        handler(&delta, &full);
                    }
                }
                terminal => {
                    inbox.outstanding = inbox.outstanding.saturating_sub(1);
                    if !stale {
                        return Ok(terminal);
                    }
                    debug!("Discarding reply to an abandoned request: {:?}", terminal);
                    if let WorkerResponse::Ready { model } = terminal {
                        self.set_model(Some(model));
                    }
                }
            }
        }
    }

    fn set_model(&self, model: Option<String>) {
        if let Ok(mut slot) = self.model.lock() {
            *slot = model;
        }
    }
}
