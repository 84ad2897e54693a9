//! Ollama runtime
//!
//! `load` pulls the model (streaming pull status as progress) and asks the
//! server to keep it in memory; `generate` streams `/api/chat`.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{DeltaStream, InferenceEngine, ProgressFn};
use crate::bridge::{ChatMessage, GenerationParams};

/// Default Ollama server address
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("No model loaded")]
    NotLoaded,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: String,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

impl PullStatus {
    fn describe(&self) -> String {
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => {
                format!("{} ({}%)", self.status, done * 100 / total)
            }
            _ => self.status.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WarmupRequest<'a> {
    model: &'a str,
    keep_alive: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    message: Option<ChunkMessage>,
    #[serde(default)]
    #[allow(dead_code)]
    done: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

pub struct OllamaEngine {
    base_url: String,
    client: reqwest::Client,
    model: Option<String>,
}

impl OllamaEngine {
    /// `connect_timeout` bounds connection setup only. Pulls and chat
    /// streams run as long as the server keeps them open.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            model: None,
        })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, OllamaError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| OllamaError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(OllamaError::ServerError { status, message });
        }

        Ok(response)
    }
}

#[async_trait]
impl InferenceEngine for OllamaEngine {
    async fn load(&mut self, model: &str, progress: ProgressFn<'_>) -> Result<()> {
        self.model = None;
        info!("Pulling Ollama model {}", model);

        let response = self
            .post(
                "/api/pull",
                &PullRequest {
                    model,
                    stream: true,
                },
            )
            .await?;

        let mut statuses = ndjson::<PullStatus, _, _>(response.bytes_stream());
        while let Some(status) = statuses.next().await {
            let status = status?;
            if let Some(error) = status.error {
                return Err(OllamaError::Model(error).into());
            }
            progress(status.describe());
        }

        progress(format!("loading {} into memory", model));
        self.post(
            "/api/generate",
            &WarmupRequest {
                model,
                keep_alive: "30m",
            },
        )
        .await?;

        self.model = Some(model.to_string());
        info!("Ollama model {} ready", model);
        Ok(())
    }

    async fn generate(
        &mut self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<DeltaStream> {
        let model = self.model.as_deref().ok_or(OllamaError::NotLoaded)?;
        debug!(
            "Ollama chat: model={} messages={} temperature={} max_gen_len={}",
            model,
            messages.len(),
            params.temperature,
            params.max_gen_len
        );

        let response = self
            .post(
                "/api/chat",
                &ChatBody {
                    model,
                    messages,
                    stream: true,
                    options: ChatOptions {
                        temperature: params.temperature,
                        num_predict: params.max_gen_len,
                    },
                },
            )
            .await?;

        let deltas = ndjson::<ChatChunk, _, _>(response.bytes_stream()).map(|chunk| -> Result<String> {
            let chunk = chunk?;
            if let Some(error) = chunk.error {
                return Err(OllamaError::Model(error).into());
            }
            Ok(chunk.message.map(|m| m.content).unwrap_or_default())
        });

        Ok(deltas.boxed())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Split a byte stream into newline-delimited JSON values
fn ndjson<T, S, B>(bytes: S) -> BoxStream<'static, Result<T, OllamaError>>
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    fn parse<T: DeserializeOwned>(line: &[u8]) -> Result<T, OllamaError> {
        serde_json::from_slice(line).map_err(|e| OllamaError::ParseError(e.to_string()))
    }

    let state = (bytes.boxed(), Vec::<u8>::new(), false);
    stream::unfold(state, |(mut bytes, mut buf, mut eof)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Some((parse(&line), (bytes, buf, eof)));
            }

            if eof {
                if buf.iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
                let line = std::mem::take(&mut buf);
                return Some((parse(&line), (bytes, buf, eof)));
            }

            match bytes.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    buf.clear();
                    eof = true;
                    return Some((
                        Err(OllamaError::ConnectionFailed(e.to_string())),
                        (bytes, buf, eof),
                    ));
                }
                None => eof = true,
            }
        }
    })
    .boxed()
}
