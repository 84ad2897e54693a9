use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::ladder::{BrainStatus, ModelLadder};
use super::turn::ConversationTurn;
use crate::bridge::{BrainBridge, BridgeError, ChatMessage, ChatRequest};
use crate::config::{BrainConfig, PersonaConfig};
use crate::playback::PlaybackController;
use crate::status::{StatusFeed, StatusKind};

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model replied and the reply was handed to playback
    Replied { reply: String, played: bool },
    /// No model could be loaded; the canned line was spoken instead
    Fallback { reply: String, played: bool },
    /// The inference request failed; nothing was spoken
    Failed { error: String },
    /// Empty transcript
    Ignored,
}

pub struct DialogueOrchestrator {
    bridge: Arc<BrainBridge>,
    playback: Arc<PlaybackController>,
    ladder: ModelLadder,
    persona: PersonaConfig,
    temperature: Option<f32>,
    max_gen_len: Option<u32>,
    status: StatusFeed,
    brain: Mutex<BrainStatus>,
    /// Serialises ladder walks
    loading: tokio::sync::Mutex<()>,
    current_turn: Arc<Mutex<Option<ConversationTurn>>>,
    last_turn: Mutex<Option<ConversationTurn>>,
}

impl DialogueOrchestrator {
    pub fn new(
        bridge: Arc<BrainBridge>,
        playback: Arc<PlaybackController>,
        brain: &BrainConfig,
        persona: PersonaConfig,
        status: StatusFeed,
    ) -> Self {
        let current_turn: Arc<Mutex<Option<ConversationTurn>>> = Arc::new(Mutex::new(None));

        let progress_status = status.clone();
        bridge.set_progress_handler(move |text| {
            progress_status.system(format!("Loading brain… {}", text));
        });

        let delta_status = status.clone();
        let delta_turn = Arc::clone(&current_turn);
        let name = persona.name.clone();
        bridge.set_delta_handler(move |delta, full| {
            if let Ok(mut turn) = delta_turn.lock() {
                if let Some(turn) = turn.as_mut() {
                    turn.append_delta(delta);
                }
            }
            delta_status.publish(StatusKind::Reply, format!("{}: {}", name, full));
        });

        Self {
            bridge,
            playback,
            ladder: ModelLadder::new(brain.ladder.iter().cloned()),
            persona,
            temperature: brain.temperature,
            max_gen_len: brain.max_gen_len,
            status,
            brain: Mutex::new(BrainStatus::Unloaded),
            loading: tokio::sync::Mutex::new(()),
            current_turn,
            last_turn: Mutex::new(None),
        }
    }

    pub fn brain_status(&self) -> BrainStatus {
        self.brain
            .lock()
            .map(|status| status.clone())
            .unwrap_or_default()
    }

    /// Turn currently being generated, if any
    pub fn current_turn(&self) -> Option<ConversationTurn> {
        self.current_turn.lock().ok().and_then(|turn| turn.clone())
    }

    /// Most recently completed turn
    pub fn last_turn(&self) -> Option<ConversationTurn> {
        self.last_turn.lock().ok().and_then(|turn| turn.clone())
    }

    /// Walk the model ladder and return the model that loaded, if any
    pub async fn load_brain(&self) -> Option<String> {
        let _loading = self.loading.lock().await;
        self.walk_ladder().await
    }

    /// Make sure a model is loaded, loading one on first use
    async fn ensure_brain(&self) -> bool {
        let _loading = self.loading.lock().await;
        match self.brain_status() {
            BrainStatus::Ready(_) => true,
            BrainStatus::Unavailable => false,
            BrainStatus::Unloaded | BrainStatus::Loading => self.walk_ladder().await.is_some(),
        }
    }

    async fn walk_ladder(&self) -> Option<String> {
        self.set_brain(BrainStatus::Loading);

        for model in self.ladder.iter() {
            self.status
                .system(format!("Loading brain… trying {}", model));

            match self.bridge.init(model).await {
                Ok(loaded) => {
                    info!("Brain loaded: {}", loaded);
                    self.status.system(format!("Brain loaded: {}", loaded));
                    self.set_brain(BrainStatus::Ready(loaded.clone()));
                    return Some(loaded);
                }
                Err(e) => warn!("Model {} failed to load: {}", model, e),
            }
        }

        warn!("All {} ladder candidates failed", self.ladder.len());
        self.status.system("Brain failed to load on this device.");
        self.set_brain(BrainStatus::Unavailable);
        None
    }

    /// Run one conversation turn to completion, including playback
    pub async fn handle_user_text(&self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Ignored;
        }

        info!("Conversation turn: user said {:?}", text);

        if !self.ensure_brain().await {
            let reply = self.persona.fallback_reply.clone();
            let played = self.say(&reply).await;
            return TurnOutcome::Fallback { reply, played };
        }

        self.set_current_turn(Some(ConversationTurn::new(text)));

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(self.persona.system_prompt.clone()),
                ChatMessage::user(text),
            ],
            temperature: self.temperature,
            max_gen_len: self.max_gen_len,
        };

        let full = match self.bridge.chat(request).await {
            Ok(full) => full,
            Err(e) => {
                warn!("Inference failed: {}", e);
                if e == BridgeError::NotLoaded {
                    self.set_brain(BrainStatus::Unloaded);
                }
                self.set_current_turn(None);
                self.status.system(format!("Brain error: {}", e));
                return TurnOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let finished = self.current_turn.lock().ok().and_then(|mut slot| {
            slot.take().map(|mut turn| {
                turn.finish(full.clone());
                turn
            })
        });
        if let Some(turn) = finished {
            debug!("Turn {} complete ({} chars)", turn.id, turn.reply_text.len());
            if let Ok(mut last) = self.last_turn.lock() {
                *last = Some(turn);
            }
        }

        let reply = match full.trim() {
            "" => self.persona.empty_reply.clone(),
            trimmed => trimmed.to_string(),
        };

        let played = self.say(&reply).await;
        TurnOutcome::Replied { reply, played }
    }

    /// Handle finalized transcripts one at a time until the channel closes
    pub async fn run(self: Arc<Self>, mut transcripts: mpsc::Receiver<String>) {
        info!("Dialogue loop started");
        while let Some(text) = transcripts.recv().await {
            let outcome = self.handle_user_text(&text).await;
            debug!("Turn outcome: {:?}", outcome);
        }
        info!("Dialogue loop stopped");
    }

    async fn say(&self, reply: &str) -> bool {
        self.status
            .publish(StatusKind::Reply, format!("{}: {}", self.persona.name, reply));
        self.playback.speak(reply).await
    }

    fn set_brain(&self, status: BrainStatus) {
        if let Ok(mut brain) = self.brain.lock() {
            *brain = status;
        }
    }

    fn set_current_turn(&self, turn: Option<ConversationTurn>) {
        if let Ok(mut slot) = self.current_turn.lock() {
            *slot = turn;
        }
    }
}
