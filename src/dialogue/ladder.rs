use serde::Serialize;

/// Models to try, best first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelLadder(Vec<String>);

impl ModelLadder {
    pub fn new(models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(models.into_iter().map(Into::into).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where the dialogue stands on having a model
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "model", rename_all = "snake_case")]
pub enum BrainStatus {
    /// Nothing attempted yet
    #[default]
    Unloaded,
    /// Ladder walk in progress
    Loading,
    /// A model answered `ready`
    Ready(String),
    /// Every candidate failed; replies fall back to a canned line
    Unavailable,
}
