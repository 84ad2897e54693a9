//! Persisted auto-start preferences for the microphone and camera

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Device a preference applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Mic,
    Cam,
}

impl DeviceKind {
    /// Stable storage key
    pub fn key(&self) -> &'static str {
        match self {
            DeviceKind::Mic => "mic_auto",
            DeviceKind::Cam => "cam_auto",
        }
    }
}

/// Boolean auto-start flags that survive restarts
pub trait PreferenceStore: Send + Sync {
    /// Stored value; unset reads as `false`
    fn get(&self, kind: DeviceKind) -> bool;

    fn set(&self, kind: DeviceKind, enabled: bool) -> Result<()>;
}

/// Preferences kept in a small JSON object on disk
///
/// ```json
/// { "cam_auto": false, "mic_auto": true }
/// ```
pub struct JsonPreferenceStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, bool>>,
}

impl JsonPreferenceStore {
    /// Open (or lazily create) the store at `path`
    ///
    /// A missing file starts empty; a corrupt one is logged and ignored so a
    /// bad write never keeps the companion from starting.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring unreadable preferences at {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read preferences {}", path.display()))
            }
        };

        info!("Preferences loaded from {} ({} keys)", path.display(), values.len());

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn persist(&self, values: &BTreeMap<String, bool>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write preferences {}", self.path.display()))
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn get(&self, kind: DeviceKind) -> bool {
        self.values
            .lock()
            .map(|values| values.get(kind.key()).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    fn set(&self, kind: DeviceKind, enabled: bool) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("preferences lock poisoned"))?;
        values.insert(kind.key().to_string(), enabled);
        self.persist(&values)
    }
}

/// Non-persistent store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<BTreeMap<DeviceKind, bool>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mic: bool, cam: bool) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.lock() {
            values.insert(DeviceKind::Mic, mic);
            values.insert(DeviceKind::Cam, cam);
        }
        store
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, kind: DeviceKind) -> bool {
        self.values
            .lock()
            .map(|values| values.get(&kind).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    fn set(&self, kind: DeviceKind, enabled: bool) -> Result<()> {
        self.values
            .lock()
            .map_err(|_| anyhow::anyhow!("preferences lock poisoned"))?
            .insert(kind, enabled);
        Ok(())
    }
}
