use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{Result, ShareBridgeError};

/// Static storage for the data directory path, initialized once at startup
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

const SETTINGS_FILE_NAME: &str = "settings.json";

/// Who handles `view` events for http/https links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WebUrlDispatch {
    /// A separate link-open path already delivers web links; suppress them here.
    #[default]
    External,
    /// No external path exists; web links become `Url` envelopes.
    Engine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// URL scheme the host is activated with.
    pub activation_scheme: String,
    /// Key of the handoff record in the shared store.
    pub handoff_key: String,
    /// Directory shared by the host and extension processes.
    /// Defaults to `<data dir>/shared`.
    pub shared_store_dir: Option<PathBuf>,
    /// Provider authorities that need an explicit persistent grant.
    pub persistent_grant_providers: Vec<String>,
    pub web_url_dispatch: WebUrlDispatch,
    pub resolve_image_content: bool,
    /// Capacity of the resolution queue.
    pub queue_capacity: usize,
    pub log_filter: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            activation_scheme: "sharebridge".to_string(),
            handoff_key: "sharebridge.pending_share".to_string(),
            shared_store_dir: None,
            persistent_grant_providers: vec!["com.google.android.apps.docs".to_string()],
            web_url_dispatch: WebUrlDispatch::External,
            resolve_image_content: false,
            queue_capacity: 16,
            log_filter: "sharebridge_app=debug".to_string(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.activation_scheme.is_empty()
            || !self
                .activation_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(ShareBridgeError::Config(format!(
                "Invalid activation scheme: {:?}",
                self.activation_scheme
            )));
        }
        if self.handoff_key.trim().is_empty() {
            return Err(ShareBridgeError::Config("Handoff key must not be empty".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ShareBridgeError::Config("Queue capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Shared store directory, falling back to `<data_dir>/shared`.
    pub fn shared_store_dir_in(&self, data_dir: &Path) -> PathBuf {
        self.shared_store_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("shared"))
    }
}

/// Initialize the data directory. Must be called once before any
/// global storage operation.
pub fn init_data_dir(path: impl Into<PathBuf>) -> Result<PathBuf> {
    let data_dir = path.into();
    std::fs::create_dir_all(&data_dir)?;

    DATA_DIR
        .set(data_dir.clone())
        .map_err(|_| ShareBridgeError::Storage("Data directory already initialized".into()))?;

    Ok(data_dir)
}

pub fn get_data_dir() -> Result<PathBuf> {
    DATA_DIR.get().cloned().ok_or_else(|| {
        ShareBridgeError::Storage(
            "Data directory not initialized. Call init_data_dir first.".into(),
        )
    })
}

/// Platform default data directory (`<data dir>/sharebridge`).
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("sharebridge"))
        .ok_or_else(|| ShareBridgeError::Storage("Could not determine data directory".into()))
}

fn get_settings_path() -> Result<PathBuf> {
    let data_dir = get_data_dir()?;
    Ok(data_dir.join(SETTINGS_FILE_NAME))
}

pub fn load_settings() -> Result<EngineSettings> {
    load_settings_from(&get_settings_path()?)
}

pub fn save_settings(settings: &EngineSettings) -> Result<()> {
    save_settings_to(&get_settings_path()?, settings)
}

pub fn load_settings_from(path: &Path) -> Result<EngineSettings> {
    if !path.exists() {
        return Ok(EngineSettings::default());
    }

    let content = std::fs::read_to_string(path)?;
    let settings: EngineSettings = serde_json::from_str(&content)?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings_to(path: &Path, settings: &EngineSettings) -> Result<()> {
    settings.validate()?;
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}
