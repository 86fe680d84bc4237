use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_TYPING_DELAY_MS: u64 = 500;
pub const DEFAULT_MOCK_RESPONSE_DELAY_MS: u64 = 1500;
pub const DEFAULT_CHART_RETRY_SHORT_MS: u64 = 150;
pub const DEFAULT_CHART_RETRY_LONG_MS: u64 = 800;

/// Engine configuration, loaded from a YAML file. Endpoints are optional:
/// without a webhook the controller answers with local mock replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub webhook_url: Option<String>,
    pub report_url: Option<String>,
    pub report_stream_url: Option<String>,
    pub request_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    pub typing_delay_ms: u64,
    pub mock_response_delay_ms: u64,
    pub chart_retry_short_ms: u64,
    pub chart_retry_long_ms: u64,
    pub user_initials: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            report_url: None,
            report_stream_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT_SECS,
            typing_delay_ms: DEFAULT_TYPING_DELAY_MS,
            mock_response_delay_ms: DEFAULT_MOCK_RESPONSE_DELAY_MS,
            chart_retry_short_ms: DEFAULT_CHART_RETRY_SHORT_MS,
            chart_retry_long_ms: DEFAULT_CHART_RETRY_LONG_MS,
            user_initials: "BC".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw).map_err(|error| AppError::Internal(error.to_string()))
    }

    /// Missing config file falls back to defaults; a present but invalid file
    /// is still an error.
    pub fn load_or_default(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
