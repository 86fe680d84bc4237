pub mod stream;
pub mod webhook;

use crate::config::EngineConfig;
use crate::errors::{AppError, AppResult};
use std::time::Duration;

/// HTTP client for the chat webhook and the report-generation backend.
#[derive(Debug, Clone)]
pub struct ChatClient {
    pub(crate) http: reqwest::Client,
    pub(crate) config: EngineConfig,
}

impl ChatClient {
    pub fn new(config: EngineConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn has_webhook(&self) -> bool {
        self.config.webhook_url.is_some()
    }

    pub(crate) fn webhook_url(&self) -> AppResult<&str> {
        self.config
            .webhook_url
            .as_deref()
            .ok_or_else(|| AppError::NotFound("no webhook endpoint configured".to_string()))
    }

    pub(crate) fn report_url(&self) -> AppResult<&str> {
        self.config
            .report_url
            .as_deref()
            .ok_or_else(|| AppError::NotFound("no report endpoint configured".to_string()))
    }

    pub(crate) fn report_stream_url(&self) -> AppResult<&str> {
        self.config
            .report_stream_url
            .as_deref()
            .ok_or_else(|| AppError::NotFound("no report stream endpoint configured".to_string()))
    }
}
