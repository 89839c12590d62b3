use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{InsightsError, Result};
use crate::llm::{AnalyzerSettings, GeminiClient, PollPolicy, StatementAnalyzer, DEFAULT_MODEL};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_MAX_POLL_INTERVAL_MS: u64 = 30_000;

/// Everything the service needs at startup. Built once and passed down; no
/// component reads the environment on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_key: String,
    pub model: String,
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
    pub inline_limit_bytes: usize,
    pub poll: PollPolicy,
    /// Empty means any origin is allowed.
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("GEMINI_API_KEY")
            .ok_or_else(|| InsightsError::Config("GEMINI_API_KEY must be set".to_string()))?;

        let defaults = PollPolicy::default();
        let interval_ms = parse_or(
            "GEMINI_POLL_INTERVAL_MS",
            get("GEMINI_POLL_INTERVAL_MS"),
            defaults.interval.as_millis() as u64,
        )?;
        let max_attempts = parse_or(
            "GEMINI_POLL_MAX_ATTEMPTS",
            get("GEMINI_POLL_MAX_ATTEMPTS"),
            defaults.max_attempts,
        )?;
        let interval = Duration::from_millis(interval_ms);

        let poll = match get("GEMINI_POLL_BACKOFF").as_deref().map(str::to_ascii_lowercase) {
            None => PollPolicy::fixed(interval, max_attempts),
            Some(mode) if mode == "fixed" => PollPolicy::fixed(interval, max_attempts),
            Some(mode) if mode == "exponential" => {
                let factor: f64 = parse_or(
                    "GEMINI_POLL_BACKOFF_FACTOR",
                    get("GEMINI_POLL_BACKOFF_FACTOR"),
                    DEFAULT_BACKOFF_FACTOR,
                )?;
                if !factor.is_finite() || factor < 1.0 {
                    return Err(InsightsError::Config(format!(
                        "GEMINI_POLL_BACKOFF_FACTOR must be at least 1, got {}",
                        factor
                    )));
                }
                let max_interval_ms = parse_or(
                    "GEMINI_POLL_MAX_INTERVAL_MS",
                    get("GEMINI_POLL_MAX_INTERVAL_MS"),
                    DEFAULT_MAX_POLL_INTERVAL_MS,
                )?;
                PollPolicy::exponential(
                    interval,
                    max_attempts,
                    factor,
                    Duration::from_millis(max_interval_ms),
                )
            }
            Some(other) => {
                return Err(InsightsError::Config(format!(
                    "GEMINI_POLL_BACKOFF must be 'fixed' or 'exponential', got '{}'",
                    other
                )))
            }
        };

        let allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            api_key,
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            bind_addr: parse_or(
                "BIND_ADDR",
                get("BIND_ADDR"),
                SocketAddr::from(([0, 0, 0, 0], 3000)),
            )?,
            max_upload_bytes: parse_or(
                "MAX_UPLOAD_BYTES",
                get("MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            inline_limit_bytes: parse_or(
                "GEMINI_INLINE_LIMIT_BYTES",
                get("GEMINI_INLINE_LIMIT_BYTES"),
                0,
            )?,
            poll,
            allowed_origins,
        })
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            model: self.model.clone(),
            inline_limit_bytes: self.inline_limit_bytes,
        }
    }

    pub fn build_analyzer(&self) -> StatementAnalyzer {
        let client =
            GeminiClient::new(self.api_key.clone()).with_poll_policy(self.poll.clone());
        StatementAnalyzer::new(client, self.analyzer_settings())
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| InsightsError::Config(format!("{} has invalid value '{}'", key, value))),
        None => Ok(default),
    }
}
