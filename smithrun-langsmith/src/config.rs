use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use secrecy::SecretString;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.smith.langchain.com";
pub const DEFAULT_PROJECT: &str = "default";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_TRACING_ENABLED: &str = "TRACING_ENABLED";
pub const ENV_PROJECT: &str = "TRACING_PROJECT";
pub const ENV_ENDPOINT: &str = "TRACING_ENDPOINT";
pub const ENV_API_KEY: &str = "TRACING_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a boolean, got '{value}'")]
    InvalidBool { var: &'static str, value: String },
    #[error("{var} is not a valid URL: {value}")]
    InvalidEndpoint { var: &'static str, value: String },
    #[error("TRACING_API_KEY is required when tracing is enabled")]
    MissingApiKey,
}

#[derive(Clone, Debug)]
pub struct LangSmithConfig {
    pub tracing_enabled: bool,
    pub api_key: SecretString,
    pub api_url: String,
    pub project_name: String,
    pub flush_interval: Duration,
    /// Upper bound on a single HTTP attempt.
    pub request_timeout: Duration,
    pub max_batch_size: usize,
    pub queue_capacity: usize,
    pub sampling_rate: f64,
    pub redact_regex: Option<Regex>,
}

impl LangSmithConfig {
    /// Tracing enabled against the hosted endpoint.
    pub fn new(api_key: SecretString, project_name: impl Into<String>) -> Self {
        Self {
            tracing_enabled: true,
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
            project_name: project_name.into(),
            flush_interval: Duration::from_secs(2),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_batch_size: 50,
            queue_capacity: 1000,
            sampling_rate: 1.0,
            redact_regex: None,
        }
    }

    /// Reads `TRACING_ENABLED`, `TRACING_PROJECT`, `TRACING_ENDPOINT` and
    /// `TRACING_API_KEY` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`LangSmithConfig::from_env`] with a caller-supplied source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tracing_enabled = match non_empty(lookup(ENV_TRACING_ENABLED)) {
            Some(raw) => parse_bool(ENV_TRACING_ENABLED, &raw)?,
            None => false,
        };
        let project_name =
            non_empty(lookup(ENV_PROJECT)).unwrap_or_else(|| DEFAULT_PROJECT.to_string());
        let api_url =
            non_empty(lookup(ENV_ENDPOINT)).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if Url::parse(&api_url).is_err() {
            return Err(ConfigError::InvalidEndpoint {
                var: ENV_ENDPOINT,
                value: api_url,
            });
        }
        let api_key = match non_empty(lookup(ENV_API_KEY)) {
            Some(key) => key,
            None if tracing_enabled => return Err(ConfigError::MissingApiKey),
            None => String::new(),
        };

        let mut config = Self::new(SecretString::new(api_key), project_name);
        config.tracing_enabled = tracing_enabled;
        config.api_url = api_url;
        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: raw.to_string(),
        }),
    }
}
