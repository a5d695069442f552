use std::env;
use std::time::Duration;

use crate::http::DEFAULT_TIMEOUT;

pub const DEFAULT_API_BASE_URL: &str = "https://api.postmarkapp.com";
pub const DEFAULT_SENDER_ADDRESS: &str = "notifications@localhost";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Credentials and addressing for the Postmark email API.
#[derive(Clone)]
pub struct PostmarkConfig {
    pub server_token: String,
    pub sender_address: String,
    pub api_base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for PostmarkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostmarkConfig")
            .field("server_token", &"***")
            .field("sender_address", &self.sender_address)
            .field("api_base_url", &self.api_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PostmarkConfig {
    pub fn new(server_token: impl Into<String>, sender_address: impl Into<String>) -> Self {
        Self {
            server_token: server_token.into(),
            sender_address: sender_address.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let server_token = env::var("POSTMARK_SERVER_TOKEN")
            .map(|value| value.trim().to_string())
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing("POSTMARK_SERVER_TOKEN"))?;
        let sender_address = non_empty_var("POSTMARK_SENDER_ADDRESS")
            .unwrap_or_else(|| DEFAULT_SENDER_ADDRESS.to_string());
        let api_base_url = non_empty_var("POSTMARK_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let timeout = match non_empty_var("POSTMARK_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or(ConfigError::Invalid {
                        key: "POSTMARK_TIMEOUT_SECS",
                        value: raw.clone(),
                    })?;
                Duration::from_secs(secs)
            }
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            server_token,
            sender_address,
            api_base_url,
            timeout,
        })
    }

    pub fn email_endpoint(&self) -> String {
        format!("{}/email", self.api_base_url.trim_end_matches('/'))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
