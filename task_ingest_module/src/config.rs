use std::env;
use std::path::PathBuf;

use send_emails_module::PostmarkConfig;

use crate::notify::DEFAULT_NOTIFICATION_FROM_NAME;
use crate::BoxError;

pub const DEFAULT_INBOUND_BODY_MAX_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_PORT: u16 = 9100;

#[derive(Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Shared secret expected on the inbound webhook; `None` disables the check.
    pub inbound_token: Option<String>,
    pub inbound_body_max_bytes: usize,
    /// Set when a Postmark server token is configured; enables confirmation emails.
    pub postmark: Option<PostmarkConfig>,
    pub notification_from_name: String,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("inbound_token", &self.inbound_token.as_ref().map(|_| "***"))
            .field("inbound_body_max_bytes", &self.inbound_body_max_bytes)
            .field("postmark", &self.postmark)
            .field("notification_from_name", &self.notification_from_name)
            .finish()
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let host = non_empty_var("INGEST_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match non_empty_var("INGEST_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| format!("invalid INGEST_PORT: {}", raw))?,
            None => DEFAULT_PORT,
        };
        let db_path = PathBuf::from(
            non_empty_var("BOARD_DB_PATH").unwrap_or_else(|| "board.db".to_string()),
        );
        let inbound_token = non_empty_var("POSTMARK_INBOUND_TOKEN");
        let inbound_body_max_bytes = non_empty_var("INBOUND_BODY_MAX_BYTES")
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_INBOUND_BODY_MAX_BYTES);
        let postmark = if non_empty_var("POSTMARK_SERVER_TOKEN").is_some() {
            Some(PostmarkConfig::from_env()?)
        } else {
            None
        };
        let notification_from_name = non_empty_var("NOTIFICATION_FROM_NAME")
            .unwrap_or_else(|| DEFAULT_NOTIFICATION_FROM_NAME.to_string());

        Ok(Self {
            host,
            port,
            db_path,
            inbound_token,
            inbound_body_max_bytes,
            postmark,
            notification_from_name,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
