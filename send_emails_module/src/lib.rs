//! Outbound notification email over the Postmark HTTP API.

pub mod config;
pub mod http;
pub mod postmark;

pub use config::{ConfigError, PostmarkConfig, DEFAULT_API_BASE_URL, DEFAULT_SENDER_ADDRESS};
pub use http::{HttpClient, HttpError, HttpResponse, ReqwestHttpClient};
pub use postmark::{
    OutboundEmail, PostmarkSendResponse, PostmarkSender, SendEmailError, SERVER_TOKEN_HEADER,
};
