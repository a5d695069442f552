use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PostmarkConfig;
use crate::http::{HttpClient, HttpError, ReqwestHttpClient};

pub const SERVER_TOKEN_HEADER: &str = "X-Postmark-Server-Token";

#[derive(Debug, thiserror::Error)]
pub enum SendEmailError {
    #[error(transparent)]
    Transport(#[from] HttpError),
    #[error("postmark returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Request body of the Postmark single-email endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "HtmlBody")]
    pub html_body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostmarkSendResponse {
    #[serde(rename = "MessageID", default)]
    pub message_id: Option<String>,
    #[serde(rename = "SubmittedAt", default)]
    pub submitted_at: Option<String>,
    #[serde(rename = "ErrorCode", default)]
    pub error_code: Option<i64>,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
}

/// Sends notification emails through the Postmark HTTP API.
pub struct PostmarkSender<C = ReqwestHttpClient> {
    config: PostmarkConfig,
    client: C,
}

impl PostmarkSender<ReqwestHttpClient> {
    pub fn from_config(config: PostmarkConfig) -> Result<Self, HttpError> {
        let client = ReqwestHttpClient::new(config.timeout)?;
        Ok(Self { config, client })
    }
}

impl<C: HttpClient> PostmarkSender<C> {
    pub fn new(config: PostmarkConfig, client: C) -> Self {
        Self { config, client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn build_email(
        &self,
        to_address: &str,
        to_name: &str,
        subject: &str,
        html_content: &str,
        from_name: &str,
    ) -> OutboundEmail {
        OutboundEmail {
            from: format_mailbox(from_name, &self.config.sender_address),
            to: format_mailbox(to_name, to_address),
            subject: subject.to_string(),
            html_body: html_content.to_string(),
        }
    }

    /// Returns false on any failure; the reason is logged.
    pub fn send_email(
        &self,
        to_address: &str,
        to_name: &str,
        subject: &str,
        html_content: &str,
        from_name: &str,
    ) -> bool {
        match self.try_send_email(to_address, to_name, subject, html_content, from_name) {
            Ok(response) => {
                info!(
                    "postmark email sent to={} message_id={}",
                    to_address,
                    response.message_id.as_deref().unwrap_or("-")
                );
                true
            }
            Err(err) => {
                warn!("postmark email to {} failed: {}", to_address, err);
                false
            }
        }
    }

    pub fn try_send_email(
        &self,
        to_address: &str,
        to_name: &str,
        subject: &str,
        html_content: &str,
        from_name: &str,
    ) -> Result<PostmarkSendResponse, SendEmailError> {
        let email = self.build_email(to_address, to_name, subject, html_content, from_name);
        let body = serde_json::to_value(&email).map_err(HttpError::from)?;
        let headers = [
            ("Accept", "application/json"),
            ("Content-Type", "application/json"),
            (SERVER_TOKEN_HEADER, self.config.server_token.as_str()),
        ];
        let response = self
            .client
            .post_json(&self.config.email_endpoint(), &headers, &body)?;
        if !response.is_success() {
            return Err(SendEmailError::Status {
                status: response.status,
                body: response.body,
            });
        }
        Ok(serde_json::from_str(&response.body).unwrap_or_default())
    }
}

fn format_mailbox(name: &str, address: &str) -> String {
    let name = name.trim();
    let address = address.trim();
    if name.is_empty() {
        address.to_string()
    } else {
        format!("{} <{}>", name, address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use serde_json::Value;
    use std::cell::RefCell;

    #[derive(Debug, Clone)]
    struct RecordedRequest {
        url: String,
        headers: Vec<String>,
        body: Value,
    }

    struct FakeClient {
        status: u16,
        body: String,
        fail: bool,
        requests: RefCell<Vec<RecordedRequest>>,
    }

    impl FakeClient {
        fn responding(status: u16, body: &str) -> Self {
            Self {
                status,
                body: body.to_string(),
                fail: false,
                requests: RefCell::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::responding(0, "")
            }
        }

        fn last(&self) -> RecordedRequest {
            self.requests.borrow().last().cloned().unwrap()
        }
    }

    impl HttpClient for FakeClient {
        fn post_json(
            &self,
            url: &str,
            headers: &[(&str, &str)],
            body: &Value,
        ) -> Result<HttpResponse, HttpError> {
            self.requests.borrow_mut().push(RecordedRequest {
                url: url.to_string(),
                headers: headers
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, value))
                    .collect(),
                body: body.clone(),
            });
            if self.fail {
                return Err(HttpError::InvalidHeader("simulated".to_string()));
            }
            Ok(HttpResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    fn sender(client: FakeClient) -> PostmarkSender<FakeClient> {
        PostmarkSender::new(
            PostmarkConfig::new("", "notifications@board.local"),
            client,
        )
    }

    #[test]
    fn send_email_builds_postmark_payload() {
        let sender = sender(FakeClient::responding(200, "{}"));
        assert!(sender.send_email("test@localhost", "Me", "Test", "Content", "Bob"));

        let request = sender.client().last();
        assert_eq!(request.url, "https://api.postmarkapp.com/email");
        assert_eq!(request.body["To"], "Me <test@localhost>");
        assert_eq!(request.body["From"], "Bob <notifications@board.local>");
        assert_eq!(request.body["Subject"], "Test");
        assert_eq!(request.body["HtmlBody"], "Content");
        assert!(request.headers.contains(&"Accept: application/json".to_string()));
        assert!(request
            .headers
            .contains(&"Content-Type: application/json".to_string()));
        assert!(request
            .headers
            .contains(&"X-Postmark-Server-Token: ".to_string()));
    }

    #[test]
    fn blank_names_fall_back_to_bare_addresses() {
        let sender = sender(FakeClient::responding(200, "{}"));
        let email = sender.build_email("test@localhost", "  ", "Hi", "", "");
        assert_eq!(email.to, "test@localhost");
        assert_eq!(email.from, "notifications@board.local");
    }

    #[test]
    fn non_success_status_is_a_failure() {
        let sender = sender(FakeClient::responding(
            422,
            r#"{"ErrorCode":300,"Message":"Invalid email request"}"#,
        ));
        assert!(!sender.send_email("test@localhost", "Me", "Test", "Content", "Bob"));

        let err = sender
            .try_send_email("test@localhost", "Me", "Test", "Content", "Bob")
            .unwrap_err();
        assert!(matches!(err, SendEmailError::Status { status: 422, .. }));
    }

    #[test]
    fn transport_failure_is_a_failure() {
        let sender = sender(FakeClient::failing());
        assert!(!sender.send_email("test@localhost", "Me", "Test", "Content", "Bob"));
    }

    #[test]
    fn success_response_is_parsed() {
        let sender = sender(FakeClient::responding(
            200,
            r#"{"To":"test@localhost","SubmittedAt":"2024-01-01T00:00:00Z","MessageID":"abc-123","ErrorCode":0,"Message":"OK"}"#,
        ));
        let response = sender
            .try_send_email("test@localhost", "Me", "Test", "Content", "Bob")
            .unwrap();
        assert_eq!(response.message_id.as_deref(), Some("abc-123"));
        assert_eq!(response.submitted_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(response.error_code, Some(0));
    }
}
