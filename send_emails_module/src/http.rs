use std::time::Duration;

use serde_json::Value;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid header {0}")]
    InvalidHeader(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Status and raw body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound transport used by the email sender.
///
/// Implementations issue exactly one request per call and never retry.
pub trait HttpClient {
    fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
    ) -> Result<HttpResponse, HttpError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::blocking::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
    ) -> Result<HttpResponse, HttpError> {
        let mut request = self.client.post(url);
        for (name, value) in headers {
            if name.trim().is_empty() {
                return Err(HttpError::InvalidHeader((*name).to_string()));
            }
            request = request.header(*name, *value);
        }
        // Body is serialized by hand so a caller-supplied Content-Type is not duplicated.
        let payload = serde_json::to_vec(body)?;
        let response = request.body(payload).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn success_range_is_2xx() {
        let ok = HttpResponse {
            status: 204,
            body: String::new(),
        };
        let redirect = HttpResponse {
            status: 302,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }

    #[test]
    fn reqwest_client_posts_headers_and_body() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/echo")
            .match_header("x-test", "yes")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"hello": "world"})))
            .with_status(201)
            .with_body("created")
            .expect(1)
            .create();

        let client = ReqwestHttpClient::new(DEFAULT_TIMEOUT).unwrap();
        let response = client
            .post_json(
                &format!("{}/echo", server.url()),
                &[("X-Test", "yes"), ("Content-Type", "application/json")],
                &json!({"hello": "world"}),
            )
            .unwrap();

        mock.assert();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, "created");
    }

    #[test]
    fn reqwest_client_reports_connection_errors() {
        let client = ReqwestHttpClient::new(Duration::from_secs(2)).unwrap();
        let result = client.post_json("http://127.0.0.1:1/email", &[], &json!({}));
        assert!(matches!(result, Err(HttpError::Request(_))));
    }
}
