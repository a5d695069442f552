use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use send_emails_module::PostmarkSender;
use serde_json::{json, Value};
use tokio::task;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::notify::PostmarkTaskNotifier;
use crate::postmark::PostmarkInbound;
use crate::receiver::EmailTaskReceiver;
use crate::store::SqliteBoardStore;
use crate::BoxError;

pub const INBOUND_TOKEN_HEADER: &str = "x-postmark-token";

#[derive(Clone)]
pub struct AppState {
    pub receiver: Arc<EmailTaskReceiver<SqliteBoardStore>>,
    pub inbound_token: Option<String>,
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/postmark/inbound", post(ingest_postmark))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
}

pub fn build_receiver(config: &ServiceConfig) -> Result<EmailTaskReceiver<SqliteBoardStore>, BoxError> {
    let store = SqliteBoardStore::new(&config.db_path)?;
    let mut receiver = EmailTaskReceiver::new(store);
    match config.postmark.clone() {
        Some(postmark) => {
            info!("task confirmation emails enabled via {}", postmark.api_base_url);
            let sender = PostmarkSender::from_config(postmark)?;
            receiver = receiver.with_notifier(Box::new(PostmarkTaskNotifier::new(
                sender,
                config.notification_from_name.clone(),
            )));
        }
        None => info!("POSTMARK_SERVER_TOKEN not set; task confirmation emails disabled"),
    }
    Ok(receiver)
}

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let setup_config = config.clone();
    // The blocking HTTP client inside the notifier must be built off the async runtime.
    let receiver = task::spawn_blocking(move || build_receiver(&setup_config))
        .await
        .map_err(|err| -> BoxError { err.into() })??;
    let receiver = Arc::new(receiver);
    let state = AppState {
        receiver: receiver.clone(),
        inbound_token: config.inbound_token.clone(),
    };
    if state.inbound_token.is_none() {
        warn!("POSTMARK_INBOUND_TOKEN not set; inbound webhook accepts unauthenticated requests");
    }

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!(
        "task ingest gateway listening on {} db={}",
        addr,
        config.db_path.display()
    );

    let app = router(state, config.inbound_body_max_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    let _ = task::spawn_blocking(move || drop(receiver)).await;
    serve_result?;
    Ok(())
}

pub(crate) async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub(crate) async fn ingest_postmark(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    if let Err(reason) = verify_inbound_token(state.inbound_token.as_deref(), &headers, &params) {
        warn!("rejected postmark webhook: {}", reason);
        return (StatusCode::UNAUTHORIZED, Json(json!({"status": reason})));
    }

    let payload = match PostmarkInbound::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("postmark webhook body is not valid json: {}", err);
            return (StatusCode::BAD_REQUEST, Json(json!({"status": "bad_json"})));
        }
    };

    let receiver = state.receiver.clone();
    let outcome = task::spawn_blocking(move || receiver.accept_email(&payload)).await;
    match outcome {
        Ok(Ok(accepted)) => {
            let task_id = accepted.task_id;
            // Confirmation goes out after the webhook is acknowledged.
            let receiver = state.receiver.clone();
            task::spawn_blocking(move || receiver.notify(&accepted));
            (
                StatusCode::OK,
                Json(json!({"status": "task_created", "task_id": task_id})),
            )
        }
        Ok(Err(err)) => {
            info!("postmark webhook ignored: {}", err);
            (
                StatusCode::OK,
                Json(json!({"status": "ignored", "reason": err.reason()})),
            )
        }
        Err(err) => {
            error!("email receiver task failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "internal_error"})),
            )
        }
    }
}

/// Accepts the secret either as the `X-Postmark-Token` header or a `token` query parameter.
pub(crate) fn verify_inbound_token(
    expected: Option<&str>,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Result<(), &'static str> {
    let Some(expected) = expected.filter(|value| !value.trim().is_empty()) else {
        return Ok(());
    };
    let header = headers
        .get(INBOUND_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    let query = params.get("token").map(String::as_str);
    if header.is_none() && query.is_none() {
        return Err("missing_token");
    }
    if header == Some(expected) || query == Some(expected) {
        Ok(())
    } else {
        Err("invalid_token")
    }
}
