use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tutor_dispatch::Dispatcher;
use tutor_protocol::{
    now_unix_ms, ClearAck, EnqueueAck, PendingMessage, ProcessNowAck, QueueStatus, DEFAULT_SENDER,
    MIN_BODY_LEN,
};

/// Inbound capture event, as posted by page-side collectors.
#[derive(Debug, Deserialize)]
pub struct QueueMessageBody {
    #[serde(default)]
    pub sender_name: String,
    pub body_text: String,
    #[serde(default)]
    pub origin_url: String,
}

pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/queue-message", post(queue_message))
        .route("/status", get(status))
        .route("/process-now", post(process_now))
        .route("/clear", post(clear))
        .with_state(dispatcher)
}

/// Same length rule the scanner applies: the trimmed body must be strictly
/// longer than the minimum.
fn qualifies(body_text: &str) -> bool {
    body_text.trim().chars().count() > MIN_BODY_LEN
}

async fn queue_message(
    State(dispatcher): State<Dispatcher>,
    Json(body): Json<QueueMessageBody>,
) -> Result<Json<EnqueueAck>, StatusCode> {
    if !qualifies(&body.body_text) {
        log::debug!("rejecting short queue-message request");
        return Ok(Json(EnqueueAck {
            accepted: false,
            queue_size: dispatcher.status().queue_size,
        }));
    }
    let sender_name = if body.sender_name.trim().is_empty() {
        DEFAULT_SENDER.to_string()
    } else {
        body.sender_name.trim().to_string()
    };
    let message = PendingMessage {
        sender_name,
        body_text: body.body_text.trim().to_string(),
        captured_at: now_unix_ms(),
        origin_url: body.origin_url,
    };
    let ack = dispatcher
        .enqueue(message)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(ack))
}

async fn status(State(dispatcher): State<Dispatcher>) -> Json<QueueStatus> {
    Json(dispatcher.status())
}

async fn process_now(
    State(dispatcher): State<Dispatcher>,
) -> Result<Json<ProcessNowAck>, StatusCode> {
    let ack = dispatcher
        .process_now()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(ack))
}

async fn clear(State(dispatcher): State<Dispatcher>) -> Result<Json<ClearAck>, StatusCode> {
    let ack = dispatcher
        .clear()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(ack))
}
