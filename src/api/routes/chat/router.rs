//! Router for the chat API

use std::sync::Arc;

use anyhow::{Context, anyhow};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::public;
use crate::ai::chat::{ChannelTransport, GenerationRequest, ServerEvent, Submission};
use crate::api::state::AppState;

type SharedState = Arc<AppState>;

/// Generate a complete response in one go. The body is the response
/// text as a bare JSON string.
async fn chat_handler(
    State(state): State<SharedState>,
    axum::Json(payload): axum::Json<public::ChatRequest>,
) -> Result<axum::Json<String>, crate::api::public::ApiError> {
    let settings = state.registry.settings();
    let request = GenerationRequest::new(payload, settings.max_previous_conversations);
    let messages = request.messages(&settings.system_prompt);

    let output: String = state
        .registry
        .provider()
        .stream_completion(messages)
        .try_collect()
        .await
        .context("Something went wrong creating conversation")?;

    if output.trim().is_empty() {
        return Err(anyhow!("Completion returned no content").into());
    }

    Ok(axum::Json(output))
}

/// Upgrade to a chat socket that streams responses as they are
/// generated
async fn chat_socket(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();

    let session = state
        .registry
        .connect(Arc::new(ChannelTransport::new(tx)));
    let connection_id = session.connection_id();
    tracing::info!("Client connected: {}", connection_id);

    // Forward everything the session emits to the socket in order
    let writer = tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut socket_error = None;
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                socket_error = Some(e);
                break;
            }
        };

        match serde_json::from_str::<public::ClientCommand>(text.as_str()) {
            Ok(public::ClientCommand::SendChat(request)) => {
                if let Submission::Dropped = session.submit(request) {
                    tracing::debug!("Ignored chat from {} while busy", connection_id);
                }
            }
            Ok(public::ClientCommand::StopChat) => session.stop(),
            Err(e) => tracing::warn!("Invalid message from {}: {}", connection_id, e),
        }
    }

    state.registry.disconnect(&connection_id);
    writer.abort();

    match socket_error {
        Some(e) => tracing::warn!("Client disconnected with error: {}: {}", connection_id, e),
        None => tracing::info!("Client disconnected: {}", connection_id),
    }
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(chat_handler))
        .route("/ws", get(chat_socket))
}
