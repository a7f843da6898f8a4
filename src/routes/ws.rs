//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::CoreError;
use crate::logic;
use crate::protocol::{to_mastery_out, to_path_out, ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "pathquest_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "pathquest_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "pathquest_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::from(CoreError::validation(format!("Invalid JSON: {}", e))),
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "kind": "storage_error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "pathquest_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "pathquest_backend", "WebSocket disconnected");
}

/// Dispatch one client message. Failures become `error` replies; the socket stays open.
#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let result = match msg {
    ClientWsMessage::Ping => Ok(ServerWsMessage::Pong),

    ClientWsMessage::GetPath { path_id } => logic::get_path(state, &path_id)
      .await
      .map(|path| ServerWsMessage::Path { path: to_path_out(path) }),

    ClientWsMessage::CompleteNode { path_id, node_id } => {
      logic::complete_node(state, &path_id, &node_id).await.map(|path| {
        info!(target: "progress", %path_id, %node_id, "WS complete_node served");
        ServerWsMessage::Path { path: to_path_out(path) }
      })
    }

    ClientWsMessage::ExtendPath { path_id, count } => logic::extend_path(state, &path_id, count)
      .await
      .map(|path| ServerWsMessage::Path { path: to_path_out(path) }),

    ClientWsMessage::CourseMastery { course_id } => logic::course_mastery(state, &course_id)
      .await
      .map(|view| ServerWsMessage::Mastery { mastery: to_mastery_out(view) }),
  };
  result.unwrap_or_else(ServerWsMessage::from)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn ping_gets_pong() {
    let state = AppState::for_tests().await;
    let reply = handle_client_ws(ClientWsMessage::Ping, &state).await;
    assert!(matches!(reply, ServerWsMessage::Pong));
  }

  #[tokio::test]
  async fn unknown_path_becomes_error_reply() {
    let state = AppState::for_tests().await;
    let reply = handle_client_ws(ClientWsMessage::GetPath { path_id: "missing".into() }, &state).await;
    match reply {
      ServerWsMessage::Error { kind, message } => {
        assert_eq!(kind, "not_found");
        assert!(message.contains("missing"));
      }
      other => panic!("unexpected reply: {:?}", other),
    }
  }

  #[tokio::test]
  async fn course_mastery_over_ws() {
    let state = AppState::for_tests().await;
    let reply = handle_client_ws(ClientWsMessage::CourseMastery { course_id: "demo-course".into() }, &state).await;
    match reply {
      ServerWsMessage::Mastery { mastery } => assert_eq!(mastery.nodes.len(), 4),
      other => panic!("unexpected reply: {:?}", other),
    }
  }
}
