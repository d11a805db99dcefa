//! WebSocket Connection Handler
//!
//! Handles individual WebSocket connections and message processing. The
//! controller and dashboard clients both land here; malformed JSON is
//! rejected at this boundary and never reaches the monitor.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::{ClientMessage, ErrorCode, ServerMessage, StateRequest};
use super::state::{AppState, ICONS_PATH};

/// Handle a WebSocket connection
pub async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create channel for sending messages to this client
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    // Register client and get session ID
    let session_id = state.register_client(tx);

    // Send connected message
    let connected_msg = ServerMessage::connected(session_id.to_string());
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        let _ = ws_sender.send(Message::Text(json.into())).await;
    }

    // Forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Process incoming messages
    let state_clone = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_client_message(&state_clone, session_id, &text).await;
                }
                Message::Close(_) => {
                    break;
                }
                Message::Ping(_data) => {
                    // Pong is handled automatically by axum
                    tracing::trace!("Received ping from {}", session_id);
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    // Cleanup
    state.remove_client(session_id);
}

/// Handle a client message
async fn handle_client_message(state: &AppState, session_id: Uuid, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Failed to parse client message: {}", e);
            state.send_to_client(
                session_id,
                ServerMessage::Error {
                    id: None,
                    code: ErrorCode::InvalidRequest,
                    message: "Invalid JSON".to_string(),
                },
            );
            return;
        }
    };

    match msg {
        ClientMessage::Subscribe { id, paths } => {
            let wants_icons = paths.iter().any(|p| p == ICONS_PATH);
            state.subscribe(session_id, paths);

            // New scheme subscribers get the current icon set right away
            let data = if wants_icons {
                match state.monitor().icons().await {
                    Ok(icons) => serde_json::to_value(&icons).ok(),
                    Err(_) => None,
                }
            } else {
                None
            };
            state.send_to_client(session_id, ServerMessage::success(id, data));
        }

        ClientMessage::Unsubscribe { id, paths } => {
            state.unsubscribe(session_id, paths);
            state.send_to_client(session_id, ServerMessage::success(id, None));
        }

        ClientMessage::Push { event } => {
            // The push channel is fire-and-forget; a full queue only
            // means the monitor is shutting down
            if let Err(e) = state.monitor().apply(event).await {
                tracing::error!("Dropped pushed event: {e}");
            }
        }

        ClientMessage::RequestStorageState { id, storage_id } => {
            state.request_state(StateRequest::Storage { storage_id });
            state.send_to_client(session_id, ServerMessage::success(id, None));
        }

        ClientMessage::RequestModuleState { id, module_id } => {
            state.request_state(StateRequest::Module { module_id });
            state.send_to_client(session_id, ServerMessage::success(id, None));
        }

        ClientMessage::SelectModule {
            id,
            module_id,
            width,
            height,
        } => {
            match state.monitor().select_module(module_id, width, height).await {
                Ok(scene) => {
                    let data = scene.and_then(|s| serde_json::to_value(&s).ok());
                    state.send_to_client(session_id, ServerMessage::success(id, data));
                }
                Err(e) => {
                    state.send_to_client(session_id, ServerMessage::error_response(id, e.to_string()));
                }
            }
        }

        ClientMessage::Click { id, x, y } => match state.monitor().click(x, y).await {
            Ok(hit) => {
                let data = serde_json::json!({ "safe_id": hit });
                state.send_to_client(session_id, ServerMessage::success(id, Some(data)));
            }
            Err(e) => {
                state.send_to_client(session_id, ServerMessage::error_response(id, e.to_string()));
            }
        },

        ClientMessage::Hover { x, y } => {
            let _ = state.monitor().hover(x, y).await;
        }

        ClientMessage::GetModule { id, module_id } => {
            match state.monitor().module(&module_id).await {
                Ok(Some(module)) => {
                    let data = serde_json::to_value(&module).ok();
                    state.send_to_client(session_id, ServerMessage::success(id, data));
                }
                Ok(None) => {
                    state.send_to_client(
                        session_id,
                        ServerMessage::Error {
                            id: Some(id),
                            code: ErrorCode::NotFound,
                            message: format!("Module {module_id} is not known yet"),
                        },
                    );
                }
                Err(e) => {
                    state.send_to_client(session_id, ServerMessage::error_response(id, e.to_string()));
                }
            }
        }

        ClientMessage::GetScene { id } => match state.monitor().scene().await {
            Ok(scene) => {
                let data = scene.and_then(|s| serde_json::to_value(&s).ok());
                state.send_to_client(session_id, ServerMessage::success(id, data));
            }
            Err(e) => {
                state.send_to_client(session_id, ServerMessage::error_response(id, e.to_string()));
            }
        },

        ClientMessage::GetIcons { id } => match state.monitor().icons().await {
            Ok(icons) => {
                let data = serde_json::to_value(&icons).ok();
                state.send_to_client(session_id, ServerMessage::success(id, data));
            }
            Err(e) => {
                state.send_to_client(session_id, ServerMessage::error_response(id, e.to_string()));
            }
        },

        ClientMessage::Ping { id } => {
            state.send_to_client(session_id, ServerMessage::pong(id));
        }
    }
}
