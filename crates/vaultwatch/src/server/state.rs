//! Server Application State
//!
//! Shared state accessible by all WebSocket handlers: the connected
//! client registry with path subscriptions, and the forwarder tasks that
//! pump monitor output to subscribed clients.

use std::collections::HashSet;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;
use wildmatch::WildMatch;

use crate::monitor::{MonitorHandle, UpstreamRequest};
use crate::notify::BroadcastNotifier;

use super::protocol::{ServerMessage, StateRequest};

/// Path carrying storage-scheme icon changes.
pub const ICONS_PATH: &str = "/scheme/icons";
/// Path carrying critical notifications.
pub const NOTIFICATIONS_PATH: &str = "/notifications";
/// Path the controller subscribes to for state requests.
pub const UPSTREAM_PATH: &str = "/upstream";

/// Path carrying scene updates for one module.
pub fn scene_path(module_id: &str) -> String {
    format!("/modules/{module_id}/scene")
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Connected clients
    clients: DashMap<Uuid, ClientState>,

    /// Handle into the monitor loop
    monitor: MonitorHandle,
}

/// Per-client state
#[derive(Debug, Clone)]
pub struct ClientState {
    /// Client session ID
    pub session_id: Uuid,

    /// Subscribed paths (with potential wildcards)
    pub subscriptions: HashSet<String>,

    /// Channel to send messages to this client
    pub tx: mpsc::Sender<ServerMessage>,
}

impl AppState {
    /// Create new application state
    pub fn new(monitor: MonitorHandle) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                clients: DashMap::new(),
                monitor,
            }),
        }
    }

    /// Get the monitor handle
    pub fn monitor(&self) -> &MonitorHandle {
        &self.inner.monitor
    }

    /// Register a new client connection
    pub fn register_client(&self, tx: mpsc::Sender<ServerMessage>) -> Uuid {
        let session_id = Uuid::new_v4();
        let client = ClientState {
            session_id,
            subscriptions: HashSet::new(),
            tx,
        };

        self.inner.clients.insert(session_id, client);
        tracing::info!("Client connected: {}", session_id);

        session_id
    }

    /// Remove a client connection
    pub fn remove_client(&self, session_id: Uuid) {
        self.inner.clients.remove(&session_id);
        tracing::info!("Client disconnected: {}", session_id);
    }

    /// Add subscriptions for a client
    pub fn subscribe(&self, session_id: Uuid, paths: Vec<String>) {
        if let Some(mut client) = self.inner.clients.get_mut(&session_id) {
            for path in paths {
                tracing::debug!("Client {} subscribed to: {}", session_id, path);
                client.subscriptions.insert(path);
            }
        }
    }

    /// Remove subscriptions for a client
    pub fn unsubscribe(&self, session_id: Uuid, paths: Vec<String>) {
        if let Some(mut client) = self.inner.clients.get_mut(&session_id) {
            for path in &paths {
                client.subscriptions.remove(path);
            }
        }
    }

    /// Broadcast a message to all clients subscribed to a path
    pub fn broadcast(&self, path: &str, message: ServerMessage) {
        for client in self.inner.clients.iter() {
            if Self::matches_any_subscription(&client.subscriptions, path) {
                if let Err(e) = client.tx.try_send(message.clone()) {
                    tracing::warn!(
                        "Failed to send message to client {}: {}",
                        client.session_id,
                        e
                    );
                }
            }
        }
    }

    /// Send a message to a specific client
    pub fn send_to_client(&self, session_id: Uuid, message: ServerMessage) {
        if let Some(client) = self.inner.clients.get(&session_id) {
            let _ = client.tx.try_send(message);
        }
    }

    /// Get the number of connected clients
    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    /// Relay a state request to controller subscribers.
    pub fn request_state(&self, request: StateRequest) {
        self.broadcast(UPSTREAM_PATH, ServerMessage::StateRequest { request });
    }

    /// Check if a path matches any subscription pattern
    fn matches_any_subscription(subscriptions: &HashSet<String>, path: &str) -> bool {
        for pattern in subscriptions {
            if pattern == path {
                return true;
            }

            if pattern.ends_with("/**") {
                // Recursive: /modules/** matches /modules/m1 and /modules/m1/scene
                let prefix = &pattern[..pattern.len() - 3];
                if path.starts_with(prefix) {
                    return true;
                }
                continue;
            }

            if pattern.ends_with("/*") {
                // Single level: /modules/* matches /modules/m1 but not /modules/m1/scene
                let prefix = &pattern[..pattern.len() - 2];
                if path.starts_with(prefix) {
                    let remainder = &path[prefix.len()..];
                    if remainder.starts_with('/') && !remainder[1..].contains('/') {
                        return true;
                    }
                    if remainder.is_empty() {
                        return true;
                    }
                }
                continue;
            }

            if WildMatch::new(pattern).matches(path) {
                return true;
            }
        }

        false
    }
}

/// Spawn the forwarder tasks pumping monitor output to subscribed
/// clients. Each runs until its source channel closes; a lagging client
/// misses intermediate values, never blocks the pump.
pub fn spawn_forwarders(
    state: AppState,
    notifier: BroadcastNotifier,
    mut upstream_rx: mpsc::Receiver<UpstreamRequest>,
) {
    let mut icons = state.monitor().subscribe_icons();
    let icon_state = state.clone();
    tokio::spawn(async move {
        while let Ok(icon) = icons.recv().await {
            if let Ok(data) = serde_json::to_value(&icon) {
                icon_state.broadcast(ICONS_PATH, ServerMessage::change(ICONS_PATH, data));
            }
        }
    });

    let mut scenes = state.monitor().subscribe_scenes();
    let scene_state = state.clone();
    tokio::spawn(async move {
        while let Ok(scene) = scenes.recv().await {
            let path = scene_path(&scene.module_id);
            if let Ok(data) = serde_json::to_value(&scene) {
                scene_state.broadcast(&path, ServerMessage::change(&path, data));
            }
        }
    });

    let mut notifications = notifier.subscribe();
    let notify_state = state.clone();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            if let Ok(data) = serde_json::to_value(&notification) {
                notify_state.broadcast(
                    NOTIFICATIONS_PATH,
                    ServerMessage::Notification {
                        path: NOTIFICATIONS_PATH.to_string(),
                        data,
                    },
                );
            }
        }
    });

    tokio::spawn(async move {
        while let Some(request) = upstream_rx.recv().await {
            let request = match request {
                UpstreamRequest::ModuleState { module_id } => StateRequest::Module { module_id },
                UpstreamRequest::StorageState { storage_id } => {
                    StateRequest::Storage { storage_id }
                }
            };
            state.request_state(request);
        }
    });
}
