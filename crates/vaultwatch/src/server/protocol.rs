//! WebSocket Protocol Messages
//!
//! Defines the message types exchanged over the `/ws` endpoint. The
//! controller and dashboard clients share the endpoint: the controller
//! pushes storage events, dashboards subscribe to paths and drive the
//! displayed module.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::events::StorageEvent;
use crate::types::ModuleId;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Subscribe to paths for real-time updates
    Subscribe {
        /// Request ID for correlation
        id: String,
        /// Paths to subscribe to (supports wildcards)
        paths: Vec<String>,
    },

    /// Unsubscribe from paths
    Unsubscribe { id: String, paths: Vec<String> },

    /// A storage event pushed by the controller
    Push { event: StorageEvent },

    /// Ask the controller for a whole-storage snapshot
    RequestStorageState { id: String, storage_id: String },

    /// Ask the controller for a single-module snapshot
    RequestModuleState { id: String, module_id: ModuleId },

    /// Switch the displayed module and set the drawing surface size
    SelectModule {
        id: String,
        module_id: Option<ModuleId>,
        width: u32,
        height: u32,
    },

    /// Pointer click on the module scheme, scheme coordinates
    Click { id: String, x: u32, y: u32 },

    /// Pointer movement on the module scheme, scheme coordinates
    Hover { x: u32, y: u32 },

    /// Current state of one module
    GetModule { id: String, module_id: ModuleId },

    /// Current scene of the displayed module
    GetScene { id: String },

    /// Current storage-scheme icon set
    GetIcons { id: String },

    /// Ping for keep-alive
    Ping { id: String },
}

/// A state request forwarded to the controller connection.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "scope")]
pub enum StateRequest {
    Module { module_id: ModuleId },
    Storage { storage_id: String },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent on initial connection
    Connected {
        session_id: String,
        server_version: String,
    },

    /// Response to a client request
    Response {
        id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Push notification for a subscribed path
    Change {
        path: String,
        data: Value,
    },

    /// A critical notification raised by reconciliation
    Notification {
        path: String,
        data: Value,
    },

    /// State request relayed to controller subscribers
    StateRequest { request: StateRequest },

    /// Error message
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: ErrorCode,
        message: String,
    },

    /// Pong response to ping
    Pong { id: String },
}

/// Error codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    NotFound,
    InternalError,
}

impl ServerMessage {
    /// Create a success response
    pub fn success(id: impl Into<String>, data: Option<Value>) -> Self {
        Self::Response {
            id: id.into(),
            success: true,
            data,
            error: None,
        }
    }

    /// Create an error response
    pub fn error_response(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Response {
            id: id.into(),
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Create a change push for a subscribed path
    pub fn change(path: impl Into<String>, data: Value) -> Self {
        Self::Change {
            path: path.into(),
            data,
        }
    }

    /// Create a connected message
    pub fn connected(session_id: impl Into<String>) -> Self {
        Self::Connected {
            session_id: session_id.into(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Create a pong message
    pub fn pong(id: impl Into<String>) -> Self {
        Self::Pong { id: id.into() }
    }
}
