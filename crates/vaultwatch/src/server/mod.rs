//! WebSocket server boundary
//!
//! Carries the push channel inbound and scene/notification traffic
//! outbound. Connection lifecycle and retry policy belong to the peers;
//! this layer only decodes messages and relays monitor traffic.

mod handler;
pub mod protocol;
mod router;
pub mod state;

pub use router::create_router;
pub use state::{spawn_forwarders, AppState};
