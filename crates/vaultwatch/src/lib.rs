//! Vaultwatch - Storage Monitoring Backend
//!
//! This crate keeps a low-latency in-memory mirror of a vault
//! installation whose controller pushes status over a channel:
//! - Geometry catalog and entity store for modules and safes
//! - Reconciliation of snapshots and deltas under the "nonzero wins" rule
//! - Derived occupancy and consolidated statuses with strict precedence
//! - Critical-transition notifications
//! - Schematic scene projection and pointer hit testing
//! - WebSocket API for the controller and dashboard clients

// Derivations over store records
pub mod aggregate;

// Static module-model geometry
pub mod catalog;

// Configuration loading
pub mod config;

// Wire event shapes
pub mod events;

// The single-threaded event loop
pub mod monitor;

// Alerting seam
pub mod notify;

// Snapshot/delta reconciliation
pub mod reconcile;

// Scene projection and hit testing
pub mod schematic;

// WebSocket server
pub mod server;

// Module/safe registry
pub mod store;

// Shared value and error types
pub mod types;
