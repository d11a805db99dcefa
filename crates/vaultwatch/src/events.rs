//! Inbound Event Shapes
//!
//! The shapes the controller pushes over the channel: whole-scope
//! snapshots and partial deltas. Everything arrives as discrete,
//! fully-formed JSON messages; raw property values are wire bytes where
//! zero means "field omitted".

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{ModuleId, SafeId};

/// One reported property: a numeric field code and its raw wire value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PropertyReport {
    pub code: u8,
    pub value: u8,
}

/// Full state carried for one safe inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SafeSnapshot {
    pub safe_id: SafeId,
    #[serde(default)]
    pub properties: Vec<PropertyReport>,
}

/// Full state carried for one module inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ModuleSnapshot {
    pub module_id: ModuleId,
    /// Hardware model, when the controller knows it.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyReport>,
    #[serde(default)]
    pub safes: Vec<SafeSnapshot>,
}

impl ModuleSnapshot {
    /// Lowest listed safe id; new modules number their slots from it.
    pub fn first_safe_id(&self) -> SafeId {
        self.safes.iter().map(|s| s.safe_id).min().unwrap_or(1)
    }
}

/// Full state of the whole storage in a single message.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub storage_id: Option<String>,
    #[serde(default)]
    pub modules: Vec<ModuleSnapshot>,
}

/// Events consumed from the push channel.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum StorageEvent {
    /// Full state for every module of the storage.
    WholeStorageState(StorageSnapshot),

    /// Full state for a single module.
    WholeModuleState(ModuleSnapshot),

    /// Icon-only hint for the storage scheme; bypasses status derivation.
    ModuleStatusChange { module_id: ModuleId, code: u8 },

    /// Single module-field update.
    ModulePropertyChange {
        module_id: ModuleId,
        code: u8,
        value: u8,
    },

    /// Batched single-field updates for one safe.
    SafePropertiesChange {
        module_id: ModuleId,
        safe_id: SafeId,
        properties: Vec<PropertyReport>,
    },
}

/// Module-level fields addressable by delta code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleField {
    Error,
    HardwareSection,
    MasterKey,
    Alarm,
    Connectivity,
    Memory,
    Power,
}

impl ModuleField {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ModuleField::Error),
            2 => Some(ModuleField::HardwareSection),
            3 => Some(ModuleField::MasterKey),
            4 => Some(ModuleField::Alarm),
            5 => Some(ModuleField::Connectivity),
            6 => Some(ModuleField::Memory),
            7 => Some(ModuleField::Power),
            _ => None,
        }
    }
}

/// Safe-level properties addressable by delta code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeProperty {
    Door,
    LockBlock,
    LockOpen,
    Fault,
    /// Renames the safe rather than setting a status field.
    LogicalNumber,
}

impl SafeProperty {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SafeProperty::Door),
            2 => Some(SafeProperty::LockBlock),
            3 => Some(SafeProperty::LockOpen),
            4 => Some(SafeProperty::Fault),
            5 => Some(SafeProperty::LogicalNumber),
            _ => None,
        }
    }
}
