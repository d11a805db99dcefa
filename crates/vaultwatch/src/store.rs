//! Entity Store
//!
//! Owns the authoritative in-memory registry of modules and their safes.
//! Entities are created lazily on first reference and live for the
//! session; there is no locking because a single monitor task owns the
//! store exclusively.

use std::collections::HashMap;

use serde::Serialize;
use ts_rs::TS;

use crate::catalog::{DEFAULT_MODEL, GeometryCatalog, SlotGeometry};
use crate::types::{ModuleId, SafeId, StatusValue};

/// An individually lockable compartment within a module.
///
/// Geometry is fixed at creation from the catalog slot and never altered;
/// only the id (logical renumbering) and status fields change afterwards.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Safe {
    pub id: SafeId,
    geometry: SlotGeometry,
    pub door_state: StatusValue,
    pub lock_block_state: StatusValue,
    pub lock_open_state: StatusValue,
    pub fault_state: StatusValue,
    pub master_key_state: StatusValue,
    /// Derived occupancy flag, refreshed after every event touching this safe.
    pub client_inside: bool,
}

impl Safe {
    fn from_slot(id: SafeId, slot: &SlotGeometry) -> Self {
        Self {
            id,
            geometry: slot.clone(),
            door_state: StatusValue::Unknown,
            lock_block_state: StatusValue::Unknown,
            lock_open_state: StatusValue::Unknown,
            fault_state: StatusValue::Unknown,
            master_key_state: StatusValue::Unknown,
            client_inside: false,
        }
    }

    pub fn geometry(&self) -> &SlotGeometry {
        &self.geometry
    }

    /// Whether any status field has moved off its creation default.
    pub fn has_reported_state(&self) -> bool {
        [
            self.door_state,
            self.lock_block_state,
            self.lock_open_state,
            self.fault_state,
            self.master_key_state,
        ]
        .iter()
        .any(|s| *s != StatusValue::Unknown)
    }
}

/// A hardware module: a fixed-layout column of safes plus seven
/// module-level status fields.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Module {
    pub id: ModuleId,
    /// Geometry-catalog key; "Default" until a snapshot reveals the real model.
    pub model: String,
    pub error_state: StatusValue,
    pub hardware_section_state: StatusValue,
    pub master_key_state: StatusValue,
    pub alarm_state: StatusValue,
    pub connectivity_state: StatusValue,
    pub memory_state: StatusValue,
    pub power_state: StatusValue,
    pub safes: Vec<Safe>,
    /// Derived count of safes with `client_inside`.
    pub open_safe_count: usize,
}

impl Module {
    fn new(id: ModuleId, model: &str, first_safe_id: SafeId, slots: &[SlotGeometry]) -> Self {
        let safes = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| Safe::from_slot(first_safe_id + i as SafeId, slot))
            .collect();
        Self {
            id,
            model: model.to_string(),
            error_state: StatusValue::Unknown,
            hardware_section_state: StatusValue::Unknown,
            master_key_state: StatusValue::Unknown,
            alarm_state: StatusValue::Unknown,
            connectivity_state: StatusValue::Unknown,
            memory_state: StatusValue::Unknown,
            power_state: StatusValue::Unknown,
            safes,
            open_safe_count: 0,
        }
    }

    pub fn safe(&self, id: SafeId) -> Option<&Safe> {
        self.safes.iter().find(|s| s.id == id)
    }

    pub fn safe_mut(&mut self, id: SafeId) -> Option<&mut Safe> {
        self.safes.iter_mut().find(|s| s.id == id)
    }

    /// The seven module-level status fields, in code order.
    pub fn status_fields(&self) -> [StatusValue; 7] {
        [
            self.error_state,
            self.hardware_section_state,
            self.master_key_state,
            self.alarm_state,
            self.connectivity_state,
            self.memory_state,
            self.power_state,
        ]
    }

    /// Whether any child safe carries reported state.
    pub fn has_safe_state(&self) -> bool {
        self.safes.iter().any(Safe::has_reported_state)
    }

    /// Lowest safe id, used to preserve numbering across relayouts.
    pub fn first_safe_id(&self) -> SafeId {
        self.safes.iter().map(|s| s.id).min().unwrap_or(1)
    }
}

/// The authoritative registry of modules for this session.
#[derive(Debug, Default)]
pub struct EntityStore {
    modules: HashMap<ModuleId, Module>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing module, or a freshly registered one with the "Default"
    /// model and safes numbered from 1. Always succeeds.
    pub fn get_or_create_module(&mut self, id: &str, catalog: &GeometryCatalog) -> &mut Module {
        self.get_or_create_module_as(id, DEFAULT_MODEL, 1, catalog)
    }

    /// Existing module, or a freshly registered one with the given model
    /// and first safe number (snapshots carry both).
    pub fn get_or_create_module_as(
        &mut self,
        id: &str,
        model: &str,
        first_safe_id: SafeId,
        catalog: &GeometryCatalog,
    ) -> &mut Module {
        self.modules.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!(module = %id, model, "Registering module");
            Module::new(id.to_string(), model, first_safe_id, catalog.slots_for(model))
        })
    }

    pub fn get_module(&self, id: &str) -> Option<&Module> {
        self.modules.get(id)
    }

    pub fn get_module_mut(&mut self, id: &str) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    /// Re-instantiate a module's safe collection for a newly learned model.
    ///
    /// Any accumulated safe state is discarded; safe numbering is kept.
    /// Returns whether reported safe state was thrown away.
    pub fn replace_module_type(&mut self, id: &str, model: &str, catalog: &GeometryCatalog) -> bool {
        let Some(module) = self.modules.get_mut(id) else {
            return false;
        };
        let discarded = module.has_safe_state();
        let first_safe_id = module.first_safe_id();
        module.model = model.to_string();
        module.safes = catalog
            .slots_for(model)
            .iter()
            .enumerate()
            .map(|(i, slot)| Safe::from_slot(first_safe_id + i as SafeId, slot))
            .collect();
        module.open_safe_count = 0;
        discarded
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
