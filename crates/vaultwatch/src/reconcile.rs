//! Reconciler
//!
//! Turns inbound snapshot/delta events into Entity Store mutations under
//! the "nonzero wins" rule: a delivered value of zero means the field was
//! omitted and must not overwrite the stored value. Derived state is
//! refreshed synchronously before any call returns, so callers may assume
//! full consistency immediately afterwards.

use std::sync::Arc;

use crate::aggregate::{refresh_module, refresh_safe};
use crate::catalog::{DEFAULT_MODEL, GeometryCatalog};
use crate::events::{ModuleField, ModuleSnapshot, PropertyReport, SafeProperty, StorageEvent};
use crate::notify::{self, Notifier};
use crate::store::{EntityStore, Module};
use crate::types::{ConsolidatedStatus, ModuleId, SafeId, StatusValue};

/// Where a module's display status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOrigin {
    /// Derived by the aggregator from stored fields.
    Derived,
    /// Icon-only hint from the controller, bypassing derivation.
    Hint,
}

/// Display-layer outcome of one reconciled event.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub module_id: ModuleId,
    pub status: ConsolidatedStatus,
    pub origin: StatusOrigin,
}

/// The reconciliation engine. Owns no entity state itself; it mutates the
/// store handed to it and reports display updates back to the caller.
pub struct Reconciler {
    catalog: Arc<GeometryCatalog>,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    pub fn new(catalog: Arc<GeometryCatalog>, notifier: Arc<dyn Notifier>) -> Self {
        Self { catalog, notifier }
    }

    pub fn catalog(&self) -> &GeometryCatalog {
        &self.catalog
    }

    /// Apply one inbound event to the store. Returns the module status
    /// updates the display layers should apply, in order.
    pub fn apply(&self, store: &mut EntityStore, event: StorageEvent) -> Vec<StatusUpdate> {
        match event {
            StorageEvent::WholeStorageState(snapshot) => {
                tracing::info!(modules = snapshot.modules.len(), "Applying storage snapshot");
                snapshot
                    .modules
                    .into_iter()
                    .map(|module| self.apply_module_snapshot(store, module))
                    .collect()
            }

            StorageEvent::WholeModuleState(snapshot) => {
                tracing::debug!(module = %snapshot.module_id, "Applying module snapshot");
                vec![self.apply_module_snapshot(store, snapshot)]
            }

            StorageEvent::ModuleStatusChange { module_id, code } => {
                // Routed straight to the scheme icon layer; the store and
                // the aggregator are not consulted for this event.
                vec![StatusUpdate {
                    module_id,
                    status: ConsolidatedStatus::from_hint(code),
                    origin: StatusOrigin::Hint,
                }]
            }

            StorageEvent::ModulePropertyChange {
                module_id,
                code,
                value,
            } => {
                let module = store.get_or_create_module(&module_id, &self.catalog);
                self.apply_module_property(module, code, value, true);
                let status = refresh_module(module);
                vec![StatusUpdate {
                    module_id,
                    status,
                    origin: StatusOrigin::Derived,
                }]
            }

            StorageEvent::SafePropertiesChange {
                module_id,
                safe_id,
                properties,
            } => {
                let module = store.get_or_create_module(&module_id, &self.catalog);
                self.apply_safe_properties(module, safe_id, &properties, true);
                let status = refresh_module(module);
                vec![StatusUpdate {
                    module_id,
                    status,
                    origin: StatusOrigin::Derived,
                }]
            }
        }
    }

    /// Apply a whole-module snapshot: create or re-type the module, then
    /// run every carried property through the single-field rule.
    ///
    /// Snapshots synchronize state without raising notifications.
    fn apply_module_snapshot(&self, store: &mut EntityStore, snapshot: ModuleSnapshot) -> StatusUpdate {
        let module_id = snapshot.module_id.clone();

        if store.get_module(&module_id).is_none() {
            let model = snapshot.model.as_deref().unwrap_or(DEFAULT_MODEL);
            if !self.catalog.knows(model) {
                tracing::debug!(module = %module_id, model, "Unrecognized model, using default layout");
            }
            store.get_or_create_module_as(&module_id, model, snapshot.first_safe_id(), &self.catalog);
        } else if let Some(model) = snapshot.model.as_deref() {
            let known_model = store.get_module(&module_id).map(|m| m.model.clone());
            if known_model.as_deref() != Some(model) {
                // The real model was learned after the module accumulated
                // state; the safe collection is rebuilt and state re-fed
                // from this snapshot.
                let discarded = store.replace_module_type(&module_id, model, &self.catalog);
                if discarded {
                    tracing::warn!(module = %module_id, model, "Module re-typed, prior safe state discarded");
                }
            }
        }

        let module = store
            .get_module_mut(&module_id)
            .expect("module registered above");

        for report in &snapshot.properties {
            self.apply_module_property(module, report.code, report.value, false);
        }
        for safe in &snapshot.safes {
            self.apply_safe_properties(module, safe.safe_id, &safe.properties, false);
        }

        let status = refresh_module(module);
        StatusUpdate {
            module_id,
            status,
            origin: StatusOrigin::Derived,
        }
    }

    /// Write one module field under the single-field rule.
    fn apply_module_property(&self, module: &mut Module, code: u8, value: u8, notify: bool) {
        let Some(field) = ModuleField::from_code(code) else {
            tracing::debug!(module = %module.id, code, "Ignoring unrecognized module property code");
            return;
        };
        let Some(value) = StatusValue::from_wire(value) else {
            // No-report sentinel or a value from a newer controller
            return;
        };

        let slot = match field {
            ModuleField::Error => &mut module.error_state,
            ModuleField::HardwareSection => &mut module.hardware_section_state,
            ModuleField::MasterKey => &mut module.master_key_state,
            ModuleField::Alarm => &mut module.alarm_state,
            ModuleField::Connectivity => &mut module.connectivity_state,
            ModuleField::Memory => &mut module.memory_state,
            ModuleField::Power => &mut module.power_state,
        };
        let previous = *slot;
        *slot = value;

        if notify && field == ModuleField::MasterKey && value.is_fault() && !previous.is_fault() {
            self.notifier.notify(notify::MASTER_KEY_TURNED, &module.id, None);
        }
    }

    /// Apply a batch of safe property reports, then refresh the safe's
    /// derived state. Deltas (but not snapshots) raise notifications for
    /// critical transitions.
    fn apply_safe_properties(
        &self,
        module: &mut Module,
        safe_id: SafeId,
        properties: &[PropertyReport],
        notify: bool,
    ) {
        let module_id = module.id.clone();
        let Some(safe) = module.safe_mut(safe_id) else {
            // Safes exist only through their module's catalog layout
            tracing::debug!(module = %module_id, safe = safe_id, "Ignoring delta for unknown safe");
            return;
        };

        let mut raised: Vec<&'static str> = Vec::new();

        for report in properties {
            let Some(property) = SafeProperty::from_code(report.code) else {
                tracing::debug!(module = %module_id, safe = safe_id, code = report.code,
                    "Ignoring unrecognized safe property code");
                continue;
            };

            if property == SafeProperty::LogicalNumber {
                if report.value != crate::types::NO_REPORT {
                    safe.id = report.value as SafeId;
                }
                continue;
            }

            let Some(value) = StatusValue::from_wire(report.value) else {
                continue;
            };

            let (slot, message) = match property {
                SafeProperty::Door => (&mut safe.door_state, notify::DOOR_OPENED),
                SafeProperty::LockBlock => (&mut safe.lock_block_state, notify::LOCK_UNBLOCKED),
                SafeProperty::LockOpen => (&mut safe.lock_open_state, notify::LOCK_OPENED),
                SafeProperty::Fault => (&mut safe.fault_state, notify::SAFE_FAULTY),
                SafeProperty::LogicalNumber => unreachable!("handled above"),
            };
            let previous = *slot;
            *slot = value;

            if notify && value.is_fault() && !previous.is_fault() {
                raised.push(message);
            }
        }

        refresh_safe(safe);

        let current_id = safe.id;
        for message in raised {
            self.notifier.notify(message, &module_id, Some(current_id));
        }
    }
}
