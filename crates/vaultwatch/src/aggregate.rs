//! Aggregator
//!
//! Derives per-safe occupancy and the per-module consolidated status from
//! the raw status fields. All derivations are pure functions over the
//! store records; nothing here talks to collaborators.

use crate::store::{Module, Safe};
use crate::types::{ConsolidatedStatus, StatusValue};

/// Recompute a safe's derived occupancy flag.
///
/// A client is inside exactly when the lock is unblocked, the lock is open
/// and the door is open, all at once. Returns whether the flag changed.
pub fn refresh_safe(safe: &mut Safe) -> bool {
    let inside = safe.lock_block_state.is_fault()
        && safe.lock_open_state.is_fault()
        && safe.door_state.is_fault();
    let changed = inside != safe.client_inside;
    safe.client_inside = inside;
    changed
}

/// Recompute a module's open-safe count and consolidated display status.
pub fn refresh_module(module: &mut Module) -> ConsolidatedStatus {
    module.open_safe_count = module.safes.iter().filter(|s| s.client_inside).count();
    consolidated_status(module)
}

/// Consolidated status by strict precedence:
/// occupancy outranks any fault, any fault outranks any unknown, and a
/// lone Ok only wins when nothing worse is present.
pub fn consolidated_status(module: &Module) -> ConsolidatedStatus {
    if module.open_safe_count > 0 {
        return ConsolidatedStatus::Person;
    }
    let fields = module.status_fields();
    if fields.iter().any(|s| *s == StatusValue::Fault) {
        ConsolidatedStatus::Error
    } else if fields.iter().any(|s| *s == StatusValue::Unknown) {
        ConsolidatedStatus::Warning
    } else {
        ConsolidatedStatus::Clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GeometryCatalog;
    use crate::store::EntityStore;

    fn module_with(model: &str) -> Module {
        let catalog = GeometryCatalog::builtin();
        let mut store = EntityStore::new();
        store.get_or_create_module_as("M1", model, 1, &catalog);
        store.get_module("M1").unwrap().clone()
    }

    #[test]
    fn test_client_inside_requires_all_three_faults() {
        let mut module = module_with("D5509");
        let safe = module.safe_mut(1).unwrap();
        safe.lock_block_state = StatusValue::Fault;
        safe.lock_open_state = StatusValue::Fault;
        assert!(!refresh_safe(safe) && !safe.client_inside);

        safe.door_state = StatusValue::Fault;
        assert!(refresh_safe(safe));
        assert!(safe.client_inside);

        // Door closing again drops the flag
        safe.door_state = StatusValue::Ok;
        assert!(refresh_safe(safe));
        assert!(!safe.client_inside);
    }

    #[test]
    fn test_open_safe_count_tracks_occupancy() {
        let mut module = module_with("D5509");
        for id in [2, 5] {
            let safe = module.safe_mut(id).unwrap();
            safe.lock_block_state = StatusValue::Fault;
            safe.lock_open_state = StatusValue::Fault;
            safe.door_state = StatusValue::Fault;
            refresh_safe(safe);
        }
        assert_eq!(refresh_module(&mut module), ConsolidatedStatus::Person);
        assert_eq!(module.open_safe_count, 2);
    }

    fn set_fields(module: &mut Module, fields: [StatusValue; 7]) {
        module.error_state = fields[0];
        module.hardware_section_state = fields[1];
        module.master_key_state = fields[2];
        module.alarm_state = fields[3];
        module.connectivity_state = fields[4];
        module.memory_state = fields[5];
        module.power_state = fields[6];
    }

    /// Expected status for a field combination with no occupied safes.
    fn expected(fields: &[StatusValue; 7]) -> ConsolidatedStatus {
        if fields.iter().any(|s| *s == StatusValue::Fault) {
            ConsolidatedStatus::Error
        } else if fields.iter().any(|s| *s == StatusValue::Unknown) {
            ConsolidatedStatus::Warning
        } else {
            ConsolidatedStatus::Clear
        }
    }

    #[test]
    fn test_precedence_over_all_field_combinations() {
        let values = [StatusValue::Ok, StatusValue::Fault, StatusValue::Unknown];
        let mut module = module_with("D5509");

        // Every combination of the seven fields over the three values,
        // crossed with zero, one and several occupied safes.
        for combo in 0..3usize.pow(7) {
            let mut fields = [StatusValue::Ok; 7];
            let mut rest = combo;
            for field in fields.iter_mut() {
                *field = values[rest % 3];
                rest /= 3;
            }
            set_fields(&mut module, fields);

            for occupied in [0usize, 1, 4] {
                for (i, safe) in module.safes.iter_mut().enumerate() {
                    let inside = i < occupied;
                    safe.lock_block_state = if inside { StatusValue::Fault } else { StatusValue::Ok };
                    safe.lock_open_state = safe.lock_block_state;
                    safe.door_state = safe.lock_block_state;
                    refresh_safe(safe);
                }
                let status = refresh_module(&mut module);
                let want = if occupied > 0 {
                    ConsolidatedStatus::Person
                } else {
                    expected(&fields)
                };
                assert_eq!(status, want, "fields {fields:?}, occupied {occupied}");
            }
        }
    }

    #[test]
    fn test_fresh_module_is_warning() {
        // All fields default to Unknown at creation
        let mut module = module_with("Default");
        assert_eq!(refresh_module(&mut module), ConsolidatedStatus::Warning);
    }

    #[test]
    fn test_all_ok_is_clear() {
        let mut module = module_with("Default");
        set_fields(&mut module, [StatusValue::Ok; 7]);
        assert_eq!(refresh_module(&mut module), ConsolidatedStatus::Clear);
    }
}
