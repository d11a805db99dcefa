//! Geometry Catalog
//!
//! Static lookup from module model to the ordered safe-slot geometries of
//! that hardware model. Slot coordinates are normalized to the fixed
//! 0..1200 vertical scheme space; box dimensions are millimetres and
//! volumes are cubic decimetres.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Height of the normalized scheme coordinate space.
pub const SCHEME_SPACE: u32 = 1200;

/// Model key used when a module's real type is not yet known.
pub const DEFAULT_MODEL: &str = "Default";

/// Geometry of a single safe slot within a module column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SlotGeometry {
    /// Offset from the top of the column, scheme units.
    pub top: u32,
    /// Bottom edge, scheme units.
    pub bottom: u32,
    /// Drawn height, scheme units.
    pub height: u32,
    /// Interior height, mm.
    pub box_h: u32,
    /// Interior width, mm.
    pub box_w: u32,
    /// Interior depth, mm.
    pub box_d: u32,
    /// Interior volume, dm3.
    pub volume: f64,
    /// Free-text details shown on the safe card.
    pub info: String,
}

impl SlotGeometry {
    fn new(top: u32, bottom: u32, box_h: u32, box_w: u32, box_d: u32, volume: f64, info: &str) -> Self {
        Self {
            top,
            bottom,
            height: bottom - top,
            box_h,
            box_w,
            box_d,
            volume,
            info: info.to_string(),
        }
    }
}

/// A module template as it appears in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Model key (e.g. "D5509").
    pub model: String,
    #[serde(default)]
    pub slots: Vec<SlotGeometry>,
}

/// Read-only mapping from module model to its safe-slot layout.
///
/// Built once at startup (built-in templates plus any configured extras)
/// and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct GeometryCatalog {
    templates: HashMap<String, Vec<SlotGeometry>>,
}

/// Evenly pitched column of identical slots.
fn uniform_slots(
    count: u32,
    pitch: u32,
    slot_height: u32,
    box_h: u32,
    volume: f64,
    info: &str,
) -> Vec<SlotGeometry> {
    (0..count)
        .map(|i| {
            let top = i * pitch;
            SlotGeometry::new(top, top + slot_height, box_h, 280, 395, volume, info)
        })
        .collect()
}

impl GeometryCatalog {
    /// Catalog with the built-in hardware templates.
    pub fn builtin() -> Self {
        let info = "Standard compartment";
        let mut templates = HashMap::new();

        templates.insert(
            DEFAULT_MODEL.to_string(),
            vec![SlotGeometry::new(0, 256, 256, 256, 256, 16.256, "Single compartment of an unrecognized module")],
        );
        // 9-slot layout used for exercising unknown-state rendering
        templates.insert(
            "Unknown".to_string(),
            uniform_slots(9, 90, 85, 192, 21.2352, info),
        );
        templates.insert("D5503".to_string(), uniform_slots(3, 285, 280, 612, 67.6872, info));
        templates.insert("D5504".to_string(), uniform_slots(4, 215, 210, 454, 50.2124, info));
        templates.insert("D5509".to_string(), uniform_slots(9, 90, 85, 192, 21.2352, info));
        templates.insert("D5514".to_string(), uniform_slots(14, 58, 53, 117, 12.9402, info));
        templates.insert("D5533".to_string(), uniform_slots(33, 36, 32, 56, 6.1936, info));

        Self { templates }
    }

    /// Merge extra templates (from configuration) over the built-ins.
    pub fn with_templates(mut self, extra: &[TemplateConfig]) -> Self {
        for template in extra {
            if template.slots.is_empty() {
                tracing::warn!(model = %template.model, "Ignoring catalog template with no slots");
                continue;
            }
            self.templates
                .insert(template.model.clone(), template.slots.clone());
        }
        self
    }

    /// Slot layout for a model, falling back to the single-slot default
    /// template for unrecognized keys.
    pub fn slots_for(&self, model: &str) -> &[SlotGeometry] {
        self.templates
            .get(model)
            .or_else(|| self.templates.get(DEFAULT_MODEL))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the model has a dedicated template.
    pub fn knows(&self, model: &str) -> bool {
        self.templates.contains_key(model)
    }

    /// Registered model keys.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

impl Default for GeometryCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_slot_counts() {
        let catalog = GeometryCatalog::builtin();
        assert_eq!(catalog.slots_for(DEFAULT_MODEL).len(), 1);
        assert_eq!(catalog.slots_for("D5503").len(), 3);
        assert_eq!(catalog.slots_for("D5504").len(), 4);
        assert_eq!(catalog.slots_for("D5509").len(), 9);
        assert_eq!(catalog.slots_for("D5514").len(), 14);
        assert_eq!(catalog.slots_for("D5533").len(), 33);
    }

    #[test]
    fn test_unknown_model_falls_back_to_default() {
        let catalog = GeometryCatalog::builtin();
        let slots = catalog.slots_for("X9999");
        assert_eq!(slots, catalog.slots_for(DEFAULT_MODEL));
        assert!(!catalog.knows("X9999"));
    }

    #[test]
    fn test_slots_are_ordered_and_disjoint() {
        let catalog = GeometryCatalog::builtin();
        for model in ["D5503", "D5504", "D5509", "D5514", "D5533"] {
            let slots = catalog.slots_for(model);
            for pair in slots.windows(2) {
                assert!(pair[0].bottom <= pair[1].top, "overlap in {model}");
            }
            let last = slots.last().unwrap();
            assert!(last.bottom <= SCHEME_SPACE);
            assert_eq!(last.height, last.bottom - last.top);
        }
    }

    #[test]
    fn test_config_templates_override_builtins() {
        let extra = vec![TemplateConfig {
            model: "D5503".to_string(),
            slots: vec![SlotGeometry::new(0, 600, 1300, 280, 395, 140.0, "tall")],
        }];
        let catalog = GeometryCatalog::builtin().with_templates(&extra);
        assert_eq!(catalog.slots_for("D5503").len(), 1);
        assert_eq!(catalog.slots_for("D5503")[0].bottom, 600);
    }

    #[test]
    fn test_empty_config_template_is_ignored() {
        let extra = vec![TemplateConfig {
            model: "Empty".to_string(),
            slots: vec![],
        }];
        let catalog = GeometryCatalog::builtin().with_templates(&extra);
        assert!(!catalog.knows("Empty"));
    }
}
