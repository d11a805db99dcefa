//! Schematic Projector
//!
//! Maps safe geometry and current field values onto a render-command list
//! (rectangles, icon asset keys, number labels) for a UI adapter to draw,
//! plus the storage-level scheme icon layer and the pointer hit test.
//! Scenes are pure data; icon images load on the rendering side and a
//! superseded scene is simply discarded.

use std::collections::HashMap;

use serde::Serialize;
use ts_rs::TS;

use crate::catalog::SCHEME_SPACE;
use crate::reconcile::{StatusOrigin, StatusUpdate};
use crate::store::{Module, Safe};
use crate::types::{ConsolidatedStatus, ModuleId, SafeId, StatusValue};

/// Nominal horizontal extent of the module scheme, device-independent.
pub const SCHEME_WIDTH: u32 = 200;
/// Horizontal inset of the safe frame.
const FRAME_INSET: u32 = 4;
/// Nominal icon edge length at scheme width.
const ICON_SIZE: u32 = 22;
/// Icon column positions at scheme width.
const COL_MASTER_KEY: u32 = 55;
const COL_LOCK_BLOCK: u32 = 90;
const COL_DOOR: u32 = 125;
const COL_FAULT: u32 = 160;

pub const SELECTION_FILL: &str = "#CCFF66";
pub const HOVER_FILL: &str = "#FFFF00";

/// Outline frame of one safe, with an optional highlight fill.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SafeRect {
    pub safe_id: SafeId,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Fill color when this safe is selected or hovered.
    pub fill: Option<String>,
}

/// One status icon to draw, keyed by asset name.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IconPlacement {
    pub safe_id: SafeId,
    /// Asset key, e.g. "dooropen_red" or "masterkey_gray".
    pub asset: String,
    /// Center x, device pixels.
    pub x: u32,
    /// Center y, device pixels.
    pub y: u32,
    pub size: u32,
}

/// Number label of one safe.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NumberLabel {
    pub safe_id: SafeId,
    pub text: String,
    pub x: u32,
    pub y: u32,
}

/// Drawable scene for one module at a concrete surface size.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Scene {
    pub module_id: ModuleId,
    pub width: u32,
    pub height: u32,
    pub rects: Vec<SafeRect>,
    pub icons: Vec<IconPlacement>,
    pub labels: Vec<NumberLabel>,
}

impl Scene {
    /// Convert a device-pixel probe into scheme coordinates for hit
    /// testing.
    pub fn to_scheme(&self, x: f64, y: f64) -> (u32, u32) {
        let sx = (x * SCHEME_WIDTH as f64 / self.width.max(1) as f64).round();
        let sy = (y * SCHEME_SPACE as f64 / self.height.max(1) as f64).round();
        (sx.max(0.0) as u32, sy.max(0.0) as u32)
    }
}

/// Per-module icon on the storage scheme.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ModuleIcon {
    pub module_id: ModuleId,
    /// Asset key, absent for a clear module.
    pub icon: Option<String>,
}

/// Storage-level icon layer: one consolidated status icon per module,
/// driven by the aggregator or directly by icon-only hints.
#[derive(Debug, Default, Clone)]
pub struct StorageScheme {
    statuses: HashMap<ModuleId, ConsolidatedStatus>,
}

impl StorageScheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a status update from reconciliation. Hints and derived
    /// statuses land in the same slot; the latest event wins.
    pub fn apply(&mut self, update: &StatusUpdate) -> ModuleIcon {
        self.statuses.insert(update.module_id.clone(), update.status);
        if update.origin == StatusOrigin::Hint {
            tracing::debug!(module = %update.module_id, status = ?update.status, "Module icon set by hint");
        }
        ModuleIcon {
            module_id: update.module_id.clone(),
            icon: update.status.icon_key().map(str::to_string),
        }
    }

    pub fn status(&self, module_id: &str) -> Option<ConsolidatedStatus> {
        self.statuses.get(module_id).copied()
    }

    /// Current icon set for every module that reported anything.
    pub fn icons(&self) -> Vec<ModuleIcon> {
        let mut icons: Vec<ModuleIcon> = self
            .statuses
            .iter()
            .map(|(module_id, status)| ModuleIcon {
                module_id: module_id.clone(),
                icon: status.icon_key().map(str::to_string),
            })
            .collect();
        icons.sort_by(|a, b| a.module_id.cmp(&b.module_id));
        icons
    }
}

fn lock_block_asset(value: StatusValue) -> &'static str {
    match value {
        StatusValue::Ok => "lockblockunblock_green",
        StatusValue::Fault => "lockblockunblock_red",
        StatusValue::Unknown => "lockblockunblock_gray",
    }
}

fn door_asset(value: StatusValue) -> &'static str {
    match value {
        StatusValue::Ok => "doorclose_green",
        StatusValue::Fault => "dooropen_red",
        StatusValue::Unknown => "doorclose_gray",
    }
}

/// The schematic projector: transient view state (selected and hovered
/// safe) plus scene assembly and hit testing for the displayed module.
#[derive(Debug, Default)]
pub struct Projector {
    selected_module: Option<ModuleId>,
    selected_safe: Option<SafeId>,
    hovered_safe: Option<SafeId>,
    scheme: StorageScheme,
}

impl Projector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheme(&self) -> &StorageScheme {
        &self.scheme
    }

    pub fn scheme_mut(&mut self) -> &mut StorageScheme {
        &mut self.scheme
    }

    pub fn selected_module(&self) -> Option<&str> {
        self.selected_module.as_deref()
    }

    pub fn selected_safe(&self) -> Option<SafeId> {
        self.selected_safe
    }

    pub fn hovered_safe(&self) -> Option<SafeId> {
        self.hovered_safe
    }

    /// Switch the displayed module. Selection and hover reset; any
    /// in-flight drawing for the prior module targets a superseded scene
    /// and is dropped by the renderer.
    pub fn select_module(&mut self, module_id: Option<ModuleId>) {
        if self.selected_module != module_id {
            self.selected_module = module_id;
            self.selected_safe = None;
            self.hovered_safe = None;
        }
    }

    pub fn select_safe(&mut self, safe_id: Option<SafeId>) {
        self.selected_safe = safe_id;
    }

    pub fn hover_safe(&mut self, safe_id: Option<SafeId>) {
        self.hovered_safe = safe_id;
    }

    /// First safe whose vertical interval `[top, top + height)` contains
    /// `y`, in scheme coordinates. The x coordinate is unconstrained
    /// because slots span the full width.
    pub fn hit_test<'a>(&self, module: &'a Module, _x: u32, y: u32) -> Option<&'a Safe> {
        module.safes.iter().find(|safe| {
            let geometry = safe.geometry();
            y >= geometry.top && y < geometry.top + geometry.height
        })
    }

    /// Build the drawable scene for a module at the requested surface
    /// size. Vertical geometry is normalized over the 0..1200 scheme
    /// space; icon columns scale with the surface width.
    pub fn project(&self, module: &Module, width: u32, height: u32) -> Scene {
        let scale_y = |v: u32| (height as f64 * v as f64 / SCHEME_SPACE as f64).round() as u32;
        let scale_x = |v: u32| (width as f64 * v as f64 / SCHEME_WIDTH as f64).round() as u32;

        let mut rects = Vec::with_capacity(module.safes.len());
        let mut icons = Vec::new();
        let mut labels = Vec::with_capacity(module.safes.len());

        for safe in &module.safes {
            let geometry = safe.geometry();
            let top = scale_y(geometry.top);
            let rect_height = scale_y(geometry.height);
            let center_y = top + rect_height / 2;

            let fill = if self.selected_safe == Some(safe.id) {
                Some(SELECTION_FILL.to_string())
            } else if self.hovered_safe == Some(safe.id) {
                Some(HOVER_FILL.to_string())
            } else {
                None
            };

            rects.push(SafeRect {
                safe_id: safe.id,
                x: FRAME_INSET,
                y: top,
                width: width.saturating_sub(2 * FRAME_INSET),
                height: rect_height,
                fill,
            });

            // Master key slot is always drawn in gray
            icons.push(IconPlacement {
                safe_id: safe.id,
                asset: "masterkey_gray".to_string(),
                x: scale_x(COL_MASTER_KEY),
                y: center_y,
                size: ICON_SIZE,
            });
            icons.push(IconPlacement {
                safe_id: safe.id,
                asset: lock_block_asset(safe.lock_block_state).to_string(),
                x: scale_x(COL_LOCK_BLOCK),
                y: center_y,
                size: ICON_SIZE,
            });
            icons.push(IconPlacement {
                safe_id: safe.id,
                asset: door_asset(safe.door_state).to_string(),
                x: scale_x(COL_DOOR),
                y: center_y,
                size: ICON_SIZE,
            });
            // Fault marker only while the safe is actually faulty
            if safe.fault_state.is_fault() {
                icons.push(IconPlacement {
                    safe_id: safe.id,
                    asset: "safefault_red".to_string(),
                    x: scale_x(COL_FAULT),
                    y: center_y,
                    size: ICON_SIZE,
                });
            }

            labels.push(NumberLabel {
                safe_id: safe.id,
                text: safe.id.to_string(),
                x: 8,
                y: center_y + 9,
            });
        }

        Scene {
            module_id: module.id.clone(),
            width,
            height,
            rects,
            icons,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GeometryCatalog;
    use crate::store::EntityStore;

    fn module(model: &str) -> Module {
        let catalog = GeometryCatalog::builtin();
        let mut store = EntityStore::new();
        store.get_or_create_module_as("M1", model, 1, &catalog);
        store.get_module("M1").unwrap().clone()
    }

    #[test]
    fn test_projection_scales_vertical_geometry() {
        let projector = Projector::new();
        let module = module("D5509");
        let scene = projector.project(&module, 200, 600);

        // Slot 3 spans 180..265 in scheme space, halved at 600px
        let rect = &scene.rects[2];
        assert_eq!(rect.y, 90);
        assert_eq!(rect.height, 43);
        assert_eq!(rect.x, 4);
        assert_eq!(rect.width, 192);
    }

    #[test]
    fn test_full_height_projection_is_identity() {
        let projector = Projector::new();
        let module = module("D5533");
        let scene = projector.project(&module, 200, 1200);
        for (rect, safe) in scene.rects.iter().zip(&module.safes) {
            assert_eq!(rect.y, safe.geometry().top);
            assert_eq!(rect.height, safe.geometry().height);
        }
    }

    #[test]
    fn test_icon_assets_follow_field_values() {
        let projector = Projector::new();
        let mut module = module("D5503");
        {
            let safe = module.safe_mut(1).unwrap();
            safe.lock_block_state = StatusValue::Fault;
            safe.door_state = StatusValue::Ok;
            safe.fault_state = StatusValue::Fault;
        }
        let scene = projector.project(&module, 200, 1200);

        let assets: Vec<&str> = scene
            .icons
            .iter()
            .filter(|icon| icon.safe_id == 1)
            .map(|icon| icon.asset.as_str())
            .collect();
        assert_eq!(
            assets,
            vec!["masterkey_gray", "lockblockunblock_red", "doorclose_green", "safefault_red"]
        );

        // An unreported safe shows gray icons and no fault marker
        let assets: Vec<&str> = scene
            .icons
            .iter()
            .filter(|icon| icon.safe_id == 2)
            .map(|icon| icon.asset.as_str())
            .collect();
        assert_eq!(
            assets,
            vec!["masterkey_gray", "lockblockunblock_gray", "doorclose_gray"]
        );
    }

    #[test]
    fn test_labels_carry_safe_numbers() {
        let projector = Projector::new();
        let module = module("D5504");
        let scene = projector.project(&module, 200, 1200);
        let texts: Vec<&str> = scene.labels.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "2", "3", "4"]);
        assert!(scene.labels.iter().all(|l| l.x == 8));
    }

    #[test]
    fn test_selection_and_hover_fills() {
        let mut projector = Projector::new();
        projector.select_module(Some("M1".to_string()));
        projector.select_safe(Some(1));
        projector.hover_safe(Some(2));

        let module = module("D5503");
        let scene = projector.project(&module, 200, 1200);
        assert_eq!(scene.rects[0].fill.as_deref(), Some(SELECTION_FILL));
        assert_eq!(scene.rects[1].fill.as_deref(), Some(HOVER_FILL));
        assert_eq!(scene.rects[2].fill, None);
    }

    #[test]
    fn test_switching_module_resets_selection() {
        let mut projector = Projector::new();
        projector.select_module(Some("M1".to_string()));
        projector.select_safe(Some(3));
        projector.hover_safe(Some(4));

        projector.select_module(Some("M2".to_string()));
        assert_eq!(projector.selected_safe(), None);
        assert_eq!(projector.hovered_safe(), None);

        // Re-selecting the same module keeps state
        projector.select_safe(Some(5));
        projector.select_module(Some("M2".to_string()));
        assert_eq!(projector.selected_safe(), Some(5));
    }

    #[test]
    fn test_hit_test_interval_membership() {
        let projector = Projector::new();
        let module = module("D5509");

        // Slot 1 spans 0..85, slot 2 starts at 90
        assert_eq!(projector.hit_test(&module, 0, 0).unwrap().id, 1);
        assert_eq!(projector.hit_test(&module, 150, 84).unwrap().id, 1);
        // Bottom edge is exclusive
        assert!(projector.hit_test(&module, 0, 85).is_none());
        // Gap between slots
        assert!(projector.hit_test(&module, 0, 87).is_none());
        assert_eq!(projector.hit_test(&module, 0, 90).unwrap().id, 2);
        // Below the last slot
        assert!(projector.hit_test(&module, 0, 1100).is_none());
    }

    #[test]
    fn test_scene_device_to_scheme() {
        let projector = Projector::new();
        let module = module("D5509");
        let scene = projector.project(&module, 400, 600);
        let (x, y) = scene.to_scheme(200.0, 300.0);
        assert_eq!(x, 100);
        assert_eq!(y, 600);
    }

    #[test]
    fn test_scheme_icons_from_updates() {
        let mut scheme = StorageScheme::new();
        let icon = scheme.apply(&StatusUpdate {
            module_id: "M1".to_string(),
            status: ConsolidatedStatus::Error,
            origin: StatusOrigin::Derived,
        });
        assert_eq!(icon.icon.as_deref(), Some("error"));

        // A direct hint overrides the derived icon
        let icon = scheme.apply(&StatusUpdate {
            module_id: "M1".to_string(),
            status: ConsolidatedStatus::Person,
            origin: StatusOrigin::Hint,
        });
        assert_eq!(icon.icon.as_deref(), Some("person"));
        assert_eq!(scheme.status("M1"), Some(ConsolidatedStatus::Person));

        // Clear removes the icon
        let icon = scheme.apply(&StatusUpdate {
            module_id: "M1".to_string(),
            status: ConsolidatedStatus::Clear,
            origin: StatusOrigin::Derived,
        });
        assert_eq!(icon.icon, None);
        assert_eq!(scheme.icons().len(), 1);
    }
}
