use serde::Serialize;

use crate::detect::{BBox, Detection};

/// Box converted to frame pixel coordinates for overlay drawing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PixelBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

/// The tracker's notion of one physical object, carried across frames.
///
/// A plain value: replacing an entry in the tracked set copies a fresh object
/// in, so no two identities ever share state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackedObject {
    id: u64,
    bbox: BBox,
    class_id: usize,
    detected: u32,
    not_detected: u32,
    change_class: u32,
}

impl TrackedObject {
    pub(crate) fn from_detection(id: u64, det: &Detection) -> Self {
        Self {
            id,
            bbox: *det.bbox(),
            class_id: det.class_id(),
            detected: 0,
            not_detected: 0,
            change_class: 0,
        }
    }

    /// Identity assigned by the owning tracker. Never reused.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }

    /// Confirmed re-sightings.
    pub fn detected(&self) -> u32 {
        self.detected
    }

    /// Consecutive frames without a matching detection.
    pub fn not_detected(&self) -> u32 {
        self.not_detected
    }

    /// Consecutive frames matched to a detection of another class.
    pub fn change_class(&self) -> u32 {
        self.change_class
    }

    pub fn x_center(&self) -> f32 {
        self.bbox.x_center()
    }

    pub fn y_center(&self) -> f32 {
        self.bbox.y_center()
    }

    /// Seen in the current frame; stale objects are kept but not drawn.
    pub fn is_visible(&self) -> bool {
        self.not_detected == 0
    }

    pub fn to_pixels(&self, width: u32, height: u32) -> PixelBox {
        let scale = |v: f32, dim: u32| (v * dim as f32) as u32;
        PixelBox {
            x1: scale(self.bbox.x1, width),
            y1: scale(self.bbox.y1, height),
            x2: scale(self.bbox.x2, width),
            y2: scale(self.bbox.y2, height),
        }
    }

    pub(crate) fn admit(&mut self) {
        self.detected = 1;
    }

    /// Same-class match: follow the detection's box.
    pub(crate) fn absorb(&mut self, det: &Detection) {
        self.bbox = *det.bbox();
        self.not_detected = 0;
        self.change_class = 0;
        self.detected += 1;
    }

    /// Matched to another class but not yet convinced: counts as a miss.
    pub(crate) fn record_class_conflict(&mut self) {
        self.change_class += 1;
        self.not_detected += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.not_detected += 1;
        self.change_class = 0;
    }

    /// Returns true exactly once per identity, when `detected` reaches `threshold`.
    pub(crate) fn confirm(&mut self, threshold: u32) -> bool {
        if self.detected != threshold {
            return false;
        }
        self.detected += 1;
        true
    }
}
