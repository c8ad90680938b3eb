//! Frame-to-frame object tracking and confirmation counting.
//!
//! The tracker turns independent per-frame detections into persistent
//! identities using a region-gated, first-match, hysteresis policy tuned for
//! objects travelling down the frame (e.g. on a conveyor belt):
//!
//! - detections near the frame edges are ignored (partially visible objects)
//! - a tracked object is matched to a detection inside a window that extends
//!   mostly in the direction of travel
//! - new objects are only admitted near the top of the region of interest
//! - an object is counted once, when it has been re-detected often enough
//!
//! `update` is synchronous and owns no threads. Each pipeline owns one tracker
//! and must feed it frames in capture order.

mod object;

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::detect::{ClassTable, Detection};

pub use object::{PixelBox, TrackedObject};

pub const DEFAULT_EDGE_Y: f32 = 0.1;
pub const DEFAULT_EDGE_X: f32 = 0.2;
pub const DEFAULT_DETECT_CONFIRM: u32 = 6;
pub const DEFAULT_MISS_DROP: u32 = 5;
pub const DEFAULT_CLASS_CHANGE_REPLACE: u32 = 4;

/// How a tracked object picks among several candidate detections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// First candidate in ascending `y_center` order.
    #[default]
    FirstCandidate,
    /// Candidate with the smallest centre distance; ties keep pool order.
    Nearest,
}

impl FromStr for MatchPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first" | "first_candidate" => Ok(MatchPolicy::FirstCandidate),
            "nearest" => Ok(MatchPolicy::Nearest),
            other => Err(anyhow!(
                "unknown match policy '{}' (expected 'first' or 'nearest')",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackerThresholds {
    /// Fraction of the frame height ignored at the top and bottom.
    pub edge_y: f32,
    /// Fraction of the frame width ignored at the left and right.
    pub edge_x: f32,
    /// Re-detections before an object is counted.
    pub detect_confirm: u32,
    /// Consecutive misses before an object is dropped.
    pub miss_drop: u32,
    /// Consecutive different-class matches tolerated before replacement.
    pub class_change_replace: u32,
    /// New objects are admitted only above this `y_center`. Defaults to `2 * edge_y`.
    pub admit_y_max: Option<f32>,
    pub match_policy: MatchPolicy,
}

impl Default for TrackerThresholds {
    fn default() -> Self {
        Self {
            edge_y: DEFAULT_EDGE_Y,
            edge_x: DEFAULT_EDGE_X,
            detect_confirm: DEFAULT_DETECT_CONFIRM,
            miss_drop: DEFAULT_MISS_DROP,
            class_change_replace: DEFAULT_CLASS_CHANGE_REPLACE,
            admit_y_max: None,
            match_policy: MatchPolicy::default(),
        }
    }
}

impl TrackerThresholds {
    pub fn admit_limit(&self) -> f32 {
        self.admit_y_max.unwrap_or(2.0 * self.edge_y)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.edge_y) {
            return Err(anyhow!("edge_y must be within [0, 0.5), got {}", self.edge_y));
        }
        if !(0.0..0.5).contains(&self.edge_x) {
            return Err(anyhow!("edge_x must be within [0, 0.5), got {}", self.edge_x));
        }
        if self.detect_confirm == 0 {
            return Err(anyhow!("detect_confirm must be at least 1"));
        }
        if self.miss_drop == 0 {
            return Err(anyhow!("miss_drop must be at least 1"));
        }
        if let Some(limit) = self.admit_y_max {
            if !(0.0..=1.0).contains(&limit) {
                return Err(anyhow!("admit_y_max must be within [0, 1], got {}", limit));
            }
        }
        Ok(())
    }

    /// Edge bands are closed on the discarded side.
    fn in_region_of_interest(&self, det: &Detection) -> bool {
        let inside = |c: f32, band: f32| c > band && c < 1.0 - band;
        inside(det.y_center(), self.edge_y) && inside(det.x_center(), self.edge_x)
    }
}

/// Precondition violations raised by `Tracker::update`.
///
/// These signal a mismatch between the model and the configured class
/// table; the owning pipeline must stop rather than retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerError {
    ClassOutOfRange { class_id: usize, class_count: usize },
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::ClassOutOfRange {
                class_id,
                class_count,
            } => write!(
                f,
                "class id {} outside class table of {} entries",
                class_id, class_count
            ),
        }
    }
}

impl std::error::Error for TrackerError {}

/// Per-class cumulative production counts. Never decremented or reset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassCounts {
    counts: Vec<u64>,
}

impl ClassCounts {
    pub fn new(class_count: usize) -> Self {
        Self {
            counts: vec![0; class_count],
        }
    }

    pub fn get(&self, class_id: usize) -> Option<u64> {
        self.counts.get(class_id).copied()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    fn increment(&mut self, class_id: usize) {
        self.counts[class_id] += 1;
    }
}

impl From<Vec<u64>> for ClassCounts {
    fn from(counts: Vec<u64>) -> Self {
        Self { counts }
    }
}

/// Identity source owned by one tracker.
#[derive(Debug, Default)]
struct IdSequence {
    next: u64,
}

impl IdSequence {
    fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

pub struct Tracker {
    thresholds: TrackerThresholds,
    classes: ClassTable,
    tracked: Vec<TrackedObject>,
    counts: ClassCounts,
    ids: IdSequence,
}

impl Tracker {
    pub fn new(classes: ClassTable, thresholds: TrackerThresholds) -> Result<Self> {
        thresholds.validate()?;
        let counts = ClassCounts::new(classes.len());
        Ok(Self {
            thresholds,
            classes,
            tracked: Vec::new(),
            counts,
            ids: IdSequence::default(),
        })
    }

    pub fn thresholds(&self) -> &TrackerThresholds {
        &self.thresholds
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    /// Live objects, deepest in frame first.
    pub fn tracked(&self) -> &[TrackedObject] {
        &self.tracked
    }

    pub fn counts(&self) -> &ClassCounts {
        &self.counts
    }

    /// Consume one frame of detections.
    ///
    /// Fails without touching any state when a detection carries a class id
    /// outside the class table.
    pub fn update(&mut self, detections: &[Detection]) -> Result<()> {
        if let Some(bad) = detections
            .iter()
            .find(|det| !self.classes.contains(det.class_id()))
        {
            return Err(TrackerError::ClassOutOfRange {
                class_id: bad.class_id(),
                class_count: self.classes.len(),
            }
            .into());
        }

        let mut pool: Vec<Detection> = detections
            .iter()
            .filter(|det| self.thresholds.in_region_of_interest(det))
            .copied()
            .collect();
        pool.sort_by(|a, b| a.y_center().total_cmp(&b.y_center()));

        self.match_tracked(&mut pool);
        self.drop_stale();
        self.admit_new(&pool);
        self.confirm_counts();

        self.tracked
            .sort_by(|a, b| b.y_center().total_cmp(&a.y_center()));

        log::trace!(
            "frame: {} detections, {} tracked, total {}",
            detections.len(),
            self.tracked.len(),
            self.counts.total()
        );
        Ok(())
    }

    fn match_tracked(&mut self, pool: &mut Vec<Detection>) {
        let policy = self.thresholds.match_policy;
        let replace_after = self.thresholds.class_change_replace;

        for obj in self.tracked.iter_mut() {
            let Some(index) = find_candidate(obj, pool.as_slice(), policy) else {
                obj.record_miss();
                continue;
            };
            let det = pool.remove(index);

            if obj.class_id() == det.class_id() {
                obj.absorb(&det);
            } else if obj.change_class() > replace_after {
                let replacement = TrackedObject::from_detection(self.ids.next_id(), &det);
                log::debug!(
                    "object #{} replaced by #{} (class {} -> {})",
                    obj.id(),
                    replacement.id(),
                    obj.class_id(),
                    replacement.class_id()
                );
                *obj = replacement;
            } else {
                obj.record_class_conflict();
            }
        }
    }

    fn drop_stale(&mut self) {
        let miss_drop = self.thresholds.miss_drop;
        self.tracked.retain(|obj| {
            let keep = obj.not_detected() < miss_drop;
            if !keep {
                log::debug!(
                    "object #{} dropped after {} missed frames",
                    obj.id(),
                    obj.not_detected()
                );
            }
            keep
        });
    }

    fn admit_new(&mut self, pool: &[Detection]) {
        let limit = self.thresholds.admit_limit();
        for det in pool.iter().filter(|det| det.y_center() < limit) {
            let mut obj = TrackedObject::from_detection(self.ids.next_id(), det);
            obj.admit();
            log::debug!(
                "object #{} admitted (class {}, y={:.3})",
                obj.id(),
                obj.class_id(),
                obj.y_center()
            );
            self.tracked.push(obj);
        }
    }

    fn confirm_counts(&mut self) {
        let threshold = self.thresholds.detect_confirm;
        for obj in self.tracked.iter_mut() {
            if obj.confirm(threshold) {
                self.counts.increment(obj.class_id());
                log::debug!(
                    "object #{} counted as class {} (class total {})",
                    obj.id(),
                    obj.class_id(),
                    self.counts.as_slice()[obj.class_id()]
                );
            }
        }
    }
}

/// Index of the detection in `pool` that `obj` should absorb this frame.
///
/// The search window spans the object's width and runs from a quarter of its
/// height above its centre to one full height below its bottom edge.
fn find_candidate(obj: &TrackedObject, pool: &[Detection], policy: MatchPolicy) -> Option<usize> {
    let bbox = obj.bbox();
    let height = bbox.height();
    let y_min = bbox.y_center() - height / 4.0;
    let y_max = bbox.y2 + height;
    let is_candidate = |det: &Detection| {
        (bbox.x1..=bbox.x2).contains(&det.x_center()) && (y_min..=y_max).contains(&det.y_center())
    };

    match policy {
        MatchPolicy::FirstCandidate => pool.iter().position(is_candidate),
        MatchPolicy::Nearest => {
            let (cx, cy) = (obj.x_center(), obj.y_center());
            pool.iter()
                .enumerate()
                .filter(|(_, det)| is_candidate(det))
                .min_by(|(_, a), (_, b)| {
                    let da = (a.x_center() - cx).powi(2) + (a.y_center() - cy).powi(2);
                    let db = (b.x_center() - cx).powi(2) + (b.y_center() - cy).powi(2);
                    da.total_cmp(&db)
                })
                .map(|(index, _)| index)
        }
    }
}
