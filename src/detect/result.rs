use anyhow::{anyhow, Result};
use serde::Serialize;

/// Number of values in one raw detection record: `[x1, y1, x2, y2, class_id, score]`.
pub const RECORD_LEN: usize = 6;

/// Axis-aligned box in normalized frame coordinates (0..1, origin top-left).
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn x_center(&self) -> f32 {
        self.x1 + (self.x2 - self.x1) / 2.0
    }

    pub fn y_center(&self) -> f32 {
        self.y1 + (self.y2 - self.y1) / 2.0
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    fn validate(&self) -> Result<()> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(anyhow!("box coordinates must be finite: {:?}", coords));
        }
        let ordered = |lo: f32, hi: f32| (0.0..=1.0).contains(&lo) && lo <= hi && hi <= 1.0;
        if !ordered(self.x1, self.x2) || !ordered(self.y1, self.y2) {
            return Err(anyhow!(
                "box must satisfy 0 <= x1 <= x2 <= 1 and 0 <= y1 <= y2 <= 1, got {:?}",
                coords
            ));
        }
        Ok(())
    }
}

/// One model output for one frame, already above the visualization threshold.
///
/// Fields are private: a detection is immutable once built for a frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Detection {
    bbox: BBox,
    class_id: usize,
    score: f32,
}

impl Detection {
    pub fn new(bbox: BBox, class_id: usize, score: f32) -> Result<Self> {
        bbox.validate()?;
        if !score.is_finite() {
            return Err(anyhow!("detection score must be finite"));
        }
        Ok(Self {
            bbox,
            class_id,
            score,
        })
    }

    /// Build a detection from a raw `[x1, y1, x2, y2, class_id, score]` record.
    pub fn from_record(record: &[f32]) -> Result<Self> {
        if record.len() != RECORD_LEN {
            return Err(anyhow!(
                "detection record must have {} values, got {}",
                RECORD_LEN,
                record.len()
            ));
        }
        let raw_class = record[4];
        if !raw_class.is_finite() || raw_class < 0.0 || raw_class.fract() != 0.0 {
            return Err(anyhow!(
                "class id must be a non-negative integer, got {}",
                raw_class
            ));
        }
        let bbox = BBox {
            x1: record[0],
            y1: record[1],
            x2: record[2],
            y2: record[3],
        };
        Self::new(bbox, raw_class as usize, record[5])
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn x_center(&self) -> f32 {
        self.bbox.x_center()
    }

    pub fn y_center(&self) -> f32 {
        self.bbox.y_center()
    }
}
