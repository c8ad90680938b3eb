//! Model output decoding.
//!
//! Turns raw per-row model outputs into `Detection`s that satisfy the tracker's
//! input contract: normalized coordinates, valid record layout and a score
//! strictly above the visualization threshold.

use anyhow::{anyhow, Result};

use super::result::{Detection, RECORD_LEN};

/// Column remapping for models whose outputs are not laid out as
/// `[x1, y1, x2, y2, class_id, score]`. Applied as `row[dst[i]] = source[src[i]]`,
/// where `source` is the incoming row with the `ignore_index` column removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Formatter {
    pub src_indices: Vec<usize>,
    pub dst_indices: Vec<usize>,
    pub ignore_index: Option<usize>,
}

impl Formatter {
    pub fn new(src_indices: Vec<usize>, dst_indices: Vec<usize>) -> Result<Self> {
        if src_indices.len() != dst_indices.len() {
            return Err(anyhow!(
                "formatter index lists differ in length ({} vs {})",
                src_indices.len(),
                dst_indices.len()
            ));
        }
        Ok(Self {
            src_indices,
            dst_indices,
            ignore_index: None,
        })
    }

    /// Drop this column of the incoming row before reading source indices.
    pub fn with_ignore_index(mut self, ignore_index: usize) -> Self {
        self.ignore_index = Some(ignore_index);
        self
    }

    fn apply(&self, row: &mut [f32]) -> Result<()> {
        let mut source = row.to_vec();
        if let Some(ignored) = self.ignore_index {
            if ignored >= source.len() {
                return Err(anyhow!("formatter ignore index {} out of row bounds", ignored));
            }
            source.remove(ignored);
        }
        for (&src, &dst) in self.src_indices.iter().zip(&self.dst_indices) {
            let value = *source
                .get(src)
                .ok_or_else(|| anyhow!("formatter source index {} out of row bounds", src))?;
            let slot = row
                .get_mut(dst)
                .ok_or_else(|| anyhow!("formatter destination index {} out of row bounds", dst))?;
            *slot = value;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputFormat {
    /// Rows scoring at or below this value are dropped.
    pub viz_threshold: f32,
    /// False when the model emits pixel coordinates in its input resolution.
    pub normalized: bool,
    /// Model input size `(width, height)`, used to normalize pixel coordinates.
    pub resize: (u32, u32),
    pub formatter: Option<Formatter>,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            viz_threshold: 0.5,
            normalized: true,
            resize: (640, 640),
            formatter: None,
        }
    }
}

impl OutputFormat {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.viz_threshold) {
            return Err(anyhow!(
                "viz_threshold must be within [0, 1], got {}",
                self.viz_threshold
            ));
        }
        if !self.normalized && (self.resize.0 == 0 || self.resize.1 == 0) {
            return Err(anyhow!("resize must be non-zero for pixel-space outputs"));
        }
        Ok(())
    }

    /// Decode one frame worth of model rows.
    pub fn decode<R: AsRef<[f32]>>(&self, rows: &[R]) -> Result<Vec<Detection>> {
        let mut detections = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            if let Some(det) = self
                .decode_row(row.as_ref())
                .map_err(|e| anyhow!("model output row {}: {}", index, e))?
            {
                detections.push(det);
            }
        }
        Ok(detections)
    }

    fn decode_row(&self, raw: &[f32]) -> Result<Option<Detection>> {
        let mut row = raw.to_vec();
        if let Some(formatter) = &self.formatter {
            formatter.apply(&mut row)?;
        }
        if row.len() < RECORD_LEN {
            return Err(anyhow!(
                "expected at least {} values, got {}",
                RECORD_LEN,
                row.len()
            ));
        }
        row.truncate(RECORD_LEN);

        let above_threshold = row[5] > self.viz_threshold;
        if !above_threshold {
            return Ok(None);
        }

        if !self.normalized {
            let (w, h) = (self.resize.0 as f32, self.resize.1 as f32);
            row[0] /= w;
            row[2] /= w;
            row[1] /= h;
            row[3] /= h;
        }
        for coord in &mut row[..4] {
            *coord = coord.clamp(0.0, 1.0);
        }
        if row[0] > row[2] || row[1] > row[3] {
            log::debug!("dropping inverted box {:?}", &row[..4]);
            return Ok(None);
        }
        Detection::from_record(&row).map(Some)
    }
}
