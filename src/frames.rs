//! JSON-lines detection feed.
//!
//! One frame per line, either `{"t": 1.25, "detections": [[x1, y1, x2, y2, class, score], ...]}`
//! or a bare array of rows. `t` is the capture time in seconds since the start
//! of the feed. Blank lines are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FrameLine {
    Object {
        t: Option<f64>,
        detections: Vec<Vec<f32>>,
    },
    Bare(Vec<Vec<f32>>),
}

/// Raw model rows for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    pub timestamp: Option<f64>,
    pub rows: Vec<Vec<f32>>,
}

/// Instant `secs` seconds after `start`; fails instead of overflowing.
pub fn offset_instant(start: Instant, secs: f64) -> Result<Instant> {
    let offset = Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("frame time {} is out of range", secs))?;
    start
        .checked_add(offset)
        .ok_or_else(|| anyhow!("frame time {} overflows the clock", secs))
}

pub fn parse_line(line: &str) -> Result<Option<FrameRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let parsed: FrameLine = serde_json::from_str(trimmed)?;
    let record = match parsed {
        FrameLine::Object { t, detections } => {
            if let Some(t) = t {
                if !t.is_finite() || t < 0.0 {
                    return Err(anyhow!("frame time must be a non-negative number, got {}", t));
                }
                Duration::try_from_secs_f64(t)
                    .map_err(|_| anyhow!("frame time {} is out of range", t))?;
            }
            FrameRecord {
                timestamp: t,
                rows: detections,
            }
        }
        FrameLine::Bare(rows) => FrameRecord {
            timestamp: None,
            rows,
        },
    };
    Ok(Some(record))
}

/// Streams frames from any buffered reader, reporting the line of a bad record.
pub struct FrameReader<R: BufRead> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl FrameReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| anyhow!("failed to open frame feed {}: {}", path.display(), e))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Result<FrameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            match parse_line(&line) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => return Some(Err(anyhow!("frame feed line {}: {}", self.line_no, e))),
            }
        }
    }
}

/// What a live feed delivers to the counting loop.
#[derive(Debug)]
pub enum FeedEvent {
    Frame(Result<FrameRecord>),
    /// The input reached end of stream.
    End,
    /// Stop requested (Ctrl-C); sent by the signal handler, not the reader.
    Shutdown,
}

/// Read frames on a worker thread so the consumer can also wait for
/// `FeedEvent::Shutdown` while the input is idle.
pub fn spawn_feed<R>(reader: R, tx: Sender<FeedEvent>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for record in FrameReader::new(reader) {
            if tx.send(FeedEvent::Frame(record)).is_err() {
                return;
            }
        }
        let _ = tx.send(FeedEvent::End);
    })
}
