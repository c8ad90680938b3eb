//! Dashboard presentation boundary.
//!
//! Rendering (box overlays, overview panel, defect histogram) lives outside
//! this crate. A `Presenter` receives what it needs to draw, and is only
//! invoked when the production total changes.

use std::io::Write;

use anyhow::Result;
use serde::{Serialize, Serializer};

use crate::rate::Overview;
use crate::tracker::TrackedObject;

/// Count for one dashboard class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassTally<'a> {
    pub class_id: usize,
    pub name: &'a str,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardView<'a> {
    pub overview: Overview,
    /// Histogram entries for the configured dashboard classes.
    pub tallies: Vec<ClassTally<'a>>,
    /// Live tracked set, deepest first. Serialized as the visible objects only.
    #[serde(rename = "visible", serialize_with = "serialize_visible")]
    pub tracked: &'a [TrackedObject],
}

fn serialize_visible<S: Serializer>(
    tracked: &&[TrackedObject],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(tracked.iter().filter(|obj| obj.is_visible()))
}

impl<'a> DashboardView<'a> {
    /// Objects seen in the current frame, the ones worth drawing.
    pub fn visible(&self) -> impl Iterator<Item = &'a TrackedObject> {
        self.tracked.iter().filter(|obj| obj.is_visible())
    }
}

pub trait Presenter {
    fn present(&mut self, view: &DashboardView<'_>) -> Result<()>;
}

/// Writes dashboard updates to the log.
#[derive(Default)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn present(&mut self, view: &DashboardView<'_>) -> Result<()> {
        let tallies: Vec<String> = view
            .tallies
            .iter()
            .map(|t| format!("{}={}", t.name, t.count))
            .collect();
        log::info!(
            "total={} defects={}% rate={}/h [{}] visible={}",
            view.overview.total,
            view.overview.defect_percent,
            view.overview.rate,
            tallies.join(", "),
            view.visible().count()
        );
        Ok(())
    }
}

/// Emits one JSON object per dashboard update.
pub struct JsonLinesPresenter<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Presenter for JsonLinesPresenter<W> {
    fn present(&mut self, view: &DashboardView<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, view)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_presenter_writes_one_line_per_update() {
        let mut presenter = JsonLinesPresenter::new(Vec::new());
        let view = DashboardView {
            overview: Overview {
                total: 3,
                defect_percent: 33,
                rate: 3,
            },
            tallies: vec![ClassTally {
                class_id: 1,
                name: "scratch",
                count: 1,
            }],
            tracked: &[],
        };
        presenter.present(&view).expect("present");
        presenter.present(&view).expect("present");
        let out = String::from_utf8(presenter.into_inner()).expect("utf8");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(parsed["overview"]["total"], 3);
        assert_eq!(parsed["tallies"][0]["name"], "scratch");
        assert_eq!(parsed["visible"], serde_json::json!([]));
    }
}
