use std::time::Instant;

use anyhow::{anyhow, Result};

use crate::detect::Detection;
use crate::present::{ClassTally, DashboardView, Presenter};
use crate::rate::{Overview, RateEstimator};
use crate::tracker::Tracker;

/// Outcome of one counted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub overview: Overview,
    /// True when the presenter was invoked for this frame.
    pub presented: bool,
}

/// Tracker, rate estimator and dashboard for one defect-detection pipeline.
///
/// Owned and driven by a single pipeline thread.
pub struct DefectCounter {
    tracker: Tracker,
    rate: RateEstimator,
    dashboard_classes: Vec<usize>,
    presenter: Box<dyn Presenter + Send>,
    last_presented_total: u64,
    last_overview: Overview,
}

impl DefectCounter {
    pub fn new(
        tracker: Tracker,
        rate: RateEstimator,
        dashboard_classes: Vec<usize>,
        presenter: Box<dyn Presenter + Send>,
    ) -> Result<Self> {
        let class_count = tracker.classes().len();
        if let Some(bad) = dashboard_classes.iter().find(|&&id| id >= class_count) {
            return Err(anyhow!(
                "dashboard class {} outside class table of {} entries",
                bad,
                class_count
            ));
        }
        Ok(Self {
            tracker,
            rate,
            dashboard_classes,
            presenter,
            last_presented_total: 0,
            last_overview: Overview::default(),
        })
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn rate(&self) -> &RateEstimator {
        &self.rate
    }

    pub fn last_overview(&self) -> Overview {
        self.last_overview
    }

    /// Track one frame, refresh the overview, and present it if the total moved.
    pub fn process_frame(&mut self, detections: &[Detection], now: Instant) -> Result<FrameReport> {
        self.tracker.update(detections)?;
        let overview = self.rate.update(self.tracker.counts(), now);
        self.last_overview = overview;

        let presented = overview.total != self.last_presented_total;
        if presented {
            let view = build_view(&self.tracker, &self.dashboard_classes, overview);
            self.presenter.present(&view)?;
            self.last_presented_total = overview.total;
        }
        Ok(FrameReport {
            overview,
            presented,
        })
    }

    /// Dashboard content for the current state.
    pub fn dashboard_view(&self) -> DashboardView<'_> {
        build_view(&self.tracker, &self.dashboard_classes, self.last_overview)
    }
}

fn build_view<'a>(
    tracker: &'a Tracker,
    dashboard_classes: &[usize],
    overview: Overview,
) -> DashboardView<'a> {
    let classes = tracker.classes();
    let counts = tracker.counts();
    let tallies = dashboard_classes
        .iter()
        .map(|&class_id| ClassTally {
            class_id,
            name: classes.name(class_id).unwrap_or("unknown"),
            count: counts.get(class_id).unwrap_or(0),
        })
        .collect();
    DashboardView {
        overview,
        tallies,
        tracked: tracker.tracked(),
    }
}
