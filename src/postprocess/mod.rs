//! Per-task post-processing.
//!
//! The model's task type is a closed set. A `PostProcess` variant is chosen
//! once at construction; frames are dispatched by `match`, never by comparing
//! task names per frame.

mod counter;

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{anyhow, Result};

use crate::config::CounterConfig;
use crate::detect::{Detection, OutputFormat};
use crate::present::Presenter;
use crate::rate::RateEstimator;
use crate::tracker::Tracker;

pub use counter::{DefectCounter, FrameReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskType {
    Classification,
    Detection,
    Segmentation,
    DefectDetection,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Detection => "detection",
            TaskType::Segmentation => "segmentation",
            TaskType::DefectDetection => "defect_detection",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "classification" => Ok(TaskType::Classification),
            "detection" => Ok(TaskType::Detection),
            "segmentation" => Ok(TaskType::Segmentation),
            "defect_detection" => Ok(TaskType::DefectDetection),
            other => Err(anyhow!("unknown task type '{}'", other)),
        }
    }
}

/// Result of post-processing one frame.
#[derive(Debug)]
pub enum FrameOutput {
    /// Plain detection: decoded boxes for overlay.
    Detections(Vec<Detection>),
    /// Defect detection: tracked, counted and summarized.
    Counted(FrameReport),
}

pub enum PostProcess {
    Detection {
        format: OutputFormat,
    },
    DefectDetection {
        format: OutputFormat,
        counter: DefectCounter,
    },
}

impl PostProcess {
    /// Build the post-processor for the configured task type.
    ///
    /// `start` anchors the first production window.
    pub fn new(
        config: &CounterConfig,
        start: Instant,
        presenter: Box<dyn Presenter + Send>,
    ) -> Result<Self> {
        match config.task_type {
            TaskType::Detection => Ok(PostProcess::Detection {
                format: config.output.clone(),
            }),
            TaskType::DefectDetection => {
                let tracker = Tracker::new(config.classes.clone(), config.tracker.clone())?;
                let rate = RateEstimator::with_window(start, config.rate_window)?;
                let counter = DefectCounter::new(
                    tracker,
                    rate,
                    config.dashboard_classes.clone(),
                    presenter,
                )?;
                Ok(PostProcess::DefectDetection {
                    format: config.output.clone(),
                    counter,
                })
            }
            other @ (TaskType::Classification | TaskType::Segmentation) => Err(anyhow!(
                "task type '{}' has no detection output to post-process",
                other
            )),
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            PostProcess::Detection { .. } => TaskType::Detection,
            PostProcess::DefectDetection { .. } => TaskType::DefectDetection,
        }
    }

    /// Decode one frame of raw model rows and run the task's processing.
    pub fn process<R: AsRef<[f32]>>(&mut self, rows: &[R], now: Instant) -> Result<FrameOutput> {
        match self {
            PostProcess::Detection { format } => format.decode(rows).map(FrameOutput::Detections),
            PostProcess::DefectDetection { format, counter } => {
                let detections = format.decode(rows)?;
                counter
                    .process_frame(&detections, now)
                    .map(FrameOutput::Counted)
            }
        }
    }

    pub fn counter(&self) -> Option<&DefectCounter> {
        match self {
            PostProcess::DefectDetection { counter, .. } => Some(counter),
            PostProcess::Detection { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::present::LogPresenter;

    #[test]
    fn task_type_round_trips_names() {
        for task in [
            TaskType::Classification,
            TaskType::Detection,
            TaskType::Segmentation,
            TaskType::DefectDetection,
        ] {
            assert_eq!(task.as_str().parse::<TaskType>().expect("parse"), task);
        }
        assert!("keypoints".parse::<TaskType>().is_err());
    }

    #[test]
    fn classification_is_not_post_processed_here() {
        let config = CounterConfig {
            task_type: TaskType::Classification,
            ..CounterConfig::default()
        };
        assert!(PostProcess::new(&config, Instant::now(), Box::new(LogPresenter)).is_err());
    }

    #[test]
    fn detection_task_only_decodes() {
        let config = CounterConfig {
            task_type: TaskType::Detection,
            ..CounterConfig::default()
        };
        let mut post =
            PostProcess::new(&config, Instant::now(), Box::new(LogPresenter)).expect("post");
        assert_eq!(post.task_type(), TaskType::Detection);
        assert!(post.counter().is_none());
        let rows: Vec<Vec<f32>> = vec![vec![0.4, 0.45, 0.5, 0.55, 0.0, 0.9]];
        match post.process(&rows, Instant::now()).expect("process") {
            FrameOutput::Detections(dets) => assert_eq!(dets.len(), 1),
            FrameOutput::Counted(_) => panic!("detection task must not count"),
        }
    }

    #[test]
    fn defect_task_tracks_decoded_rows() {
        let config = CounterConfig::default();
        let start = Instant::now();
        let mut post = PostProcess::new(&config, start, Box::new(LogPresenter)).expect("post");
        assert_eq!(post.task_type(), TaskType::DefectDetection);
        let rows: Vec<Vec<f32>> = vec![vec![0.40, 0.12, 0.50, 0.22, 0.0, 0.9]];
        for _ in 0..6 {
            post.process(&rows, start).expect("process");
        }
        let counter = post.counter().expect("counter");
        assert_eq!(counter.tracker().counts().as_slice(), &[1, 0]);
    }
}
