//! Belt Counter
//!
//! Turns per-frame object detections from an inference model into a
//! temporally coherent count of physical objects and a production-rate
//! estimate, for objects travelling through a camera's field of view
//! (e.g. parts on a conveyor belt).
//!
//! # Pipeline
//!
//! Per frame, the owning pipeline thread:
//!
//! 1. decodes raw model rows into `Detection`s (`detect::OutputFormat`)
//! 2. feeds them to the `Tracker`, which maintains identities and per-class counts
//! 3. derives an `Overview` (total, defect share, units/hour) with the `RateEstimator`
//! 4. hands the dashboard to a `Presenter` when the total changed
//!
//! `postprocess::DefectCounter` wires steps 2-4 together; `postprocess::PostProcess`
//! selects the processing for the model's task type once at construction.
//!
//! # Module Structure
//!
//! - `detect`: detection values, class table, model output decoding
//! - `tracker`: tracked objects, matching, confirmation counting
//! - `rate`: overview and production-rate window
//! - `present`: presenter boundary
//! - `postprocess`: task-type dispatch and the per-pipeline counter
//! - `frames`: JSON-lines detection feed
//! - `config`: file and environment configuration

pub mod config;
pub mod detect;
pub mod frames;
pub mod postprocess;
pub mod present;
pub mod rate;
pub mod tracker;

pub use config::CounterConfig;
pub use detect::{BBox, ClassTable, Detection, LabelOffset, OutputFormat};
pub use postprocess::{DefectCounter, FrameOutput, FrameReport, PostProcess, TaskType};
pub use present::{ClassTally, DashboardView, JsonLinesPresenter, LogPresenter, Presenter};
pub use rate::{Overview, ProductionWindow, RateEstimator};
pub use tracker::{
    ClassCounts, MatchPolicy, PixelBox, TrackedObject, Tracker, TrackerError, TrackerThresholds,
};
