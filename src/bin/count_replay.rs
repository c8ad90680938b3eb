//! count_replay - replay a recorded detection feed through the counter
//!
//! Reads a JSON-lines detection feed, runs every frame through the configured
//! post-processing (tracking, counting and rate estimation for defect
//! detection), logs dashboard updates and prints a JSON summary on stdout.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;

use belt_counter::frames::{offset_instant, FrameReader, FrameRecord};
use belt_counter::{
    CounterConfig, FrameOutput, LogPresenter, Overview, PostProcess, TrackedObject,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON-lines detection feed to replay.
    input: PathBuf,
    /// Counter configuration (JSON, or TOML with a .toml extension).
    #[arg(long, env = "COUNTER_CONFIG")]
    config: Option<PathBuf>,
    /// Frame rate used to time frames that carry no timestamp.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
    /// Also write the summary to this file.
    #[arg(long)]
    summary: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Serialize)]
struct ClassSummary<'a> {
    class_id: usize,
    name: &'a str,
    count: u64,
}

#[derive(Serialize)]
struct ReplaySummary<'a> {
    task_type: String,
    frames: usize,
    simulated_secs: f64,
    detections: usize,
    overview: Option<Overview>,
    classes: Vec<ClassSummary<'a>>,
    tracked: &'a [TrackedObject],
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if !(args.fps.is_finite() && args.fps > 0.0) {
        return Err(anyhow!("fps must be a positive number"));
    }
    let ui = ui::Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let config = {
        let _stage = ui.stage("Load configuration");
        match &args.config {
            Some(path) => CounterConfig::from_path(path)?,
            None => CounterConfig::load()?,
        }
    };
    log::info!(
        "task={} classes={} thresholds={:?}",
        config.task_type,
        config.classes.len(),
        config.tracker
    );

    let frames: Vec<FrameRecord> = {
        let _stage = ui.stage("Read detection feed");
        FrameReader::open(&args.input)?.collect::<Result<_>>()?
    };

    let start = Instant::now();
    let mut post = PostProcess::new(&config, start, Box::new(LogPresenter))?;
    let mut detections = 0usize;
    let mut last_t = 0.0f64;

    {
        let _stage = ui.stage("Replay frames");
        let progress = ui.frames(frames.len() as u64);
        for (index, frame) in frames.iter().enumerate() {
            let t = frame
                .timestamp
                .unwrap_or_else(|| index as f64 / args.fps)
                .max(last_t);
            last_t = t;
            let now = offset_instant(start, t).map_err(|e| anyhow!("frame {}: {}", index, e))?;
            match post.process(&frame.rows, now)? {
                FrameOutput::Detections(dets) => detections += dets.len(),
                FrameOutput::Counted(report) => {
                    if report.presented {
                        progress.set_message(format!("total {}", report.overview.total));
                    }
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();
    }

    let summary = match post.counter() {
        Some(counter) => {
            let tracker = counter.tracker();
            let classes = tracker
                .counts()
                .as_slice()
                .iter()
                .enumerate()
                .map(|(class_id, &count)| ClassSummary {
                    class_id,
                    name: tracker.classes().name(class_id).unwrap_or("unknown"),
                    count,
                })
                .collect();
            ReplaySummary {
                task_type: post.task_type().to_string(),
                frames: frames.len(),
                simulated_secs: last_t,
                detections,
                overview: Some(counter.last_overview()),
                classes,
                tracked: tracker.tracked(),
            }
        }
        None => ReplaySummary {
            task_type: post.task_type().to_string(),
            frames: frames.len(),
            simulated_secs: last_t,
            detections,
            overview: None,
            classes: Vec::new(),
            tracked: &[],
        },
    };

    let json = serde_json::to_string_pretty(&summary)?;
    if let Some(path) = &args.summary {
        std::fs::write(path, &json)
            .map_err(|e| anyhow!("failed to write summary {}: {}", path.display(), e))?;
        log::info!("summary written to {}", path.display());
    }
    println!("{json}");
    Ok(())
}
