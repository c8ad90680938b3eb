//! count_stream - live counter fed from stdin
//!
//! Reads one frame of model rows per line from stdin as the inference stage
//! produces them, and emits a dashboard update whenever the production total
//! changes. Stops at end of input or on Ctrl-C.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Instant;

use belt_counter::frames::{offset_instant, spawn_feed, FeedEvent};
use belt_counter::{
    CounterConfig, FrameOutput, JsonLinesPresenter, LogPresenter, PostProcess, Presenter,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Output {
    /// Dashboard updates as log lines on stderr.
    Log,
    /// Dashboard updates as JSON lines on stdout.
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Counter configuration (JSON, or TOML with a .toml extension).
    #[arg(long, env = "COUNTER_CONFIG")]
    config: Option<PathBuf>,
    /// Where dashboard updates go.
    #[arg(long, value_enum, default_value_t = Output::Json)]
    output: Output,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CounterConfig::from_path(path)?,
        None => CounterConfig::load()?,
    };

    let presenter: Box<dyn Presenter + Send> = match args.output {
        Output::Log => Box::new(LogPresenter),
        Output::Json => Box::new(JsonLinesPresenter::new(std::io::stdout())),
    };

    let start = Instant::now();
    let mut post = PostProcess::new(&config, start, presenter)?;
    log::info!(
        "count_stream running: task={}, {} classes",
        post.task_type(),
        config.classes.len()
    );

    let (tx, rx) = mpsc::channel();
    let signal_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(FeedEvent::Shutdown);
    })
    .expect("error setting Ctrl-C handler");
    spawn_feed(std::io::BufReader::new(std::io::stdin()), tx);

    let mut frames = 0u64;
    for event in rx {
        let record = match event {
            FeedEvent::Frame(record) => record?,
            FeedEvent::End => {
                log::info!("end of input");
                break;
            }
            FeedEvent::Shutdown => {
                log::info!("shutdown signal received");
                break;
            }
        };
        let now = match record.timestamp {
            Some(t) => offset_instant(start, t)?,
            None => Instant::now(),
        };
        if let FrameOutput::Detections(dets) = post.process(&record.rows, now)? {
            log::debug!("frame {}: {} detections", frames, dets.len());
        }
        frames += 1;
    }

    match post.counter() {
        Some(counter) => {
            let overview = counter.last_overview();
            log::info!(
                "stopped after {} frames: total={} defects={}% rate={}/h",
                frames,
                overview.total,
                overview.defect_percent,
                overview.rate
            );
        }
        None => log::info!("stopped after {} frames", frames),
    }
    Ok(())
}
