use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use belt_counter::frames::{offset_instant, FrameReader};
use belt_counter::{CounterConfig, FrameOutput, JsonLinesPresenter, PostProcess, TaskType};

/// Writer shared between the presenter and the test.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn feed_file(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp feed");
    for line in lines {
        writeln!(file, "{}", line).expect("write feed");
    }
    file.flush().expect("flush feed");
    file
}

fn defect_frame(t: f64) -> String {
    format!(
        r#"{{"t": {}, "detections": [[0.40, 0.12, 0.50, 0.22, 1, 0.93], [0.70, 0.80, 0.80, 0.90, 0, 0.2]]}}"#,
        t
    )
}

#[test]
fn replayed_feed_counts_confirmed_defect() {
    let mut lines: Vec<String> = (0..8).map(|i| defect_frame(i as f64 / 30.0)).collect();
    lines.insert(3, String::new());
    let feed = feed_file(&lines);

    let out = SharedBuf::default();
    let start = Instant::now();
    let mut post = PostProcess::new(
        &CounterConfig::default(),
        start,
        Box::new(JsonLinesPresenter::new(out.clone())),
    )
    .expect("post process");
    assert_eq!(post.task_type(), TaskType::DefectDetection);

    let mut presented = 0;
    for record in FrameReader::open(feed.path()).expect("open feed") {
        let record = record.expect("frame");
        let t = record.timestamp.expect("timestamp");
        match post
            .process(&record.rows, start + Duration::from_secs_f64(t))
            .expect("process")
        {
            FrameOutput::Counted(report) => {
                if report.presented {
                    presented += 1;
                }
            }
            FrameOutput::Detections(_) => panic!("defect task returned plain detections"),
        }
    }
    assert_eq!(presented, 1);

    let counter = post.counter().expect("counter");
    assert_eq!(counter.tracker().counts().as_slice(), &[0, 1]);
    let overview = counter.last_overview();
    assert_eq!(overview.total, 1);
    assert_eq!(overview.defect_percent, 100);
    assert_eq!(overview.rate, 1);

    let written = String::from_utf8(out.0.lock().unwrap().clone()).expect("utf8");
    let updates: Vec<serde_json::Value> = written
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["overview"]["total"], 1);
    assert_eq!(updates[0]["tallies"][0]["name"], "defect");
    assert_eq!(updates[0]["tallies"][0]["count"], 1);
    let visible = updates[0]["visible"].as_array().expect("visible objects");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0]["class_id"], 1);
    assert_eq!(visible[0]["not_detected"], 0);
}

#[test]
fn detection_task_passes_decoded_boxes_through() {
    let feed = feed_file(&[defect_frame(0.0)]);
    let config = CounterConfig {
        task_type: TaskType::Detection,
        ..CounterConfig::default()
    };
    let start = Instant::now();
    let mut post = PostProcess::new(
        &config,
        start,
        Box::new(JsonLinesPresenter::new(SharedBuf::default())),
    )
    .expect("post process");

    let record = FrameReader::open(feed.path())
        .expect("open feed")
        .next()
        .expect("one frame")
        .expect("frame");
    match post.process(&record.rows, start).expect("process") {
        FrameOutput::Detections(dets) => {
            assert_eq!(dets.len(), 1);
            assert_eq!(dets[0].class_id(), 1);
        }
        FrameOutput::Counted(_) => panic!("detection task must not count"),
    }
    assert!(post.counter().is_none());
}

#[test]
fn malformed_line_reports_its_position() {
    let lines = vec![
        defect_frame(0.0),
        String::new(),
        r#"{"t": 0.1, "detections": "nope"}"#.to_string(),
    ];
    let feed = feed_file(&lines);
    let results: Vec<_> = FrameReader::open(feed.path()).expect("open feed").collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    let err = results[1].as_ref().expect_err("bad line");
    assert!(err.to_string().contains("frame feed line 3"));
}

#[test]
fn out_of_table_class_stops_the_pipeline() {
    let feed = feed_file(&[r#"[[0.40, 0.12, 0.50, 0.22, 5, 0.9]]"#.to_string()]);
    let start = Instant::now();
    let mut post = PostProcess::new(
        &CounterConfig::default(),
        start,
        Box::new(JsonLinesPresenter::new(SharedBuf::default())),
    )
    .expect("post process");
    let record = FrameReader::open(feed.path())
        .expect("open feed")
        .next()
        .expect("one frame")
        .expect("frame");
    assert!(record.timestamp.is_none());
    assert!(post.process(&record.rows, start).is_err());
}

#[test]
fn out_of_range_frame_time_is_an_error_not_a_crash() {
    let feed = feed_file(&[defect_frame(0.0), r#"{"t": 1e30, "detections": []}"#.to_string()]);
    let results: Vec<_> = FrameReader::open(feed.path()).expect("open feed").collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    let err = results[1].as_ref().expect_err("huge time");
    assert!(err.to_string().contains("frame feed line 2"));

    let start = Instant::now();
    assert!(offset_instant(start, 1e30).is_err());
    assert!(offset_instant(start, 2.5).is_ok());
}
