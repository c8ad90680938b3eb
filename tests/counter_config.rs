use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use belt_counter::{CounterConfig, LabelOffset, MatchPolicy, TaskType};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "COUNTER_CONFIG",
        "COUNTER_EDGE_Y",
        "COUNTER_EDGE_X",
        "COUNTER_DETECT_CONFIRM",
        "COUNTER_MISS_DROP",
        "COUNTER_CLASS_CHANGE_REPLACE",
        "COUNTER_MATCH_POLICY",
        "COUNTER_VIZ_THRESHOLD",
        "COUNTER_CLASSES",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(file: &mut NamedTempFile, body: &str) {
    file.write_all(body.as_bytes()).expect("write config");
    file.flush().expect("flush config");
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    write_config(
        &mut file,
        r#"{
            "task_type": "defect_detection",
            "classes": ["good", "scratch", "dent", "stain"],
            "dashboard_classes": [1, 2, 3, 9],
            "model": {
                "viz_threshold": 0.4,
                "normalized_detections": false,
                "resize": [1280, 720]
            },
            "tracker": {
                "edge_y": 0.08,
                "miss_drop": 7,
                "match_policy": "nearest"
            },
            "rate": { "window_secs": 30 }
        }"#,
    );

    std::env::set_var("COUNTER_CONFIG", file.path());
    std::env::set_var("COUNTER_MISS_DROP", "9");
    std::env::set_var("COUNTER_VIZ_THRESHOLD", "0.65");

    let cfg = CounterConfig::load().expect("load config");
    assert_eq!(cfg.task_type, TaskType::DefectDetection);
    assert_eq!(cfg.classes.names(), &["good", "scratch", "dent", "stain"]);
    assert_eq!(cfg.dashboard_classes, vec![1, 2, 3]);
    assert!(!cfg.output.normalized);
    assert_eq!(cfg.output.resize, (1280, 720));
    assert!((cfg.output.viz_threshold - 0.65).abs() < f32::EPSILON);
    assert!((cfg.tracker.edge_y - 0.08).abs() < f32::EPSILON);
    assert_eq!(cfg.tracker.miss_drop, 9);
    assert_eq!(cfg.tracker.detect_confirm, 6);
    assert_eq!(cfg.tracker.match_policy, MatchPolicy::Nearest);
    assert_eq!(cfg.rate_window, Duration::from_secs(30));

    clear_env();
}

#[test]
fn loads_toml_config_with_label_offset_map() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    write_config(
        &mut file,
        r#"
task_type = "detection"
classes = ["background", "good", "defect"]

[label_offset]
0 = 1
1 = 2

[tracker]
admit_y_max = 0.3
"#,
    );

    let cfg = CounterConfig::from_path(file.path()).expect("load config");
    assert_eq!(cfg.task_type, TaskType::Detection);
    assert_eq!(cfg.classes.name(0), Some("good"));
    assert_eq!(cfg.classes.name(1), Some("defect"));
    match cfg.classes.offset() {
        LabelOffset::Map(map) => assert_eq!(map.len(), 2),
        other => panic!("expected label map, got {:?}", other),
    }
    assert!((cfg.tracker.admit_limit() - 0.3).abs() < f32::EPSILON);
}

#[test]
fn env_classes_replace_file_classes() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COUNTER_CLASSES", "ok, chipped ,cracked");
    let cfg = CounterConfig::load().expect("load config");
    assert_eq!(cfg.classes.names(), &["ok", "chipped", "cracked"]);
    assert_eq!(cfg.dashboard_classes, vec![1, 2]);

    clear_env();
}

#[test]
fn invalid_env_override_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COUNTER_DETECT_CONFIRM", "six");
    let err = CounterConfig::load().expect_err("invalid env value");
    assert!(err.to_string().contains("COUNTER_DETECT_CONFIRM"));

    std::env::set_var("COUNTER_DETECT_CONFIRM", "6");
    std::env::set_var("COUNTER_MATCH_POLICY", "closest");
    assert!(CounterConfig::load().is_err());

    clear_env();
}

#[test]
fn out_of_range_thresholds_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COUNTER_EDGE_Y", "0.7");
    assert!(CounterConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.json");
    let err = CounterConfig::from_path(&missing).expect_err("missing file");
    assert!(err.to_string().contains("failed to read config file"));
}
