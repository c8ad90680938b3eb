use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::detect::{ClassTable, Formatter, LabelOffset, OutputFormat};
use crate::postprocess::TaskType;
use crate::tracker::{MatchPolicy, TrackerThresholds};

const DEFAULT_DASHBOARD_CLASSES: [usize; 3] = [1, 2, 3];
const DEFAULT_WINDOW_SECS: u64 = 60;

#[derive(Debug, Deserialize, Default)]
struct CounterConfigFile {
    task_type: Option<String>,
    classes: Option<Vec<String>>,
    label_offset: Option<LabelOffsetFile>,
    dashboard_classes: Option<Vec<usize>>,
    model: Option<ModelConfigFile>,
    tracker: Option<TrackerConfigFile>,
    rate: Option<RateConfigFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LabelOffsetFile {
    Fixed(usize),
    Map(BTreeMap<String, usize>),
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    viz_threshold: Option<f32>,
    normalized_detections: Option<bool>,
    resize: Option<[u32; 2]>,
    formatter: Option<FormatterConfigFile>,
}

#[derive(Debug, Deserialize)]
struct FormatterConfigFile {
    src_indices: Vec<usize>,
    dst_indices: Vec<usize>,
    ignore_index: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    edge_y: Option<f32>,
    edge_x: Option<f32>,
    detect_confirm: Option<u32>,
    miss_drop: Option<u32>,
    class_change_replace: Option<u32>,
    admit_y_max: Option<f32>,
    match_policy: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RateConfigFile {
    window_secs: Option<u64>,
}

/// Construction-time settings for one counting pipeline.
#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub task_type: TaskType,
    pub classes: ClassTable,
    /// Classes shown in the dashboard histogram.
    pub dashboard_classes: Vec<usize>,
    pub output: OutputFormat,
    pub tracker: TrackerThresholds,
    pub rate_window: Duration,
}

impl Default for CounterConfig {
    fn default() -> Self {
        let mut cfg = Self {
            task_type: TaskType::DefectDetection,
            classes: ClassTable::default(),
            dashboard_classes: DEFAULT_DASHBOARD_CLASSES.to_vec(),
            output: OutputFormat::default(),
            tracker: TrackerThresholds::default(),
            rate_window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        };
        cfg.clip_dashboard_classes();
        cfg
    }
}

impl CounterConfig {
    /// Load from the file named by `COUNTER_CONFIG` (if set), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("COUNTER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        Self::build(file_cfg.unwrap_or_default())
    }

    /// Load from an explicit file, then apply environment overrides.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::build(read_config_file(path)?)
    }

    fn build(file: CounterConfigFile) -> Result<Self> {
        let mut cfg = Self::from_file(file)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Result<Self> {
        let task_type = match file.task_type.as_deref() {
            Some(raw) => raw.parse()?,
            None => TaskType::DefectDetection,
        };

        let classes = match file.classes {
            Some(names) => ClassTable::new(names)?,
            None => ClassTable::default(),
        };
        let classes = match file.label_offset {
            Some(LabelOffsetFile::Fixed(offset)) => classes.with_offset(LabelOffset::Fixed(offset)),
            Some(LabelOffsetFile::Map(raw)) => {
                let mut map = BTreeMap::new();
                for (model_id, index) in raw {
                    let model_id: usize = model_id.trim().parse().map_err(|_| {
                        anyhow!("label_offset keys must be class ids, got '{}'", model_id)
                    })?;
                    map.insert(model_id, index);
                }
                classes.with_offset(LabelOffset::Map(map))
            }
            None => classes,
        };

        let dashboard_classes = file
            .dashboard_classes
            .unwrap_or_else(|| DEFAULT_DASHBOARD_CLASSES.to_vec());

        let model = file.model.unwrap_or_default();
        let defaults = OutputFormat::default();
        let formatter = match model.formatter {
            Some(f) => {
                let formatter = Formatter::new(f.src_indices, f.dst_indices)?;
                Some(match f.ignore_index {
                    Some(ignored) => formatter.with_ignore_index(ignored),
                    None => formatter,
                })
            }
            None => None,
        };
        let output = OutputFormat {
            viz_threshold: model.viz_threshold.unwrap_or(defaults.viz_threshold),
            normalized: model.normalized_detections.unwrap_or(defaults.normalized),
            resize: model
                .resize
                .map(|[w, h]| (w, h))
                .unwrap_or(defaults.resize),
            formatter,
        };

        let t = file.tracker.unwrap_or_default();
        let defaults = TrackerThresholds::default();
        let tracker = TrackerThresholds {
            edge_y: t.edge_y.unwrap_or(defaults.edge_y),
            edge_x: t.edge_x.unwrap_or(defaults.edge_x),
            detect_confirm: t.detect_confirm.unwrap_or(defaults.detect_confirm),
            miss_drop: t.miss_drop.unwrap_or(defaults.miss_drop),
            class_change_replace: t
                .class_change_replace
                .unwrap_or(defaults.class_change_replace),
            admit_y_max: t.admit_y_max,
            match_policy: match t.match_policy.as_deref() {
                Some(raw) => raw.parse()?,
                None => defaults.match_policy,
            },
        };

        let rate_window = Duration::from_secs(
            file.rate
                .and_then(|rate| rate.window_secs)
                .unwrap_or(DEFAULT_WINDOW_SECS),
        );

        Ok(Self {
            task_type,
            classes,
            dashboard_classes,
            output,
            tracker,
            rate_window,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_parse::<f32>("COUNTER_EDGE_Y")? {
            self.tracker.edge_y = value;
        }
        if let Some(value) = env_parse::<f32>("COUNTER_EDGE_X")? {
            self.tracker.edge_x = value;
        }
        if let Some(value) = env_parse::<u32>("COUNTER_DETECT_CONFIRM")? {
            self.tracker.detect_confirm = value;
        }
        if let Some(value) = env_parse::<u32>("COUNTER_MISS_DROP")? {
            self.tracker.miss_drop = value;
        }
        if let Some(value) = env_parse::<u32>("COUNTER_CLASS_CHANGE_REPLACE")? {
            self.tracker.class_change_replace = value;
        }
        if let Some(value) = env_parse::<MatchPolicy>("COUNTER_MATCH_POLICY")? {
            self.tracker.match_policy = value;
        }
        if let Some(value) = env_parse::<f32>("COUNTER_VIZ_THRESHOLD")? {
            self.output.viz_threshold = value;
        }
        if let Ok(classes) = std::env::var("COUNTER_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                let offset = self.classes.offset().clone();
                self.classes = ClassTable::new(parsed)?.with_offset(offset);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.tracker.validate()?;
        self.output.validate()?;
        if self.rate_window.is_zero() {
            return Err(anyhow!("rate window must be greater than zero"));
        }
        self.clip_dashboard_classes();
        Ok(())
    }

    fn clip_dashboard_classes(&mut self) {
        let class_count = self.classes.len();
        self.dashboard_classes.retain(|&class_id| class_id < class_count);
    }
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("{} is invalid: {}", key, e)),
        _ => Ok(None),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
