use std::sync::atomic::Ordering;
use std::time::Duration;

use nightqa_core::config::{ExternalConfig, MonitorConfig, PathsConfig, WorkerConfig};
use nightqa_ingest::{DiscoveryMode, ProcessedSet};
use tempfile::TempDir;

use super::*;

fn config(dir: &TempDir) -> Config {
    let root = dir.path();
    Config {
        profile: String::new(),
        paths: PathsConfig {
            raw_dir: root.join("raw"),
            redux_dir: root.join("redux"),
            output_dir: root.join("qa"),
            output_kind: "qa".to_string(),
            threshold_dir: root.join("thresholds"),
            calibration_dir: None,
            calibration_family: "calibration".to_string(),
        },
        workers: WorkerConfig::default(),
        monitor: MonitorConfig {
            poll_seconds: 0,
            start_night: None,
            stop_file: root.join("STOP"),
        },
        external: ExternalConfig {
            process_command: None,
            submit_command: "true".to_string(),
        },
    }
}

#[test]
fn stop_flag_is_checked_before_discovery() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(&config(&dir));
    pipeline.stop_handle().store(true, Ordering::Relaxed);

    let options = LoopOptions {
        mode: DiscoveryMode::LiveTail,
        batch: false,
        poll: Duration::from_secs(60),
        max_idle_polls: None,
    };
    assert_eq!(pipeline.run_loop(&options, &mut ProcessedSet::new()), LoopSummary::default());
}

#[test]
fn evaluator_knows_drift_metrics() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(&config(&dir));
    assert!(pipeline.evaluator.drift_metrics().contains("INTEG_RAW_FLUX"));
}

#[test]
fn input_dir_follows_redux_layout() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(&config(&dir));
    assert_eq!(
        pipeline.input_dir(ExposureId::new(20220101, 2)),
        dir.path().join("redux").join("20220101").join("00000002")
    );
}
