use std::fs;
use std::path::Path;
use std::time::Duration;

use nightqa_cli::{LoopOptions, LoopSummary, Pipeline, PipelineError};
use nightqa_core::config::{ExternalConfig, MonitorConfig, PathsConfig, WorkerConfig};
use nightqa_core::{Config, ExposureId, Granularity, RawLayout, Severity};
use nightqa_ingest::{DiscoveryMode, IngestError, ProcessedSet};
use serde_json::json;
use tempfile::TempDir;

fn config(root: &Path) -> Config {
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
        workers: WorkerConfig {
            workers: 2,
            interactive_cap: 8,
            batch_env: "NIGHTQA_TEST_UNSET_BATCH_VAR".to_string(),
        },
        monitor: MonitorConfig {
            poll_seconds: 0,
            start_night: None,
            stop_file: root.join("qa").join("STOP"),
        },
        external: ExternalConfig {
            process_command: None,
            submit_command: "true".to_string(),
        },
    }
}

fn write_json(path: &Path, value: serde_json::Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, value.to_string()).unwrap();
}

/// Land a raw exposure; with `products`, also write the intermediate products.
fn land(config: &Config, id: ExposureId, obstype: &str, products: bool) {
    let raw = RawLayout::new(&config.paths.raw_dir);
    fs::create_dir_all(raw.exposure_dir(id)).unwrap();
    fs::write(raw.marker_path(id), b"").unwrap();
    write_json(
        &raw.request_path(id),
        json!({"OBSTYPE": obstype, "PROGRAM": "CALIB", "EXPTIME": 120.0}),
    );
    if !products {
        return;
    }

    let indir = config.input_dir(id);
    write_json(
        &indir.join(format!("preproc-b0-{:08}.json", id.expid)),
        json!({"camera": "b0", "amps": {
            "A": {"bias": 1000.0, "readnoise": 3.0, "cosmic_pixels": 5, "npix": 1000},
            "B": {"bias": 1002.0, "readnoise": 5.0, "cosmic_pixels": 7, "npix": 1000}
        }}),
    );
    write_json(
        &indir.join(format!("psf-b0-{:08}.json", id.expid)),
        json!({"camera": "b0", "dx": [0.01, -0.02], "dy": [0.0, 0.01]}),
    );
    write_json(
        &indir.join(format!("frame-b0-{:08}.json", id.expid)),
        json!({"camera": "b0", "fibers": [0, 1], "integrated_flux": [100.0, 200.0], "sky_flux": [1.0, 2.0]}),
    );
}

fn readnoise_thresholds(config: &Config) {
    write_json(
        &config.paths.threshold_dir.join("READNOISE-20210101.json"),
        json!({"band": {"lower_err": 0.0, "lower": 1.0, "upper": 4.0, "upper_err": 6.0}}),
    );
}

fn catch_up() -> LoopOptions {
    LoopOptions {
        mode: DiscoveryMode::CatchUp,
        batch: false,
        poll: Duration::from_millis(1),
        max_idle_polls: Some(1),
    }
}

#[test]
fn process_exposure_writes_tables_status_and_manifest() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let id = ExposureId::new(20220101, 2);
    land(&config, id, "ARC", true);
    readnoise_thresholds(&config);

    let pipeline = Pipeline::new(&config);
    let summary = pipeline.process_exposure(id).unwrap();
    assert_eq!(summary.status, Severity::Warning);
    assert!(summary.failed_providers.is_empty());

    let store = pipeline.store();
    assert!(store.is_complete(id));
    let manifest = store.read_manifest(id).unwrap();
    assert_eq!(manifest.observation_kind, "ARC");
    for granularity in [Granularity::Amp, Granularity::Camera, Granularity::Spectro, Granularity::Exposure] {
        assert!(manifest.table(granularity).is_some(), "{}", granularity);
    }
    assert!(manifest.table(Granularity::Fiber).is_none());

    let status = store.read_status(id).unwrap();
    assert_eq!(status.status, Severity::Warning);
    let amp = &status.tables[&Granularity::Amp];
    assert_eq!(amp.evaluated_metrics, vec!["READNOISE".to_string()]);
    assert_eq!(amp.rows.len(), 2);

    assert!(config.paths.output_dir.join("qa-metric-columns.json").is_file());
}

#[test]
fn rerunning_discovery_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let first = ExposureId::new(20220101, 1);
    let second = ExposureId::new(20220102, 3);
    land(&config, first, "FLAT", true);
    land(&config, second, "SCIENCE", true);

    let pipeline = Pipeline::new(&config);
    let mut processed = ProcessedSet::new();
    let summary = pipeline.run_loop(&catch_up(), &mut processed);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 0);
    let before: Vec<ExposureId> = processed.iter().collect();
    assert_eq!(before, vec![first, second]);

    let again = pipeline.run_loop(&catch_up(), &mut processed);
    assert_eq!(again.processed, 0);
    assert_eq!(processed.iter().collect::<Vec<_>>(), before);

    // A fresh process finds the output artifacts and has nothing to do.
    let restarted = Pipeline::new(&config).run_loop(&catch_up(), &mut ProcessedSet::new());
    assert_eq!(restarted.processed, 0);
}

#[test]
fn missing_products_is_no_data_and_leaves_exposure_incomplete() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let id = ExposureId::new(20220101, 5);
    land(&config, id, "SCIENCE", false);
    fs::create_dir_all(config.input_dir(id)).unwrap();

    let pipeline = Pipeline::new(&config);
    let err = pipeline.process_exposure(id).unwrap_err();
    assert!(matches!(err, PipelineError::NoData(e) if e == id));
    assert!(!pipeline.store().is_complete(id));
}

#[test]
fn loop_survives_failing_exposures() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let broken = ExposureId::new(20220101, 1);
    let good = ExposureId::new(20220101, 2);
    land(&config, broken, "SCIENCE", false);
    land(&config, good, "SCIENCE", true);

    let pipeline = Pipeline::new(&config);
    let mut processed = ProcessedSet::new();
    let summary = pipeline.run_loop(&catch_up(), &mut processed);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 1);
    assert!(processed.contains(broken));
    assert!(!pipeline.store().is_complete(broken));
    assert!(pipeline.store().is_complete(good));
}

#[test]
fn missing_raw_exposure_is_missing_input() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let err = Pipeline::new(&config)
        .process_exposure(ExposureId::new(20220101, 9))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Ingest(IngestError::MissingInput(_))));
}

#[test]
fn status_can_be_reevaluated_from_persisted_tables() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let id = ExposureId::new(20220101, 2);
    land(&config, id, "DARK", true);

    let pipeline = Pipeline::new(&config);
    let manifest = pipeline.compute_metrics(id).unwrap();
    assert!(manifest.table(Granularity::Amp).is_some());
    assert!(pipeline.store().read_status(id).is_err());

    readnoise_thresholds(&config);
    let status = pipeline.evaluate_existing(id).unwrap();
    assert_eq!(status.status, Severity::Warning);
    assert_eq!(pipeline.store().read_status(id).unwrap(), status);
}

#[test]
fn missing_calibration_snapshots_are_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path());
    config.paths.calibration_dir = Some(dir.path().join("calibration"));
    let id = ExposureId::new(20220101, 2);
    land(&config, id, "ARC", true);

    let pipeline = Pipeline::new(&config);
    let err = pipeline.process_exposure(id).unwrap_err();
    assert!(matches!(err, PipelineError::Snapshot(_)));
    assert!(!pipeline.store().is_complete(id));
}

#[test]
fn only_filter_limits_tables() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let id = ExposureId::new(20220101, 2);
    land(&config, id, "ARC", true);

    let pipeline = Pipeline::new(&config).with_only(&["amp_stats".to_string()]);
    let manifest = pipeline.compute_metrics(id).unwrap();
    assert_eq!(manifest.tables.len(), 1);
    assert_eq!(manifest.tables[0].granularity, Granularity::Amp);
}

#[test]
fn stop_file_ends_the_loop() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    land(&config, ExposureId::new(20220101, 1), "SCIENCE", true);
    fs::create_dir_all(&config.paths.output_dir).unwrap();
    fs::write(&config.monitor.stop_file, b"").unwrap();

    let options = LoopOptions {
        max_idle_polls: None,
        ..catch_up()
    };
    let summary = Pipeline::new(&config).run_loop(&options, &mut ProcessedSet::new());
    assert_eq!(summary, LoopSummary::default());
}

#[test]
fn batch_mode_submits_instead_of_processing() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let id = ExposureId::new(20220101, 1);
    land(&config, id, "SCIENCE", true);

    let options = LoopOptions {
        batch: true,
        ..catch_up()
    };
    let pipeline = Pipeline::new(&config);
    let summary = pipeline.run_loop(&options, &mut ProcessedSet::new());
    assert_eq!(summary.submitted, 1);
    assert_eq!(summary.processed, 0);
    assert!(!pipeline.store().is_complete(id));
}

#[test]
fn submitted_jobs_keep_the_monitor_directories() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path());
    config.paths.output_dir = dir.path().join("custom_qa");
    let record = dir.path().join("jobs.txt");
    let script = dir.path().join("submit.sh");
    fs::write(&script, format!("#!/bin/sh\necho \"$1\" >> {}\n", record.display())).unwrap();
    config.external.submit_command = format!("sh {}", script.display());

    let id = ExposureId::new(20220101, 1);
    land(&config, id, "SCIENCE", true);

    let options = LoopOptions {
        batch: true,
        ..catch_up()
    };
    let summary = Pipeline::new(&config).run_loop(&options, &mut ProcessedSet::new());
    assert_eq!(summary.submitted, 1);

    let jobs = fs::read_to_string(&record).unwrap();
    let job = jobs.lines().next().unwrap();
    assert!(job.contains(&format!("--outdir {}", dir.path().join("custom_qa").display())));
    assert!(job.contains(&format!("--rawdir {}", config.paths.raw_dir.display())));
    assert!(job.contains(&format!("--indir {}", config.paths.redux_dir.display())));
    assert!(job.contains("--workers 2"));
    assert!(job.ends_with("run --night 20220101 --expid 1"));
}
