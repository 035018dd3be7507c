use std::collections::BTreeMap;
use std::fs;

use nightqa_core::{CellValue, EntityTable, Exposure, ExposureId, Granularity, RowKey, Severity};
use serde_json::json;
use tempfile::TempDir;

use super::*;

const NIGHT: u32 = 20220315;

fn id() -> ExposureId {
    ExposureId::new(NIGHT, 7)
}

fn exposure(program: &str, tairtemp: f64) -> Exposure {
    let header = [
        ("OBSTYPE".to_string(), json!("ARC")),
        ("PROGRAM".to_string(), json!(program)),
        ("EXPTIME".to_string(), json!(5.0)),
        ("TAIRTEMP".to_string(), json!(tairtemp)),
    ]
    .into_iter()
    .collect();
    Exposure::from_header(id(), header)
}

fn write(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

fn amp_table(rows: Vec<(char, char, Vec<(&str, CellValue)>)>) -> EntityTable {
    let mut table = EntityTable::new(Granularity::Amp);
    for (cam, amp, values) in rows {
        table.insert_row(RowKey::amp(id(), 0, cam, amp), values).unwrap();
    }
    table
}

fn tables(list: Vec<EntityTable>) -> BTreeMap<Granularity, EntityTable> {
    list.into_iter().map(|t| (t.granularity(), t)).collect()
}

#[test]
fn rollup_is_worst_metric_per_row() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "READNOISE-20220101.yaml",
        "band: {lower_err: 1.0, lower: 2.0, upper: 4.0, upper_err: 6.0}\n",
    );
    write(
        &dir,
        "BIAS-20220101.json",
        r#"{"band": {"lower_err": 0, "lower": 100, "upper": 2000, "upper_err": 3000}}"#,
    );

    let table = amp_table(vec![
        ('b', 'a', vec![("READNOISE", 3.0.into()), ("BIAS", 500.0.into())]),
        ('b', 'b', vec![("READNOISE", 4.0.into()), ("BIAS", 500.0.into())]),
        ('b', 'c', vec![("READNOISE", 3.0.into()), ("BIAS", 3000.0.into())]),
        ('b', 'd', vec![("READNOISE", CellValue::Null), ("COSMICS_RATE", 0.1.into())]),
    ]);

    let evaluator = StatusEvaluator::new(dir.path());
    let report = evaluator.evaluate(&exposure("dark", 10.0), &tables(vec![table])).unwrap();
    let amp = &report.tables[&Granularity::Amp];

    assert_eq!(amp.evaluated_metrics, vec!["READNOISE".to_string(), "BIAS".to_string()]);
    let by_entity: BTreeMap<&str, &RowStatus> = amp.rows.iter().map(|r| (r.entity.as_str(), r)).collect();
    assert_eq!(by_entity["B0A"].qastatus, Severity::Ok);
    assert_eq!(by_entity["B0B"].qastatus, Severity::Warning);
    assert_eq!(by_entity["B0C"].qastatus, Severity::Error);
    // Null READNOISE and an unconfigured COSMICS_RATE: nothing evaluated.
    assert!(by_entity["B0D"].metrics.is_empty());
    assert_eq!(by_entity["B0D"].qastatus, Severity::Ok);

    for row in &amp.rows {
        assert_eq!(row.qastatus, Severity::worst(row.metrics.values().map(|m| m.severity)));
    }
    assert_eq!(amp.status, Severity::Error);
    assert_eq!(report.status, Severity::Error);
    assert!(report.warnings.is_empty());
}

#[test]
fn entity_bands_leave_unknown_entities_unevaluated() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "READNOISE-20220101.json",
        r#"{"entities": {"B0A": {"lower_err": 1, "lower": 2, "upper": 4, "upper_err": 6}}}"#,
    );
    let table = amp_table(vec![
        ('b', 'a', vec![("READNOISE", 5.0.into())]),
        ('r', 'a', vec![("READNOISE", 100.0.into())]),
    ]);

    let report = StatusEvaluator::new(dir.path())
        .evaluate(&exposure("dark", 10.0), &tables(vec![table]))
        .unwrap();
    let rows = &report.tables[&Granularity::Amp].rows;
    assert_eq!(rows[0].entity, "B0A");
    assert_eq!(rows[0].qastatus, Severity::Warning);
    assert_eq!(rows[1].entity, "R0A");
    assert!(rows[1].metrics.is_empty());
    assert_eq!(report.status, Severity::Warning);
}

#[test]
fn granularity_restricted_threshold_skips_other_tables() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "NCAM-20220101.yaml",
        "granularity: PER_EXP\nband: {lower_err: 0, lower: 10, upper: 31, upper_err: 32}\n",
    );
    let mut spectro = EntityTable::new(Granularity::Spectro);
    spectro
        .insert_row(RowKey::spectro(id(), 0), [("NCAM", CellValue::Int(1))])
        .unwrap();
    let mut exp = EntityTable::new(Granularity::Exposure);
    exp.insert_row(RowKey::exposure(id()), [("NCAM", CellValue::Int(3))])
        .unwrap();

    let report = StatusEvaluator::new(dir.path())
        .evaluate(&exposure("dark", 10.0), &tables(vec![spectro, exp]))
        .unwrap();
    assert!(report.tables[&Granularity::Spectro].evaluated_metrics.is_empty());
    assert_eq!(report.tables[&Granularity::Exposure].status, Severity::Warning);
    assert_eq!(report.tables[&Granularity::Exposure].rows[0].entity, "");
}

#[test]
fn stale_threshold_is_used_and_reported() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "READNOISE-20230101.yaml",
        "band: {lower_err: 1.0, lower: 2.0, upper: 4.0, upper_err: 6.0}\n",
    );
    let table = amp_table(vec![('b', 'a', vec![("READNOISE", 3.0.into())])]);

    let report = StatusEvaluator::new(dir.path())
        .evaluate(&exposure("dark", 10.0), &tables(vec![table]))
        .unwrap();
    assert_eq!(report.tables[&Granularity::Amp].evaluated_metrics.len(), 1);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("READNOISE"));
}

#[test]
fn malformed_threshold_skips_only_that_metric() {
    let dir = TempDir::new().unwrap();
    write(&dir, "READNOISE-20220101.json", "{broken");
    write(
        &dir,
        "BIAS-20220101.json",
        r#"{"band": {"lower_err": 0, "lower": 100, "upper": 2000, "upper_err": 3000}}"#,
    );
    write(
        &dir,
        "COSMICS_RATE-20220101.json",
        r#"{"band": {"lower_err": 5, "lower": 1, "upper": 2, "upper_err": 3}}"#,
    );
    let table = amp_table(vec![(
        'b',
        'a',
        vec![("READNOISE", 3.0.into()), ("BIAS", 5000.0.into()), ("COSMICS_RATE", 9.0.into())],
    )]);

    let report = StatusEvaluator::new(dir.path())
        .evaluate(&exposure("dark", 10.0), &tables(vec![table]))
        .unwrap();
    let amp = &report.tables[&Granularity::Amp];
    assert_eq!(amp.evaluated_metrics, vec!["BIAS".to_string()]);
    assert_eq!(amp.status, Severity::Error);
    assert_eq!(report.warnings.len(), 2);
}

fn calibration_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "calibration-20220101.yaml",
        r#"
LED arc:
  INTEG_RAW_FLUX:
    covariate: TAIRTEMP
    slope: 10.0
    reference_covariate: 10.0
    warn_frac: 0.05
    error_frac: 0.1
    nominal:
      B0: 1000.0
"#,
    );
    dir
}

fn camera_flux(value: f64) -> EntityTable {
    let mut table = EntityTable::new(Granularity::Camera);
    table
        .insert_row(RowKey::camera(id(), 0, 'b'), [("INTEG_RAW_FLUX", CellValue::Float(value))])
        .unwrap();
    table
}

#[test]
fn drift_metric_is_corrected_before_classification() {
    let thresholds = TempDir::new().unwrap();
    let calib = calibration_dir();
    let evaluator = StatusEvaluator::new(thresholds.path())
        .with_calibration(calib.path(), "calibration")
        .with_drift_metrics(["INTEG_RAW_FLUX"]);

    // Raw 1100 at 20 degrees corrects to 1000: nominal.
    let report = evaluator
        .evaluate(&exposure("LED arc", 20.0), &tables(vec![camera_flux(1100.0)]))
        .unwrap();
    let row = &report.tables[&Granularity::Camera].rows[0];
    let metric = &row.metrics["INTEG_RAW_FLUX"];
    assert_eq!(metric.value, 1100.0);
    assert_eq!(metric.corrected, Some(1000.0));
    assert_eq!(metric.severity, Severity::Ok);

    // At the reference temperature nothing is corrected.
    let report = evaluator
        .evaluate(&exposure("LED arc", 10.0), &tables(vec![camera_flux(1150.0)]))
        .unwrap();
    assert_eq!(report.status, Severity::Error);
}

#[test]
fn drift_fallback_thresholds_respect_granularity() {
    let mut table = camera_flux(1000.0);
    table
        .insert_row(RowKey::camera(id(), 0, 'r'), [("INTEG_RAW_FLUX", CellValue::Float(50.0))])
        .unwrap();
    let calib = calibration_dir();
    let band = "band: {lower_err: 0, lower: 100, upper: 900, upper_err: 2000}";

    let restricted = TempDir::new().unwrap();
    write(
        &restricted,
        "INTEG_RAW_FLUX-20220101.yaml",
        &format!("granularity: PER_EXP\n{band}\n"),
    );
    let report = StatusEvaluator::new(restricted.path())
        .with_calibration(calib.path(), "calibration")
        .with_drift_metrics(["INTEG_RAW_FLUX"])
        .evaluate(&exposure("LED arc", 10.0), &tables(vec![table.clone()]))
        .unwrap();
    let row = |report: &ExposureStatus, entity: &str| {
        report.tables[&Granularity::Camera]
            .rows
            .iter()
            .find(|r| r.entity == entity)
            .unwrap()
            .metrics
            .clone()
    };
    assert_eq!(row(&report, "B0")["INTEG_RAW_FLUX"].severity, Severity::Ok);
    assert!(row(&report, "R0").is_empty());

    let open = TempDir::new().unwrap();
    write(&open, "INTEG_RAW_FLUX-20220101.yaml", &format!("{band}\n"));
    let report = StatusEvaluator::new(open.path())
        .with_calibration(calib.path(), "calibration")
        .with_drift_metrics(["INTEG_RAW_FLUX"])
        .evaluate(&exposure("LED arc", 10.0), &tables(vec![table]))
        .unwrap();
    assert_eq!(row(&report, "R0")["INTEG_RAW_FLUX"].severity, Severity::Warning);
}

#[test]
fn missing_program_skips_only_drift_metric() {
    let thresholds = TempDir::new().unwrap();
    write(
        &thresholds,
        "MEANDX-20220101.json",
        r#"{"band": {"lower_err": -1, "lower": -0.5, "upper": 0.5, "upper_err": 1}}"#,
    );
    let calib = calibration_dir();
    let evaluator = StatusEvaluator::new(thresholds.path())
        .with_calibration(calib.path(), "calibration")
        .with_drift_metrics(["INTEG_RAW_FLUX"]);

    let mut table = camera_flux(1.0);
    let idx = table.ensure_metric("MEANDX").unwrap();
    table.row_entry(RowKey::camera(id(), 0, 'b')).unwrap()[idx] = CellValue::Float(0.7);

    let report = evaluator
        .evaluate(&exposure("unknown program", 20.0), &tables(vec![table]))
        .unwrap();
    let camera = &report.tables[&Granularity::Camera];
    assert_eq!(camera.evaluated_metrics, vec!["MEANDX".to_string()]);
    assert_eq!(camera.status, Severity::Warning);
    assert_eq!(report.warnings.len(), 1);
}

#[test]
fn missing_covariate_skips_drift_metric() {
    let thresholds = TempDir::new().unwrap();
    let calib = calibration_dir();
    let evaluator = StatusEvaluator::new(thresholds.path())
        .with_calibration(calib.path(), "calibration")
        .with_drift_metrics(["INTEG_RAW_FLUX"]);

    let header = [("PROGRAM".to_string(), json!("LED arc"))].into_iter().collect();
    let exp = Exposure::from_header(id(), header);
    let report = evaluator.evaluate(&exp, &tables(vec![camera_flux(1.0)])).unwrap();
    assert!(report.tables[&Granularity::Camera].evaluated_metrics.is_empty());
    assert!(report.warnings[0].contains("TAIRTEMP"));
}

#[test]
fn calibration_family_without_files_is_fatal() {
    let thresholds = TempDir::new().unwrap();
    let calib = TempDir::new().unwrap();
    let evaluator = StatusEvaluator::new(thresholds.path())
        .with_calibration(calib.path(), "calibration")
        .with_drift_metrics(["INTEG_RAW_FLUX"]);

    let err = evaluator
        .evaluate(&exposure("LED arc", 20.0), &tables(vec![camera_flux(1.0)]))
        .unwrap_err();
    assert!(err.is_fatal());

    // Without a drift metric in the tables the calibration store is not consulted.
    let report = evaluator
        .evaluate(&exposure("LED arc", 20.0), &tables(vec![amp_table(vec![])]))
        .unwrap();
    assert_eq!(report.status, Severity::Ok);
}

#[test]
fn report_serializes_with_qastatus_field() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "READNOISE-20220101.yaml",
        "band: {lower_err: 1.0, lower: 2.0, upper: 4.0, upper_err: 6.0}\n",
    );
    let table = amp_table(vec![('b', 'a', vec![("READNOISE", 3.0.into())])]);
    let report = StatusEvaluator::new(dir.path())
        .evaluate(&exposure("dark", 10.0), &tables(vec![table]))
        .unwrap();

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["tables"]["PER_AMP"]["rows"][0]["QASTATUS"], "ok");

    let back: ExposureStatus = serde_json::from_value(value).unwrap();
    assert_eq!(back, report);
}
