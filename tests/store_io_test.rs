use calsim_toolkit::adapters::CsvBackend;
use calsim_toolkit::core::compare::{compare_studies, CompareOptions};
use calsim_toolkit::core::io::{
    parse_filepaths, read_catalog, read_dss, read_land_use, write_dss, CatalogFilter, ReadOptions,
    WriteTarget,
};
use calsim_toolkit::core::units::{review_file, UnitReviewOptions};
use calsim_toolkit::domain::model::{RegularSeries, TidyFrame, TidyRecord};
use calsim_toolkit::domain::ports::{DssBackend, DssStore};
use calsim_toolkit::CalSimError;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tempfile::TempDir;

const SHASTA: &str = "/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/";
const KESWICK: &str = "/CALSIM/C_KSWCK/CHANNEL//1MON/L2015A/";

fn t(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn seed(path: &Path, series: &[(&str, &str, &str, Vec<f64>)], start: NaiveDateTime) {
    let mut store = CsvBackend.open(path).unwrap();
    for (pathname, units, data_type, values) in series {
        store
            .write_regular(
                pathname,
                &RegularSeries {
                    start,
                    values: values.clone(),
                    units: units.to_string(),
                    data_type: data_type.to_string(),
                },
            )
            .unwrap();
    }
    store.close().unwrap();
}

fn window(start: NaiveDateTime, end: NaiveDateTime) -> ReadOptions {
    ReadOptions {
        filter: CatalogFilter::default(),
        start,
        end,
    }
}

#[test]
fn test_write_then_read_by_study() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("base.csv");
    let alt = temp_dir.path().join("alt.csv");

    let months = [t(1921, 10, 31), t(1921, 11, 30), t(1921, 12, 31)];
    let mut records = Vec::new();
    for (study, offset) in [("Base", 0.0), ("Alt", 10.0)] {
        for (i, datetime) in months.iter().enumerate() {
            records.push(TidyRecord {
                study: Some(study.to_string()),
                datetime: *datetime,
                pathname: SHASTA.to_string(),
                units: "TAF".to_string(),
                data_type: "INST-VAL".to_string(),
                value: (i != 1).then_some(offset + i as f64),
            });
        }
    }
    let frame = TidyFrame::new(records);

    let target = WriteTarget::ByStudy(BTreeMap::from([
        ("Base".to_string(), base.clone()),
        ("Alt".to_string(), alt.clone()),
    ]));
    write_dss(&CsvBackend, &frame, &target).unwrap();

    let files = parse_filepaths(&[&base, &alt], &["Base".to_string(), "Alt".to_string()]).unwrap();
    let read = read_dss(&CsvBackend, &files, &window(t(1921, 10, 31), t(1921, 12, 31))).unwrap();

    let cells = |f: &TidyFrame| -> BTreeSet<(Option<String>, NaiveDateTime, String, Option<i64>)> {
        f.records
            .iter()
            .map(|r| (r.study.clone(), r.datetime, r.pathname.clone(), r.value.map(|v| v as i64)))
            .collect()
    };
    assert_eq!(cells(&read), cells(&frame));
    assert!(read.records.iter().all(|r| r.units == "TAF"));
}

#[test]
fn test_write_rejects_unmapped_study() {
    let temp_dir = TempDir::new().unwrap();
    let frame = TidyFrame::new(vec![TidyRecord {
        study: Some("Base".into()),
        datetime: t(1921, 10, 31),
        pathname: SHASTA.into(),
        units: "TAF".into(),
        data_type: "INST-VAL".into(),
        value: Some(1.0),
    }]);
    let target = WriteTarget::ByStudy(BTreeMap::from([(
        "Alt".to_string(),
        temp_dir.path().join("alt.csv"),
    )]));
    assert!(write_dss(&CsvBackend, &frame, &target).is_err());
}

#[test]
fn test_catalog_filters() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("DV.csv");
    seed(
        &path,
        &[
            (SHASTA, "TAF", "INST-VAL", vec![1.0]),
            (KESWICK, "CFS", "PER-AVER", vec![2.0]),
        ],
        t(1921, 10, 31),
    );
    let files = parse_filepaths(&[&path], &[]).unwrap();

    let exact = CatalogFilter::exact().with_b(["S_SHSTA"]);
    let catalog = read_catalog(&CsvBackend, &files, &exact).unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.entries[0].pathname, SHASTA);

    let contains = CatalogFilter {
        c: vec!["chan".into()],
        ..CatalogFilter::contains()
    };
    let catalog = read_catalog(&CsvBackend, &files, &contains).unwrap();
    assert_eq!(catalog.entries[0].pathname, KESWICK);

    let none = CatalogFilter::exact().with_b(["S_OROVL"]);
    let result = read_catalog(&CsvBackend, &files, &none);
    assert!(matches!(result, Err(CalSimError::NoMatch { .. })));
}

#[test]
fn test_read_missing_file() {
    let files = parse_filepaths(&["does/not/exist.csv"], &[]).unwrap();
    let result = read_dss(&CsvBackend, &files, &ReadOptions::default());
    assert!(matches!(result, Err(CalSimError::FileNotFound { .. })));
}

#[test]
fn test_land_use_reads_year_4000_as_2000() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("SV.csv");
    let values: Vec<f64> = (1..=12).map(f64::from).collect();
    seed(
        &path,
        &[("/CALSIMHYDRO/LU_01/LANDUSE//1MON/2020D09E/", "ACRES", "PER-AVER", values)],
        t(4000, 1, 31),
    );

    let files = parse_filepaths(&[&path], &[]).unwrap();
    let frame = read_land_use(&CsvBackend, &files, &CatalogFilter::default()).unwrap();
    assert_eq!(frame.len(), 12);
    assert_eq!(frame.records[0].datetime, t(2000, 1, 31));
    assert_eq!(frame.records[11].datetime, t(2000, 12, 31));
    assert_eq!(frame.records[11].value, Some(12.0));
}

#[test]
fn test_compare_studies() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("base.csv");
    let alt = temp_dir.path().join("alt.csv");
    let start = t(1921, 10, 31);
    seed(
        &base,
        &[
            (SHASTA, "TAF", "INST-VAL", vec![1.0, 2.0]),
            (KESWICK, "CFS", "PER-AVER", vec![5.0, 5.0]),
            ("/CALSIM/S_OLD/STORAGE//1MON/L2015A/", "TAF", "INST-VAL", vec![0.0]),
        ],
        start,
    );
    seed(
        &alt,
        &[
            (SHASTA, "TAF", "INST-VAL", vec![1.0, 2.5]),
            (KESWICK, "CFS", "PER-AVER", vec![5.0, 5.0]),
            ("/CALSIM/S_NEW/STORAGE//1MON/L2015A/", "TAF", "INST-VAL", vec![0.0]),
        ],
        start,
    );

    let report = compare_studies(&CsvBackend, &base, &alt, &CompareOptions::default()).unwrap();
    assert_eq!(report.removed, vec!["S_OLD"]);
    assert_eq!(report.added, vec!["S_NEW"]);
    assert_eq!(report.changed, vec!["S_SHSTA"]);
    assert!(report.render().contains("Common variables with changes in"));
}

#[test]
fn test_unit_review_and_correction() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("SV.csv");
    seed(
        &path,
        &[
            (SHASTA, "TAF", "PER-AVER", vec![1.0, 2.0]),
            (KESWICK, "CFS", "PER-AVER", vec![5.0, 5.0]),
        ],
        t(1921, 10, 31),
    );

    let options = UnitReviewOptions {
        init: false,
        correct: true,
    };
    let review = review_file(&CsvBackend, &path, options).unwrap();
    assert!(review.corrected);
    assert_eq!(review.part_b, vec!["S_SHSTA"]);

    let again = review_file(&CsvBackend, &path, UnitReviewOptions::default()).unwrap();
    assert!(again.issues.is_empty());
    assert_eq!(again.render(), "Found no variables requiring unit correction.");

    let wrong_ext = review_file(&CsvBackend, &temp_dir.path().join("SV.dss"), options);
    assert!(wrong_ext.is_err());
}
