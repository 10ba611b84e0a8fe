//! CSV import/export of the three table layouts.

use crate::adapters::csv_store::{parse_datetime, DATETIME_FORMAT};
use crate::core::stats::{AnnualFrame, ExceedanceCurve, MonthlyMean};
use crate::domain::model::{
    is_missing_sentinel, Catalog, Column, CondenseFrame, CondenseKey, IndexedFrame, SeriesKey, Table,
    TidyFrame, TidyRecord, WideFrame,
};
use crate::domain::pathname::Pathname;
use crate::utils::error::{CalSimError, Result};
use chrono::NaiveDateTime;

const TIDY_HEADER: [&str; 5] = ["DateTime", "Pathname", "Units", "Data Type", "Value"];

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn format_datetime(t: &NaiveDateTime) -> String {
    t.format(DATETIME_FORMAT).to_string()
}

/// Serialize a tidy frame; the `Study` column comes first when present.
pub fn tidy_to_csv(frame: &TidyFrame) -> Result<Vec<u8>> {
    let with_study = frame.has_study();
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = Vec::with_capacity(6);
    if with_study {
        header.push("Study");
    }
    header.extend(TIDY_HEADER);
    writer.write_record(&header)?;

    for r in &frame.records {
        let mut row: Vec<String> = Vec::with_capacity(6);
        if with_study {
            row.push(r.study.clone().unwrap_or_default());
        }
        row.push(format_datetime(&r.datetime));
        row.push(r.pathname.clone());
        row.push(r.units.clone());
        row.push(r.data_type.clone());
        row.push(format_value(r.value));
        writer.write_record(&row)?;
    }

    into_bytes(writer)
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| CalSimError::format(format!("Failed to finish CSV output: {}", e)))
}

/// Parse a tidy CSV produced by `tidy_to_csv` (or by hand).
pub fn tidy_from_csv(data: &[u8]) -> Result<TidyFrame> {
    let mut reader = csv::Reader::from_reader(data);
    let headers = reader.headers()?.clone();
    let position = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| CalSimError::format(format!("Tidy CSV is missing column '{}'", name)))
    };

    let study_col = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("Study"));
    let datetime_col = position("DateTime")?;
    let pathname_col = position("Pathname")?;
    let units_col = position("Units")?;
    let type_col = position("Data Type")?;
    let value_col = position("Value")?;

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let field = |i: usize| row.get(i).unwrap_or("").trim();

        let raw_value = field(value_col);
        let value = if raw_value.is_empty() || raw_value.eq_ignore_ascii_case("nan") {
            None
        } else {
            let v: f64 = raw_value.parse().map_err(|_| {
                CalSimError::format(format!("Row {}: '{}' is not a number", line + 2, raw_value))
            })?;
            (!is_missing_sentinel(v)).then_some(v)
        };

        records.push(TidyRecord {
            study: study_col
                .map(|i| field(i).to_string())
                .filter(|s| !s.is_empty()),
            datetime: parse_datetime(field(datetime_col))?,
            pathname: field(pathname_col).to_uppercase(),
            units: field(units_col).to_uppercase(),
            data_type: field(type_col).to_uppercase(),
            value,
        });
    }

    let frame = TidyFrame::new(records);
    frame.validate()?;
    Ok(frame)
}

type Levels<'a> = Vec<(&'a str, Vec<String>)>;

/// One header row per column level, then one labelled row per index entry.
fn columns_to_csv<K>(labels: Vec<String>, columns: &[Column<K>], levels: Levels<'_>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for (name, values) in &levels {
        let mut row = Vec::with_capacity(values.len() + 1);
        row.push(name.to_string());
        row.extend(values.iter().cloned());
        writer.write_record(&row)?;
    }

    for (i, label) in labels.into_iter().enumerate() {
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(label);
        row.extend(columns.iter().map(|c| format_value(c.values.get(i).copied().flatten())));
        writer.write_record(&row)?;
    }

    into_bytes(writer)
}

fn indexed_to_csv<K>(frame: &IndexedFrame<K>, levels: Levels<'_>) -> Result<Vec<u8>> {
    let labels = frame.index.iter().map(format_datetime).collect();
    columns_to_csv(labels, &frame.columns, levels)
}

fn series_levels(keys: &[&SeriesKey]) -> Levels<'static> {
    let mut levels = Vec::new();
    if keys.iter().any(|k| k.study.is_some()) {
        levels.push((
            "Study",
            keys.iter().map(|k| k.study.clone().unwrap_or_default()).collect(),
        ));
    }
    levels.push(("Part A", keys.iter().map(|k| k.a.clone()).collect()));
    levels.push(("Part B", keys.iter().map(|k| k.b.clone()).collect()));
    levels.push(("Part C", keys.iter().map(|k| k.c.clone()).collect()));
    levels.push(("Part E", keys.iter().map(|k| k.e.clone()).collect()));
    levels.push(("Part F", keys.iter().map(|k| k.f.clone()).collect()));
    levels.push(("Units", keys.iter().map(|k| k.units.clone()).collect()));
    levels.push(("Data Type", keys.iter().map(|k| k.data_type.clone()).collect()));
    levels
}

pub fn wide_to_csv(frame: &WideFrame) -> Result<Vec<u8>> {
    let keys: Vec<_> = frame.columns.iter().map(|c| &c.key).collect();
    indexed_to_csv(frame, series_levels(&keys))
}

/// Water-year table, one row per water year.
pub fn annual_to_csv(frame: &AnnualFrame) -> Result<Vec<u8>> {
    let keys: Vec<_> = frame.columns.iter().map(|c| &c.key).collect();
    let labels = frame.water_years.iter().map(|wy| wy.to_string()).collect();
    columns_to_csv(labels, &frame.columns, series_levels(&keys))
}

/// Monthly means, one row per month from October.
pub fn monthly_to_csv(frame: &MonthlyMean) -> Result<Vec<u8>> {
    let keys: Vec<_> = frame.columns.iter().map(|c| &c.key).collect();
    let labels = frame.months.iter().map(|m| m.to_string()).collect();
    columns_to_csv(labels, &frame.columns, series_levels(&keys))
}

/// Exceedance curves in long form.
pub fn exceedance_to_csv(curves: &[ExceedanceCurve]) -> Result<Vec<u8>> {
    let with_study = curves.iter().any(|c| c.key.study.is_some());
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = Vec::with_capacity(6);
    if with_study {
        header.push("Study");
    }
    header.extend(["Pathname", "Units", "Data Type", "Probability", "Value"]);
    writer.write_record(&header)?;

    for curve in curves {
        let k = &curve.key;
        let pathname = Pathname::join(&k.a, &k.b, &k.c, &k.e, &k.f);
        for point in &curve.points {
            let mut row = Vec::with_capacity(6);
            if with_study {
                row.push(k.study.clone().unwrap_or_default());
            }
            row.extend([
                pathname.clone(),
                k.units.clone(),
                k.data_type.clone(),
                point.probability.to_string(),
                point.value.to_string(),
            ]);
            writer.write_record(&row)?;
        }
    }

    into_bytes(writer)
}

pub fn catalog_to_csv(catalog: &Catalog) -> Result<Vec<u8>> {
    let with_study = catalog.entries.iter().any(|e| e.study.is_some());
    let mut writer = csv::Writer::from_writer(Vec::new());
    if with_study {
        writer.write_record(["Study", "File", "Pathname"])?;
    } else {
        writer.write_record(["File", "Pathname"])?;
    }
    for e in &catalog.entries {
        let file = e.file_path.display().to_string();
        if with_study {
            writer.write_record([e.study.clone().unwrap_or_default(), file, e.pathname.clone()])?;
        } else {
            writer.write_record([file, e.pathname.clone()])?;
        }
    }
    into_bytes(writer)
}

pub fn condense_to_csv(frame: &CondenseFrame) -> Result<Vec<u8>> {
    let keys: Vec<_> = frame.columns.iter().map(|c| &c.key).collect();
    let optional = |get: fn(&CondenseKey) -> &Option<String>| {
        keys.iter()
            .any(|k| get(k).is_some())
            .then(|| {
                keys.iter()
                    .map(|k| get(k).clone().unwrap_or_default())
                    .collect::<Vec<String>>()
            })
    };

    let mut levels: Levels<'_> = Vec::new();
    if let Some(values) = optional(|k| &k.study) {
        levels.push(("Study", values));
    }
    if let Some(values) = optional(|k| &k.a) {
        levels.push(("Part A", values));
    }
    levels.push(("Part B", keys.iter().map(|k| k.b.clone()).collect()));
    if let Some(values) = optional(|k| &k.c) {
        levels.push(("Part C", values));
    }
    if let Some(values) = optional(|k| &k.e) {
        levels.push(("Part E", values));
    }
    if let Some(values) = optional(|k| &k.f) {
        levels.push(("Part F", values));
    }
    levels.push(("Units & Type", keys.iter().map(|k| k.units_type.clone()).collect()));
    indexed_to_csv(frame, levels)
}

/// Serialize any layout.
pub fn table_to_csv(table: &Table) -> Result<Vec<u8>> {
    match table {
        Table::Tidy(t) => tidy_to_csv(t),
        Table::Wide(w) => wide_to_csv(w),
        Table::Condense(c) => condense_to_csv(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CatalogEntry;
    use chrono::NaiveDate;

    fn t(m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2000, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_tidy_csv_keeps_missing() {
        let frame = TidyFrame::new(vec![
            TidyRecord {
                study: Some("Base".into()),
                datetime: t(1, 31),
                pathname: "/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/".into(),
                units: "TAF".into(),
                data_type: "INST-VAL".into(),
                value: None,
            },
            TidyRecord {
                study: Some("Base".into()),
                datetime: t(2, 29),
                pathname: "/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/".into(),
                units: "TAF".into(),
                data_type: "INST-VAL".into(),
                value: Some(2.5),
            },
        ]);

        let bytes = tidy_to_csv(&frame).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("Study,DateTime,Pathname,Units,Data Type,Value\n"));

        assert_eq!(tidy_from_csv(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_tidy_csv_sentinel_and_missing_column() {
        let data = b"DateTime,Pathname,Units,Data Type,Value\n2000-01-31,/a/b/c//1MON/f/,cfs,per-aver,-901\n";
        let frame = tidy_from_csv(data).unwrap();
        assert_eq!(frame.records[0].value, None);
        assert_eq!(frame.records[0].pathname, "/A/B/C//1MON/F/");

        assert!(tidy_from_csv(b"DateTime,Units\n").is_err());
    }

    #[test]
    fn test_condense_csv_levels() {
        let frame = CondenseFrame {
            index: vec![t(1, 31)],
            columns: vec![Column {
                key: CondenseKey {
                    study: None,
                    a: None,
                    b: "S_SHSTA".into(),
                    c: None,
                    e: None,
                    f: None,
                    units_type: "TAF INST-VAL".into(),
                },
                values: vec![Some(1.0)],
            }],
        };
        let text = String::from_utf8(condense_to_csv(&frame).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Part B,S_SHSTA");
        assert_eq!(lines[1], "Units & Type,TAF INST-VAL");
        assert_eq!(lines[2], "2000-01-31 00:00:00,1");
    }

    #[test]
    fn test_catalog_csv() {
        let catalog = Catalog {
            entries: vec![CatalogEntry {
                pathname: "/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/".into(),
                file_path: "DV.csv".into(),
                study: None,
            }],
        };
        let text = String::from_utf8(catalog_to_csv(&catalog).unwrap()).unwrap();
        assert_eq!(text, "File,Pathname\nDV.csv,/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/\n");
    }
}
