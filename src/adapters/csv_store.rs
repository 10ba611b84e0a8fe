use crate::domain::model::{RegularSeries, MISSING_VALUE};
use crate::domain::pathname::Pathname;
use crate::domain::ports::{DssBackend, DssStore};
use crate::utils::error::{CalSimError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Record store kept as a flat CSV file, one row per (pathname, timestep).
///
/// This is the exchange format the toolkit reads and writes natively; binary
/// HEC-DSS files are exported to / imported from it by the HEC tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvBackend;

impl DssBackend for CsvBackend {
    type Store = CsvStore;

    fn open(&self, path: &Path) -> Result<CsvStore> {
        CsvStore::open(path)
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["csv"]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "Pathname")]
    pathname: String,
    #[serde(rename = "DateTime")]
    datetime: String,
    #[serde(rename = "Units")]
    units: String,
    #[serde(rename = "Data Type")]
    data_type: String,
    #[serde(rename = "Value")]
    value: f64,
}

#[derive(Debug, Clone)]
struct StoredSeries {
    units: String,
    data_type: String,
    points: BTreeMap<NaiveDateTime, f64>,
}

#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    series: BTreeMap<String, StoredSeries>,
    dirty: bool,
}

pub fn parse_datetime(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::default()))
        })
        .map_err(|e| CalSimError::format(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn normalize(pathname: &str) -> Result<String> {
    Ok(Pathname::parse(pathname)?.without_d().to_string())
}

impl CsvStore {
    pub fn open(path: &Path) -> Result<Self> {
        let mut series: BTreeMap<String, StoredSeries> = BTreeMap::new();

        if path.exists() {
            let mut reader = csv::Reader::from_path(path)?;
            for row in reader.deserialize::<CsvRow>() {
                let row = row?;
                let key = normalize(&row.pathname)?;
                let datetime = parse_datetime(&row.datetime)?;
                let entry = series.entry(key).or_insert_with(|| StoredSeries {
                    units: row.units.clone(),
                    data_type: row.data_type.clone(),
                    points: BTreeMap::new(),
                });
                entry.units = row.units;
                entry.data_type = row.data_type;
                entry.points.insert(datetime, row.value);
            }
            tracing::debug!("Opened {} with {} records", path.display(), series.len());
        } else {
            tracing::debug!("{} does not exist yet; starting an empty store", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            series,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        for (pathname, stored) in &self.series {
            for (datetime, value) in &stored.points {
                writer.serialize(CsvRow {
                    pathname: pathname.clone(),
                    datetime: datetime.format(DATETIME_FORMAT).to_string(),
                    units: stored.units.clone(),
                    data_type: stored.data_type.clone(),
                    value: *value,
                })?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

impl DssStore for CsvStore {
    fn catalog(&self) -> Result<Vec<String>> {
        Ok(self.series.keys().cloned().collect())
    }

    fn read_regular(
        &self,
        pathname: &str,
        start: NaiveDateTime,
        count: usize,
    ) -> Result<RegularSeries> {
        let key = normalize(pathname)?;
        let step = Pathname::parse(&key)?.time_step()?;
        let stored = self
            .series
            .get(&key)
            .ok_or_else(|| CalSimError::RecordNotFound {
                pathname: pathname.to_string(),
                path: self.path.clone(),
            })?;

        let values = (0..count as i64)
            .map(|k| {
                stored
                    .points
                    .get(&step.advance(start, k))
                    .copied()
                    .unwrap_or(MISSING_VALUE)
            })
            .collect();

        Ok(RegularSeries {
            start,
            values,
            units: stored.units.clone(),
            data_type: stored.data_type.clone(),
        })
    }

    fn write_regular(&mut self, pathname: &str, series: &RegularSeries) -> Result<()> {
        let key = normalize(pathname)?;
        let step = Pathname::parse(&key)?.time_step()?;
        let entry = self.series.entry(key).or_insert_with(|| StoredSeries {
            units: series.units.clone(),
            data_type: series.data_type.clone(),
            points: BTreeMap::new(),
        });
        entry.units = series.units.clone();
        entry.data_type = series.data_type.clone();
        for (k, value) in series.values.iter().enumerate() {
            entry.points.insert(step.advance(series.start, k as i64), *value);
        }
        self.dirty = true;
        Ok(())
    }

    fn close(self) -> Result<()> {
        if self.dirty {
            self.flush()?;
            tracing::debug!("Flushed {} records to {}", self.series.len(), self.path.display());
        }
        Ok(())
    }
}
