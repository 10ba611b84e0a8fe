use crate::utils::error::{CalSimError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// DSS sentinel for a missing value.
pub const MISSING_VALUE: f64 = -901.0;
/// Secondary sentinel that also reads back as missing.
pub const MISSING_VALUE_ALT: f64 = -902.0;

pub fn is_missing_sentinel(value: f64) -> bool {
    value == MISSING_VALUE || value == MISSING_VALUE_ALT || value.is_nan()
}

/// One observation of one record, the "tidy" (long) layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TidyRecord {
    pub study: Option<String>,
    pub datetime: NaiveDateTime,
    pub pathname: String,
    pub units: String,
    pub data_type: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TidyFrame {
    pub records: Vec<TidyRecord>,
}

impl TidyFrame {
    pub fn new(records: Vec<TidyRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_study(&self) -> bool {
        self.records.first().map(|r| r.study.is_some()).unwrap_or(false)
    }

    /// Unique studies in first-seen order.
    pub fn studies(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter_map(|r| r.study.clone())
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }

    /// Unique pathnames in first-seen order.
    pub fn pathnames(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .map(|r| r.pathname.clone())
            .filter(|p| seen.insert(p.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let with_study = self.records.iter().filter(|r| r.study.is_some()).count();
        if with_study != 0 && with_study != self.records.len() {
            return Err(CalSimError::validation(
                "Study must be set on every record or on none",
            ));
        }

        let mut keys = HashSet::with_capacity(self.records.len());
        for r in &self.records {
            let key = (&r.study, r.datetime, &r.pathname, &r.units, &r.data_type);
            if !keys.insert(key) {
                return Err(CalSimError::validation(format!(
                    "Table contains duplicate records: {} at {}. Please, remove duplicate data.",
                    r.pathname, r.datetime
                )));
            }
        }
        Ok(())
    }
}

/// Column header of the wide layout (one level per field).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub study: Option<String>,
    pub a: String,
    pub b: String,
    pub c: String,
    pub e: String,
    pub f: String,
    pub units: String,
    pub data_type: String,
}

impl SeriesKey {
    /// Legend label used by plots: the two leading header levels.
    pub fn label(&self) -> String {
        match &self.study {
            Some(study) => format!("{} {}", study, self.a),
            None => format!("{} {}", self.a, self.c),
        }
    }
}

/// Column header of the condense layout. Levels that are constant across the
/// whole table are dropped (`None`); units and data type are merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CondenseKey {
    pub study: Option<String>,
    pub a: Option<String>,
    pub b: String,
    pub c: Option<String>,
    pub e: Option<String>,
    pub f: Option<String>,
    pub units_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column<K> {
    pub key: K,
    pub values: Vec<Option<f64>>,
}

/// A time-indexed table with one column per series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFrame<K> {
    pub index: Vec<NaiveDateTime>,
    pub columns: Vec<Column<K>>,
}

pub type WideFrame = IndexedFrame<SeriesKey>;
pub type CondenseFrame = IndexedFrame<CondenseKey>;

impl<K> Default for IndexedFrame<K> {
    fn default() -> Self {
        Self {
            index: Vec::new(),
            columns: Vec::new(),
        }
    }
}

impl<K: Eq + std::hash::Hash + std::fmt::Debug> IndexedFrame<K> {
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if column.values.len() != self.index.len() {
                return Err(CalSimError::validation(format!(
                    "Column {:?} has {} values for an index of {}",
                    column.key,
                    column.values.len(),
                    self.index.len()
                )));
            }
            if !keys.insert(&column.key) {
                return Err(CalSimError::validation(format!(
                    "Table contains duplicate column {:?}. Please, remove duplicate data.",
                    column.key
                )));
            }
        }
        Ok(())
    }

    pub fn column(&self, key: &K) -> Option<&Column<K>> {
        self.columns.iter().find(|c| &c.key == key)
    }
}

/// Fills the pathname parts a condense table may have dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathDefaults {
    pub a: Option<String>,
    pub c: Option<String>,
    pub e: Option<String>,
    pub f: Option<String>,
}

impl PathDefaults {
    pub fn new(a: Option<&str>, c: Option<&str>, f: Option<&str>) -> Self {
        Self {
            a: a.map(str::to_string),
            c: c.map(str::to_string),
            e: None,
            f: f.map(str::to_string),
        }
    }
}

/// Any of the three supported table layouts.
#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    Tidy(TidyFrame),
    Wide(WideFrame),
    Condense(CondenseFrame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum TableFormat {
    Tidy,
    Wide,
    Condense,
}

impl Table {
    pub fn format(&self) -> TableFormat {
        match self {
            Table::Tidy(_) => TableFormat::Tidy,
            Table::Wide(_) => TableFormat::Wide,
            Table::Condense(_) => TableFormat::Condense,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Table::Tidy(t) => t.validate(),
            Table::Wide(w) => w.validate(),
            Table::Condense(c) => c.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudyFile {
    pub study: Option<String>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub pathname: String,
    pub file_path: PathBuf,
    pub study: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Distinct (study, file) pairs in catalog order.
    pub fn study_files(&self) -> Vec<StudyFile> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|e| StudyFile {
                study: e.study.clone(),
                path: e.file_path.clone(),
            })
            .filter(|sf| seen.insert(sf.clone()))
            .collect()
    }

    pub fn pathnames_for(&self, file: &StudyFile) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.file_path == file.path && e.study == file.study)
            .map(|e| e.pathname.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A regular series as exchanged with a DSS store (sentinels, not options).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegularSeries {
    pub start: NaiveDateTime,
    pub values: Vec<f64>,
    pub units: String,
    pub data_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(study: Option<&str>, day: u32, value: f64) -> TidyRecord {
        TidyRecord {
            study: study.map(str::to_string),
            datetime: NaiveDate::from_ymd_opt(2000, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            pathname: "/CALSIM/S_SHSTA/STORAGE//1DAY/L2015A/".to_string(),
            units: "TAF".to_string(),
            data_type: "INST-VAL".to_string(),
            value: Some(value),
        }
    }

    #[test]
    fn test_tidy_validate_duplicates() {
        let frame = TidyFrame::new(vec![record(None, 1, 1.0), record(None, 1, 2.0)]);
        assert!(frame.validate().is_err());

        let frame = TidyFrame::new(vec![record(None, 1, 1.0), record(None, 2, 2.0)]);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_tidy_validate_mixed_study() {
        let frame = TidyFrame::new(vec![record(Some("Base"), 1, 1.0), record(None, 2, 2.0)]);
        assert!(frame.validate().is_err());
    }

    #[test]
    fn test_wide_validate_lengths() {
        let key = SeriesKey {
            study: None,
            a: "CALSIM".into(),
            b: "S_SHSTA".into(),
            c: "STORAGE".into(),
            e: "1MON".into(),
            f: "L2015A".into(),
            units: "TAF".into(),
            data_type: "INST-VAL".into(),
        };
        let frame = WideFrame {
            index: vec![record(None, 1, 0.0).datetime],
            columns: vec![Column {
                key,
                values: vec![Some(1.0), Some(2.0)],
            }],
        };
        assert!(frame.validate().is_err());
    }

    #[test]
    fn test_sentinels() {
        assert!(is_missing_sentinel(-901.0));
        assert!(is_missing_sentinel(-902.0));
        assert!(!is_missing_sentinel(-900.0));
    }
}
