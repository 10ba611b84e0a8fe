use crate::domain::model::{
    is_missing_sentinel, Catalog, CatalogEntry, RegularSeries, StudyFile, TidyFrame, TidyRecord,
    MISSING_VALUE,
};
use crate::domain::pathname::{Pathname, TimeStep};
use crate::domain::ports::{DssBackend, DssStore};
use crate::utils::error::{CalSimError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Pair file paths with study names.
///
/// With no study names, a single file carries no study and several files are
/// labelled `Alt0`, `Alt1`, ...
pub fn parse_filepaths<P: AsRef<Path>>(paths: &[P], studies: &[String]) -> Result<Vec<StudyFile>> {
    if paths.is_empty() {
        return Err(CalSimError::validation("At least one file path is required"));
    }
    if !studies.is_empty() && studies.len() != paths.len() {
        return Err(CalSimError::validation(format!(
            "Number of file paths ({}) must equal number of study names ({})",
            paths.len(),
            studies.len()
        )));
    }

    let study_for = |i: usize| -> Option<String> {
        if !studies.is_empty() {
            Some(studies[i].clone())
        } else if paths.len() > 1 {
            Some(format!("Alt{}", i))
        } else {
            None
        }
    };

    Ok(paths
        .iter()
        .enumerate()
        .map(|(i, p)| StudyFile {
            study: study_for(i),
            path: p.as_ref().to_path_buf(),
        })
        .collect())
}

/// Pathname part filters. Empty lists match everything.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogFilter {
    pub a: Vec<String>,
    pub b: Vec<String>,
    pub c: Vec<String>,
    pub e: Vec<String>,
    pub f: Vec<String>,
    /// Whole-part membership when set, substring (regex alternation) otherwise.
    pub exact: bool,
}

impl Default for CatalogFilter {
    fn default() -> Self {
        Self {
            a: Vec::new(),
            b: Vec::new(),
            c: Vec::new(),
            e: Vec::new(),
            f: Vec::new(),
            exact: true,
        }
    }
}

impl CatalogFilter {
    pub fn exact() -> Self {
        Self::default()
    }

    pub fn contains() -> Self {
        Self {
            exact: false,
            ..Self::default()
        }
    }

    pub fn with_b<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.b = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
            && self.b.is_empty()
            && self.c.is_empty()
            && self.e.is_empty()
            && self.f.is_empty()
    }

    fn compile(&self) -> Result<CompiledFilter> {
        let part = |values: &[String]| -> Result<Option<PartMatcher>> {
            if values.is_empty() {
                return Ok(None);
            }
            let upper: Vec<String> = values.iter().map(|v| v.trim().to_uppercase()).collect();
            if self.exact {
                Ok(Some(PartMatcher::Exact(upper.into_iter().collect())))
            } else {
                Ok(Some(PartMatcher::Contains(Regex::new(&upper.join("|"))?)))
            }
        };
        Ok(CompiledFilter {
            a: part(&self.a)?,
            b: part(&self.b)?,
            c: part(&self.c)?,
            e: part(&self.e)?,
            f: part(&self.f)?,
        })
    }
}

enum PartMatcher {
    Exact(HashSet<String>),
    Contains(Regex),
}

impl PartMatcher {
    fn matches(&self, part: &str) -> bool {
        match self {
            PartMatcher::Exact(set) => set.contains(part),
            PartMatcher::Contains(re) => re.is_match(part),
        }
    }
}

struct CompiledFilter {
    a: Option<PartMatcher>,
    b: Option<PartMatcher>,
    c: Option<PartMatcher>,
    e: Option<PartMatcher>,
    f: Option<PartMatcher>,
}

impl CompiledFilter {
    fn matches(&self, p: &Pathname) -> bool {
        [
            (&self.a, &p.a),
            (&self.b, &p.b),
            (&self.c, &p.c),
            (&self.e, &p.e),
            (&self.f, &p.f),
        ]
        .into_iter()
        .all(|(matcher, part)| match matcher {
            Some(m) => m.matches(part),
            None => true,
        })
    }
}

/// Query the catalogs of one or more stores.
pub fn read_catalog<B: DssBackend>(
    backend: &B,
    files: &[StudyFile],
    filter: &CatalogFilter,
) -> Result<Catalog> {
    let compiled = filter.compile()?;
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for file in files {
        if !file.path.exists() {
            return Err(CalSimError::FileNotFound {
                path: file.path.clone(),
            });
        }

        let store = backend.open(&file.path)?;
        let mut matched = 0usize;
        for raw in store.catalog()? {
            let pathname = Pathname::parse(&raw)?.without_d();
            if !compiled.matches(&pathname) {
                continue;
            }
            matched += 1;
            let entry = CatalogEntry {
                pathname: pathname.to_string(),
                file_path: file.path.clone(),
                study: file.study.clone(),
            };
            if seen.insert(entry.clone()) {
                entries.push(entry);
            }
        }
        store.close()?;

        if matched == 0 {
            return Err(CalSimError::NoMatch {
                path: file.path.clone(),
            });
        }
        tracing::debug!("📚 {} pathnames matched in {}", matched, file.path.display());
    }

    Ok(Catalog { entries })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    pub filter: CatalogFilter,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            filter: CatalogFilter::default(),
            start: midnight(1921, 10, 31),
            end: midnight(2003, 9, 30),
        }
    }
}

impl ReadOptions {
    pub fn with_filter(filter: CatalogFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

pub(crate) fn midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Read regular series into a tidy frame.
pub fn read_dss<B: DssBackend>(
    backend: &B,
    files: &[StudyFile],
    opts: &ReadOptions,
) -> Result<TidyFrame> {
    if opts.start > opts.end {
        return Err(CalSimError::validation(format!(
            "Start date {} is after end date {}",
            opts.start, opts.end
        )));
    }
    let catalog = read_catalog(backend, files, &opts.filter)?;
    read_catalog_series(backend, &catalog, |step| {
        let index = step.range(opts.start, opts.end);
        let start = index.first().copied().unwrap_or(opts.start);
        (start, index)
    })
}

/// Read CalSimHydro repeating monthly series (stored in year 4000) as year 2000.
pub fn read_land_use<B: DssBackend>(
    backend: &B,
    files: &[StudyFile],
    filter: &CatalogFilter,
) -> Result<TidyFrame> {
    let catalog = read_catalog(backend, files, filter)?;
    read_catalog_series(backend, &catalog, |step| {
        let index = step.range(midnight(2000, 1, 31), midnight(2000, 12, 31));
        (midnight(4000, 1, 31), index)
    })
}

fn read_catalog_series<B, F>(backend: &B, catalog: &Catalog, window: F) -> Result<TidyFrame>
where
    B: DssBackend,
    F: Fn(TimeStep) -> (NaiveDateTime, Vec<NaiveDateTime>),
{
    let mut records = Vec::new();

    for file in catalog.study_files() {
        let store = backend.open(&file.path)?;
        for pathname in catalog.pathnames_for(&file) {
            let step = Pathname::parse(pathname)?.time_step()?;
            let (read_start, index) = window(step);
            let series = store.read_regular(pathname, read_start, index.len())?;
            let units = series.units.to_uppercase();
            let data_type = series.data_type.to_uppercase();

            records.extend(index.into_iter().zip(series.values).map(|(datetime, value)| {
                TidyRecord {
                    study: file.study.clone(),
                    datetime,
                    pathname: pathname.to_string(),
                    units: units.clone(),
                    data_type: data_type.clone(),
                    value: (!is_missing_sentinel(value)).then_some(value),
                }
            }));
        }
        store.close()?;
        tracing::info!(
            "📥 Read {} from {}",
            file.study.as_deref().unwrap_or("records"),
            file.path.display()
        );
    }

    Ok(TidyFrame::new(records))
}

/// Destination of `write_dss`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteTarget {
    Single(PathBuf),
    ByStudy(BTreeMap<String, PathBuf>),
}

impl WriteTarget {
    /// One bare `PATH`, or `STUDY=PATH` per study.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        match specs {
            [] => Err(CalSimError::MissingConfigError {
                field: "target".to_string(),
            }),
            [single] if !single.as_ref().contains('=') => {
                Ok(WriteTarget::Single(PathBuf::from(single.as_ref())))
            }
            _ => specs
                .iter()
                .map(|spec| match spec.as_ref().split_once('=') {
                    Some((study, path)) if !study.trim().is_empty() => {
                        Ok((study.trim().to_string(), PathBuf::from(path.trim())))
                    }
                    _ => Err(CalSimError::InvalidConfigValueError {
                        field: "target".to_string(),
                        value: spec.as_ref().to_string(),
                        reason: "Expected STUDY=PATH when writing several studies".to_string(),
                    }),
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(WriteTarget::ByStudy),
        }
    }
}

/// Write a tidy frame, one regular series per pathname.
pub fn write_dss<B: DssBackend>(backend: &B, frame: &TidyFrame, target: &WriteTarget) -> Result<()> {
    frame.validate()?;

    let targets: Vec<(Option<String>, PathBuf)> = match (frame.has_study(), target) {
        (true, WriteTarget::ByStudy(map)) => {
            let given: BTreeSet<&String> = map.keys().collect();
            let studies = frame.studies();
            let present: BTreeSet<&String> = studies.iter().collect();
            let missing: Vec<&String> = present.difference(&given).copied().collect();
            let extra: Vec<&String> = given.difference(&present).copied().collect();
            if !missing.is_empty() || !extra.is_empty() {
                let mut msg = Vec::new();
                if !missing.is_empty() {
                    msg.push(format!("Studies missing from the file mapping: {:?}", missing));
                }
                if !extra.is_empty() {
                    msg.push(format!("Studies not present in the table: {:?}", extra));
                }
                return Err(CalSimError::validation(msg.join("; ")));
            }
            map.iter()
                .map(|(study, path)| (Some(study.clone()), path.clone()))
                .collect()
        }
        (true, WriteTarget::Single(_)) => {
            return Err(CalSimError::validation(
                "A table with studies requires a study to file path mapping",
            ))
        }
        (false, WriteTarget::Single(path)) => vec![(None, path.clone())],
        (false, WriteTarget::ByStudy(_)) => {
            return Err(CalSimError::validation(
                "A table without studies requires a single file path",
            ))
        }
    };

    for (study, path) in targets {
        let mut store = backend.open(&path)?;
        let subset: Vec<&TidyRecord> = frame
            .records
            .iter()
            .filter(|r| r.study == study)
            .collect();

        let mut pathnames: Vec<&str> = Vec::new();
        let mut seen = HashSet::new();
        for r in &subset {
            if seen.insert(r.pathname.as_str()) {
                pathnames.push(r.pathname.as_str());
            }
        }

        for pathname in pathnames {
            let mut rows: Vec<&TidyRecord> = subset
                .iter()
                .copied()
                .filter(|r| r.pathname == pathname)
                .collect();
            rows.sort_by_key(|r| r.datetime);
            let Some(first) = rows.first() else { continue };

            let series = RegularSeries {
                start: first.datetime,
                values: rows.iter().map(|r| r.value.unwrap_or(MISSING_VALUE)).collect(),
                units: first.units.clone(),
                data_type: first.data_type.clone(),
            };
            store.write_regular(pathname, &series)?;
        }
        store.close()?;

        match &study {
            Some(study) => tracing::info!("💾 Study {} written to {}", study, path.display()),
            None => tracing::info!("💾 Table written to {}", path.display()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::csv_store::CsvBackend;
    use tempfile::TempDir;

    fn seed(path: &Path, pathnames: &[&str]) {
        let mut store = CsvBackend.open(path).unwrap();
        for p in pathnames {
            store
                .write_regular(
                    p,
                    &RegularSeries {
                        start: midnight(1921, 10, 31),
                        values: vec![1.0, -902.0, 3.0],
                        units: "taf".into(),
                        data_type: "per-cum".into(),
                    },
                )
                .unwrap();
        }
        store.close().unwrap();
    }

    #[test]
    fn test_parse_filepaths_labels() {
        let one = parse_filepaths(&["a.csv"], &[]).unwrap();
        assert_eq!(one[0].study, None);

        let two = parse_filepaths(&["a.csv", "b.csv"], &[]).unwrap();
        assert_eq!(two[1].study.as_deref(), Some("Alt1"));

        assert!(parse_filepaths(&["a.csv", "b.csv"], &["Base".to_string()]).is_err());
    }

    #[test]
    fn test_catalog_filters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dv.csv");
        seed(
            &path,
            &[
                "/CALSIM/C_KSWCK/CHANNEL//1MON/L2015A/",
                "/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/",
            ],
        );
        let files = parse_filepaths(&[&path], &[]).unwrap();

        let catalog = read_catalog(&CsvBackend, &files, &CatalogFilter::contains().with_b(["shsta"]))
            .unwrap();
        assert_eq!(catalog.len(), 1);

        let exact = CatalogFilter::exact().with_b(["SHSTA"]);
        let err = read_catalog(&CsvBackend, &files, &exact).unwrap_err();
        assert!(matches!(err, CalSimError::NoMatch { .. }));
    }

    #[test]
    fn test_default_filter_matches_whole_parts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dv.csv");
        seed(
            &path,
            &[
                "/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/",
                "/CALSIM/S_SHSTA_X/STORAGE//1MON/L2015A/",
            ],
        );
        let files = parse_filepaths(&[&path], &[]).unwrap();

        assert!(CatalogFilter::default().exact);
        let catalog = read_catalog(&CsvBackend, &files, &CatalogFilter::default().with_b(["s_shsta"]))
            .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entries[0].pathname, "/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/");

        let opts = ReadOptions {
            filter: CatalogFilter::default().with_b(["S_SHSTA"]),
            end: midnight(1922, 1, 31),
            ..ReadOptions::default()
        };
        let frame = read_dss(&CsvBackend, &files, &opts).unwrap();
        assert!(frame
            .records
            .iter()
            .all(|r| r.pathname == "/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/"));
    }

    #[test]
    fn test_read_maps_sentinels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dv.csv");
        seed(&path, &["/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/"]);
        let files = parse_filepaths(&[&path], &[]).unwrap();

        let opts = ReadOptions {
            end: midnight(1922, 1, 31),
            ..ReadOptions::default()
        };
        let frame = read_dss(&CsvBackend, &files, &opts).unwrap();
        let values: Vec<Option<f64>> = frame.records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![Some(1.0), None, Some(3.0), None]);
        assert_eq!(frame.records[0].units, "TAF");
        assert_eq!(frame.records[0].data_type, "PER-CUM");
    }

    #[test]
    fn test_missing_file() {
        let files = parse_filepaths(&["/nonexistent/dv.csv"], &[]).unwrap();
        let err = read_catalog(&CsvBackend, &files, &CatalogFilter::default()).unwrap_err();
        assert!(matches!(err, CalSimError::FileNotFound { .. }));
    }

    #[test]
    fn test_write_target_specs() {
        assert_eq!(
            WriteTarget::parse(&["DV.csv"]).unwrap(),
            WriteTarget::Single("DV.csv".into())
        );
        let WriteTarget::ByStudy(map) = WriteTarget::parse(&["Base=base.csv", "Alt=alt.csv"]).unwrap() else {
            panic!("expected per-study targets");
        };
        assert_eq!(map["Alt"], PathBuf::from("alt.csv"));
        assert!(WriteTarget::parse(&["a.csv", "b.csv"]).is_err());
        assert!(WriteTarget::parse::<&str>(&[]).is_err());
    }
}
