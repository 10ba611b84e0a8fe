use crate::core::io::{midnight, parse_filepaths, read_catalog, read_dss, CatalogFilter, ReadOptions};
use crate::domain::model::TidyFrame;
use crate::domain::pathname::Pathname;
use crate::domain::ports::DssBackend;
use crate::utils::error::Result;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct CompareOptions {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            start: midnight(1921, 10, 31),
            end: midnight(2015, 9, 30),
        }
    }
}

/// Part B differences of an alternative study relative to a baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub baseline: PathBuf,
    pub alternative: PathBuf,
    pub removed: Vec<String>,
    pub added: Vec<String>,
    pub changed: Vec<String>,
}

impl ComparisonReport {
    pub fn render(&self) -> String {
        let base = self.baseline.display();
        let alt = self.alternative.display();
        let section = |heading: String, names: &[String]| {
            std::iter::once(heading)
                .chain(names.iter().cloned())
                .collect::<Vec<_>>()
                .join("\n")
        };

        [
            section(
                format!("Variables removed from {} relative to {}.", alt, base),
                &self.removed,
            ),
            section(
                format!("Variables added to {} relative to {}.", alt, base),
                &self.added,
            ),
            section(
                format!("Common variables with changes in {} relative to {}.", alt, base),
                &self.changed,
            ),
        ]
        .join("\n\n")
    }

    pub fn has_differences(&self) -> bool {
        !(self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty())
    }
}

fn part_bs<S: AsRef<str>>(pathnames: impl IntoIterator<Item = S>) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for p in pathnames {
        let b = Pathname::parse(p.as_ref())?.b;
        if seen.insert(b.clone()) {
            out.push(b);
        }
    }
    Ok(out)
}

fn values_by_cell(frame: &TidyFrame) -> HashMap<(&str, NaiveDateTime), f64> {
    frame
        .records
        .iter()
        .filter_map(|r| r.value.map(|v| ((r.pathname.as_str(), r.datetime), v)))
        .collect()
}

/// Compare the catalogs and common series of two stores.
pub fn compare_studies<B: DssBackend>(
    backend: &B,
    baseline: &Path,
    alternative: &Path,
    opts: &CompareOptions,
) -> Result<ComparisonReport> {
    let base_files = parse_filepaths(&[baseline], &[])?;
    let alt_files = parse_filepaths(&[alternative], &[])?;

    let base_catalog = read_catalog(backend, &base_files, &CatalogFilter::default())?;
    let alt_catalog = read_catalog(backend, &alt_files, &CatalogFilter::default())?;
    let base_paths: BTreeSet<String> = base_catalog.entries.into_iter().map(|e| e.pathname).collect();
    let alt_paths: BTreeSet<String> = alt_catalog.entries.into_iter().map(|e| e.pathname).collect();

    let removed = part_bs(base_paths.difference(&alt_paths))?;
    let added = part_bs(alt_paths.difference(&base_paths))?;
    let common: BTreeSet<&str> = base_paths
        .intersection(&alt_paths)
        .map(String::as_str)
        .collect();
    let common_b = part_bs(&common)?;

    let mut changed = Vec::new();
    if !common_b.is_empty() {
        let read = ReadOptions {
            filter: CatalogFilter::exact().with_b(common_b),
            start: opts.start,
            end: opts.end,
        };
        let base_frame = read_dss(backend, &base_files, &read)?;
        let alt_frame = read_dss(backend, &alt_files, &read)?;
        let base_values = values_by_cell(&base_frame);
        let alt_values = values_by_cell(&alt_frame);

        let mut changed_paths = BTreeSet::new();
        for ((pathname, t), alt) in &alt_values {
            if !common.contains(*pathname) {
                continue;
            }
            if let Some(base) = base_values.get(&(*pathname, *t)) {
                if (alt - base).abs() > 0.0 {
                    changed_paths.insert(pathname.to_string());
                }
            }
        }
        changed = part_bs(changed_paths)?;
    }

    tracing::info!(
        "🔍 Compared {} with {}: {} removed, {} added, {} changed",
        baseline.display(),
        alternative.display(),
        removed.len(),
        added.len(),
        changed.len()
    );

    Ok(ComparisonReport {
        baseline: baseline.to_path_buf(),
        alternative: alternative.to_path_buf(),
        removed,
        added,
        changed,
    })
}
