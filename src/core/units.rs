//! Review and correction of CalSim unit / data-type labels.
//!
//! Storage is expected as `TAF INST-VAL`, other volumes as `TAF PER-CUM` and
//! flows as `CFS PER-AVER`. Relabelling Init and SV files has no effect on a
//! CalSim run, so corrections are meant as a post-processing step.

use crate::core::io::{midnight, parse_filepaths, read_dss, write_dss, ReadOptions, WriteTarget};
use crate::domain::model::TidyFrame;
use crate::domain::pathname::Pathname;
use crate::domain::ports::DssBackend;
use crate::utils::error::Result;
use crate::utils::validation::validate_file_extension;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnitIssueKind {
    /// Units carry leading or trailing whitespace.
    Whitespace,
    Storage,
    NonStorageVolume,
    Flow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitIssue {
    pub study: Option<String>,
    pub pathname: String,
    pub units: String,
    pub data_type: String,
    pub kinds: Vec<UnitIssueKind>,
    pub corrected_units: String,
    pub corrected_data_type: String,
}

impl UnitIssue {
    pub fn part_b(&self) -> String {
        Pathname::parse(&self.pathname)
            .map(|p| p.b)
            .unwrap_or_default()
    }

    pub fn describe(&self) -> String {
        format!(
            "{}: \"{} {}\" -> \"{} {}\"",
            self.pathname, self.units, self.data_type, self.corrected_units, self.corrected_data_type
        )
    }
}

fn check(pathname: &str, units: &str, data_type: &str) -> Result<Option<(Vec<UnitIssueKind>, String, String)>> {
    let part_c = Pathname::parse(pathname)?.c;
    let mut kinds = Vec::new();
    let mut fixed_units = units.trim().to_string();
    let mut fixed_type = data_type.to_string();

    if fixed_units != units {
        kinds.push(UnitIssueKind::Whitespace);
    }
    if part_c == "STORAGE" {
        if fixed_units != "TAF" || fixed_type != "INST-VAL" {
            kinds.push(UnitIssueKind::Storage);
            fixed_units = "TAF".to_string();
            fixed_type = "INST-VAL".to_string();
        }
    } else if fixed_units == "TAF" && fixed_type != "PER-CUM" {
        kinds.push(UnitIssueKind::NonStorageVolume);
        fixed_type = "PER-CUM".to_string();
    }
    if fixed_units == "CFS" && fixed_type != "PER-AVER" {
        kinds.push(UnitIssueKind::Flow);
        fixed_type = "PER-AVER".to_string();
    }

    Ok((!kinds.is_empty()).then_some((kinds, fixed_units, fixed_type)))
}

/// Flag mislabelled series, once per (study, pathname).
pub fn review_units(frame: &TidyFrame) -> Result<Vec<UnitIssue>> {
    let mut seen = HashSet::new();
    let mut issues = Vec::new();
    for r in &frame.records {
        if !seen.insert((&r.study, &r.pathname)) {
            continue;
        }
        if let Some((kinds, corrected_units, corrected_data_type)) =
            check(&r.pathname, &r.units, &r.data_type)?
        {
            issues.push(UnitIssue {
                study: r.study.clone(),
                pathname: r.pathname.clone(),
                units: r.units.clone(),
                data_type: r.data_type.clone(),
                kinds,
                corrected_units,
                corrected_data_type,
            });
        }
    }
    Ok(issues)
}

/// The flagged series only, relabelled.
pub fn apply_corrections(frame: &TidyFrame, issues: &[UnitIssue]) -> TidyFrame {
    let fixes: HashMap<(&Option<String>, &str), &UnitIssue> = issues
        .iter()
        .map(|i| ((&i.study, i.pathname.as_str()), i))
        .collect();

    TidyFrame::new(
        frame
            .records
            .iter()
            .filter_map(|r| {
                fixes.get(&(&r.study, r.pathname.as_str())).map(|issue| {
                    let mut fixed = r.clone();
                    fixed.units = issue.corrected_units.clone();
                    fixed.data_type = issue.corrected_data_type.clone();
                    fixed
                })
            })
            .collect(),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitReviewOptions {
    /// The file is an initialization (INIT) file.
    pub init: bool,
    /// Write the corrections back to the file.
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReview {
    pub issues: Vec<UnitIssue>,
    pub part_b: Vec<String>,
    pub corrected: bool,
}

impl UnitReview {
    pub fn render(&self) -> String {
        if self.issues.is_empty() {
            return "Found no variables requiring unit correction.".to_string();
        }
        let mut lines = vec!["Found values requiring unit correction.".to_string()];
        lines.extend(self.issues.iter().map(UnitIssue::describe));
        lines.join("\n")
    }
}

pub fn review_file<B: DssBackend>(
    backend: &B,
    path: &Path,
    options: UnitReviewOptions,
) -> Result<UnitReview> {
    validate_file_extension("path", path, backend.extensions())?;

    let read = if options.init {
        ReadOptions {
            start: midnight(1918, 5, 31),
            end: midnight(1921, 11, 30),
            ..ReadOptions::default()
        }
    } else {
        ReadOptions {
            end: midnight(2015, 9, 30),
            ..ReadOptions::default()
        }
    };
    let files = parse_filepaths(&[path], &[])?;
    let frame = read_dss(backend, &files, &read)?;
    let issues = review_units(&frame)?;

    let mut part_b = Vec::new();
    for issue in &issues {
        let b = issue.part_b();
        if !part_b.contains(&b) {
            part_b.push(b);
        }
    }

    let corrected = options.correct && !issues.is_empty();
    if corrected {
        let fixed = apply_corrections(&frame, &issues);
        write_dss(backend, &fixed, &WriteTarget::Single(path.to_path_buf()))?;
        tracing::info!("🛠️  Corrected units of {} series in {}", issues.len(), path.display());
    } else {
        tracing::info!("🔎 {} series with unit issues in {}", issues.len(), path.display());
    }

    Ok(UnitReview {
        issues,
        part_b,
        corrected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::TidyRecord;

    fn record(pathname: &str, units: &str, data_type: &str) -> TidyRecord {
        TidyRecord {
            study: None,
            datetime: midnight(1921, 10, 31),
            pathname: pathname.into(),
            units: units.into(),
            data_type: data_type.into(),
            value: Some(1.0),
        }
    }

    #[test]
    fn test_rules() {
        let frame = TidyFrame::new(vec![
            record("/CALSIM/S_SHSTA/STORAGE//1MON/L2015A/", "TAF", "PER-AVER"),
            record("/CALSIM/D_X/DELIVERY//1MON/L2015A/", "TAF", "PER-AVER"),
            record("/CALSIM/C_KSWCK/CHANNEL//1MON/L2015A/", "CFS ", "PER-CUM"),
            record("/CALSIM/C_OK/CHANNEL//1MON/L2015A/", "CFS", "PER-AVER"),
        ]);
        let issues = review_units(&frame).unwrap();
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].corrected_data_type, "INST-VAL");
        assert_eq!(issues[1].kinds, vec![UnitIssueKind::NonStorageVolume]);
        assert_eq!(
            issues[2].kinds,
            vec![UnitIssueKind::Whitespace, UnitIssueKind::Flow]
        );
        assert_eq!(issues[2].corrected_units, "CFS");

        let fixed = apply_corrections(&frame, &issues);
        assert_eq!(fixed.len(), 3);
        assert!(fixed.records.iter().all(|r| r.pathname != "/CALSIM/C_OK/CHANNEL//1MON/L2015A/"));
    }
}
