//! Variable dependency analysis over the WRESL sources of a study.
//!
//! Text is blanked rather than removed so that byte offsets of every match
//! still point into the original source.

use crate::utils::error::{CalSimError, Result};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

const WRESL_KEYWORDS: &[&str] = &[
    "initial", "define", "svar", "goal", "group", "dvar", "integer", "alias", "value", "std",
    "kind", "units", "weight", "upper", "lower", "convert", "name", "type", "desc", "bounds",
    "penalty", "month", "wateryear", "always", "never", "constrain", "include", "condition",
    "lhs", "rhs", "import", "sequence", "model", "order", "timeseries", "lookup", "select",
    "from", "where", "given", "use", "sum", "max", "min", "abs", "binary", "and", "or", "cfs",
    "taf", "storage", "diversion", "flow",
];

fn regex(pattern: &str, case_insensitive: bool, dot_all: bool) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(dot_all)
        .build()?)
}

/// Replace every byte of `spans` with a space.
fn blank(code: &str, spans: impl IntoIterator<Item = Range<usize>>) -> String {
    let mut bytes = code.as_bytes().to_vec();
    for span in spans {
        bytes[span].fill(b' ');
    }
    // Spans come from regex matches, so whole characters are replaced.
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn blank_matches(code: &str, patterns: &[Regex]) -> String {
    let spans: Vec<Range<usize>> = patterns
        .iter()
        .flat_map(|re| re.find_iter(code).map(|m| m.range()))
        .collect();
    blank(code, spans)
}

/// Blank `/* ... */` blocks and `!` line comments.
pub fn remove_comments(code: &str) -> Result<String> {
    let block = regex(r"/\*.*?\*/", false, true)?;
    let inline = regex(r"![^\n]*", false, false)?;
    // Blocks first: a `!` inside a block comment must not swallow its closing `*/`.
    let without_blocks = blank_matches(code, &[block]);
    Ok(blank_matches(&without_blocks, &[inline]))
}

/// Blank `case ... { ... }` blocks.
pub fn remove_cases(code: &str) -> Result<String> {
    Ok(blank_matches(code, &[regex(r"case.*?\{.*?\}", false, true)?]))
}

/// Blank numbers, cycle references, keywords and case headers, leaving only
/// candidate variable names.
pub fn remove_non_variables(code: &str) -> Result<String> {
    let keywords = format!(r"\b(?:{})\b", WRESL_KEYWORDS.join("|"));
    let patterns = [
        regex(r"\b\d\.?\d*\b", false, false)?,
        regex(r"\[.+?\]", false, false)?,
        regex(&keywords, true, false)?,
        regex(r"\bcase.*?\{", true, false)?,
    ];
    Ok(blank_matches(code, &patterns))
}

/// Spans of `<keyword> <var> { ... }` statements; `var = None` matches any name.
pub fn find_statements(code: &str, keyword: &str, var: Option<&str>) -> Result<Vec<Range<usize>>> {
    let var = var.map(regex::escape).unwrap_or_else(|| ".*?".to_string());
    let pattern = format!(r"{}\s+{}\s*?\{{.*?\}}", regex::escape(keyword), var);
    Ok(regex(&pattern, true, true)?
        .find_iter(code)
        .map(|m| m.range())
        .collect())
}

/// 1-based start and end lines of `span` in `code`.
pub fn line_numbers(span: &Range<usize>, code: &str) -> (usize, usize) {
    let line_of = |offset: usize| {
        code.as_bytes()[..offset.min(code.len())]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1
    };
    (line_of(span.start), line_of(span.end))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementLocation {
    pub variable: String,
    pub file: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
    pub span: (usize, usize),
}

impl StatementLocation {
    fn describe(&self) -> String {
        if self.start_line == self.end_line {
            format!("Line {} of {}", self.start_line, self.file.display())
        } else {
            format!(
                "Lines {} - {} of {}",
                self.start_line,
                self.end_line,
                self.file.display()
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyReport {
    pub variable: String,
    pub study_dir: PathBuf,
    pub defined: Vec<StatementLocation>,
    pub inputs: Vec<StatementLocation>,
    pub dependents: Vec<StatementLocation>,
}

impl DependencyReport {
    pub fn render(&self) -> String {
        let var = &self.variable;
        let mut lines = vec![
            format!(
                "Variable Dependency Results for {} in study directory {}",
                var,
                self.study_dir.display()
            ),
            format!("\n{} is defined in the following locations:", var),
        ];
        lines.extend(
            self.defined
                .iter()
                .enumerate()
                .map(|(i, loc)| format!("{}. {}", i + 1, loc.describe())),
        );

        if self.inputs.is_empty() {
            lines.push(format!("\nThere are no variable inputs for {}.", var));
        } else {
            lines.push(format!(
                "\nThe inputs of {} are defined in the following locations:",
                var
            ));
            lines.extend(numbered(&self.inputs));
        }

        if self.dependents.is_empty() {
            lines.push(format!("\nNo variables depend on {} as input.", var));
        } else {
            lines.push(format!("\nThe following variables rely on {} as input:", var));
            lines.extend(numbered(&self.dependents));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

fn numbered(locations: &[StatementLocation]) -> impl Iterator<Item = String> + '_ {
    locations
        .iter()
        .enumerate()
        .map(|(i, loc)| format!("{}. {}: {}", i + 1, loc.variable, loc.describe()))
}

struct SourceFile {
    relative: PathBuf,
    code: String,
    /// Comments blanked. Statement bodies are read from here.
    uncommented: String,
    /// Comments and case blocks blanked. Statement spans are found here.
    cleaned: String,
}

fn load_sources(study_dir: &Path) -> Result<Vec<SourceFile>> {
    if !study_dir.is_dir() {
        return Err(CalSimError::FileNotFound {
            path: study_dir.to_path_buf(),
        });
    }
    let pattern = study_dir.join("**").join("*.wresl");
    let mut paths = Vec::new();
    for entry in glob::glob(&pattern.to_string_lossy())? {
        paths.push(entry?);
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| -> Result<SourceFile> {
            let code = fs::read_to_string(&path)?;
            let uncommented = remove_comments(&code)?;
            let cleaned = remove_cases(&uncommented)?;
            let relative = path
                .strip_prefix(study_dir)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.clone());
            Ok(SourceFile {
                relative,
                code,
                uncommented,
                cleaned,
            })
        })
        .collect()
}

fn locate(file: &SourceFile, variable: &str, span: Range<usize>) -> StatementLocation {
    let (start_line, end_line) = line_numbers(&span, &file.code);
    StatementLocation {
        variable: variable.to_string(),
        file: file.relative.clone(),
        start_line,
        end_line,
        span: (span.start, span.end),
    }
}

/// Text after the opening brace of a statement.
fn statement_body(text: &str) -> &str {
    text.split_once('{').map(|(_, body)| body).unwrap_or("")
}

fn definitions(sources: &[SourceFile], variable: &str) -> Result<Vec<StatementLocation>> {
    let mut found = Vec::new();
    for file in sources {
        for span in find_statements(&file.cleaned, "define", Some(variable))? {
            found.push(locate(file, variable, span));
        }
    }
    Ok(found)
}

/// Locate where `variable` is defined, what feeds it and what it feeds.
pub fn analyze(study_dir: &Path, variable: &str) -> Result<DependencyReport> {
    let sources = load_sources(study_dir)?;
    tracing::debug!("Scanning {} WRESL files in {}", sources.len(), study_dir.display());

    let defined = definitions(&sources, variable)?;

    let words = regex(r"\b\w+\b", false, false)?;
    let mut identifiers = BTreeSet::new();
    for loc in &defined {
        let Some(file) = sources.iter().find(|s| s.relative == loc.file) else {
            continue;
        };
        let text = &file.uncommented[loc.span.0..loc.span.1];
        let body = remove_non_variables(statement_body(text))?;
        identifiers.extend(words.find_iter(&body).map(|m| m.as_str().to_string()));
    }

    let mut inputs = Vec::new();
    for identifier in &identifiers {
        inputs.extend(definitions(&sources, identifier)?);
    }

    let uses_variable = regex(&format!(r"\b{}\b", regex::escape(variable)), true, false)?;
    let mut dependents = Vec::new();
    for file in &sources {
        let mut spans = find_statements(&file.cleaned, "define", None)?;
        spans.extend(find_statements(&file.cleaned, "goal", None)?);
        for span in spans {
            let text = &file.uncommented[span.clone()];
            let Some((head, body)) = text.split_once('{') else {
                continue;
            };
            if !uses_variable.is_match(&remove_non_variables(body)?) {
                continue;
            }
            let name = head.split_whitespace().last().unwrap_or_default();
            dependents.push(locate(file, name, span));
        }
    }

    tracing::info!(
        "🧭 {}: {} definitions, {} inputs, {} dependents",
        variable,
        defined.len(),
        inputs.len(),
        dependents.len()
    );

    Ok(DependencyReport {
        variable: variable.to_string(),
        study_dir: study_dir.canonicalize().unwrap_or_else(|_| study_dir.to_path_buf()),
        defined,
        inputs,
        dependents,
    })
}
