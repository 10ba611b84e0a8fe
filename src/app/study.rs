//! Housekeeping for CalSim study directories: cleaning run artifacts,
//! packaging deliverables and moving source files between studies.

use crate::utils::error::{CalSimError, Result};
use chrono::NaiveDate;
use glob::MatchOptions;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use zip::write::{FileOptions, ZipWriter};

/// WRIMS writes extensions in whatever case it likes.
const MATCH_ANY_CASE: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Files matching `pattern` below `dir`, sorted.
fn find(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = format!("{}/{}", glob::Pattern::escape(&dir.to_string_lossy()), pattern);
    let mut found = Vec::new();
    for entry in glob::glob_with(&full, MATCH_ANY_CASE)? {
        found.push(entry?);
    }
    found.sort();
    Ok(found)
}

fn find_all(dir: &Path, patterns: &[&str]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for pattern in patterns {
        found.extend(find(dir, pattern)?.into_iter().filter(|p| p.is_file()));
    }
    Ok(found)
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanSummary {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Remove batch, DSS catalog and run log files that WRIMS regenerates.
///
/// A file that cannot be removed is logged and skipped.
pub fn clean_study(dir: &Path) -> Result<CleanSummary> {
    if !dir.is_dir() {
        return Err(CalSimError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }

    let files = find_all(
        dir,
        &[
            "*.bat",
            "*.config",
            "*.prgss",
            "**/*.dsc",
            "**/*.dsd",
            "**/*.dsk",
            "CONV/Run/*.txt",
            "CONV/Run/*.par",
            "CONV/Run/*.log",
        ],
    )?;

    let mut summary = CleanSummary::default();
    for file in files {
        match fs::remove_file(&file) {
            Ok(()) => summary.removed.push(file),
            Err(e) => {
                tracing::warn!("⚠️  Unable to remove {}: {}", file.display(), e);
                summary.failed.push(file);
            }
        }
    }

    for sub in ["CONV/Run/=ILP=", "__pycache__"] {
        let path = dir.join(sub);
        if !path.exists() {
            continue;
        }
        match fs::remove_dir_all(&path) {
            Ok(()) => summary.removed.push(path),
            Err(e) => {
                tracing::warn!("⚠️  Unable to remove {}: {}", path.display(), e);
                summary.failed.push(path);
            }
        }
    }

    tracing::info!(
        "🧹 Scrubbed {} unnecessary files from {}",
        summary.removed.len(),
        dir.display()
    );
    Ok(summary)
}

/// `value="..."` attributes of launch file lines that mention a DSS file.
fn launch_dss_references(launch: &str) -> impl Iterator<Item = &str> {
    launch
        .lines()
        .filter(|line| line.to_uppercase().contains(".DSS"))
        .filter_map(|line| line.split_once("value=\""))
        .filter_map(|(_, rest)| rest.split('"').next())
}

/// Names of external libraries referenced from WRESL code, e.g.
/// `interfacetogw_x64` for ` interfacetogw_x64.dll`.
fn wresl_dll_references(code: &str) -> Result<BTreeSet<String>> {
    let re = Regex::new(r"\s(\w+)\.dll")?;
    Ok(re
        .captures_iter(code)
        .map(|c| c[1].to_string())
        .collect())
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// DSS, DLL and `.out` binaries that no launch file or WRESL source needs.
pub fn binaries_for_removal(dir: &Path) -> Result<Vec<PathBuf>> {
    let candidates = find_all(dir, &["**/*.dss", "**/*.dll", "CONV/DSS/*.out"])?;

    let mut used = BTreeSet::new();
    for launch_file in find(dir, "*.launch")? {
        let launch = fs::read_to_string(&launch_file)?;
        for reference in launch_dss_references(&launch) {
            let path = Path::new(reference);
            let path = if path.is_relative() {
                dir.join(path)
            } else {
                path.to_path_buf()
            };
            if path.is_file() {
                used.insert(canonical(&path));
            }
        }
    }

    let mut dlls = BTreeSet::new();
    for wresl in find(dir, "**/*.wresl")? {
        dlls.extend(wresl_dll_references(&fs::read_to_string(&wresl)?)?);
    }
    // Loaded indirectly through interfacetogw_x64.dll.
    dlls.insert("CVGroundwater_x64".to_string());

    let external = dir.join("CONV").join("Run").join("External");
    for dll in dlls {
        let path = external.join(format!("{}.dll", dll));
        if path.is_file() {
            used.insert(canonical(&path));
        }
    }

    Ok(candidates
        .into_iter()
        .filter(|p| !used.contains(&canonical(p)))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOptions {
    /// Package name is `<date>_<suffix>`.
    pub date: NaiveDate,
    pub suffix: String,
    /// Git executable used to stamp launch files; `None` skips stamping.
    pub git: Option<String>,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            date: chrono::Local::now().date_naive(),
            suffix: "USBR_CalSim3".to_string(),
            git: Some("git".to_string()),
        }
    }
}

impl PackageOptions {
    pub fn package_name(&self) -> String {
        format!("{}_{}", self.date.format("%Y-%m-%d"), self.suffix)
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in find(from, "**/*")? {
        let target = to.join(relative_to(&entry, from));
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&entry, &target)?;
        }
    }
    Ok(())
}

/// Git marks its object files read-only, which blocks removal on Windows.
fn remove_tree_forcibly(dir: &Path) -> Result<()> {
    for entry in find(dir, "**/*")? {
        let mut permissions = fs::metadata(&entry)?.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(&entry, permissions)?;
        }
    }
    fs::remove_dir_all(dir)?;
    Ok(())
}

async fn git_output(git: &str, dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(git).args(args).current_dir(dir).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Append `version: <branch> (<commit>)` to the quoted value of every
/// `DESCRIPTION` line.
pub fn stamp_description(launch: &str, branch: &str, commit: &str) -> String {
    launch
        .split('\n')
        .map(|line| {
            if !line.contains("DESCRIPTION") {
                return line.to_string();
            }
            let mut parts: Vec<String> = line.split('"').map(str::to_string).collect();
            let n = parts.len();
            if n < 2 {
                return line.to_string();
            }
            let stamped = format!("{} version: {} ({})", parts[n - 2], branch, commit);
            parts[n - 2] = stamped.trim().to_string();
            parts.join("\"")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn stamp_version(package_dir: &Path, git: &str) -> Result<bool> {
    let branch = git_output(git, package_dir, &["rev-parse", "--abbrev-ref", "HEAD"]).await;
    let commit = git_output(git, package_dir, &["rev-parse", "HEAD"]).await;
    let (Some(branch), Some(commit)) = (branch, commit) else {
        tracing::warn!(
            "⚠️  No git history found in {}; launch files left unstamped",
            package_dir.display()
        );
        return Ok(false);
    };

    for launch_file in find(package_dir, "*.launch")? {
        let launch = fs::read_to_string(&launch_file)?;
        fs::write(&launch_file, stamp_description(&launch, &branch, &commit))?;
    }
    tracing::info!("🏷️  Added version note {} ({}) to launch files", branch, commit);
    Ok(true)
}

fn zip_directory(dir: &Path, prefix: &str, zip_path: &Path) -> Result<()> {
    let mut zip = ZipWriter::new(File::create(zip_path)?);
    zip.add_directory::<_, ()>(format!("{}/", prefix), FileOptions::default())?;

    for entry in find(dir, "**/*")? {
        let relative = relative_to(&entry, dir);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if entry.is_dir() {
            zip.add_directory::<_, ()>(format!("{}/{}/", prefix, name), FileOptions::default())?;
        } else {
            zip.start_file::<_, ()>(format!("{}/{}", prefix, name), FileOptions::default())?;
            io::copy(&mut File::open(&entry)?, &mut zip)?;
        }
    }

    let mut file = zip.finish()?;
    file.flush()?;
    Ok(())
}

/// Build a clean zip deliverable of `study_dir` next to it and return its path.
pub async fn package_study(study_dir: &Path, options: &PackageOptions) -> Result<PathBuf> {
    let study_dir = study_dir.canonicalize().map_err(|_| CalSimError::FileNotFound {
        path: study_dir.to_path_buf(),
    })?;
    let common_dir = study_dir.parent().unwrap_or(&study_dir).to_path_buf();
    let name = options.package_name();
    let package_dir = common_dir.join(&name);
    if package_dir.exists() {
        return Err(CalSimError::validation(format!(
            "Package directory {} already exists",
            package_dir.display()
        )));
    }

    copy_tree(&study_dir, &package_dir)?;
    clean_study(&package_dir)?;
    let binaries = binaries_for_removal(&package_dir)?;
    for binary in &binaries {
        fs::remove_file(binary)?;
    }
    tracing::info!("🧹 Removed {} unused binaries from {}", binaries.len(), package_dir.display());

    if let Some(git) = &options.git {
        stamp_version(&package_dir, git).await?;
    }

    let git_dir = package_dir.join(".git");
    if git_dir.exists() {
        remove_tree_forcibly(&git_dir)?;
    }
    let gitignore = package_dir.join(".gitignore");
    if gitignore.exists() {
        fs::remove_file(gitignore)?;
    }
    let unrelated = find_all(
        &package_dir,
        &["**/*.link", "**/*.py", "**/*.md", "**/*.xml", "**/*.pdf", "**/*.xlsx"],
    )?;
    for file in &unrelated {
        fs::remove_file(file)?;
    }
    tracing::debug!("Removed {} non-CalSim files", unrelated.len());

    let zip_path = common_dir.join(format!("{}.zip", name));
    zip_directory(&package_dir, &name, &zip_path)?;
    fs::remove_dir_all(&package_dir)?;

    tracing::info!("📦 Packaged {} into {}", study_dir.display(), zip_path.display());
    Ok(zip_path)
}

/// Copy the text sources of a study (`.project`, WRESL, tables and launch
/// files) into another study, keeping relative paths. Returns the relative
/// paths copied.
pub fn transfer_study_files(from: &Path, to: &Path) -> Result<Vec<PathBuf>> {
    if !from.is_dir() {
        return Err(CalSimError::FileNotFound {
            path: from.to_path_buf(),
        });
    }

    let files = find_all(from, &[".project", "**/*.wresl", "**/*.table", "**/*.launch"])?;
    let mut copied = Vec::with_capacity(files.len());
    for file in files {
        let relative = relative_to(&file, from);
        let target = to.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&file, &target)?;
        copied.push(relative);
    }

    tracing::info!(
        "📁 Transferred {} study files from {} to {}",
        copied.len(),
        from.display(),
        to.display()
    );
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_description() {
        let launch = "<a key=\"x\"/>\n<stringAttribute key=\"DESCRIPTION\" value=\"Existing \"/>";
        let stamped = stamp_description(launch, "main", "abc123");
        assert_eq!(
            stamped,
            "<a key=\"x\"/>\n<stringAttribute key=\"DESCRIPTION\" value=\"Existing  version: main (abc123)\"/>"
        );
    }

    #[test]
    fn test_launch_references() {
        let launch = "<stringAttribute key=\"DVFILE\" value=\"DSS\\output\\DV.dss\"/>\n<x value=\"a.txt\"/>";
        let refs: Vec<&str> = launch_dss_references(launch).collect();
        assert_eq!(refs, vec!["DSS\\output\\DV.dss"]);
    }

    #[test]
    fn test_dll_references() {
        let code = "define x {external interfacetogw_x64.dll}\nexternal(\"f90.dll\")";
        let dlls = wresl_dll_references(code).unwrap();
        assert!(dlls.contains("interfacetogw_x64"));
        assert_eq!(dlls.len(), 1);
    }

    #[test]
    fn test_package_name() {
        let options = PackageOptions {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            suffix: "DWR_CalSim3".into(),
            git: None,
        };
        assert_eq!(options.package_name(), "2024-03-01_DWR_CalSim3");
    }
}
