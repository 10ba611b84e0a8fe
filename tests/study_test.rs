use calsim_toolkit::app::study::{
    binaries_for_removal, clean_study, package_study, transfer_study_files, PackageOptions,
};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn touch(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

const LAUNCH: &str = "<launchConfiguration>\n\
<stringAttribute key=\"DESCRIPTION\" value=\"Baseline\"/>\n\
<stringAttribute key=\"DVFILE\" value=\"DSS/output/DV.dss\"/>\n\
</launchConfiguration>\n";

/// A small study tree with run artifacts, used and unused binaries.
fn study(root: &Path) {
    touch(root, ".project", "<projectDescription/>");
    touch(root, "Baseline.launch", LAUNCH);
    touch(root, "CONV/Run/main.wresl", "define X {external interfacetogw_x64.dll}\n");
    touch(root, "CONV/Lookup/res_info.table", "1 2 3\n");
    touch(root, "DSS/output/DV.dss", "dv");
    touch(root, "DSS/output/Old.dss", "old");
    touch(root, "CONV/Run/External/interfacetogw_x64.dll", "gw");
    touch(root, "CONV/Run/External/CVGroundwater_x64.dll", "cvgw");
    touch(root, "CONV/Run/External/Retired.dll", "retired");
    touch(root, "CONV/Run/wrims.log", "log");
    touch(root, "CONV/Run/=ILP=/cycle1.txt", "ilp");
    touch(root, "DSS/output/DV.dsc", "catalog");
    touch(root, "run.bat", "@echo off");
    touch(root, "README.md", "# Baseline");
}

fn names(paths: &[PathBuf], root: &Path) -> BTreeSet<String> {
    paths
        .iter()
        .map(|p| {
            p.strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect()
}

#[test]
fn test_clean_study() {
    let dir = TempDir::new().unwrap();
    study(dir.path());

    let summary = clean_study(dir.path()).unwrap();
    assert!(summary.failed.is_empty());
    assert_eq!(
        names(&summary.removed, dir.path()),
        BTreeSet::from([
            "run.bat".to_string(),
            "CONV/Run/wrims.log".to_string(),
            "DSS/output/DV.dsc".to_string(),
            "CONV/Run/=ILP=".to_string(),
        ])
    );
    assert!(!dir.path().join("CONV/Run/=ILP=").exists());
    assert!(dir.path().join("CONV/Run/main.wresl").is_file());
}

#[test]
fn test_binaries_for_removal() {
    let dir = TempDir::new().unwrap();
    study(dir.path());

    let unused = binaries_for_removal(dir.path()).unwrap();
    assert_eq!(
        names(&unused, dir.path()),
        BTreeSet::from([
            "DSS/output/Old.dss".to_string(),
            "CONV/Run/External/Retired.dll".to_string(),
        ])
    );
}

#[tokio::test]
async fn test_package_without_git() {
    let root = TempDir::new().unwrap();
    let study_dir = root.path().join("Baseline");
    study(&study_dir);

    let options = PackageOptions {
        date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        suffix: "Test".to_string(),
        git: None,
    };
    let zip_path = package_study(&study_dir, &options).await.unwrap();
    assert_eq!(zip_path.file_name().unwrap(), "2024-03-01_Test.zip");
    assert!(!root.path().join("2024-03-01_Test").exists());

    let mut archive = zip::ZipArchive::new(fs::File::open(&zip_path).unwrap()).unwrap();
    let entries: BTreeSet<String> = archive.file_names().map(str::to_string).collect();
    assert!(entries.iter().all(|e| e.starts_with("2024-03-01_Test/")));
    assert!(entries.contains("2024-03-01_Test/Baseline.launch"));
    assert!(entries.contains("2024-03-01_Test/CONV/Run/main.wresl"));
    assert!(entries.contains("2024-03-01_Test/DSS/output/DV.dss"));
    for removed in ["README.md", "run.bat", "DSS/output/Old.dss", "CONV/Run/wrims.log"] {
        assert!(!entries.contains(&format!("2024-03-01_Test/{}", removed)));
    }

    let mut launch = String::new();
    std::io::Read::read_to_string(
        &mut archive.by_name("2024-03-01_Test/Baseline.launch").unwrap(),
        &mut launch,
    )
    .unwrap();
    assert_eq!(launch, LAUNCH);

    // The source study is left as it was.
    assert!(study_dir.join("run.bat").is_file());
}

#[test]
fn test_transfer_study_files() {
    let root = TempDir::new().unwrap();
    let from = root.path().join("Baseline");
    let to = root.path().join("Alternative");
    study(&from);

    let copied = transfer_study_files(&from, &to).unwrap();
    let copied: BTreeSet<String> = copied
        .iter()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(
        copied,
        BTreeSet::from([
            ".project".to_string(),
            "Baseline.launch".to_string(),
            "CONV/Run/main.wresl".to_string(),
            "CONV/Lookup/res_info.table".to_string(),
        ])
    );
    assert!(to.join("CONV/Lookup/res_info.table").is_file());
    assert!(!to.join("DSS").exists());
}
