use anyhow::Result;
use calsim_toolkit::core::dependencies::analyze;
use calsim_toolkit::CalSimError;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn study() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("main.wresl"),
        "define S_IN {value 5}\n\
         define D_OUT {\n  value S_IN * 2\n} ! release\n\
         /* define D_OUT {value 0} */\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("goals.wresl"),
        "goal G_LIMIT {D_OUT < 100}\ngoal G_OTHER {S_IN > 1}\n",
    )
    .unwrap();
    dir
}

#[test]
fn test_analyze_inputs_and_dependents() -> Result<()> {
    let dir = study();
    let report = analyze(dir.path(), "D_OUT")?;

    // The commented-out definition is ignored.
    assert_eq!(report.defined.len(), 1);
    let defined = &report.defined[0];
    assert_eq!(defined.file, PathBuf::from("main.wresl"));
    assert_eq!((defined.start_line, defined.end_line), (2, 4));

    assert_eq!(report.inputs.len(), 1);
    assert_eq!(report.inputs[0].variable, "S_IN");
    assert_eq!(report.inputs[0].start_line, 1);

    let dependents: Vec<&str> = report.dependents.iter().map(|d| d.variable.as_str()).collect();
    assert_eq!(dependents, vec!["G_LIMIT"]);

    let text = report.render();
    assert!(text.contains("1. Lines 2 - 4 of main.wresl"));
    assert!(text.contains("1. S_IN: Line 1 of main.wresl"));
    assert!(text.contains("1. G_LIMIT: Line 1 of goals.wresl"));
    Ok(())
}

#[test]
fn test_analyze_variable_without_inputs() {
    let dir = study();
    let report = analyze(dir.path(), "S_IN").unwrap();
    assert!(report.inputs.is_empty());
    assert_eq!(report.dependents.len(), 2);
    assert!(report.render().contains("There are no variable inputs for S_IN."));
}

#[test]
fn test_analyze_missing_directory() {
    let result = analyze(&PathBuf::from("no/such/study"), "S_IN");
    assert!(matches!(result, Err(CalSimError::FileNotFound { .. })));
}

/// Case-style definitions spread over several files.
fn case_study() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("inputs.wresl"), "define S_IN {value 5}\n").unwrap();
    fs::create_dir_all(dir.path().join("rules")).unwrap();
    fs::write(
        dir.path().join("rules").join("release.wresl"),
        "define D_OUT {\n\
         case wet {\n  condition month == 1\n  value S_IN * 2\n }\n\
         case otherwise {\n  condition always\n  value 0\n }\n}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("rules").join("limits.wresl"),
        "define D_CAP {\n\
         case dry {\n  condition month == 7\n  value D_OUT / 2\n }\n\
         case otherwise {\n  condition always\n  value 100\n }\n}\n",
    )
    .unwrap();
    dir
}

#[test]
fn test_case_definitions_are_analyzed() -> Result<()> {
    let dir = case_study();
    let report = analyze(dir.path(), "D_OUT")?;

    assert_eq!(report.defined.len(), 1);
    assert_eq!(report.defined[0].file, PathBuf::from("rules").join("release.wresl"));
    assert_eq!((report.defined[0].start_line, report.defined[0].end_line), (1, 10));

    assert_eq!(report.inputs.len(), 1);
    assert_eq!(report.inputs[0].variable, "S_IN");
    assert_eq!(report.inputs[0].file, PathBuf::from("inputs.wresl"));

    assert_eq!(report.dependents.len(), 1);
    assert_eq!(report.dependents[0].variable, "D_CAP");
    assert_eq!(report.dependents[0].file, PathBuf::from("rules").join("limits.wresl"));

    let upstream = analyze(dir.path(), "S_IN")?;
    let dependents: Vec<&str> = upstream.dependents.iter().map(|d| d.variable.as_str()).collect();
    assert_eq!(dependents, vec!["D_OUT"]);
    Ok(())
}
