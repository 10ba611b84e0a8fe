//! Batch runs of CalSim studies through a WRIMS installation.

use crate::domain::ports::BatchExecutor;
use crate::utils::error::{CalSimError, Result};
use crate::utils::validation::{validate_range, Validate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::process::Command;

/// WRIMS parallel runs are handed at most this many launch files at a time.
pub const PACKET_SIZE: usize = 5;

pub const MAX_MEMORY_MB: u32 = 8192;

/// Paths of a WRIMS installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrimsInstall {
    pub dir: PathBuf,
    pub launch_group_file: PathBuf,
    pub settings_file: PathBuf,
    pub sequential_batch: PathBuf,
    pub parallel_batch: PathBuf,
}

impl WrimsInstall {
    /// `raw` may carry the quotes a shell or file browser leaves around it.
    pub fn from_dir(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let unquoted = trimmed
            .strip_prefix(['"', '\''])
            .unwrap_or(trimmed);
        let unquoted = unquoted.strip_suffix(['"', '\'']).unwrap_or(unquoted);
        if unquoted.is_empty() {
            return Err(CalSimError::MissingConfigError {
                field: "wrims.directory".to_string(),
            });
        }

        let dir = Path::new(unquoted)
            .canonicalize()
            .map_err(|_| CalSimError::FileNotFound {
                path: PathBuf::from(unquoted),
            })?;
        let batchrun = dir.join("batchrun");
        Ok(Self {
            launch_group_file: batchrun.join("LaunchFileGroup.lfg"),
            settings_file: dir.join("data").join("setting.prf"),
            sequential_batch: batchrun.join("SequentialBatchRun.bat"),
            parallel_batch: batchrun.join("ParallelBatchRun.bat"),
            dir,
        })
    }

    fn batch_file(&self, mode: RunMode) -> &Path {
        match mode {
            RunMode::Sequential => &self.sequential_batch,
            RunMode::Parallel => &self.parallel_batch,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "UPPERCASE")]
pub enum Solver {
    Xa,
    #[default]
    Cbc,
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Solver::Xa => f.write_str("XA"),
            Solver::Cbc => f.write_str("CBC"),
        }
    }
}

impl FromStr for Solver {
    type Err = CalSimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "XA" => Ok(Solver::Xa),
            "CBC" => Ok(Solver::Cbc),
            _ => Err(CalSimError::InvalidConfigValueError {
                field: "wrims.solver".to_string(),
                value: s.to_string(),
                reason: "Invalid solver specified. Valid options: XA, CBC".to_string(),
            }),
        }
    }
}

/// Which cycle solutions WRIMS writes to the output DSS file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CycleOutput {
    #[default]
    None,
    All,
    Selected(Vec<u32>),
}

impl CycleOutput {
    /// `cycles` switches cycle output on; an empty list then means all cycles.
    pub fn from_flags(cycles: bool, list: &[u32]) -> Self {
        match (cycles, list.is_empty()) {
            (false, _) => CycleOutput::None,
            (true, true) => CycleOutput::All,
            (true, false) => CycleOutput::Selected(list.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrimsSettings {
    pub solver: Solver,
    pub memory_mb: u32,
    pub cycles: CycleOutput,
}

impl Default for WrimsSettings {
    fn default() -> Self {
        Self::new(Solver::Cbc, 4096, CycleOutput::None)
    }
}

impl WrimsSettings {
    pub fn new(solver: Solver, memory_mb: u32, cycles: CycleOutput) -> Self {
        Self {
            solver,
            memory_mb,
            cycles,
        }
    }

    /// Contents of `data/setting.prf`.
    pub fn render(&self) -> String {
        let (enabled, all, list) = match &self.cycles {
            CycleOutput::None => ("false", "true", String::new()),
            CycleOutput::All => ("true", "true", String::new()),
            CycleOutput::Selected(cycles) => (
                "true",
                "false",
                cycles
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        };
        [
            self.solver.to_string(),
            self.memory_mb.to_string(),
            enabled.to_string(),
            all.to_string(),
            format!("'{}'", list),
        ]
        .join("\n")
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())?;
        tracing::debug!("Wrote WRIMS settings to {}", path.display());
        Ok(())
    }
}

impl Validate for WrimsSettings {
    fn validate(&self) -> Result<()> {
        validate_range("wrims.memory_mb", self.memory_mb, 64, MAX_MEMORY_MB)
    }
}

/// Expand study directories to their top-level launch files.
///
/// WSI-DI launch files are skipped; every remaining path must exist.
pub fn collect_launch_files<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        if input.is_dir() {
            let pattern = format!("{}/*.launch", glob::Pattern::escape(&input.to_string_lossy()));
            let mut found = Vec::new();
            for entry in glob::glob(&pattern)? {
                found.push(entry?);
            }
            found.sort();
            candidates.extend(found);
        } else {
            candidates.push(input.to_path_buf());
        }
    }

    candidates
        .into_iter()
        .filter(|p| {
            !p.file_name()
                .map(|name| name.to_string_lossy().to_lowercase().contains("wsi"))
                .unwrap_or(false)
        })
        .map(|p| {
            p.canonicalize()
                .map_err(|_| CalSimError::FileNotFound { path: p.clone() })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchOutcome {
    Completed,
    Failed(i32),
    /// Launch group written, batch not started.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub launch_files: Vec<PathBuf>,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub batches: Vec<BatchResult>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b.outcome, BatchOutcome::Failed(_)))
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

fn write_launch_group(path: &Path, launch_files: &[PathBuf]) -> Result<()> {
    let lines: Vec<String> = launch_files
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    fs::write(path, lines.join("\n"))?;
    Ok(())
}

/// Write WRIMS settings, then run the launch files one batch (sequential) or
/// one packet of `PACKET_SIZE` (parallel) at a time.
///
/// A batch that exits nonzero is reported in the summary; the remaining
/// packets still run.
pub async fn run_studies<E: BatchExecutor + ?Sized>(
    install: &WrimsInstall,
    settings: &WrimsSettings,
    launch_files: &[PathBuf],
    mode: RunMode,
    executor: &E,
    execute: bool,
) -> Result<RunSummary> {
    settings.write(&install.settings_file)?;

    if launch_files.is_empty() {
        return Err(CalSimError::validation("No launch files to run"));
    }
    let batch = install.batch_file(mode);
    if !batch.is_file() {
        return Err(CalSimError::FileNotFound {
            path: batch.to_path_buf(),
        });
    }
    let work_dir = batch.parent().unwrap_or(&install.dir);

    let packets: Vec<&[PathBuf]> = match mode {
        RunMode::Sequential => vec![launch_files],
        RunMode::Parallel => launch_files.chunks(PACKET_SIZE).collect(),
    };
    tracing::info!(
        "🚀 Running {} launch files in {} {:?} batch(es)",
        launch_files.len(),
        packets.len(),
        mode
    );

    let mut batches = Vec::with_capacity(packets.len());
    for (i, packet) in packets.into_iter().enumerate() {
        write_launch_group(&install.launch_group_file, packet)?;

        let outcome = if !execute {
            tracing::info!("⏭️  Batch {} written to {}, not started", i + 1, install.launch_group_file.display());
            BatchOutcome::Skipped
        } else {
            match executor.execute(batch, work_dir).await? {
                0 => {
                    tracing::info!("✅ CalSim batch {} complete", i + 1);
                    BatchOutcome::Completed
                }
                code => {
                    tracing::error!("❌ CalSim batch {} failed with exit code {}", i + 1, code);
                    BatchOutcome::Failed(code)
                }
            }
        };
        batches.push(BatchResult {
            launch_files: packet.to_vec(),
            outcome,
        });
    }

    Ok(RunSummary { mode, batches })
}

/// Runs WRIMS batch files as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioBatchExecutor;

#[async_trait]
impl BatchExecutor for TokioBatchExecutor {
    async fn execute(&self, program: &Path, cwd: &Path) -> Result<i32> {
        let status = Command::new(program)
            .current_dir(cwd)
            .status()
            .await
            .map_err(|e| CalSimError::ProcessError {
                message: format!("Failed to start {}: {}", program.display(), e),
            })?;
        // Killed by a signal.
        Ok(status.code().unwrap_or(-1))
    }
}
