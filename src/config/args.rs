//! Command-line arguments of the `calsim` binary.

use crate::adapters::cdec::DurationCode;
use crate::app::run::Solver;
use crate::core::io::CatalogFilter;
use crate::core::plot::PlotKind;
use crate::domain::model::TableFormat;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "calsim")]
#[command(about = "Read, convert, analyse and run CalSim studies")]
pub struct Cli {
    /// TOML settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log CPU and memory per phase")]
    pub monitor: bool,

    #[arg(long, global = true, help = "Emit JSON log lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Pathname part filters shared by the store-reading commands.
#[derive(Debug, Clone, Default, Args)]
pub struct PartArgs {
    #[arg(short = 'a', long = "part-a", value_delimiter = ',')]
    pub a: Vec<String>,
    #[arg(short = 'b', long = "part-b", value_delimiter = ',')]
    pub b: Vec<String>,
    #[arg(short = 'c', long = "part-c", value_delimiter = ',')]
    pub c: Vec<String>,
    #[arg(short = 'e', long = "part-e", value_delimiter = ',')]
    pub e: Vec<String>,
    #[arg(short = 'f', long = "part-f", value_delimiter = ',')]
    pub f: Vec<String>,
    /// Match parts by substring instead of whole value
    #[arg(long)]
    pub contains: bool,
}

impl PartArgs {
    pub fn filter(&self) -> CatalogFilter {
        CatalogFilter {
            a: self.a.clone(),
            b: self.b.clone(),
            c: self.c.clone(),
            e: self.e.clone(),
            f: self.f.clone(),
            exact: !self.contains,
        }
    }
}

/// Store files with optional study labels.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Study name per file, in file order
    #[arg(long = "study")]
    pub studies: Vec<String>,
    #[command(flatten)]
    pub parts: PartArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct WindowArgs {
    #[arg(long)]
    pub start: Option<NaiveDate>,
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatKind {
    /// Water-year aggregation
    Annual,
    /// Calendar-month means
    Monthly,
    /// Exceedance curves
    Exceedance,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List pathnames in one or more stores
    Catalog {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Read series into a table
    Read {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long, value_enum, default_value = "tidy")]
        format: TableFormat,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Read CalSimHydro land-use series (year 4000) as year 2000
    LandUse {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long, value_enum, default_value = "tidy")]
        format: TableFormat,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write a tidy CSV table into stores
    Import {
        /// Tidy CSV table
        input: PathBuf,
        /// `PATH`, or `STUDY=PATH` once per study
        #[arg(long = "target", required = true)]
        targets: Vec<String>,
    },
    /// Water-year statistics
    Stats {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long, value_enum, default_value = "annual")]
        kind: StatKind,
        /// End-of-month for annual values (1-12)
        #[arg(long)]
        eom: Option<u32>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Plot series to an SVG file
    Plot {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long, value_enum)]
        kind: PlotKind,
        #[arg(long)]
        eom: Option<u32>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Variables removed, added or changed between two studies
    Compare {
        baseline: PathBuf,
        alternative: PathBuf,
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Review unit labels of a store
    Units {
        file: PathBuf,
        /// The file is an initialization file
        #[arg(long)]
        init: bool,
        /// Write corrected labels back to the file
        #[arg(long)]
        correct: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Trace where a WRESL variable is defined and used
    Deps {
        study_dir: PathBuf,
        variable: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Remove files WRIMS regenerates
    Clean { study_dir: PathBuf },
    /// Zip a clean deliverable of a study
    Package {
        study_dir: PathBuf,
        #[arg(long)]
        suffix: Option<String>,
        /// Skip stamping launch files with the git version
        #[arg(long)]
        no_git: bool,
    },
    /// Copy WRESL, table, launch and project files into another study
    Transfer { from: PathBuf, to: PathBuf },
    /// Run launch files through WRIMS
    Run {
        /// Launch files or study directories
        #[arg(required = true)]
        launch: Vec<PathBuf>,
        #[arg(long)]
        wrims_dir: Option<String>,
        #[arg(long)]
        parallel: bool,
        #[arg(long, value_enum)]
        solver: Option<Solver>,
        #[arg(long)]
        memory_mb: Option<u32>,
        /// Write cycle solutions to the output file
        #[arg(long)]
        cycles: bool,
        #[arg(long, value_delimiter = ',')]
        cycle_list: Vec<u32>,
        /// Write settings and launch groups without starting WRIMS
        #[arg(long)]
        dry_run: bool,
    },
    /// Download station data from CDEC
    Cdec {
        #[arg(long, value_delimiter = ',', required = true)]
        stations: Vec<String>,
        #[arg(long)]
        sensor: u32,
        #[arg(long, value_enum, default_value = "daily")]
        duration: DurationCode,
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read_command() {
        let cli = Cli::parse_from([
            "calsim", "--verbose", "read", "DV.csv", "-b", "S_SHSTA,C_KSWCK", "--contains", "--format",
            "wide", "--start", "1921-10-31",
        ]);
        assert!(cli.verbose);
        let Command::Read { store, window, format, .. } = cli.command else {
            panic!("expected read");
        };
        let filter = store.parts.filter();
        assert_eq!(filter.b, vec!["S_SHSTA", "C_KSWCK"]);
        assert!(!filter.exact);
        assert_eq!(format, TableFormat::Wide);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(1921, 10, 31));
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::parse_from([
            "calsim", "run", "CalSim3", "--parallel", "--solver", "xa", "--cycle-list", "1,2", "--cycles",
        ]);
        let Command::Run { parallel, solver, cycle_list, cycles, .. } = cli.command else {
            panic!("expected run");
        };
        assert!(parallel && cycles);
        assert_eq!(solver, Some(Solver::Xa));
        assert_eq!(cycle_list, vec![1, 2]);
    }
}
