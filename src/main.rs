use calsim_toolkit::adapters::cdec::{CdecClient, CdecQuery};
use calsim_toolkit::adapters::CsvBackend;
use calsim_toolkit::app::run::{
    collect_launch_files, run_studies, CycleOutput, RunMode, TokioBatchExecutor, WrimsInstall, WrimsSettings,
};
use calsim_toolkit::app::study::{clean_study, package_study, transfer_study_files, PackageOptions};
use calsim_toolkit::config::{Cli, Command, StatKind, StoreArgs, WindowArgs};
use calsim_toolkit::core::compare::{compare_studies, CompareOptions};
use calsim_toolkit::core::dependencies::analyze;
use calsim_toolkit::core::export::{
    annual_to_csv, catalog_to_csv, exceedance_to_csv, monthly_to_csv, table_to_csv, tidy_from_csv,
};
use calsim_toolkit::core::io::{
    parse_filepaths, read_catalog, read_dss, read_land_use, write_dss, ReadOptions, WriteTarget,
};
use calsim_toolkit::core::plot::{build_figure, PlotOptions};
use calsim_toolkit::core::stats::{aggregate_annual, annual_exceedance, monthly_exceedance, monthly_mean};
use calsim_toolkit::core::transform::tidy_to_wide;
use calsim_toolkit::core::units::{review_file, UnitReviewOptions};
use calsim_toolkit::core::Storage;
use calsim_toolkit::domain::model::{PathDefaults, Table, TableFormat, TidyFrame};
use calsim_toolkit::utils::error::{CalSimError, ErrorSeverity, Result};
use calsim_toolkit::utils::monitor::SystemMonitor;
use calsim_toolkit::utils::{logger, validation::Validate};
use calsim_toolkit::{LocalStorage, ToolkitConfig};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::Parser;
use std::io::Write;
use std::path::Path;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::info!("Starting calsim CLI");
    if cli.verbose {
        tracing::debug!("CLI arguments: {:?}", cli);
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    let monitor = SystemMonitor::new(cli.monitor || config.monitoring_enabled());
    if monitor.is_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    match dispatch(&cli.command, &config, &monitor).await {
        Ok(()) => {
            monitor.log_final_stats();
            tracing::info!("✅ Done");
        }
        Err(e) => {
            tracing::error!(
                "❌ Command failed: {} (Severity: {:?})",
                e,
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ToolkitConfig> {
    let Some(path) = path else {
        return Ok(ToolkitConfig::default());
    };
    let config = ToolkitConfig::from_file(path)?;
    config.validate()?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default())
}

fn read_options(store: &StoreArgs, window: &WindowArgs, config: &ToolkitConfig) -> ReadOptions {
    let (config_start, config_end) = config.read_window();
    let mut opts = ReadOptions::with_filter(store.parts.filter());
    if let Some(start) = window.start.or(config_start) {
        opts.start = midnight(start);
    }
    if let Some(end) = window.end.or(config_end) {
        opts.end = midnight(end);
    }
    opts
}

fn read_store(store: &StoreArgs, window: &WindowArgs, config: &ToolkitConfig) -> Result<TidyFrame> {
    let files = parse_filepaths(&store.files, &store.studies)?;
    read_dss(&CsvBackend, &files, &read_options(store, window, config))
}

/// Write to `--output` when given, else to stdout.
async fn emit(output: Option<&Path>, data: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            LocalStorage::default()
                .write_file(&path.to_string_lossy(), data)
                .await?;
            tracing::info!("📁 Output saved to: {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn emit_table(frame: TidyFrame, format: TableFormat, output: Option<&Path>) -> Result<()> {
    let table = Table::Tidy(frame).convert(format, &PathDefaults::default())?;
    emit(output, &table_to_csv(&table)?).await
}

async fn dispatch(command: &Command, config: &ToolkitConfig, monitor: &SystemMonitor) -> Result<()> {
    match command {
        Command::Catalog { store, output } => {
            let files = parse_filepaths(&store.files, &store.studies)?;
            let catalog = read_catalog(&CsvBackend, &files, &store.parts.filter())?;
            emit(output.as_deref(), &catalog_to_csv(&catalog)?).await
        }
        Command::Read {
            store,
            window,
            format,
            output,
        } => {
            let frame = read_store(store, window, config)?;
            monitor.log_stats("Read");
            emit_table(frame, *format, output.as_deref()).await
        }
        Command::LandUse {
            store,
            format,
            output,
        } => {
            let files = parse_filepaths(&store.files, &store.studies)?;
            let frame = read_land_use(&CsvBackend, &files, &store.parts.filter())?;
            emit_table(frame, *format, output.as_deref()).await
        }
        Command::Import { input, targets } => {
            let data = LocalStorage::default()
                .read_file(&input.to_string_lossy())
                .await?;
            let frame = tidy_from_csv(&data)?;
            write_dss(&CsvBackend, &frame, &WriteTarget::parse(targets)?)
        }
        Command::Stats {
            store,
            window,
            kind,
            eom,
            output,
        } => {
            let wide = tidy_to_wide(&read_store(store, window, config)?)?;
            let data = match (kind, eom) {
                (StatKind::Annual, eom) => annual_to_csv(&aggregate_annual(&wide, eom.unwrap_or(9))?)?,
                (StatKind::Monthly, _) => monthly_to_csv(&monthly_mean(&wide)?)?,
                (StatKind::Exceedance, Some(eom)) => exceedance_to_csv(&annual_exceedance(&wide, *eom)?)?,
                (StatKind::Exceedance, None) => exceedance_to_csv(&monthly_exceedance(&wide)?)?,
            };
            monitor.log_stats("Statistics");
            emit(output.as_deref(), &data).await
        }
        Command::Plot {
            store,
            window,
            kind,
            eom,
            output,
        } => {
            let wide = tidy_to_wide(&read_store(store, window, config)?)?;
            let figure = build_figure(*kind, &wide, &PlotOptions { eom: *eom })?;
            render(&figure, output)
        }
        Command::Compare {
            baseline,
            alternative,
            window,
            output,
        } => {
            let mut opts = CompareOptions::default();
            if let Some(start) = window.start {
                opts.start = midnight(start);
            }
            if let Some(end) = window.end {
                opts.end = midnight(end);
            }
            let report = compare_studies(&CsvBackend, baseline, alternative, &opts)?;
            emit(output.as_deref(), format!("{}\n", report.render()).as_bytes()).await
        }
        Command::Units {
            file,
            init,
            correct,
            output,
        } => {
            let review = review_file(
                &CsvBackend,
                file,
                UnitReviewOptions {
                    init: *init,
                    correct: *correct,
                },
            )?;
            emit(output.as_deref(), format!("{}\n", review.render()).as_bytes()).await
        }
        Command::Deps {
            study_dir,
            variable,
            output,
        } => {
            let report = analyze(study_dir, variable)?;
            emit(output.as_deref(), report.render().as_bytes()).await
        }
        Command::Clean { study_dir } => {
            let summary = clean_study(study_dir)?;
            if !summary.failed.is_empty() {
                tracing::warn!("⚠️  {} files could not be removed", summary.failed.len());
            }
            Ok(())
        }
        Command::Package {
            study_dir,
            suffix,
            no_git,
        } => {
            let defaults = PackageOptions::default();
            let options = PackageOptions {
                suffix: suffix
                    .clone()
                    .or_else(|| config.package_suffix().map(str::to_string))
                    .unwrap_or(defaults.suffix),
                git: if *no_git { None } else { config.package_git() },
                date: defaults.date,
            };
            let zip_path = package_study(study_dir, &options).await?;
            println!("📦 {}", zip_path.display());
            Ok(())
        }
        Command::Transfer { from, to } => {
            transfer_study_files(from, to)?;
            Ok(())
        }
        Command::Run {
            launch,
            wrims_dir,
            parallel,
            solver,
            memory_mb,
            cycles,
            cycle_list,
            dry_run,
        } => {
            let dir = wrims_dir
                .as_deref()
                .or(config.wrims_directory())
                .ok_or_else(|| CalSimError::MissingConfigError {
                    field: "wrims.directory".to_string(),
                })?;
            let install = WrimsInstall::from_dir(dir)?;

            let base = config.wrims_settings()?;
            let cycles = if *cycles || !cycle_list.is_empty() {
                CycleOutput::from_flags(true, cycle_list)
            } else {
                base.cycles
            };
            let settings = WrimsSettings::new(
                solver.unwrap_or(base.solver),
                memory_mb.unwrap_or(base.memory_mb),
                cycles,
            );

            let launch_files = collect_launch_files(launch)?;
            let mode = if *parallel {
                RunMode::Parallel
            } else {
                RunMode::Sequential
            };
            monitor.log_stats("Before WRIMS run");
            let summary = run_studies(
                &install,
                &settings,
                &launch_files,
                mode,
                &TokioBatchExecutor,
                !*dry_run,
            )
            .await?;
            monitor.log_stats("After WRIMS run");

            if summary.all_succeeded() {
                Ok(())
            } else {
                Err(CalSimError::ProcessError {
                    message: format!("{} of {} CalSim batches failed", summary.failed(), summary.batches.len()),
                })
            }
        }
        Command::Cdec {
            stations,
            sensor,
            duration,
            window,
            output,
        } => {
            let mut client = CdecClient::new(config.cdec_base_url());
            if let Some(seconds) = config.cdec_timeout_seconds() {
                client = client.with_timeout(seconds);
            }
            let query = CdecQuery::new(stations.clone(), *sensor, *duration);
            let start = window.start.unwrap_or(query.start);
            let end = window.end.unwrap_or(query.end);
            let query = query.with_range(start, end);
            let body = client.fetch_raw(&query).await?;
            emit(output.as_deref(), body.as_bytes()).await
        }
    }
}

#[cfg(feature = "plot")]
fn render(figure: &calsim_toolkit::core::plot::Figure, output: &Path) -> Result<()> {
    calsim_toolkit::core::render::render_svg(figure, output)
}

#[cfg(not(feature = "plot"))]
fn render(_figure: &calsim_toolkit::core::plot::Figure, _output: &Path) -> Result<()> {
    Err(CalSimError::PlotError {
        message: "This build has no plotting support; enable the `plot` feature".to_string(),
    })
}
