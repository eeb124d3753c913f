use std::path::PathBuf;

use anyhow::{Context, Result};
use battery_dispatch::config::{ReportFormat, SolverBackend};
use battery_dispatch::general::{InputProvider, ResultSink, WorkbookInput, report_sink};
use battery_dispatch::{DispatchConfig, solve_dispatch};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "battery-dispatch")]
#[command(author, version, about = "Cost-minimal battery dispatch over a price horizon")]
struct Cli {
    /// Input workbook with the timeseries, grid and battery sheets
    #[arg(long, default_value = "input/input_file.xlsx")]
    input: PathBuf,

    /// Directory for the result files (overrides the config file)
    #[arg(long)]
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// MILP backend
    #[arg(long, value_enum)]
    backend: Option<SolverBackend>,

    /// Solver time limit in seconds
    #[arg(long)]
    time_limit: Option<f64>,

    /// Relative MIP gap at which the solver may stop
    #[arg(long)]
    mip_gap: Option<f64>,

    /// Report file format
    #[arg(long, value_enum)]
    format: Option<ReportFormat>,

    /// Also render the dispatch profile as a PNG
    #[arg(long)]
    plot: bool,
}

impl Cli {
    fn dispatch_config(&self) -> Result<DispatchConfig> {
        let mut config = match &self.config {
            Some(path) => DispatchConfig::from_file(path)?,
            None => DispatchConfig::default(),
        };
        if let Some(dir) = &self.output {
            config.output.dir = dir.clone();
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(backend) = self.backend {
            config.solver.backend = backend;
        }
        if self.time_limit.is_some() {
            config.solver.time_limit_secs = self.time_limit;
        }
        if self.mip_gap.is_some() {
            config.solver.mip_gap = self.mip_gap;
        }
        config.output.plot |= self.plot;
        Ok(config)
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.dispatch_config()?;
    info!(input = %cli.input.display(), backend = %config.solver.backend, "starting dispatch");

    let loaded = WorkbookInput::new(&cli.input, config.input.clone())
        .load()
        .with_context(|| format!("Failed to load input from {}", cli.input.display()))?;
    if let Some(start) = loaded.start() {
        info!(%start, steps = loaded.timestamps.len(), "horizon loaded");
    }
    let schedule = solve_dispatch(&loaded.input, &config.solver)?;

    info!(
        status = %schedule.status,
        variables = schedule.num_variables,
        constraints = schedule.num_constraints,
        solve_time_ms = schedule.solve_time_ms,
        "Solution is found."
    );

    report_sink(config.output).write(&loaded, &schedule)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("battery_dispatch=info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        error!("Dispatch failed: {e:#}");
        return Err(e);
    }
    Ok(())
}
