use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// MILP backend used for the dispatch solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SolverBackend {
    /// HiGHS, linked in-process.
    #[default]
    Highs,
    /// SCIP, bundled.
    Scip,
    /// CBC through its command line binary, which must be on `PATH`.
    Cbc,
}

impl std::fmt::Display for SolverBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverBackend::Highs => write!(f, "highs"),
            SolverBackend::Scip => write!(f, "scip"),
            SolverBackend::Cbc => write!(f, "cbc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub backend: SolverBackend,
    pub time_limit_secs: Option<f64>, // Wall-clock limit handed to the solver
    pub mip_gap: Option<f64>,         // Relative MIP gap at which the solver may stop
    pub verbose: bool,                // Let the solver print its own log
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub default_dt_hours: f64, // Timestep length used when the timeseries has a single row
    pub timestep_tolerance_secs: f64, // Allowed deviation from uniform spacing
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            default_dt_hours: 1.0,
            timestep_tolerance_secs: 1.0,
        }
    }
}

/// File layout of the written reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// One `Result.xlsx` workbook with `Cost` and `Operation` sheets.
    #[default]
    Xlsx,
    /// `Result_cost.csv` and `Result_operation.csv`.
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub format: ReportFormat,
    pub precision: u32,      // Decimals for per-timestep values
    pub cost_precision: u32, // Decimals for the total cost
    pub cost_scale: f64,     // Objective multiplier for the cost report (cents -> currency)
    pub timestamp_format: String,
    pub plot: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            format: ReportFormat::Xlsx,
            precision: 4,
            cost_precision: 2,
            cost_scale: 0.01,
            timestamp_format: "%d/%m/%Y %H:%M".to_string(),
            plot: false,
        }
    }
}

/// Configuration struct holding all dispatch run parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub solver: SolverConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
}

impl DispatchConfig {
    /// Load a configuration from a TOML file; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}
