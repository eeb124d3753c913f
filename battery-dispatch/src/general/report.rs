use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::format::{Item, StrftimeItems};
use dispatch_model::{DispatchSchedule, round_to};
use indexmap::IndexMap;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::Serialize;
use tracing::{info, warn};

use super::workbook::LoadedInput;
use crate::config::{OutputConfig, ReportFormat};
use crate::dispatch::plot::plot_dispatch;

pub const WORKBOOK_FILE: &str = "Result.xlsx";
pub const COST_SHEET: &str = "Cost";
pub const OPERATION_SHEET: &str = "Operation";
pub const OPERATION_FILE: &str = "Result_operation.csv";
pub const COST_FILE: &str = "Result_cost.csv";
pub const PLOT_FILE: &str = "dispatch_profile.png";

const OPERATION_HEADERS: [&str; 7] = [
    "Time",
    "Grid Power Flow (kW)",
    "Battery Output (kW)",
    "Charging Power (kW)",
    "Discharging Power (kW)",
    "State-of-charge (SOC)",
    "Charge Status",
];

/// Destination for a solved dispatch schedule.
pub trait ResultSink {
    fn write(&self, loaded: &LoadedInput, schedule: &DispatchSchedule) -> Result<()>;
}

/// Sink writing reports in the configured format.
pub fn report_sink(config: OutputConfig) -> Box<dyn ResultSink> {
    match config.format {
        ReportFormat::Xlsx => Box::new(XlsxReportSink::new(config)),
        ReportFormat::Csv => Box::new(CsvReportSink::new(config)),
    }
}

#[derive(Debug, Serialize)]
struct OperationRow {
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Grid Power Flow (kW)")]
    grid: f64,
    #[serde(rename = "Battery Output (kW)")]
    batt_power: f64,
    #[serde(rename = "Charging Power (kW)")]
    charge: f64,
    #[serde(rename = "Discharging Power (kW)")]
    discharge: f64,
    #[serde(rename = "State-of-charge (SOC)")]
    soc: f64,
    #[serde(rename = "Charge Status")]
    charge_status: u8,
}

impl OperationRow {
    fn values(&self) -> [f64; 6] {
        [
            self.grid,
            self.batt_power,
            self.charge,
            self.discharge,
            self.soc,
            f64::from(self.charge_status),
        ]
    }
}

/// One entry of the cost summary.
#[derive(Debug, Clone, PartialEq)]
pub enum CostValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for CostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostValue::Number(value) => write!(f, "{value}"),
            CostValue::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Ordered key/value summary of the run, costs scaled into the reporting currency.
pub fn cost_summary(
    config: &OutputConfig,
    loaded: &LoadedInput,
    schedule: &DispatchSchedule,
) -> IndexMap<&'static str, CostValue> {
    let scale = config.cost_scale;
    let decimals = config.cost_precision;
    let baseline = loaded.input.horizon.baseline_cost();

    let mut summary = IndexMap::new();
    summary.insert(
        "Total Cost of Importing Power ($)",
        CostValue::Number(round_to(schedule.objective * scale, decimals)),
    );
    summary.insert(
        "Cost Without Battery ($)",
        CostValue::Number(round_to(baseline * scale, decimals)),
    );
    summary.insert("Solve Status", CostValue::Text(schedule.status.to_string()));
    summary.insert(
        "Number of Variables",
        CostValue::Number(schedule.num_variables as f64),
    );
    summary.insert(
        "Number of Constraints",
        CostValue::Number(schedule.num_constraints as f64),
    );
    summary.insert(
        "Solve Time (ms)",
        CostValue::Number(schedule.solve_time_ms as f64),
    );
    summary
}

fn operation_rows(
    config: &OutputConfig,
    loaded: &LoadedInput,
    schedule: &DispatchSchedule,
) -> Result<Vec<OperationRow>> {
    if loaded.timestamps.len() != schedule.len() {
        bail!(
            "schedule has {} records for {} timestamps",
            schedule.len(),
            loaded.timestamps.len()
        );
    }
    check_timestamp_format(&config.timestamp_format)?;

    let format = config.timestamp_format.as_str();
    let rows = loaded
        .timestamps
        .iter()
        .zip(schedule.rounded_records(config.precision))
        .map(|(time, record)| OperationRow {
            time: time.format(format).to_string(),
            grid: record.grid,
            batt_power: record.batt_power,
            charge: record.charge,
            discharge: record.discharge,
            soc: record.soc,
            charge_status: record.charge_status,
        })
        .collect();
    Ok(rows)
}

fn create_dir(config: &OutputConfig) -> Result<()> {
    std::fs::create_dir_all(&config.dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.dir.display()
        )
    })
}

fn plot_if_enabled(config: &OutputConfig, loaded: &LoadedInput, schedule: &DispatchSchedule) {
    if !config.plot {
        return;
    }
    // a failed plot does not invalidate the reports
    let path = config.dir.join(PLOT_FILE);
    if let Err(e) = plot_dispatch(&loaded.input.horizon, schedule, &path) {
        warn!(error = %e, "failed to plot dispatch profile");
    }
}

/// Writes `Result.xlsx` with a `Cost` and an `Operation` sheet, plus an optional plot.
#[derive(Debug, Clone)]
pub struct XlsxReportSink {
    config: OutputConfig,
}

impl XlsxReportSink {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn path(&self) -> PathBuf {
        self.config.dir.join(WORKBOOK_FILE)
    }
}

fn write_header(worksheet: &mut Worksheet, headers: &[&str], bold: &Format) -> Result<()> {
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, bold)?;
        worksheet.set_column_width(col as u16, header.len().max(12) as f64)?;
    }
    Ok(())
}

impl ResultSink for XlsxReportSink {
    fn write(&self, loaded: &LoadedInput, schedule: &DispatchSchedule) -> Result<()> {
        let rows = operation_rows(&self.config, loaded, schedule)?;
        let summary = cost_summary(&self.config, loaded, schedule);
        create_dir(&self.config)?;

        let bold = Format::new().set_bold();
        let mut workbook = Workbook::new();

        let cost = workbook.add_worksheet();
        cost.set_name(COST_SHEET)?;
        let keys: Vec<&str> = summary.keys().copied().collect();
        write_header(cost, &keys, &bold)?;
        for (col, value) in summary.values().enumerate() {
            match value {
                CostValue::Number(number) => cost.write_number(1, col as u16, *number)?,
                CostValue::Text(text) => cost.write_string(1, col as u16, text.as_str())?,
            };
        }

        let operation = workbook.add_worksheet();
        operation.set_name(OPERATION_SHEET)?;
        write_header(operation, &OPERATION_HEADERS, &bold)?;
        for (i, row) in rows.iter().enumerate() {
            let r = (i + 1) as u32;
            operation.write_string(r, 0, row.time.as_str())?;
            for (col, value) in row.values().into_iter().enumerate() {
                operation.write_number(r, (col + 1) as u16, value)?;
            }
        }

        let path = self.path();
        workbook
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "report written");

        plot_if_enabled(&self.config, loaded, schedule);
        Ok(())
    }
}

/// Writes the operation and cost reports as CSV files, plus an optional plot.
#[derive(Debug, Clone)]
pub struct CsvReportSink {
    config: OutputConfig,
}

impl CsvReportSink {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.config.dir.join(file)
    }

    fn write_operation(&self, rows: &[OperationRow]) -> Result<()> {
        let path = self.path(OPERATION_FILE);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_cost(&self, summary: &IndexMap<&'static str, CostValue>) -> Result<()> {
        let path = self.path(COST_FILE);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(["Metric", "Value"])?;
        for (metric, value) in summary {
            writer.write_record([*metric, value.to_string().as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ResultSink for CsvReportSink {
    fn write(&self, loaded: &LoadedInput, schedule: &DispatchSchedule) -> Result<()> {
        let rows = operation_rows(&self.config, loaded, schedule)?;
        create_dir(&self.config)?;

        self.write_operation(&rows)?;
        self.write_cost(&cost_summary(&self.config, loaded, schedule))?;
        info!(dir = %self.config.dir.display(), "reports written");

        plot_if_enabled(&self.config, loaded, schedule);
        Ok(())
    }
}

/// Rejects strftime patterns chrono cannot render, which would otherwise panic on format.
fn check_timestamp_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        bail!("Invalid timestamp format: {format:?}");
    }
    Ok(())
}
