use std::path::PathBuf;

use calamine::{Data, Range, Reader, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use dispatch_model::{
    BatteryParameters, DispatchInput, GridParameters, Horizon, Timestep, ValidationError,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::InputConfig;

pub const TIMESERIES_SHEET: &str = "Timeseries data";
pub const GRID_SHEET: &str = "Grid";
pub const BATTERY_SHEET: &str = "Battery";

/// Text layouts accepted in the time column besides native spreadsheet dates.
const TIME_FORMATS: [&str; 5] = [
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to open workbook {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("failed to read sheet '{sheet}': {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: calamine::Error,
    },

    #[error("sheet '{0}' has no data row below its header")]
    MissingRow(&'static str),

    #[error("sheet '{sheet}', row {row}, column {column}: cannot read {value:?} as {expected}")]
    InvalidCell {
        sheet: &'static str,
        row: usize,
        column: usize,
        value: String,
        expected: &'static str,
    },

    #[error("timeseries contains no timestamped rows")]
    EmptyTimeseries,

    #[error("timeseries is not evenly spaced: step before {at} is {found_secs} s, expected {expected_secs} s")]
    IrregularSpacing {
        at: NaiveDateTime,
        expected_secs: f64,
        found_secs: f64,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Input data loaded for one dispatch run, with the timestamp of every timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedInput {
    pub timestamps: Vec<NaiveDateTime>,
    pub input: DispatchInput,
}

impl LoadedInput {
    pub fn start(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }
}

/// Source of the horizon and parameters for a dispatch run.
pub trait InputProvider {
    fn load(&self) -> Result<LoadedInput, InputError>;
}

/// Reads the timeseries, grid and battery sheets of a spreadsheet workbook.
#[derive(Debug, Clone)]
pub struct WorkbookInput {
    path: PathBuf,
    config: InputConfig,
}

impl WorkbookInput {
    pub fn new(path: impl Into<PathBuf>, config: InputConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

impl InputProvider for WorkbookInput {
    fn load(&self) -> Result<LoadedInput, InputError> {
        let mut workbook = open_workbook_auto(&self.path).map_err(|source| InputError::Open {
            path: self.path.clone(),
            source,
        })?;

        let mut sheet = |name: &str| {
            workbook
                .worksheet_range(name)
                .map_err(|source| InputError::Sheet {
                    sheet: name.to_string(),
                    source,
                })
        };
        let timeseries = sheet(TIMESERIES_SHEET)?;
        let grid = sheet(GRID_SHEET)?;
        let battery = sheet(BATTERY_SHEET)?;

        let (timestamps, horizon) = parse_timeseries(&timeseries, &self.config)?;
        let input = DispatchInput::new(horizon, parse_grid(&grid)?, parse_battery(&battery)?);
        input.validate()?;

        info!(
            path = %self.path.display(),
            steps = input.horizon.len(),
            dt_hours = input.horizon.dt_hours(),
            "loaded dispatch input"
        );
        Ok(LoadedInput { timestamps, input })
    }
}

/// Parses the timeseries sheet: a header row followed by `time, price, load, wind, solar`.
///
/// Rows without a time are dropped, empty values read as 0 and rows are sorted by time.
pub fn parse_timeseries(
    range: &Range<Data>,
    config: &InputConfig,
) -> Result<(Vec<NaiveDateTime>, Horizon), InputError> {
    let mut rows: Vec<(NaiveDateTime, Timestep)> = Vec::new();

    for (row_idx, row) in range.rows().enumerate().skip(1) {
        let cell = |column: usize| row.get(column).unwrap_or(&Data::Empty);
        let Some(time) = cell_time(cell(0), row_idx)? else {
            continue;
        };

        let price = number_or_zero(cell(1), TIMESERIES_SHEET, row_idx, 1)?;
        let load = number_or_zero(cell(2), TIMESERIES_SHEET, row_idx, 2)?;
        let wind = number_or_zero(cell(3), TIMESERIES_SHEET, row_idx, 3)?;
        let solar = number_or_zero(cell(4), TIMESERIES_SHEET, row_idx, 4)?;
        rows.push((time, Timestep::new(load, wind, solar, price)));
    }

    if rows.is_empty() {
        return Err(InputError::EmptyTimeseries);
    }
    rows.sort_by_key(|(time, _)| *time);

    let dt_secs = match rows.as_slice() {
        [(first, _), (second, _), ..] => seconds_between(*first, *second),
        _ => (config.default_dt_hours * 3600.0).round(),
    };
    for pair in rows.windows(2) {
        let found_secs = seconds_between(pair[0].0, pair[1].0);
        if (found_secs - dt_secs).abs() > config.timestep_tolerance_secs {
            return Err(InputError::IrregularSpacing {
                at: pair[1].0,
                expected_secs: dt_secs,
                found_secs,
            });
        }
    }

    debug!(rows = rows.len(), dt_secs, "parsed timeseries sheet");
    let (timestamps, steps): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
    let horizon = Horizon::new(dt_secs / 3600.0, steps)?;
    Ok((timestamps, horizon))
}

/// Parses the grid sheet: `max_buy_power, max_sell_power, max_import_power, max_export_power`.
pub fn parse_grid(range: &Range<Data>) -> Result<GridParameters, InputError> {
    let [max_buy_power, max_sell_power, max_import_power, max_export_power] =
        parameter_row::<4>(range, GRID_SHEET)?;
    Ok(GridParameters {
        max_buy_power,
        max_sell_power,
        max_import_power,
        max_export_power,
    })
}

/// Parses the battery sheet: `max_charge_rate, max_discharge_rate, capacity, charge_eff,
/// discharge_eff, min_soc, max_soc, initial_soc`.
pub fn parse_battery(range: &Range<Data>) -> Result<BatteryParameters, InputError> {
    let [
        max_charge_rate,
        max_discharge_rate,
        capacity,
        charge_eff,
        discharge_eff,
        min_soc,
        max_soc,
        initial_soc,
    ] = parameter_row::<8>(range, BATTERY_SHEET)?;
    Ok(BatteryParameters {
        max_charge_rate,
        max_discharge_rate,
        capacity,
        charge_eff,
        discharge_eff,
        min_soc,
        max_soc,
        initial_soc,
    })
}

/// First data row below the header; every one of the `N` leading cells must hold a number.
fn parameter_row<const N: usize>(
    range: &Range<Data>,
    sheet: &'static str,
) -> Result<[f64; N], InputError> {
    let row = range.rows().nth(1).ok_or(InputError::MissingRow(sheet))?;
    let mut values = [0.0; N];
    for (column, value) in values.iter_mut().enumerate() {
        let cell = row.get(column).unwrap_or(&Data::Empty);
        *value = match cell {
            Data::Empty => return Err(invalid_cell(sheet, 1, column, cell, "a number")),
            other => number_or_zero(other, sheet, 1, column)?,
        };
    }
    Ok(values)
}

fn number_or_zero(
    cell: &Data,
    sheet: &'static str,
    row: usize,
    column: usize,
) -> Result<f64, InputError> {
    match cell {
        Data::Empty => Ok(0.0),
        Data::Float(value) => Ok(*value),
        Data::Int(value) => Ok(*value as f64),
        Data::String(text) if text.trim().is_empty() => Ok(0.0),
        Data::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid_cell(sheet, row, column, cell, "a number")),
        other => Err(invalid_cell(sheet, row, column, other, "a number")),
    }
}

fn cell_time(cell: &Data, row: usize) -> Result<Option<NaiveDateTime>, InputError> {
    let time = match cell {
        Data::Empty => return Ok(None),
        Data::String(text) if text.trim().is_empty() => return Ok(None),
        Data::DateTime(value) => from_excel_serial(value.as_f64()),
        Data::Float(serial) => from_excel_serial(*serial),
        Data::Int(serial) => from_excel_serial(*serial as f64),
        Data::String(text) | Data::DateTimeIso(text) => parse_time_text(text.trim()),
        _ => None,
    };
    time.map(Some)
        .ok_or_else(|| invalid_cell(TIMESERIES_SHEET, row, 0, cell, "a timestamp"))
}

fn parse_time_text(text: &str) -> Option<NaiveDateTime> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Spreadsheet day serial (days since 1899-12-30) to a timestamp rounded to the second.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_seconds(seconds)?)
}

fn seconds_between(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    ((later - earlier).num_milliseconds() as f64 / 1000.0).round()
}

fn invalid_cell(
    sheet: &'static str,
    row: usize,
    column: usize,
    cell: &Data,
    expected: &'static str,
) -> InputError {
    InputError::InvalidCell {
        sheet,
        row,
        column,
        value: cell.to_string(),
        expected,
    }
}
