use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// How the solver terminated for an accepted schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "./schedule.ts")]
pub enum SolveStatus {
    /// The schedule is proven cost-minimal.
    Optimal,
    /// The solver stopped at a time or iteration limit with a feasible schedule.
    TimeLimited,
    /// The solver stopped within the configured relative MIP gap of the bound.
    GapLimited,
}

impl SolveStatus {
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "optimal"),
            SolveStatus::TimeLimited => write!(f, "time limited"),
            SolveStatus::GapLimited => write!(f, "gap limited"),
        }
    }
}

/// Solved decision values for one timestep.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./schedule.ts")]
pub struct DispatchRecord {
    /// Net power drawn from the grid (kW); negative when exporting.
    pub grid: f64,
    /// Net battery power (kW); positive when discharging.
    pub batt_power: f64,
    /// Charging power (kW), never positive.
    pub charge: f64,
    /// Discharging power (kW), never negative.
    pub discharge: f64,
    /// State of charge at the end of the timestep.
    pub soc: f64,
    /// 1 when the timestep runs in charging mode, 0 otherwise.
    pub charge_status: u8,
}

impl DispatchRecord {
    /// Copy with every power and SOC value rounded to `decimals` places, for reporting.
    pub fn rounded(&self, decimals: u32) -> Self {
        Self {
            grid: round_to(self.grid, decimals),
            batt_power: round_to(self.batt_power, decimals),
            charge: round_to(self.charge, decimals),
            discharge: round_to(self.discharge, decimals),
            soc: round_to(self.soc, decimals),
            charge_status: self.charge_status,
        }
    }

    pub fn is_charging(&self) -> bool {
        self.charge_status == 1
    }
}

/// A solved dispatch plan covering the whole horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./schedule.ts")]
pub struct DispatchSchedule {
    pub status: SolveStatus,
    /// Total energy cost, `sum(grid * price * dt)`, unrounded.
    pub objective: f64,
    /// One record per timestep, aligned with the input horizon.
    pub records: Vec<DispatchRecord>,
    /// Number of decision variables in the model.
    pub num_variables: usize,
    /// Number of constraints in the model.
    pub num_constraints: usize,
    /// Wall-clock time of the solve in milliseconds.
    pub solve_time_ms: u64,
}

impl DispatchSchedule {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records rounded for presentation; `self` keeps full precision.
    pub fn rounded_records(&self, decimals: u32) -> Vec<DispatchRecord> {
        self.records
            .iter()
            .map(|record| record.rounded(decimals))
            .collect()
    }

    pub fn grid(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.grid).collect()
    }

    pub fn batt_power(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.batt_power).collect()
    }

    pub fn soc(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.soc).collect()
    }
}

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    // avoid reporting -0.0
    if rounded == 0.0 { 0.0 } else { rounded }
}
