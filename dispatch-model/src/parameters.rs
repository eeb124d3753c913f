use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::ValidationError;
use crate::horizon::Horizon;

/// Power transfer limits of the grid connection, constant over the horizon.
///
/// Two separate families of limits apply: the buy/sell limits bound the grid flow itself,
/// while the import/export limits bound the site's residual demand net of battery action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./parameters.ts")]
pub struct GridParameters {
    /// Maximum power drawn from the grid (kW).
    pub max_buy_power: f64,
    /// Maximum power fed into the grid (kW).
    pub max_sell_power: f64,
    /// Maximum residual demand the site may import (kW).
    pub max_import_power: f64,
    /// Maximum residual surplus the site may export (kW).
    pub max_export_power: f64,
}

impl GridParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_finite(&[
            ("max_buy_power", self.max_buy_power),
            ("max_sell_power", self.max_sell_power),
            ("max_import_power", self.max_import_power),
            ("max_export_power", self.max_export_power),
        ])
    }
}

/// Physical parameters of the battery.
///
/// The efficiency factors enter the state-of-charge recursion as `(1 - charge_eff)` on
/// charge and `1 / (1 - discharge_eff)` on discharge, so `discharge_eff` must stay below 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./parameters.ts")]
pub struct BatteryParameters {
    /// Maximum charging power (kW).
    pub max_charge_rate: f64,
    /// Maximum discharging power (kW).
    pub max_discharge_rate: f64,
    /// Usable energy capacity (kWh).
    pub capacity: f64,
    /// Charging efficiency factor in [0, 1].
    pub charge_eff: f64,
    /// Discharging efficiency factor in [0, 1).
    pub discharge_eff: f64,
    /// Lower state-of-charge bound as a fraction of capacity.
    pub min_soc: f64,
    /// Upper state-of-charge bound as a fraction of capacity.
    pub max_soc: f64,
    /// State of charge at the start of the horizon.
    pub initial_soc: f64,
}

impl BatteryParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_finite(&[
            ("max_charge_rate", self.max_charge_rate),
            ("max_discharge_rate", self.max_discharge_rate),
            ("capacity", self.capacity),
            ("charge_eff", self.charge_eff),
            ("discharge_eff", self.discharge_eff),
            ("min_soc", self.min_soc),
            ("max_soc", self.max_soc),
            ("initial_soc", self.initial_soc),
        ])?;

        if self.capacity <= 0.0 {
            return Err(ValidationError::NonPositiveCapacity(self.capacity));
        }
        for (field, value) in [
            ("max_charge_rate", self.max_charge_rate),
            ("max_discharge_rate", self.max_discharge_rate),
        ] {
            if value < 0.0 {
                return Err(ValidationError::NegativeRate { field, value });
            }
        }
        for (field, value) in [
            ("charge_eff", self.charge_eff),
            ("discharge_eff", self.discharge_eff),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::EfficiencyOutOfRange { field, value });
            }
        }
        if self.discharge_eff == 1.0 {
            return Err(ValidationError::DegenerateDischargeEfficiency);
        }
        for (field, value) in [
            ("min_soc", self.min_soc),
            ("max_soc", self.max_soc),
            ("initial_soc", self.initial_soc),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::SocOutOfRange { field, value });
            }
        }

        Ok(())
    }

    /// State-of-charge gained per kW of charging power over `dt_hours` (applied to a
    /// non-positive charge value, hence the sign in the recursion).
    pub fn charge_soc_factor(&self, dt_hours: f64) -> f64 {
        dt_hours / self.capacity * (1.0 - self.charge_eff)
    }

    /// State-of-charge drawn per kW of delivered discharge power over `dt_hours`.
    pub fn discharge_soc_factor(&self, dt_hours: f64) -> f64 {
        dt_hours / self.capacity / (1.0 - self.discharge_eff)
    }

    /// State of charge after one step starting from `previous_soc`.
    pub fn next_soc(&self, previous_soc: f64, charge: f64, discharge: f64, dt_hours: f64) -> f64 {
        previous_soc
            - (self.charge_soc_factor(dt_hours) * charge
                + self.discharge_soc_factor(dt_hours) * discharge)
    }
}

/// Everything one dispatch solve needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./parameters.ts")]
pub struct DispatchInput {
    pub horizon: Horizon,
    pub grid: GridParameters,
    pub battery: BatteryParameters,
}

impl DispatchInput {
    pub fn new(horizon: Horizon, grid: GridParameters, battery: BatteryParameters) -> Self {
        Self {
            horizon,
            grid,
            battery,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.horizon.validate()?;
        self.grid.validate()?;
        self.battery.validate()
    }
}

fn check_finite(values: &[(&'static str, f64)]) -> Result<(), ValidationError> {
    match values.iter().find(|(_, value)| !value.is_finite()) {
        Some(&(field, value)) => Err(ValidationError::NonFiniteParameter { field, value }),
        None => Ok(()),
    }
}
