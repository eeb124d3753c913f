use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::ValidationError;

/// Forecast values for a single timestep of the planning horizon.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./horizon.ts")]
pub struct Timestep {
    /// Site load (kW).
    pub load: f64,
    /// Wind generation (kW).
    pub wind: f64,
    /// Solar generation (kW).
    pub solar: f64,
    /// Energy price per kWh.
    pub price: f64,
}

impl Timestep {
    pub fn new(load: f64, wind: f64, solar: f64, price: f64) -> Self {
        Self {
            load,
            wind,
            solar,
            price,
        }
    }

    /// Load left over after on-site generation, before any battery action.
    pub fn net_load(&self) -> f64 {
        self.load - self.solar - self.wind
    }

    fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("load", self.load),
            ("wind", self.wind),
            ("solar", self.solar),
            ("price", self.price),
        ]
    }
}

/// Ordered, gap-free sequence of timesteps with a fixed duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./horizon.ts")]
pub struct Horizon {
    /// Duration of every timestep in hours.
    dt_hours: f64,
    /// Timesteps in chronological order.
    steps: Vec<Timestep>,
}

impl Horizon {
    /// Creates a horizon, rejecting empty sequences, invalid durations and non-finite values.
    pub fn new(dt_hours: f64, steps: Vec<Timestep>) -> Result<Self, ValidationError> {
        let horizon = Self { dt_hours, steps };
        horizon.validate()?;
        Ok(horizon)
    }

    /// Checks the invariants `new` enforces; deserialized horizons bypass the constructor.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.steps.is_empty() {
            return Err(ValidationError::EmptyHorizon);
        }
        if !self.dt_hours.is_finite() || self.dt_hours <= 0.0 {
            return Err(ValidationError::InvalidTimestep(self.dt_hours));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if let Some((field, value)) = step.fields().into_iter().find(|(_, v)| !v.is_finite())
            {
                return Err(ValidationError::NonFiniteTimestep {
                    index,
                    field,
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn dt_hours(&self) -> f64 {
        self.dt_hours
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Timestep] {
        &self.steps
    }

    pub fn iter(&self) -> impl Iterator<Item = &Timestep> {
        self.steps.iter()
    }

    /// Cost of covering the net load from the grid alone, with the battery idle.
    pub fn baseline_cost(&self) -> f64 {
        self.steps
            .iter()
            .map(|step| step.net_load() * step.price * self.dt_hours)
            .sum()
    }
}
