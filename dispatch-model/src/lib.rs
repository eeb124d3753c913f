pub mod error;
pub mod horizon;
pub mod parameters;
pub mod schedule;

pub use error::ValidationError;
pub use horizon::{Horizon, Timestep};
pub use parameters::{BatteryParameters, DispatchInput, GridParameters};
pub use schedule::{DispatchRecord, DispatchSchedule, SolveStatus, round_to};
