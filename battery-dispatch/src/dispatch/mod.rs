pub mod milp;
pub mod plot;
