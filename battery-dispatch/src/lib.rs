pub mod config;
pub mod dispatch;
pub mod error;
pub mod general;

// Re-export commonly used items for convenience
pub use config::DispatchConfig;
pub use dispatch::milp::{solve_dispatch, solve_dispatch_with};
pub use error::DispatchError;
pub use general::{
    CsvReportSink, InputProvider, LoadedInput, ResultSink, WorkbookInput, XlsxReportSink,
};
