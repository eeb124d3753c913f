pub mod report;
pub mod workbook;

pub use report::{CsvReportSink, ResultSink, XlsxReportSink, report_sink};
pub use workbook::{InputError, InputProvider, LoadedInput, WorkbookInput};
