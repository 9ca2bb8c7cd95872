//! Expense export backends.

mod csv;

pub use self::csv::{CSV_HEADERS, CsvExportBackend};
