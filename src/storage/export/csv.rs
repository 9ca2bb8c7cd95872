//! CSV expense export.
//!
//! An append-only spreadsheet-compatible file with one row per expense.
//! Dates are written in UTC. Times keep their fractional seconds; a whole
//! second is written without a fraction.

use crate::models::{CategoryTotals, ExpenseId, ExpenseRecord, ExportInfo, ExportStats};
use crate::storage::metrics::observe;
use crate::storage::sqlite::acquire_lock;
use crate::storage::traits::ExportBackend;
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "csv_export";

/// Header row of the export file.
pub const CSV_HEADERS: [&str; 6] = ["id", "date", "time", "amount", "category", "description"];

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// CSV-file export backend.
///
/// Appends are serialized through an internal lock; reads take the same lock
/// so they never observe a half-written row.
pub struct CsvExportBackend {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvExportBackend {
    /// Creates a backend writing to `path`.
    ///
    /// The file is created with a header row on the first append. Parent
    /// directories are created here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the parent directory cannot be
    /// created.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::StoreUnavailable {
                store: BACKEND.to_string(),
                cause: format!("{}: {e}", parent.display()),
            })?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Returns the export file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn needs_header(&self) -> bool {
        std::fs::metadata(&self.path).map_or(true, |m| m.len() == 0)
    }

    fn open_for_append(&self) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::StoreUnavailable {
                store: BACKEND.to_string(),
                cause: format!("{}: {e}", self.path.display()),
            })
    }

    /// Reads every row of the file. A missing file reads as empty.
    fn read_all(&self) -> Result<Vec<ExpenseRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| Error::operation("open_csv", e))?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| Error::operation("read_csv", e))?;
            records.push(parse_row(&row)?);
        }
        Ok(records)
    }
}

fn format_row(record: &ExpenseRecord) -> [String; 6] {
    [
        record.id.to_string(),
        record.date.format(DATE_FORMAT).to_string(),
        record.date.format(TIME_FORMAT).to_string(),
        record.amount.to_string(),
        record.category.clone(),
        record.description.clone().unwrap_or_default(),
    ]
}

fn parse_row(row: &csv::StringRecord) -> Result<ExpenseRecord> {
    let field = |i: usize| row.get(i).unwrap_or_default();

    let date = NaiveDate::parse_from_str(field(1), DATE_FORMAT)
        .map_err(|e| Error::InvalidInput(format!("date '{}': {e}", field(1))))?;
    let time = NaiveTime::parse_from_str(field(2), TIME_FORMAT)
        .map_err(|e| Error::InvalidInput(format!("time '{}': {e}", field(2))))?;
    let amount = Decimal::from_str(field(3))
        .map_err(|e| Error::InvalidInput(format!("amount '{}': {e}", field(3))))?;
    let description = Some(field(5).to_string()).filter(|d| !d.is_empty());

    ExpenseRecord::with_id(
        ExpenseId::new(field(0)),
        amount,
        field(4),
        description,
        NaiveDateTime::new(date, time).and_utc(),
    )
}

fn summarize(records: &[ExpenseRecord]) -> ExportStats {
    let mut stats = ExportStats::default();
    for record in records {
        stats.total_expenses += 1;
        stats.total_amount += record.amount;

        let totals: &mut CategoryTotals =
            stats.categories.entry(record.category.clone()).or_default();
        totals.count += 1;
        totals.amount += record.amount;

        if stats.first_record_date.is_none_or(|d| record.date < d) {
            stats.first_record_date = Some(record.date);
        }
        if stats.last_record_date.is_none_or(|d| record.date > d) {
            stats.last_record_date = Some(record.date);
        }
    }
    stats
}

impl ExportBackend for CsvExportBackend {
    #[instrument(skip(self, record), fields(operation = "append", backend = BACKEND, expense.id = %record.id))]
    fn append(&self, record: &ExpenseRecord) -> Result<()> {
        let start = Instant::now();
        let result = (|| -> Result<()> {
            let _guard = acquire_lock(&self.lock);
            let write_header = self.needs_header();
            let file = self.open_for_append()?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false) // header written manually for new files only
                .from_writer(file);

            if write_header {
                writer
                    .write_record(CSV_HEADERS)
                    .map_err(|e| Error::operation("write_csv_headers", e))?;
            }
            writer
                .write_record(format_row(record))
                .map_err(|e| Error::operation("write_csv", e))?;
            writer.flush().map_err(|e| Error::operation("flush_csv", e))
        })();
        observe(BACKEND, "append", start, result)
    }

    #[instrument(skip(self), fields(operation = "statistics", backend = BACKEND))]
    fn statistics(&self) -> Result<ExportStats> {
        let start = Instant::now();
        let result = {
            let _guard = acquire_lock(&self.lock);
            self.read_all().map(|records| summarize(&records))
        };
        observe(BACKEND, "statistics", start, result)
    }

    #[instrument(skip(self), fields(operation = "query_range", backend = BACKEND))]
    fn query_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ExpenseRecord>> {
        let start = Instant::now();
        let result = {
            let _guard = acquire_lock(&self.lock);
            self.read_all().map(|records| {
                records
                    .into_iter()
                    .filter(|r| (from..=to).contains(&r.date.date_naive()))
                    .collect()
            })
        };
        observe(BACKEND, "query_range", start, result)
    }

    #[instrument(skip(self), fields(operation = "query_by_category", backend = BACKEND))]
    fn query_by_category(&self, category: &str) -> Result<Vec<ExpenseRecord>> {
        let start = Instant::now();
        let result = {
            let _guard = acquire_lock(&self.lock);
            self.read_all().map(|records| {
                records
                    .into_iter()
                    .filter(|r| r.is_category(category))
                    .collect()
            })
        };
        observe(BACKEND, "query_by_category", start, result)
    }

    fn info(&self) -> Result<ExportInfo> {
        let _guard = acquire_lock(&self.lock);
        let rows = self.read_all()?.len();
        Ok(ExportInfo {
            path: self.path.clone(),
            exists: self.path.exists(),
            rows: rows as u64,
        })
    }
}
