//! Ledger store: CSV load, validation and all-or-nothing commit.
//!
//! - Load is strict about structure (header, dates) and lenient about cells
//! - Commit stages the complete file in memory, writes `<ledger>.tmp`, then
//!   renames it over the ledger, so a failed run leaves the old file intact
//! - An optional `<ledger>.bak` copy is taken before a rewrite replaces data

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::cell::Cell;
use crate::ledger::{Ledger, ObservationRow};
use crate::schema::{FieldId, ObservationSchema, DATE_COLUMN};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// How a commit reaches the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    /// Stage the whole table and replace the file.
    #[default]
    Rewrite,
    /// Keep the stored bytes and add rows for dates not on disk at load.
    /// Updates to existing rows are dropped.
    Append,
}

impl fmt::Display for PersistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistMode::Rewrite => write!(f, "rewrite"),
            PersistMode::Append => write!(f, "append"),
        }
    }
}

impl FromStr for PersistMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rewrite" => Ok(PersistMode::Rewrite),
            "append" => Ok(PersistMode::Append),
            other => Err(format!("unknown persist mode '{other}' (rewrite|append)")),
        }
    }
}

/// A persisted ledger that cannot be loaded without guessing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("header has no 'date' column")]
    MissingDateColumn,

    #[error("header column '{0}' is not in the schema")]
    UnknownColumn(String),

    #[error("header column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("line {line}: unparsable date '{raw}'")]
    BadDate { line: u64, raw: String },

    #[error("line {line}: row has data but no date")]
    EmptyDate { line: u64 },

    #[error("line {line}: date {date} already appears on line {first_line}")]
    DuplicateDate {
        date: NaiveDate,
        first_line: u64,
        line: u64,
    },

    #[error("line {line}: expected {expected} fields, found {found}")]
    RecordLength {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("append mode requires the header to match the schema exactly")]
    HeaderMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{}: {violation}", path.display())]
    Schema {
        path: PathBuf,
        violation: SchemaViolation,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}: CSV error: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },
}

impl LedgerError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        LedgerError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn violation(&self) -> Option<&SchemaViolation> {
        match self {
            LedgerError::Schema { violation, .. } => Some(violation),
            _ => None,
        }
    }
}

/// What a commit wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub path: PathBuf,
    pub mode: PersistMode,
    pub rows_written: usize,
    /// Append mode only: updates to rows already on disk that were not persisted.
    pub dropped_updates: usize,
    pub bytes: usize,
    /// blake3 of the committed file contents.
    pub digest: String,
    pub backup: Option<PathBuf>,
}

/// State of the file at load time, needed by append commits.
#[derive(Debug, Default)]
struct DiskState {
    has_content: bool,
    baseline: HashMap<NaiveDate, ObservationRow>,
}

#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    mode: PersistMode,
    backup: bool,
    disk: DiskState,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: PersistMode::Rewrite,
            backup: false,
            disk: DiskState::default(),
        }
    }

    pub fn with_mode(mut self, mode: PersistMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> PersistMode {
        self.mode
    }

    fn backup_path(&self) -> PathBuf {
        sibling(&self.path, "bak")
    }

    fn tmp_path(&self) -> PathBuf {
        sibling(&self.path, "tmp")
    }

    fn violation(&self, violation: SchemaViolation) -> LedgerError {
        LedgerError::Schema {
            path: self.path.clone(),
            violation,
        }
    }

    /// Load the whole ledger. A missing or empty file is an empty ledger.
    pub fn load(&mut self, schema: &ObservationSchema) -> Result<Ledger, LedgerError> {
        self.disk = DiskState::default();

        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "ledger not found, starting empty");
                return Ok(Ledger::new(schema));
            }
            Err(e) => return Err(LedgerError::io(&self.path, e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Ledger::new(schema));
        }
        self.disk.has_content = true;

        let ledger = self.parse(schema, &bytes)?;

        if self.mode == PersistMode::Append {
            self.disk.baseline = ledger.rows().iter().map(|r| (r.date, r.clone())).collect();
        }

        tracing::info!(
            path = %self.path.display(),
            rows = ledger.len(),
            "ledger loaded"
        );
        Ok(ledger)
    }

    fn parse(&self, schema: &ObservationSchema, bytes: &[u8]) -> Result<Ledger, LedgerError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);
        let mut records = rdr.records();

        let header = match records.next() {
            Some(rec) => rec.map_err(|e| LedgerError::csv(&self.path, e))?,
            None => return Ok(Ledger::new(schema)),
        };
        let header: Vec<String> = header
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let columns = self.map_header(schema, &header)?;
        let date_col = columns.date;

        let mut rows = Vec::new();
        let mut seen: HashMap<NaiveDate, u64> = HashMap::new();

        for rec in records {
            let rec = rec.map_err(|e| LedgerError::csv(&self.path, e))?;
            let line = rec.position().map(|p| p.line()).unwrap_or_default();

            if rec.len() != header.len() {
                return Err(self.violation(SchemaViolation::RecordLength {
                    line,
                    expected: header.len(),
                    found: rec.len(),
                }));
            }

            let raw_date = rec.get(date_col).unwrap_or("").trim();
            if raw_date.is_empty() {
                if rec.iter().all(|c| c.trim().is_empty()) {
                    tracing::debug!(line, "dropping empty record");
                    continue;
                }
                return Err(self.violation(SchemaViolation::EmptyDate { line }));
            }
            let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT).map_err(|_| {
                self.violation(SchemaViolation::BadDate {
                    line,
                    raw: raw_date.to_string(),
                })
            })?;
            if let Some(&first_line) = seen.get(&date) {
                return Err(self.violation(SchemaViolation::DuplicateDate {
                    date,
                    first_line,
                    line,
                }));
            }
            seen.insert(date, line);

            let mut row = ObservationRow::empty(date, schema.len());
            for (col, field) in columns.fields.iter().enumerate() {
                let Some(field) = field else { continue };
                let raw = rec.get(col).unwrap_or("");
                let cell = Cell::parse(raw);
                if cell.is_malformed() {
                    tracing::warn!(
                        line,
                        %date,
                        field = %schema.field(*field).name,
                        raw,
                        "malformed cell kept as-is"
                    );
                }
                row.set(*field, cell);
            }
            rows.push(row);
        }

        Ok(Ledger::from_rows(schema.len(), rows))
    }

    fn map_header(
        &self,
        schema: &ObservationSchema,
        header: &[String],
    ) -> Result<HeaderMap, LedgerError> {
        if self.mode == PersistMode::Append {
            let expected: Vec<String> = schema.header().into_iter().map(String::from).collect();
            if header != expected.as_slice() {
                return Err(self.violation(SchemaViolation::HeaderMismatch {
                    expected,
                    found: header.to_vec(),
                }));
            }
        }

        let mut seen = HashSet::new();
        let mut date = None;
        let mut fields = Vec::with_capacity(header.len());

        for (i, name) in header.iter().enumerate() {
            if !seen.insert(name.as_str()) {
                return Err(self.violation(SchemaViolation::DuplicateColumn(name.clone())));
            }
            if name == DATE_COLUMN {
                date = Some(i);
                fields.push(None);
                continue;
            }
            match schema.find(name) {
                Some(id) => fields.push(Some(id)),
                None => return Err(self.violation(SchemaViolation::UnknownColumn(name.clone()))),
            }
        }

        let date = date.ok_or_else(|| self.violation(SchemaViolation::MissingDateColumn))?;

        for f in schema.fields() {
            if !seen.contains(f.name.as_str()) {
                tracing::warn!(field = %f.name, "header lacks schema column; restored on commit");
            }
        }

        Ok(HeaderMap { date, fields })
    }

    /// Commit with the store's configured mode.
    pub fn commit(
        &self,
        ledger: &Ledger,
        schema: &ObservationSchema,
    ) -> Result<CommitSummary, LedgerError> {
        self.commit_with(ledger, schema, self.mode)
    }

    /// Commit with an explicit mode. Repair passes always use `Rewrite`.
    pub fn commit_with(
        &self,
        ledger: &Ledger,
        schema: &ObservationSchema,
        mode: PersistMode,
    ) -> Result<CommitSummary, LedgerError> {
        if mode == PersistMode::Append && self.disk.has_content {
            return self.commit_append(ledger, schema);
        }

        let bytes = render(ledger, schema).map_err(|e| LedgerError::csv(&self.path, e))?;

        let backup = if self.backup && self.disk.has_content && self.path.exists() {
            let bak = self.backup_path();
            fs::copy(&self.path, &bak).map_err(|e| LedgerError::io(&bak, e))?;
            Some(bak)
        } else {
            None
        };

        self.replace_file(&bytes)?;

        let summary = CommitSummary {
            path: self.path.clone(),
            mode,
            rows_written: ledger.len(),
            dropped_updates: 0,
            bytes: bytes.len(),
            digest: blake3::hash(&bytes).to_hex().to_string(),
            backup,
        };
        tracing::info!(
            path = %summary.path.display(),
            mode = %mode,
            rows = summary.rows_written,
            digest = %summary.digest,
            "ledger committed"
        );
        Ok(summary)
    }

    fn commit_append(
        &self,
        ledger: &Ledger,
        schema: &ObservationSchema,
    ) -> Result<CommitSummary, LedgerError> {
        let mut staged = fs::read(&self.path).map_err(|e| LedgerError::io(&self.path, e))?;
        if staged.last().is_some_and(|b| *b != b'\n') {
            staged.push(b'\n');
        }

        let mut new_rows = Vec::new();
        let mut dropped = 0;
        for row in ledger.rows() {
            match self.disk.baseline.get(&row.date) {
                None => new_rows.push(row),
                Some(before) if before != row => {
                    dropped += 1;
                    tracing::warn!(date = %row.date, "append mode: update to stored row dropped");
                }
                Some(_) => {}
            }
        }

        let mut wtr = csv::Writer::from_writer(vec![]);
        for row in &new_rows {
            wtr.write_record(record(row, schema))
                .map_err(|e| LedgerError::csv(&self.path, e))?;
        }
        let appended = wtr
            .into_inner()
            .map_err(|e| LedgerError::io(&self.path, e.into_error()))?;
        staged.extend_from_slice(&appended);

        self.replace_file(&staged)?;

        let summary = CommitSummary {
            path: self.path.clone(),
            mode: PersistMode::Append,
            rows_written: new_rows.len(),
            dropped_updates: dropped,
            bytes: staged.len(),
            digest: blake3::hash(&staged).to_hex().to_string(),
            backup: None,
        };
        tracing::info!(
            path = %summary.path.display(),
            appended = summary.rows_written,
            dropped = dropped,
            "ledger appended"
        );
        Ok(summary)
    }

    /// Atomic replace: write tmp, then rename into place.
    fn replace_file(&self, bytes: &[u8]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }
        let tmp = self.tmp_path();
        fs::write(&tmp, bytes).map_err(|e| LedgerError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            LedgerError::io(&self.path, e)
        })
    }
}

struct HeaderMap {
    date: usize,
    /// Field per file column; `None` for the date column.
    fields: Vec<Option<FieldId>>,
}

fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(ext);
    path.with_file_name(name)
}

fn record(row: &ObservationRow, schema: &ObservationSchema) -> Vec<String> {
    std::iter::once(row.date.format(DATE_FORMAT).to_string())
        .chain(
            schema
                .ids()
                .map(|id| row.cell(id).render(schema.field(id).precision)),
        )
        .collect()
}

/// Serialize the full table, header first, rows in ledger order, every value
/// at its field's precision.
pub fn render(ledger: &Ledger, schema: &ObservationSchema) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(schema.header())?;
    for row in ledger.rows() {
        wtr.write_record(record(row, schema))?;
    }
    wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn small_schema() -> ObservationSchema {
        use crate::schema::{FieldDescriptor, UnitFamily};
        ObservationSchema::new(vec![
            FieldDescriptor::new("GOLD", UnitFamily::Price, vec![]),
            FieldDescriptor::new("US 10 YR (%)", UnitFamily::RatePercent, vec![]),
        ])
        .unwrap()
    }

    #[test]
    fn render_formats_at_field_precision() {
        let schema = small_schema();
        let mut ledger = Ledger::new(&schema);
        let mut row = ObservationRow::empty(d("2025-09-05"), 2);
        row.set(FieldId(0), dec!(3613.7).into());
        row.set(FieldId(1), dec!(4.2).into());
        ledger.upsert(row);
        ledger.upsert(ObservationRow::empty(d("2025-09-08"), 2));

        let text = String::from_utf8(render(&ledger, &schema).unwrap()).unwrap();
        assert_eq!(
            text,
            "date,GOLD,US 10 YR (%)\n2025-09-05,3613.70,4.2000\n2025-09-08,,\n"
        );
    }

    #[test]
    fn sibling_paths() {
        assert_eq!(
            sibling(Path::new("data/log.csv"), "tmp"),
            PathBuf::from("data/log.csv.tmp")
        );
    }

    #[test]
    fn persist_mode_parses() {
        assert_eq!("Append".parse::<PersistMode>().unwrap(), PersistMode::Append);
        assert!("fast".parse::<PersistMode>().is_err());
    }
}
