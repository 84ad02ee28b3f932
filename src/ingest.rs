//! Bulk CSV ingestion of reference data.
//!
//! Parses an uploaded CSV, validates each row against the entity kind's
//! column contract, and hands the surviving rows to the storage layer's
//! batched upsert. The whole batch commits as one transaction; rows that
//! fail validation or hit a per-row store error are reported individually
//! and never appear as partial entities.

use serde::Serialize;

use crate::storage::{EntityKind, ReferenceRecord, Storage, StorageError};

/// A malformed or unreadable input that prevents the batch from running at
/// all (as opposed to per-row errors, which are carried in the report).
#[derive(Debug)]
pub enum IngestError {
    /// The CSV could not be parsed.
    Malformed(String),
    /// A required column is missing from the header.
    MissingColumn(&'static str),
    /// The input contained no data rows.
    Empty,
    Storage(StorageError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Malformed(msg) => write!(f, "malformed csv: {msg}"),
            IngestError::MissingColumn(col) => write!(f, "csv must contain a '{col}' column"),
            IngestError::Empty => write!(f, "csv contains no data rows"),
            IngestError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<StorageError> for IngestError {
    fn from(e: StorageError) -> Self {
        IngestError::Storage(e)
    }
}

/// One row that could not be ingested. `row` is the 1-based index over the
/// data rows (the header is not counted).
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

/// Structured result of an ingest run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub created: u32,
    pub updated: u32,
    pub row_errors: Vec<RowError>,
}

/// Overall batch status, used by the web layer to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// Every row succeeded.
    Full,
    /// Some rows succeeded, some errored.
    Partial,
    /// No row succeeded.
    Failed,
}

impl IngestReport {
    pub fn status(&self) -> IngestStatus {
        let succeeded = self.created + self.updated;
        if self.row_errors.is_empty() && succeeded > 0 {
            IngestStatus::Full
        } else if succeeded > 0 {
            IngestStatus::Partial
        } else {
            IngestStatus::Failed
        }
    }
}

/// Required and optional columns for each entity kind. `name` is always the
/// natural key; supplements additionally key on `category`.
fn required_columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Supplement => &["name", "category"],
        EntityKind::Condition | EntityKind::Brand => &["name"],
    }
}

/// Ingest a CSV body for the given entity kind.
///
/// Header problems and unreadable input are terminal ([`IngestError`]);
/// everything row-level lands in the report. Validation happens before the
/// batch transaction opens, so invalid rows never touch the store.
pub fn ingest_csv(
    storage: &Storage,
    kind: EntityKind,
    body: &[u8],
) -> Result<IngestReport, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|e| IngestError::Malformed(e.to_string()))?
        .clone();
    for col in required_columns(kind) {
        if !headers.iter().any(|h| h == *col) {
            return Err(IngestError::MissingColumn(col));
        }
    }
    let column = |name: &str| headers.iter().position(|h| h == name);
    let name_idx = match column("name") {
        Some(i) => i,
        None => return Err(IngestError::MissingColumn("name")),
    };
    let category_idx = column("category");
    let dosage_unit_idx = column("dosage_unit");

    let mut report = IngestReport::default();
    let mut records: Vec<ReferenceRecord> = Vec::new();
    let mut row = 0usize;

    for result in reader.records() {
        row += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                report.row_errors.push(RowError {
                    row,
                    message: format!("unreadable row: {e}"),
                });
                continue;
            }
        };

        let name = record.get(name_idx).unwrap_or("").trim();
        if name.is_empty() {
            report.row_errors.push(RowError {
                row,
                message: "missing value for natural key 'name'".to_string(),
            });
            continue;
        }
        let category = match kind {
            EntityKind::Supplement => {
                let cat = category_idx
                    .and_then(|i| record.get(i))
                    .map(str::trim)
                    .unwrap_or("");
                if cat.is_empty() {
                    report.row_errors.push(RowError {
                        row,
                        message: "missing value for natural key 'category'".to_string(),
                    });
                    continue;
                }
                Some(cat.to_string())
            }
            _ => None,
        };
        let dosage_unit = dosage_unit_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        records.push(ReferenceRecord {
            row,
            name: name.to_string(),
            category,
            dosage_unit,
        });
    }

    if row == 0 {
        return Err(IngestError::Empty);
    }

    if !records.is_empty() {
        let batch = storage.upsert_reference_batch(kind, &records)?;
        report.created = batch.created;
        report.updated = batch.updated;
        for (row, message) in batch.errors {
            report.row_errors.push(RowError { row, message });
        }
        report.row_errors.sort_by_key(|e| e.row);
    }

    crate::slog!(
        "ingest: {} {} created, {} updated, {} row error(s)",
        kind.as_str(),
        report.created,
        report.updated,
        report.row_errors.len()
    );
    Ok(report)
}
