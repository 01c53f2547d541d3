use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{KopilkaError, Result};
use crate::importer::detect::{auto_detect_columns, infer_preset, BankPreset, ColumnSamples};
use crate::importer::mapping::{Mapping, DEFAULT_EXPENSE_MARKERS, DEFAULT_INCOME_MARKERS, FALLBACK_CURRENCY};
use crate::importer::process::{process_rows, ImportOutcome};
use crate::importer::reader::{self, ParsedFile, SAMPLE_ROWS};
use crate::{accounts, catalog, db, preferences};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    pub bank_preset: BankPreset,
    pub sheet_name: Option<String>,
    pub last_mapping: Option<Mapping>,
}

/// One upload between its steps. A session with `sheet_names` set is still
/// waiting for the user to pick a worksheet and has no rows yet.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSession {
    pub id: i64,
    pub user_id: i64,
    pub created_at: String,
    pub original_name: String,
    pub columns: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    #[serde(skip)]
    pub rows: Vec<Vec<String>>,
    pub metadata: SessionMetadata,
    pub sheet_names: Option<Vec<String>>,
}

impl ImportSession {
    pub fn is_pending(&self) -> bool {
        self.sheet_names.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum UploadOutcome {
    Mapping { session_id: i64 },
    Sheet { session_id: i64, sheet_names: Vec<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct MappingProposal {
    pub session_id: i64,
    pub original_name: String,
    pub bank_preset: BankPreset,
    pub columns: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    pub auto_mapping: Mapping,
    pub column_samples: Vec<ColumnSamples>,
    pub initial: Mapping,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyResult {
    #[serde(flatten)]
    pub outcome: ImportOutcome,
    /// Still set when failing rows were kept for another attempt.
    pub session_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

const SESSION_COLUMNS: &str =
    "id, user_id, created_at, original_name, columns, sample_rows, rows, metadata, sheet_names";

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn session_from_row(row: &Row) -> rusqlite::Result<ImportSession> {
    let sheet_names: Option<String> = row.get(8)?;
    let sheet_names = match sheet_names {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };
    Ok(ImportSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        original_name: row.get(3)?,
        columns: json_column(row, 4)?,
        sample_rows: json_column(row, 5)?,
        rows: json_column(row, 6)?,
        metadata: json_column(row, 7)?,
        sheet_names,
    })
}

pub fn get(conn: &Connection, user_id: i64, session_id: i64) -> Result<ImportSession> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM import_sessions WHERE id = ?1 AND user_id = ?2"),
        params![session_id, user_id],
        session_from_row,
    )
    .optional()?
    .ok_or_else(|| KopilkaError::NotFound(format!("import session {session_id}")))
}

fn save_parsed(
    conn: &Connection,
    session_id: i64,
    original_name: &str,
    parsed: &ParsedFile,
    metadata: &SessionMetadata,
) -> Result<()> {
    conn.execute(
        "UPDATE import_sessions SET original_name = ?1, columns = ?2, sample_rows = ?3, rows = ?4, \
         metadata = ?5, pending_file = NULL, sheet_names = NULL WHERE id = ?6",
        params![
            original_name,
            serde_json::to_string(&parsed.columns)?,
            serde_json::to_string(&parsed.sample_rows())?,
            serde_json::to_string(&parsed.rows)?,
            serde_json::to_string(metadata)?,
            session_id,
        ],
    )?;
    Ok(())
}

fn save_metadata(conn: &Connection, session_id: i64, metadata: &SessionMetadata) -> Result<()> {
    conn.execute(
        "UPDATE import_sessions SET metadata = ?1 WHERE id = ?2",
        params![serde_json::to_string(metadata)?, session_id],
    )?;
    Ok(())
}

fn save_rows(conn: &Connection, session_id: i64, rows: &[Vec<String>]) -> Result<()> {
    let sample: Vec<&Vec<String>> = rows.iter().take(SAMPLE_ROWS).collect();
    conn.execute(
        "UPDATE import_sessions SET rows = ?1, sample_rows = ?2 WHERE id = ?3",
        params![serde_json::to_string(rows)?, serde_json::to_string(&sample)?, session_id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Store an uploaded file. A CSV goes straight to the mapping step; a
/// workbook is parked until a sheet is chosen. `preset` of `None` means
/// "infer it from the columns".
pub fn upload(
    conn: &Connection,
    user_id: i64,
    filename: &str,
    bytes: &[u8],
    preset: Option<BankPreset>,
) -> Result<UploadOutcome> {
    let created_at = db::format_datetime(&db::now());

    if reader::is_spreadsheet(filename) {
        let sheet_names = reader::sheet_names(bytes)?;
        let Some(first) = sheet_names.first() else {
            return Err(KopilkaError::Import("the workbook has no sheets".into()));
        };
        let preset = match preset {
            Some(p) => p,
            None => reader::read_sheet(bytes, Some(first))
                .map(|parsed| infer_preset(&parsed.columns))
                .unwrap_or_default(),
        };
        let metadata = SessionMetadata {
            bank_preset: preset,
            ..SessionMetadata::default()
        };
        conn.execute(
            "INSERT INTO import_sessions (user_id, created_at, original_name, metadata, pending_file, sheet_names) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                created_at,
                filename,
                serde_json::to_string(&metadata)?,
                bytes,
                serde_json::to_string(&sheet_names)?,
            ],
        )?;
        let session_id = conn.last_insert_rowid();
        info!(user_id, session_id, sheets = sheet_names.len(), "workbook uploaded");
        return Ok(UploadOutcome::Sheet { session_id, sheet_names });
    }

    let parsed = reader::read_csv(bytes)?;
    let metadata = SessionMetadata {
        bank_preset: preset.unwrap_or_else(|| infer_preset(&parsed.columns)),
        ..SessionMetadata::default()
    };
    conn.execute(
        "INSERT INTO import_sessions (user_id, created_at, original_name) VALUES (?1, ?2, ?3)",
        params![user_id, created_at, filename],
    )?;
    let session_id = conn.last_insert_rowid();
    save_parsed(conn, session_id, filename, &parsed, &metadata)?;
    info!(user_id, session_id, rows = parsed.rows.len(), preset = metadata.bank_preset.as_str(), "file uploaded");
    Ok(UploadOutcome::Mapping { session_id })
}

/// Parse the chosen worksheet of a parked workbook. An unknown sheet drops
/// the parked upload; the file has to be uploaded again.
pub fn select_sheet(conn: &Connection, user_id: i64, session_id: i64, sheet: &str) -> Result<ImportSession> {
    let session = get(conn, user_id, session_id)?;
    let Some(sheet_names) = &session.sheet_names else {
        return Err(KopilkaError::Import("this upload is not waiting for a sheet".into()));
    };
    if !sheet_names.iter().any(|s| s == sheet) {
        discard(conn, user_id, session_id)?;
        return Err(KopilkaError::Import(
            "the sheet selection has expired; upload the file again".into(),
        ));
    }

    let bytes: Vec<u8> = conn.query_row(
        "SELECT pending_file FROM import_sessions WHERE id = ?1",
        [session_id],
        |r| r.get(0),
    )?;
    let parsed = reader::read_sheet(&bytes, Some(sheet))?;
    let original_name = format!("{} — {}", session.original_name, sheet);
    let metadata = SessionMetadata {
        sheet_name: Some(sheet.to_string()),
        ..session.metadata
    };
    save_parsed(conn, session_id, &original_name, &parsed, &metadata)?;
    info!(user_id, session_id, sheet, rows = parsed.rows.len(), "sheet selected");
    get(conn, user_id, session_id)
}

/// What the mapping step starts from: built-in defaults, then the user's
/// default account and project, then the bank preset, then the mapping used
/// last time on this session; columns still unset come from auto-detection.
pub fn proposal(conn: &Connection, user_id: i64, session_id: i64) -> Result<MappingProposal> {
    let session = get(conn, user_id, session_id)?;
    if session.is_pending() {
        return Err(KopilkaError::Import("choose a sheet first".into()));
    }
    let (auto_mapping, column_samples) = auto_detect_columns(&session.columns, &session.sample_rows);

    let prefs = preferences::sanitized(conn, user_id)?;
    let default_account = match prefs.default_account_id {
        Some(id) => Some(accounts::get_active_account(conn, user_id, id)?),
        None => None,
    };
    let default_project = match prefs.default_project_id {
        Some(id) => Some(catalog::get_active_project(conn, user_id, id)?),
        None => None,
    };

    let mut initial = Mapping {
        default_currency: Some(FALLBACK_CURRENCY.to_string()),
        income_markers: Some(DEFAULT_INCOME_MARKERS.to_string()),
        expense_markers: Some(DEFAULT_EXPENSE_MARKERS.to_string()),
        ..Mapping::default()
    };
    initial.fill_default_names(default_account.as_ref(), default_project.as_ref());
    initial.overlay(&session.metadata.bank_preset.mapping());
    if let Some(last) = &session.metadata.last_mapping {
        let mut last = last.clone();
        if let Some(id) = last.default_account_id {
            if accounts::get_active_account(conn, user_id, id).is_err() {
                last.default_account_id = None;
            }
        }
        if let Some(id) = last.default_project_id {
            if catalog::get_active_project(conn, user_id, id).is_err() {
                last.default_project_id = None;
            }
        }
        initial.overlay(&last);
    }
    initial.fill_columns(&auto_mapping);

    Ok(MappingProposal {
        session_id,
        original_name: session.original_name,
        bank_preset: session.metadata.bank_preset,
        columns: session.columns,
        sample_rows: session.sample_rows,
        auto_mapping,
        column_samples,
        initial,
    })
}

/// Validate the mapping and import the session's rows. Failing rows stay in
/// the session for another attempt; a clean run removes the session.
pub fn apply(conn: &Connection, user_id: i64, session_id: i64, mapping: &Mapping) -> Result<ApplyResult> {
    let session = get(conn, user_id, session_id)?;
    if session.is_pending() {
        return Err(KopilkaError::Import("choose a sheet first".into()));
    }
    let resolved = mapping.resolve(conn, user_id, &session.columns)?;
    let outcome = process_rows(conn, user_id, &session.columns, &session.rows, &resolved)?;

    let metadata = SessionMetadata {
        last_mapping: Some(mapping.clone()),
        ..session.metadata
    };
    save_metadata(conn, session_id, &metadata)?;

    if outcome.errors.is_empty() {
        discard(conn, user_id, session_id)?;
        return Ok(ApplyResult {
            outcome,
            session_id: None,
        });
    }
    warn!(user_id, session_id, failed = outcome.errors.len(), "import finished with row errors");
    save_rows(conn, session_id, &outcome.failed_rows)?;
    Ok(ApplyResult {
        outcome,
        session_id: Some(session_id),
    })
}

pub fn discard(conn: &Connection, user_id: i64, session_id: i64) -> Result<()> {
    let n = conn.execute(
        "DELETE FROM import_sessions WHERE id = ?1 AND user_id = ?2",
        params![session_id, user_id],
    )?;
    if n == 0 {
        return Err(KopilkaError::NotFound(format!("import session {session_id}")));
    }
    Ok(())
}
