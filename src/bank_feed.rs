//! Raw bank card feed: spreadsheets dropped into an inbox directory are
//! normalized, appended to `banking_raw` and moved to a processed directory.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::db;
use crate::error::{KopilkaError, Result};
use crate::importer::parse::{parse_amount, parse_date};
use crate::importer::reader::{self, ParsedFile};

/// Export columns in file order. Files are matched by position, not by header.
pub const FEED_COLUMNS: [&str; 15] = [
    "operation_date",
    "payment_date",
    "card_number",
    "status",
    "amount",
    "currency",
    "amount_payment",
    "currency_payment",
    "cashback",
    "category",
    "mcc",
    "description",
    "bonus",
    "invest_round",
    "amount_round",
];

#[derive(Debug, Clone, PartialEq)]
pub struct BankingRow {
    pub operation_date: NaiveDateTime,
    pub payment_date: Option<NaiveDate>,
    pub card_number: Option<String>,
    pub status: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub amount_payment: Option<f64>,
    pub currency_payment: Option<String>,
    pub cashback: Option<f64>,
    pub category: Option<String>,
    pub mcc: Option<String>,
    pub description: Option<String>,
    pub bonus: Option<f64>,
    pub invest_round: Option<f64>,
    pub amount_round: Option<f64>,
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboxCheck {
    /// Nothing to do; the run ends successfully.
    Skipped,
    Files(Vec<PathBuf>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSummary {
    pub files: usize,
    pub rows: usize,
    pub archived: usize,
}

pub fn check_inbox(dir: &Path) -> Result<InboxCheck> {
    if !dir.is_dir() {
        return Err(KopilkaError::Import(format!("inbox {} does not exist", dir.display())));
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    if files.is_empty() {
        info!(inbox = %dir.display(), "no files in inbox");
        return Ok(InboxCheck::Skipped);
    }
    info!(inbox = %dir.display(), files = files.len(), "files found");
    Ok(InboxCheck::Files(files))
}

fn text(cell: &str) -> Option<String> {
    let cell = cell.trim();
    (!cell.is_empty()).then(|| cell.to_string())
}

fn number(cell: &str, column: &str, source: &str) -> Result<Option<f64>> {
    if cell.trim().is_empty() {
        return Ok(None);
    }
    parse_amount(cell)
        .map(Some)
        .map_err(|e| KopilkaError::Import(format!("{source}: {column}: {e}")))
}

/// Normalize one sheet's rows. Any malformed row fails the file.
pub fn rows_from_sheet(parsed: &ParsedFile, source: &str) -> Result<Vec<BankingRow>> {
    if parsed.columns.len() != FEED_COLUMNS.len() {
        return Err(KopilkaError::Import(format!(
            "{source}: expected {} columns, found {}",
            FEED_COLUMNS.len(),
            parsed.columns.len()
        )));
    }

    parsed
        .rows
        .iter()
        .map(|row| {
            let operation_date =
                parse_date(&row[0]).map_err(|e| KopilkaError::Import(format!("{source}: operation_date: {e}")))?;
            let payment_date = match row[1].trim() {
                "" => None,
                raw => Some(
                    parse_date(raw)
                        .map_err(|e| KopilkaError::Import(format!("{source}: payment_date: {e}")))?
                        .date(),
                ),
            };
            Ok(BankingRow {
                operation_date,
                payment_date,
                card_number: text(&row[2]),
                status: text(&row[3]),
                amount: number(&row[4], FEED_COLUMNS[4], source)?,
                currency: text(&row[5]),
                amount_payment: number(&row[6], FEED_COLUMNS[6], source)?,
                currency_payment: text(&row[7]),
                cashback: number(&row[8], FEED_COLUMNS[8], source)?,
                category: text(&row[9]),
                mcc: text(&row[10]),
                description: text(&row[11]),
                bonus: number(&row[12], FEED_COLUMNS[12], source)?,
                invest_round: number(&row[13], FEED_COLUMNS[13], source)?,
                amount_round: number(&row[14], FEED_COLUMNS[14], source)?,
                source_file: source.to_string(),
            })
        })
        .collect()
}

/// First sheet of every file, concatenated and sorted by operation date.
pub fn process_files(paths: &[PathBuf]) -> Result<Vec<BankingRow>> {
    let mut all = Vec::new();
    for path in paths {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let bytes = std::fs::read(path)?;
        let parsed = reader::read_sheet(&bytes, None)?;
        let rows = rows_from_sheet(&parsed, &source)?;
        info!(file = %source, rows = rows.len(), "file processed");
        all.extend(rows);
    }
    all.sort_by_key(|r| r.operation_date);
    Ok(all)
}

pub fn load(conn: &Connection, rows: &[BankingRow]) -> Result<usize> {
    if rows.is_empty() {
        info!("no rows to load");
        return Ok(0);
    }
    let loaded_at = db::format_datetime(&db::now());
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO banking_raw (operation_date, payment_date, card_number, status, amount, currency, \
             amount_payment, currency_payment, cashback, category, mcc, description, bonus, invest_round, \
             amount_round, source_file, loaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        )?;
        for r in rows {
            stmt.execute(params![
                db::format_datetime(&r.operation_date),
                r.payment_date.map(|d| d.format("%Y-%m-%d").to_string()),
                r.card_number,
                r.status,
                r.amount,
                r.currency,
                r.amount_payment,
                r.currency_payment,
                r.cashback,
                r.category,
                r.mcc,
                r.description,
                r.bonus,
                r.invest_round,
                r.amount_round,
                r.source_file,
                loaded_at,
            ])?;
        }
    }
    tx.commit()?;
    info!(rows = rows.len(), "banking rows appended");
    Ok(rows.len())
}

/// Move files into `processed_dir`. Files that vanished are logged and skipped.
pub fn archive_files(paths: &[PathBuf], processed_dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(processed_dir)?;
    let mut moved = 0;
    for path in paths {
        let Some(name) = path.file_name() else { continue };
        if !path.exists() {
            warn!(file = %path.display(), "file not found, skipping");
            continue;
        }
        let target = processed_dir.join(name);
        if std::fs::rename(path, &target).is_err() {
            // across filesystems
            std::fs::copy(path, &target)?;
            std::fs::remove_file(path)?;
        }
        info!(from = %path.display(), to = %target.display(), "file archived");
        moved += 1;
    }
    Ok(moved)
}

/// check -> process -> load -> archive. `None` when the inbox was empty.
pub fn run(conn: &Connection, inbox: &Path, processed_dir: &Path) -> Result<Option<FeedSummary>> {
    let files = match check_inbox(inbox)? {
        InboxCheck::Skipped => return Ok(None),
        InboxCheck::Files(files) => files,
    };
    let rows = process_files(&files)?;
    let loaded = load(conn, &rows)?;
    let archived = archive_files(&files, processed_dir)?;
    Ok(Some(FeedSummary {
        files: files.len(),
        rows: loaded,
        archived,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count, open_in_memory};

    fn sheet(rows: &[[&str; 15]]) -> ParsedFile {
        ParsedFile {
            columns: (0..15).map(|i| format!("c{i}")).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    const ROW: [&str; 15] = [
        "05.01.2024 14:22:10",
        "06.01.2024",
        "*1234",
        "OK",
        "-350,5",
        "RUB",
        "-350,5",
        "RUB",
        "",
        "Кафе",
        "5814",
        "Кофейня",
        "3",
        "0",
        "350,5",
    ];

    #[test]
    fn test_rows_from_sheet_normalizes() {
        let rows = rows_from_sheet(&sheet(&[ROW]), "export.xlsx").unwrap();
        let r = &rows[0];
        assert_eq!(db::format_datetime(&r.operation_date), "2024-01-05 14:22:10");
        assert_eq!(r.payment_date, NaiveDate::from_ymd_opt(2024, 1, 6));
        assert_eq!(r.amount, Some(-350.5));
        assert_eq!(r.cashback, None);
        assert_eq!(r.mcc.as_deref(), Some("5814"));
        assert_eq!(r.source_file, "export.xlsx");
    }

    #[test]
    fn test_excel_iso_dates_accepted() {
        let mut row = ROW;
        row[0] = "2024-01-05T14:22:10";
        row[1] = "2024-01-06T00:00:00";
        let rows = rows_from_sheet(&sheet(&[row]), "x").unwrap();
        assert_eq!(rows[0].payment_date, NaiveDate::from_ymd_opt(2024, 1, 6));
    }

    #[test]
    fn test_wrong_width_or_bad_cells_fail() {
        let mut narrow = sheet(&[ROW]);
        narrow.columns.pop();
        assert!(matches!(rows_from_sheet(&narrow, "x"), Err(KopilkaError::Import(_))));

        let mut bad = ROW;
        bad[4] = "много";
        assert!(matches!(rows_from_sheet(&sheet(&[bad]), "x"), Err(KopilkaError::Import(_))));
    }

    #[test]
    fn test_check_inbox() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_inbox(&dir.path().join("missing")).is_err());
        assert_eq!(check_inbox(dir.path()).unwrap(), InboxCheck::Skipped);

        std::fs::write(dir.path().join("b.xlsx"), b"x").unwrap();
        std::fs::write(dir.path().join("a.xlsx"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let InboxCheck::Files(files) = check_inbox(dir.path()).unwrap() else {
            panic!("expected files");
        };
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.xlsx", "b.xlsx"]);
    }

    #[test]
    fn test_load_appends() {
        let conn = open_in_memory().unwrap();
        let rows = rows_from_sheet(&sheet(&[ROW, ROW]), "x").unwrap();
        assert_eq!(load(&conn, &rows).unwrap(), 2);
        load(&conn, &rows).unwrap();
        assert_eq!(count(&conn, "banking_raw").unwrap(), 4);
        let payment: String = conn
            .query_row("SELECT payment_date FROM banking_raw LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(payment, "2024-01-06");
    }

    #[test]
    fn test_archive_skips_missing_files() {
        let inbox = tempfile::tempdir().unwrap();
        let done = tempfile::tempdir().unwrap();
        let present = inbox.path().join("a.xlsx");
        std::fs::write(&present, b"x").unwrap();
        let gone = inbox.path().join("gone.xlsx");

        let moved = archive_files(&[present.clone(), gone], done.path()).unwrap();
        assert_eq!(moved, 1);
        assert!(!present.exists());
        assert!(done.path().join("a.xlsx").exists());
    }

    #[test]
    fn test_run_on_empty_inbox_is_skipped() {
        let conn = open_in_memory().unwrap();
        let inbox = tempfile::tempdir().unwrap();
        let done = tempfile::tempdir().unwrap();
        assert_eq!(run(&conn, inbox.path(), done.path()).unwrap(), None);
    }

    #[cfg(feature = "excel")]
    fn export(rows: &[[&str; 15]]) -> Vec<u8> {
        let mut matrix = vec![FEED_COLUMNS.to_vec()];
        matrix.extend(rows.iter().map(|r| r.to_vec()));
        crate::importer::reader::test_workbook::build(&[("Операции", matrix)])
    }

    #[cfg(feature = "excel")]
    #[test]
    fn test_run_loads_and_archives_workbooks() {
        let conn = open_in_memory().unwrap();
        let inbox = tempfile::tempdir().unwrap();
        let done = tempfile::tempdir().unwrap();

        let mut late = ROW;
        late[0] = "20.01.2024 08:00:00";
        late[4] = "-1200";
        late[10] = "5411";
        std::fs::write(inbox.path().join("january.xlsx"), export(&[late, ROW])).unwrap();
        let mut early = ROW;
        early[0] = "02.01.2024 10:00:00";
        early[1] = "";
        std::fs::write(inbox.path().join("new_year.xlsx"), export(&[early])).unwrap();

        let files = match check_inbox(inbox.path()).unwrap() {
            InboxCheck::Files(files) => files,
            InboxCheck::Skipped => panic!("expected files"),
        };
        let rows = process_files(&files).unwrap();
        let order: Vec<String> = rows.iter().map(|r| db::format_datetime(&r.operation_date)).collect();
        assert_eq!(order, vec!["2024-01-02 10:00:00", "2024-01-05 14:22:10", "2024-01-20 08:00:00"]);
        assert_eq!(rows[0].source_file, "new_year.xlsx");
        assert_eq!(rows[0].payment_date, None);
        assert_eq!(rows[2].amount, Some(-1200.0));
        assert_eq!(rows[2].mcc.as_deref(), Some("5411"));
        assert_eq!(rows[1].card_number.as_deref(), Some("*1234"));

        let summary = run(&conn, inbox.path(), done.path()).unwrap().unwrap();
        assert_eq!(summary, FeedSummary { files: 2, rows: 3, archived: 2 });
        assert_eq!(count(&conn, "banking_raw").unwrap(), 3);
        assert!(done.path().join("january.xlsx").exists());
        assert!(done.path().join("new_year.xlsx").exists());
        assert_eq!(check_inbox(inbox.path()).unwrap(), InboxCheck::Skipped);
    }

    #[cfg(feature = "excel")]
    #[test]
    fn test_run_keeps_files_when_a_workbook_is_malformed() {
        let conn = open_in_memory().unwrap();
        let inbox = tempfile::tempdir().unwrap();
        let done = tempfile::tempdir().unwrap();
        std::fs::write(inbox.path().join("a.xlsx"), export(&[ROW])).unwrap();
        let narrow = crate::importer::reader::test_workbook::build(&[("Лист1", vec![vec!["дата", "сумма"]])]);
        std::fs::write(inbox.path().join("b.xlsx"), narrow).unwrap();

        assert!(matches!(run(&conn, inbox.path(), done.path()), Err(KopilkaError::Import(_))));
        assert_eq!(count(&conn, "banking_raw").unwrap(), 0);
        assert!(inbox.path().join("a.xlsx").exists());
        assert!(inbox.path().join("b.xlsx").exists());
    }
}
