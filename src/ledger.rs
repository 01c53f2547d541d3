//! Transactions: entry, inline edits, paired transfers and the tabular-grid query.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::{self, TreeProject};
use crate::currencies;
use crate::db::{self, DATETIME_FMT};
use crate::error::{FieldErrors, KopilkaError, Result};
use crate::importer::parse::parse_amount;
use crate::models::{round_cents, Currency, Status, Transaction, TransactionType};
use crate::{accounts, fmt, preferences};

pub const FORM_DATETIME_FMT: &str = "%Y-%m-%dT%H:%M";
pub const NO_SUBCATEGORY: &str = "—";
pub const DEFAULT_PAGE_LENGTH: i64 = 20;

/// Body of the entry form and of inline edits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionInput {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub subcategory_id: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferInput {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: Value,
    /// Amount credited to the destination when its currency differs. Defaults to `amount`.
    #[serde(default)]
    pub to_amount: Option<Value>,
    pub project_id: i64,
    pub category_id: i64,
    #[serde(default)]
    pub subcategory_id: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A transaction with the names of everything it points at.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub account_name: String,
    pub project_id: i64,
    pub project_name: String,
    pub category_id: i64,
    pub category_name: String,
    pub subcategory_id: Option<i64>,
    pub subcategory_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SortPair<T> {
    pub display: String,
    pub sort: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRow {
    pub id: i64,
    pub date: SortPair<i64>,
    pub date_iso: String,
    pub type_raw: String,
    pub amount: SortPair<f64>,
    pub amount_raw: String,
    pub currency: String,
    pub currency_code: String,
    pub account: String,
    pub account_id: i64,
    pub project: String,
    pub project_id: i64,
    pub category: String,
    pub category_id: i64,
    pub subcategory: String,
    pub subcategory_id: Option<i64>,
    pub comment: String,
    pub comment_raw: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableQuery {
    #[serde(default = "default_draw")]
    pub draw: i64,
    #[serde(default)]
    pub start: i64,
    #[serde(default = "default_length")]
    pub length: i64,
    #[serde(default)]
    pub search_query: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub date_start: Option<String>,
    #[serde(default)]
    pub date_end: Option<String>,
}

fn default_draw() -> i64 {
    1
}

fn default_length() -> i64 {
    DEFAULT_PAGE_LENGTH
}

impl Default for TableQuery {
    fn default() -> Self {
        Self {
            draw: default_draw(),
            start: 0,
            length: default_length(),
            search_query: String::new(),
            project: String::new(),
            account: String::new(),
            category: String::new(),
            subcategory: String::new(),
            date_start: None,
            date_end: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TablePage {
    pub draw: i64,
    #[serde(rename = "recordsTotal")]
    pub records_total: i64,
    #[serde(rename = "recordsFiltered")]
    pub records_filtered: i64,
    pub data: Vec<TableRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountOption {
    pub id: i64,
    pub name: String,
    pub currency: String,
}

/// Everything the entry form needs to render its pickers.
#[derive(Debug, Clone, Serialize)]
pub struct FormContext {
    pub accounts: Vec<AccountOption>,
    pub project_tree: Vec<TreeProject>,
    pub currencies: Vec<Currency>,
    pub default_account_id: Option<i64>,
    pub default_project_id: Option<i64>,
    pub default_currency: Option<String>,
    pub now: String,
}

// --- Parsing helpers ---

/// `YYYY-MM-DDTHH:MM`, with optional seconds.
pub fn parse_form_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, FORM_DATETIME_FMT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Amount from a JSON number or a string like "1 234,50".
pub fn amount_from_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s).ok(),
        _ => None,
    }?;
    parsed.is_finite().then(|| round_cents(parsed))
}

fn clean_comment(comment: Option<&str>) -> Option<String> {
    comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

// --- Reads ---

const ENTRY_SELECT: &str = "SELECT t.id, t.account_id, t.expense_link_id, t.amount, t.currency, t.date, \
     t.transaction_type, t.comment, t.related_transaction_id, a.name, l.project_id, p.name, \
     l.category_id, c.name, l.subcategory_id, s.name \
     FROM transactions t \
     JOIN accounts a ON a.id = t.account_id \
     JOIN expense_links l ON l.id = t.expense_link_id \
     JOIN projects p ON p.id = l.project_id \
     JOIN categories c ON c.id = l.category_id \
     LEFT JOIN subcategories s ON s.id = l.subcategory_id";

fn map_entry(row: &Row) -> rusqlite::Result<LedgerEntry> {
    let raw_date: String = row.get(5)?;
    let date = db::parse_datetime(&raw_date).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("bad transaction date: {raw_date}").into(),
        )
    })?;
    Ok(LedgerEntry {
        transaction: Transaction {
            id: row.get(0)?,
            account_id: row.get(1)?,
            expense_link_id: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            date,
            transaction_type: row.get(6)?,
            comment: row.get(7)?,
            related_transaction_id: row.get(8)?,
        },
        account_name: row.get(9)?,
        project_id: row.get(10)?,
        project_name: row.get(11)?,
        category_id: row.get(12)?,
        category_name: row.get(13)?,
        subcategory_id: row.get(14)?,
        subcategory_name: row.get(15)?,
    })
}

pub fn get_entry(conn: &Connection, user_id: i64, transaction_id: i64) -> Result<LedgerEntry> {
    conn.query_row(
        &format!("{ENTRY_SELECT} WHERE t.id = ?1 AND a.user_id = ?2"),
        [transaction_id, user_id],
        map_entry,
    )
    .optional()?
    .ok_or_else(|| KopilkaError::NotFound(format!("transaction {transaction_id}")))
}

/// Entries matching a WHERE fragment; `?1` is always the user id.
pub fn query_entries(
    conn: &Connection,
    user_id: i64,
    extra_where: &str,
    extra_params: &[&dyn ToSql],
    order_limit: &str,
) -> Result<Vec<LedgerEntry>> {
    let sql = format!("{ENTRY_SELECT} WHERE a.user_id = ?1 {extra_where} {order_limit}");
    let mut all_params: Vec<&dyn ToSql> = vec![&user_id];
    all_params.extend_from_slice(extra_params);
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(all_params.as_slice(), map_entry)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

// --- Writes ---

/// Active, owned references of a transaction, validated together.
struct Refs {
    account_id: i64,
    account_currency: String,
    project_id: i64,
    category_id: i64,
    subcategory_id: Option<i64>,
}

fn resolve_refs(conn: &Connection, user_id: i64, input: &TransactionInput, errors: &mut FieldErrors) -> Result<Option<Refs>> {
    let mut account = None;
    match input.account_id {
        None => errors.add("account", "Select an account"),
        Some(id) => match accounts::get_active_account(conn, user_id, id) {
            Ok(a) => account = Some(a),
            Err(KopilkaError::NotFound(_)) => errors.add("account", "Account not found"),
            Err(e) => return Err(e),
        },
    }

    let mut project_id = None;
    match input.project_id {
        None => errors.add("project", "Select a project"),
        Some(id) => match catalog::get_active_project(conn, user_id, id) {
            Ok(p) => project_id = Some(p.id),
            Err(KopilkaError::NotFound(_)) => errors.add("project", "Project not found"),
            Err(e) => return Err(e),
        },
    }

    let mut category_id = None;
    match input.category_id {
        None => errors.add("category", "Select a category"),
        Some(id) => match catalog::get_category(conn, user_id, id) {
            Ok(c) if c.status == Status::Active => category_id = Some(c.id),
            Ok(_) | Err(KopilkaError::NotFound(_)) => errors.add("category", "Category not found"),
            Err(e) => return Err(e),
        },
    }

    let mut subcategory_id = None;
    if let Some(id) = input.subcategory_id {
        match catalog::get_subcategory(conn, user_id, id) {
            Ok(s) if s.status == Status::Active => subcategory_id = Some(s.id),
            Ok(_) | Err(KopilkaError::NotFound(_)) => {
                errors.add("subcategory", "Subcategory not found")
            }
            Err(e) => return Err(e),
        }
    }

    Ok(match (account, project_id, category_id) {
        (Some(account), Some(project_id), Some(category_id)) => Some(Refs {
            account_id: account.id,
            account_currency: account.currency,
            project_id,
            category_id,
            subcategory_id,
        }),
        _ => None,
    })
}

fn check_currency(conn: &Connection, code: &str, errors: &mut FieldErrors) -> Result<()> {
    if !currencies::is_active(conn, code)? {
        errors.add("currency", "Select an active currency");
    }
    Ok(())
}

fn insert(
    conn: &Connection,
    account_id: i64,
    link_id: i64,
    amount: f64,
    currency: &str,
    date: &NaiveDateTime,
    kind: TransactionType,
    comment: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions (account_id, expense_link_id, amount, currency, date, transaction_type, comment) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            account_id,
            link_id,
            round_cents(amount),
            currency,
            db::format_datetime(date),
            kind,
            comment
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record a transaction from the entry form. The link for the chosen triple must already exist.
pub fn create_transaction(conn: &Connection, user_id: i64, input: &TransactionInput) -> Result<LedgerEntry> {
    let mut errors = FieldErrors::new();

    let amount = match &input.amount {
        None => {
            errors.add("amount", "Amount is required");
            None
        }
        Some(v) => {
            let parsed = amount_from_value(v);
            if parsed.is_none() {
                errors.add("amount", "Invalid amount");
            }
            parsed
        }
    };

    let date = match input.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        None => Some(db::now()),
        Some(raw) => {
            let parsed = parse_form_datetime(raw);
            if parsed.is_none() {
                errors.add("date", "Invalid date format");
            }
            parsed
        }
    };

    let currency = input
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_uppercase);
    match &currency {
        None => errors.add("currency", "Select a currency"),
        Some(code) => check_currency(conn, code, &mut errors)?,
    }

    let refs = resolve_refs(conn, user_id, input, &mut errors)?;

    let link = match &refs {
        Some(r) => catalog::find_active_link(conn, user_id, r.project_id, r.category_id, r.subcategory_id)?,
        None => None,
    };
    if refs.is_some() && link.is_none() {
        errors.add_non_field("No active link for the selected project and category");
    }
    errors.into_result()?;

    let (Some(refs), Some(link), Some(amount), Some(date), Some(currency)) = (refs, link, amount, date, currency)
    else {
        return Err(KopilkaError::Other("incomplete transaction input".into()));
    };

    let id = insert(
        conn,
        refs.account_id,
        link.id,
        amount,
        &currency,
        &date,
        TransactionType::from_amount(amount),
        clean_comment(input.comment.as_deref()).as_deref(),
    )?;
    info!(user_id, transaction_id = id, "transaction created");
    get_entry(conn, user_id, id)
}

/// Inline edit from the grid. Every field is checked before anything fails;
/// a missing link for the new triple is created.
pub fn update_transaction(
    conn: &Connection,
    user_id: i64,
    transaction_id: i64,
    input: &TransactionInput,
) -> Result<TableRow> {
    let existing = get_entry(conn, user_id, transaction_id)?;
    let mut errors = FieldErrors::new();

    let date = match input.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        None => {
            errors.add("date", "Date is required");
            None
        }
        Some(raw) => {
            let parsed = parse_form_datetime(raw);
            if parsed.is_none() {
                errors.add("date", "Invalid date format");
            }
            parsed
        }
    };

    let amount = input.amount.as_ref().and_then(amount_from_value);
    if amount.is_none() {
        errors.add("amount", "Invalid amount");
    }

    let refs = resolve_refs(conn, user_id, input, &mut errors)?;

    let currency = input
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_else(|| existing.transaction.currency.clone());
    check_currency(conn, &currency, &mut errors)?;

    errors.into_result()?;
    let (Some(refs), Some(amount), Some(date)) = (refs, amount, date) else {
        return Err(KopilkaError::Other("incomplete transaction input".into()));
    };

    let link = catalog::ensure_expense_link(conn, user_id, refs.project_id, refs.category_id, refs.subcategory_id)?;
    let currency = if currency.is_empty() { refs.account_currency } else { currency };
    let kind = if existing.transaction.transaction_type == TransactionType::Transfer {
        TransactionType::Transfer
    } else {
        TransactionType::from_amount(amount)
    };

    conn.execute(
        "UPDATE transactions SET date = ?1, amount = ?2, currency = ?3, account_id = ?4, \
         expense_link_id = ?5, comment = ?6, transaction_type = ?7 WHERE id = ?8",
        params![
            db::format_datetime(&date),
            amount,
            currency,
            refs.account_id,
            link.id,
            clean_comment(input.comment.as_deref()),
            kind,
            transaction_id,
        ],
    )?;
    debug!(user_id, transaction_id, "transaction updated");
    Ok(format_row(&get_entry(conn, user_id, transaction_id)?))
}

pub fn delete_transaction(conn: &Connection, user_id: i64, transaction_id: i64) -> Result<()> {
    get_entry(conn, user_id, transaction_id)?;
    conn.execute("DELETE FROM transactions WHERE id = ?1", [transaction_id])?;
    info!(user_id, transaction_id, "transaction deleted");
    Ok(())
}

/// Two `transfer` legs pointing at each other: money leaves the source and lands on the destination.
pub fn create_transfer(conn: &Connection, user_id: i64, input: &TransferInput) -> Result<(LedgerEntry, LedgerEntry)> {
    let mut errors = FieldErrors::new();

    let amount = amount_from_value(&input.amount).map(f64::abs);
    match amount {
        None => errors.add("amount", "Invalid amount"),
        Some(a) if a == 0.0 => errors.add("amount", "Amount must be greater than zero"),
        Some(_) => {}
    }
    let to_amount = match &input.to_amount {
        None => amount,
        Some(v) => {
            let parsed = amount_from_value(v).map(f64::abs);
            if parsed.is_none() {
                errors.add("to_amount", "Invalid amount");
            }
            parsed
        }
    };

    let date = match input.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        None => Some(db::now()),
        Some(raw) => {
            let parsed = parse_form_datetime(raw);
            if parsed.is_none() {
                errors.add("date", "Invalid date format");
            }
            parsed
        }
    };

    if input.from_account_id == input.to_account_id {
        errors.add("to_account", "Choose two different accounts");
    }
    let target = TransactionInput {
        account_id: Some(input.to_account_id),
        project_id: Some(input.project_id),
        category_id: Some(input.category_id),
        subcategory_id: input.subcategory_id,
        ..TransactionInput::default()
    };
    let source = TransactionInput {
        account_id: Some(input.from_account_id),
        ..target.clone()
    };
    let from = resolve_refs(conn, user_id, &source, &mut errors)?;
    let to = match accounts::get_active_account(conn, user_id, input.to_account_id) {
        Ok(a) => Some(a),
        Err(KopilkaError::NotFound(_)) => {
            errors.add("to_account", "Account not found");
            None
        }
        Err(e) => return Err(e),
    };
    errors.into_result()?;

    let (Some(from), Some(to), Some(amount), Some(to_amount), Some(date)) = (from, to, amount, to_amount, date)
    else {
        return Err(KopilkaError::Other("incomplete transfer input".into()));
    };

    let comment = clean_comment(input.comment.as_deref());
    let tx = conn.unchecked_transaction()?;
    let link = catalog::ensure_expense_link(&tx, user_id, from.project_id, from.category_id, from.subcategory_id)?;
    let out_id = insert(
        &tx,
        from.account_id,
        link.id,
        -amount,
        &from.account_currency,
        &date,
        TransactionType::Transfer,
        comment.as_deref(),
    )?;
    let in_id = insert(
        &tx,
        to.id,
        link.id,
        to_amount,
        &to.currency,
        &date,
        TransactionType::Transfer,
        comment.as_deref(),
    )?;
    tx.execute(
        "UPDATE transactions SET related_transaction_id = ?1 WHERE id = ?2",
        [in_id, out_id],
    )?;
    tx.execute(
        "UPDATE transactions SET related_transaction_id = ?1 WHERE id = ?2",
        [out_id, in_id],
    )?;
    tx.commit()?;
    info!(user_id, from = out_id, to = in_id, "transfer created");
    Ok((get_entry(conn, user_id, out_id)?, get_entry(conn, user_id, in_id)?))
}

// --- Grid ---

pub fn format_row(entry: &LedgerEntry) -> TableRow {
    let t = &entry.transaction;
    let type_raw = match t.transaction_type {
        TransactionType::Transfer => TransactionType::Transfer,
        _ => TransactionType::from_amount(t.amount),
    };
    TableRow {
        id: t.id,
        date: SortPair {
            display: t.date.format("%d.%m.%Y %H:%M").to_string(),
            sort: t.date.and_utc().timestamp(),
        },
        date_iso: t.date.format(FORM_DATETIME_FMT).to_string(),
        type_raw: type_raw.as_str().to_string(),
        amount: SortPair {
            display: fmt::signed_amount(t.amount),
            sort: t.amount,
        },
        amount_raw: format!("{:.2}", t.amount),
        currency: t.currency.clone(),
        currency_code: t.currency.clone(),
        account: entry.account_name.clone(),
        account_id: t.account_id,
        project: entry.project_name.clone(),
        project_id: entry.project_id,
        category: entry.category_name.clone(),
        category_id: entry.category_id,
        subcategory: entry
            .subcategory_name
            .clone()
            .unwrap_or_else(|| NO_SUBCATEGORY.to_string()),
        subcategory_id: entry.subcategory_id,
        comment: t.comment.clone().unwrap_or_default(),
        comment_raw: t.comment.clone().unwrap_or_default(),
    }
}

fn matches_search(entry: &LedgerEntry, needle: &str) -> bool {
    let hay = [
        Some(entry.account_name.as_str()),
        Some(entry.project_name.as_str()),
        Some(entry.category_name.as_str()),
        entry.subcategory_name.as_deref(),
        entry.transaction.comment.as_deref(),
    ];
    hay.iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}

fn parse_filter_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(None),
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| KopilkaError::Validation(FieldErrors::single("date", format!("Invalid date: {d}")))),
    }
}

/// One page of the user's transactions, newest first.
pub fn query_table(conn: &Connection, user_id: i64, query: &TableQuery) -> Result<TablePage> {
    let records_total: i64 = conn.query_row(
        "SELECT count(*) FROM transactions t JOIN accounts a ON a.id = t.account_id WHERE a.user_id = ?1",
        [user_id],
        |r| r.get(0),
    )?;

    let mut clauses = String::new();
    let mut values: Vec<String> = Vec::new();
    let mut push = |clause: &str, value: String| {
        values.push(value);
        clauses.push_str(&format!(" AND {clause} ?{}", values.len() + 1));
    };
    let project = query.project.trim();
    if !project.is_empty() {
        push("p.name =", project.to_string());
    }
    let account = query.account.trim();
    if !account.is_empty() {
        push("a.name =", account.to_string());
    }
    let category = query.category.trim();
    if !category.is_empty() {
        push("c.name =", category.to_string());
    }
    let subcategory = query.subcategory.trim();
    let none_subcategory = subcategory == "__none";
    if !subcategory.is_empty() && !none_subcategory {
        push("s.name =", subcategory.to_string());
    }
    if let Some(start) = parse_filter_date(query.date_start.as_deref())? {
        push("t.date >=", start.and_time(NaiveTime::MIN).format(DATETIME_FMT).to_string());
    }
    if let Some(end) = parse_filter_date(query.date_end.as_deref())? {
        push("t.date <=", format!("{} 23:59:59", end.format("%Y-%m-%d")));
    }
    if none_subcategory {
        clauses.push_str(" AND l.subcategory_id IS NULL");
    }

    let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
    let mut entries = query_entries(conn, user_id, &clauses, &params, "ORDER BY t.date DESC, t.id DESC")?;

    let needle = query.search_query.trim().to_lowercase();
    if !needle.is_empty() {
        entries.retain(|e| matches_search(e, &needle));
    }

    let records_filtered = entries.len() as i64;
    let length = if query.length <= 0 {
        records_filtered.max(1)
    } else {
        query.length
    };
    let num_pages = if records_filtered == 0 {
        1
    } else {
        (records_filtered - 1) / length + 1
    };
    let page_number = (query.start.max(0) / length).saturating_add(1).min(num_pages);
    let offset = ((page_number - 1) * length) as usize;

    let data = entries
        .iter()
        .skip(offset)
        .take(length as usize)
        .map(format_row)
        .collect();

    Ok(TablePage {
        draw: query.draw,
        records_total,
        records_filtered,
        data,
    })
}

pub fn form_context(conn: &Connection, user_id: i64) -> Result<FormContext> {
    let prefs = preferences::sanitized(conn, user_id)?;
    let accounts: Vec<AccountOption> = accounts::list_active(conn, user_id)?
        .into_iter()
        .map(|a| AccountOption {
            id: a.id,
            name: a.name,
            currency: a.currency,
        })
        .collect();
    let default_currency = match prefs.default_account_id {
        Some(id) => accounts.iter().find(|a| a.id == id).map(|a| a.currency.clone()),
        None => None,
    };
    let default_currency = match default_currency {
        Some(code) => Some(code),
        None => currencies::preferred_default(conn)?,
    };
    Ok(FormContext {
        accounts,
        project_tree: catalog::project_tree(conn, user_id)?,
        currencies: currencies::list_active(conn)?,
        default_account_id: prefs.default_account_id,
        default_project_id: prefs.default_project_id,
        default_currency,
        now: db::now().format(FORM_DATETIME_FMT).to_string(),
    })
}
