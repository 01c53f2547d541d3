use std::collections::HashMap;

use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::accounts::{self, AccountInput};
use crate::catalog::{self, name_key};
use crate::currencies;
use crate::db;
use crate::error::{KopilkaError, Result};
use crate::importer::mapping::ResolvedMapping;
use crate::importer::parse::{parse_amount, parse_date, RowError};
use crate::importer::reader::row_object;
use crate::models::{round_cents, Account, NewTransaction, Project, TransactionType};

#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    /// 1-based position among the session's rows.
    pub row: usize,
    pub message: String,
    pub row_data: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    pub created: usize,
    pub errors: Vec<RowFailure>,
    /// The failing rows themselves, kept for a retry with a corrected mapping.
    #[serde(skip)]
    pub failed_rows: Vec<Vec<String>>,
}

/// Lookups made once per run. Keys are lowercase names.
struct Caches {
    accounts: HashMap<String, Account>,
    projects: HashMap<String, Project>,
    categories: HashMap<String, i64>,
    subcategories: HashMap<String, i64>,
    links: HashMap<(i64, i64, Option<i64>), i64>,
    currencies: HashMap<String, bool>,
}

impl Caches {
    fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            projects: HashMap::new(),
            categories: HashMap::new(),
            subcategories: HashMap::new(),
            links: HashMap::new(),
            currencies: HashMap::new(),
        }
    }
}

fn cell<'a>(row: &'a [String], idx: Option<usize>) -> &'a str {
    idx.and_then(|i| row.get(i)).map(|c| c.trim()).unwrap_or("")
}

/// Domain refusals become row errors; storage failures abort the run.
fn row_level(err: KopilkaError) -> Result<RowError> {
    match err {
        KopilkaError::Validation(e) => Ok(RowError::Unexpected(e.to_string())),
        KopilkaError::NotFound(m) | KopilkaError::Conflict(m) | KopilkaError::Other(m) => {
            Ok(RowError::Unexpected(m))
        }
        other => Err(other),
    }
}

fn resolve_account(
    conn: &Connection,
    user_id: i64,
    mapping: &ResolvedMapping,
    caches: &mut Caches,
    row_value: &str,
    currency: &str,
) -> Result<std::result::Result<Account, RowError>> {
    let name = if row_value.is_empty() {
        mapping.default_account_name.as_deref().unwrap_or("")
    } else {
        row_value
    };
    if name.is_empty() {
        return Ok(mapping.default_account.clone().ok_or(RowError::NoAccount));
    }
    let key = name_key(name);
    if let Some(account) = caches.accounts.get(&key) {
        return Ok(Ok(account.clone()));
    }
    let account = match accounts::find_by_name(conn, user_id, name)? {
        Some(found) => found,
        None => match &mapping.default_account {
            Some(default) => default.clone(),
            None => {
                let currency = if currencies::is_active(conn, currency)? {
                    currency.to_string()
                } else {
                    mapping.default_currency.clone()
                };
                match accounts::create_account(conn, user_id, &AccountInput::named(name, &currency)) {
                    Ok(created) => {
                        debug!(user_id, account = %created.name, "account created by import");
                        created
                    }
                    Err(e) => return Ok(Err(row_level(e)?)),
                }
            }
        },
    };
    caches.accounts.insert(key, account.clone());
    Ok(Ok(account))
}

fn resolve_project(
    conn: &Connection,
    user_id: i64,
    mapping: &ResolvedMapping,
    caches: &mut Caches,
    row_value: &str,
) -> Result<std::result::Result<Project, RowError>> {
    let name = if row_value.is_empty() {
        mapping.default_project_name.as_deref().unwrap_or("")
    } else {
        row_value
    };
    if name.is_empty() {
        return Ok(mapping.default_project.clone().ok_or(RowError::NoProject));
    }
    let key = name_key(name);
    if let Some(project) = caches.projects.get(&key) {
        return Ok(Ok(project.clone()));
    }
    let project = match catalog::find_project_by_name(conn, user_id, name)? {
        Some(found) => found,
        None => match &mapping.default_project {
            Some(default) => default.clone(),
            None => match catalog::create_project(conn, user_id, name, None) {
                Ok(created) => created,
                Err(e) => return Ok(Err(row_level(e)?)),
            },
        },
    };
    caches.projects.insert(key, project.clone());
    Ok(Ok(project))
}

fn prepare_row(
    conn: &Connection,
    user_id: i64,
    mapping: &ResolvedMapping,
    caches: &mut Caches,
    row: &[String],
) -> Result<std::result::Result<NewTransaction, RowError>> {
    macro_rules! row_try {
        ($e:expr) => {
            match $e {
                Ok(v) => v,
                Err(e) => return Ok(Err(e)),
            }
        };
    }

    let date = row_try!(parse_date(cell(row, Some(mapping.date))));
    let mut amount = row_try!(parse_amount(cell(row, Some(mapping.amount))));

    if mapping.kind.is_some() {
        let marker = cell(row, mapping.kind).to_lowercase();
        if !mapping.income_markers.is_empty() && mapping.income_markers.contains(&marker) {
            amount = amount.abs();
        } else if mapping.expense_markers.contains(&marker) {
            amount = -amount.abs();
        }
    }

    let currency = match cell(row, mapping.currency) {
        "" => mapping.default_currency.clone(),
        code => {
            let code = code.to_uppercase();
            let active = match caches.currencies.get(&code) {
                Some(active) => *active,
                None => {
                    let active = currencies::is_active(conn, &code)?;
                    caches.currencies.insert(code.clone(), active);
                    active
                }
            };
            if !active {
                return Ok(Err(RowError::UnknownCurrency(code)));
            }
            code
        }
    };

    let account = row_try!(resolve_account(
        conn,
        user_id,
        mapping,
        caches,
        cell(row, mapping.account),
        &currency
    )?);
    let project = row_try!(resolve_project(conn, user_id, mapping, caches, cell(row, mapping.project))?);

    let category_name = match cell(row, mapping.category) {
        "" => mapping.default_category_name.as_deref().unwrap_or(""),
        name => name,
    };
    if category_name.is_empty() {
        return Ok(Err(RowError::NoCategory));
    }
    let category_id = match caches.categories.get(&name_key(category_name)) {
        Some(id) => *id,
        None => match catalog::find_or_create_category(conn, user_id, category_name) {
            Ok(c) => {
                caches.categories.insert(name_key(category_name), c.id);
                c.id
            }
            Err(e) => return Ok(Err(row_level(e)?)),
        },
    };

    let subcategory_name = match cell(row, mapping.subcategory) {
        "" => mapping.default_subcategory_name.as_deref().unwrap_or(""),
        name => name,
    };
    let subcategory_id = if subcategory_name.is_empty() {
        None
    } else {
        match caches.subcategories.get(&name_key(subcategory_name)) {
            Some(id) => Some(*id),
            None => match catalog::find_or_create_subcategory(conn, user_id, subcategory_name) {
                Ok(s) => {
                    caches.subcategories.insert(name_key(subcategory_name), s.id);
                    Some(s.id)
                }
                Err(e) => return Ok(Err(row_level(e)?)),
            },
        }
    };

    let link_key = (project.id, category_id, subcategory_id);
    let link_id = match caches.links.get(&link_key) {
        Some(id) => *id,
        None => {
            let link = catalog::ensure_expense_link(conn, user_id, project.id, category_id, subcategory_id)?;
            caches.links.insert(link_key, link.id);
            link.id
        }
    };

    let comment = [cell(row, mapping.comment), mapping.default_comment.as_deref().unwrap_or("")]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    let amount = round_cents(amount);
    Ok(Ok(NewTransaction {
        account_id: account.id,
        expense_link_id: link_id,
        amount,
        currency: if currency.is_empty() { account.currency } else { currency },
        date,
        transaction_type: TransactionType::from_amount(amount),
        comment: (!comment.is_empty()).then_some(comment),
    }))
}

/// Turn file rows into transactions.
///
/// Accounts, projects, categories and links a row needs are created as it is
/// processed; the transactions of all valid rows are inserted together at the end.
/// Rows that fail are reported, never silently dropped.
pub fn process_rows(
    conn: &Connection,
    user_id: i64,
    columns: &[String],
    rows: &[Vec<String>],
    mapping: &ResolvedMapping,
) -> Result<ImportOutcome> {
    let mut outcome = ImportOutcome::default();
    let mut caches = Caches::new();
    let mut pending = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        match prepare_row(conn, user_id, mapping, &mut caches, row)? {
            Ok(txn) => pending.push(txn),
            Err(err) => {
                outcome.errors.push(RowFailure {
                    row: idx + 1,
                    message: err.to_string(),
                    row_data: row_object(columns, row),
                });
                outcome.failed_rows.push(row.clone());
            }
        }
    }

    if !pending.is_empty() {
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO transactions (account_id, expense_link_id, amount, currency, date, transaction_type, comment) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for t in &pending {
                stmt.execute(params![
                    t.account_id,
                    t.expense_link_id,
                    t.amount,
                    t.currency,
                    db::format_datetime(&t.date),
                    t.transaction_type,
                    t.comment,
                ])?;
            }
        }
        tx.commit()?;
        outcome.created = pending.len();
    }

    info!(
        user_id,
        created = outcome.created,
        failed = outcome.errors.len(),
        "import rows processed"
    );
    Ok(outcome)
}
