use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::name_key;
use crate::currencies;
use crate::error::{FieldErrors, KopilkaError, Result};
use crate::models::{round_cents, Account, AccountType, Status};
use crate::preferences;

const ACCOUNT_COLUMNS: &str = "id, user_id, name, account_type, currency, status, include_in_total, \
     show_in_expenses, credit_limit, account_target, total_debt";

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "RUB".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInput {
    pub name: String,
    #[serde(default)]
    pub account_type: AccountType,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_true")]
    pub include_in_total: bool,
    #[serde(default = "default_true")]
    pub show_in_expenses: bool,
    #[serde(default)]
    pub credit_limit: f64,
    #[serde(default)]
    pub account_target: f64,
    #[serde(default)]
    pub total_debt: f64,
}

impl AccountInput {
    pub fn named(name: &str, currency: &str) -> Self {
        Self {
            name: name.to_string(),
            account_type: AccountType::Normal,
            currency: currency.to_string(),
            include_in_total: true,
            show_in_expenses: true,
            credit_limit: 0.0,
            account_target: 0.0,
            total_debt: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    #[serde(flatten)]
    pub account: Account,
    pub balance: f64,
    pub is_default: bool,
}

fn map_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        account_type: row.get(3)?,
        currency: row.get(4)?,
        status: row.get(5)?,
        include_in_total: row.get(6)?,
        show_in_expenses: row.get(7)?,
        credit_limit: row.get(8)?,
        account_target: row.get(9)?,
        total_debt: row.get(10)?,
    })
}

pub fn get_account(conn: &Connection, user_id: i64, account_id: i64) -> Result<Account> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1 AND user_id = ?2"),
        [account_id, user_id],
        map_account,
    )
    .optional()?
    .ok_or_else(|| KopilkaError::NotFound(format!("account {account_id}")))
}

pub fn get_active_account(conn: &Connection, user_id: i64, account_id: i64) -> Result<Account> {
    let account = get_account(conn, user_id, account_id)?;
    if account.status != Status::Active {
        return Err(KopilkaError::NotFound(format!("account {account_id}")));
    }
    Ok(account)
}

/// Any-status account whose name matches ignoring case, active rows first.
pub fn find_by_name(conn: &Connection, user_id: i64, name: &str) -> Result<Option<Account>> {
    let key = name_key(name);
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 \
         ORDER BY status = 'active' DESC, id"
    ))?;
    let accounts = stmt.query_map([user_id], map_account)?;
    for account in accounts {
        let account = account?;
        if name_key(&account.name) == key {
            return Ok(Some(account));
        }
    }
    Ok(None)
}

pub fn list_active(conn: &Connection, user_id: i64) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 AND status = 'active' ORDER BY name"
    ))?;
    let accounts = stmt
        .query_map([user_id], map_account)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(accounts)
}

/// Active accounts with their all-time balance and default flag.
pub fn list_accounts(conn: &Connection, user_id: i64) -> Result<Vec<AccountSummary>> {
    let prefs = preferences::sanitized(conn, user_id)?;
    let mut balance_stmt =
        conn.prepare_cached("SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE account_id = ?1")?;
    let mut out = Vec::new();
    for account in list_active(conn, user_id)? {
        let balance: f64 = balance_stmt.query_row([account.id], |r| r.get(0))?;
        out.push(AccountSummary {
            is_default: prefs.default_account_id == Some(account.id),
            balance: round_cents(balance),
            account,
        });
    }
    Ok(out)
}

fn validate(
    conn: &Connection,
    user_id: i64,
    input: &AccountInput,
    exclude_id: Option<i64>,
) -> Result<String> {
    let mut errors = FieldErrors::new();
    let name = input.name.trim().to_string();
    if name.is_empty() {
        errors.add("name", "Name is required");
    } else if name.chars().count() > 100 {
        errors.add("name", "Name must be at most 100 characters");
    } else if let Some(existing) = find_by_name(conn, user_id, &name)? {
        if Some(existing.id) != exclude_id {
            errors.add("name", "An account with this name already exists");
        }
    }
    if !currencies::is_active(conn, &input.currency)? {
        errors.add("currency", "Select an active currency");
    }
    for (field, value) in [
        ("credit_limit", input.credit_limit),
        ("account_target", input.account_target),
        ("total_debt", input.total_debt),
    ] {
        if !value.is_finite() {
            errors.add(field, "Enter a number");
        }
    }
    errors.into_result()?;
    Ok(name)
}

pub fn create_account(conn: &Connection, user_id: i64, input: &AccountInput) -> Result<Account> {
    let name = validate(conn, user_id, input, None)?;
    conn.execute(
        "INSERT INTO accounts (user_id, name, account_type, currency, status, include_in_total, \
         show_in_expenses, credit_limit, account_target, total_debt) \
         VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6, ?7, ?8, ?9)",
        params![
            user_id,
            name,
            input.account_type,
            input.currency,
            input.include_in_total,
            input.show_in_expenses,
            round_cents(input.credit_limit),
            round_cents(input.account_target),
            round_cents(input.total_debt),
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(user_id, account_id = id, "account created");
    get_account(conn, user_id, id)
}

pub fn update_account(
    conn: &Connection,
    user_id: i64,
    account_id: i64,
    input: &AccountInput,
) -> Result<Account> {
    get_active_account(conn, user_id, account_id)?;
    let name = validate(conn, user_id, input, Some(account_id))?;
    conn.execute(
        "UPDATE accounts SET name = ?1, account_type = ?2, currency = ?3, include_in_total = ?4, \
         show_in_expenses = ?5, credit_limit = ?6, account_target = ?7, total_debt = ?8 \
         WHERE id = ?9",
        params![
            name,
            input.account_type,
            input.currency,
            input.include_in_total,
            input.show_in_expenses,
            round_cents(input.credit_limit),
            round_cents(input.account_target),
            round_cents(input.total_debt),
            account_id,
        ],
    )?;
    get_account(conn, user_id, account_id)
}

fn retire(conn: &Connection, user_id: i64, account_id: i64, status: Status) -> Result<()> {
    get_active_account(conn, user_id, account_id)?;
    conn.execute(
        "UPDATE accounts SET status = ?1 WHERE id = ?2",
        params![status, account_id],
    )?;
    preferences::forget_account(conn, user_id, account_id)?;
    info!(user_id, account_id, status = status.as_str(), "account retired");
    Ok(())
}

pub fn delete_account(conn: &Connection, user_id: i64, account_id: i64) -> Result<()> {
    retire(conn, user_id, account_id, Status::Deleted)
}

pub fn archive_account(conn: &Connection, user_id: i64, account_id: i64) -> Result<()> {
    retire(conn, user_id, account_id, Status::Archived)
}
