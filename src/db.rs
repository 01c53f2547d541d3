use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

/// Storage format for timestamps. Lexicographic order matches chronological order.
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username ON users(username COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS sessions (
    token TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS currencies (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS subcategories (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    account_type TEXT NOT NULL DEFAULT 'normal',
    currency TEXT NOT NULL DEFAULT 'RUB',
    status TEXT NOT NULL DEFAULT 'active',
    include_in_total INTEGER NOT NULL DEFAULT 1,
    show_in_expenses INTEGER NOT NULL DEFAULT 1,
    credit_limit REAL NOT NULL DEFAULT 0,
    account_target REAL NOT NULL DEFAULT 0,
    total_debt REAL NOT NULL DEFAULT 0,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS expense_links (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    project_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    subcategory_id INTEGER,
    status TEXT NOT NULL DEFAULT 'active',
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE,
    FOREIGN KEY (subcategory_id) REFERENCES subcategories(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    expense_link_id INTEGER NOT NULL,
    amount REAL NOT NULL,
    currency TEXT NOT NULL DEFAULT 'RUB',
    date TEXT NOT NULL,
    transaction_type TEXT NOT NULL,
    comment TEXT,
    related_transaction_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE,
    FOREIGN KEY (expense_link_id) REFERENCES expense_links(id) ON DELETE CASCADE,
    FOREIGN KEY (related_transaction_id) REFERENCES transactions(id) ON DELETE SET NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_account_date ON transactions(account_id, date);

CREATE TABLE IF NOT EXISTS user_preferences (
    user_id INTEGER PRIMARY KEY,
    default_account_id INTEGER,
    default_project_id INTEGER,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (default_account_id) REFERENCES accounts(id) ON DELETE SET NULL,
    FOREIGN KEY (default_project_id) REFERENCES projects(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS import_sessions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    original_name TEXT NOT NULL,
    columns TEXT NOT NULL DEFAULT '[]',
    sample_rows TEXT NOT NULL DEFAULT '[]',
    rows TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    pending_file BLOB,
    sheet_names TEXT,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS invest_accounts_list (
    account_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    opened_date TEXT,
    closed_date TEXT,
    processed_dttm TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS banking_raw (
    id INTEGER PRIMARY KEY,
    operation_date TEXT NOT NULL,
    payment_date TEXT,
    card_number TEXT,
    status TEXT,
    amount REAL,
    currency TEXT,
    amount_payment REAL,
    currency_payment TEXT,
    cashback REAL,
    category TEXT,
    mcc TEXT,
    description TEXT,
    bonus REAL,
    invest_round REAL,
    amount_round REAL,
    source_file TEXT,
    loaded_at TEXT DEFAULT (datetime('now'))
);
";

// (code, name)
const DEFAULT_CURRENCIES: &[(&str, &str)] = &[
    ("RUB", "Российский рубль"),
    ("USD", "Доллар США"),
    ("CNY", "Китайский юань"),
    ("KZT", "Казахстанский тенге"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    init_db(&conn)?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    for (code, name) in DEFAULT_CURRENCIES {
        conn.execute(
            "INSERT INTO currencies (code, name, status) VALUES (?1, ?2, 'active') \
             ON CONFLICT(code) DO NOTHING",
            rusqlite::params![code, name],
        )?;
    }
    Ok(())
}

pub fn count(conn: &Connection, table: &str) -> Result<i64> {
    let n = conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))?;
    Ok(n)
}

pub fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub fn format_datetime(dt: &chrono::NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

pub fn parse_datetime(raw: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(raw, DATETIME_FMT).ok()
}
