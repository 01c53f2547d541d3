pub mod bank_feed;
pub mod broker;
pub mod currencies;
pub mod dashboard;
pub mod import;
pub mod init;
pub mod serve;
pub mod status;
pub mod users;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::auth;
use crate::db::{get_connection, init_db};
use crate::error::{KopilkaError, Result};
use crate::models::User;
use crate::settings::Settings;

/// Open the configured database, creating the schema when it is missing.
pub(crate) fn open_db(settings: &Settings) -> Result<Connection> {
    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;
    Ok(conn)
}

pub(crate) fn require_user(conn: &Connection, username: &str) -> Result<User> {
    auth::find_user(conn, username)?.ok_or_else(|| KopilkaError::NotFound(format!("user '{username}'")))
}

#[derive(Parser)]
#[command(name = "kopilka", about = "Personal finance tracker: accounts, projects, bank imports and dashboards.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for kopilka data (default: ~/.local/share/kopilka)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Run the HTTP JSON API.
    Serve {
        /// Address to listen on, e.g. 127.0.0.1:8000
        #[arg(long, env = "KOPILKA_BIND")]
        bind: Option<String>,
    },
    /// Manage users.
    Users {
        #[command(subcommand)]
        command: UsersCommands,
    },
    /// Import a CSV/XLSX bank statement for a user.
    Import {
        /// Path to the CSV or spreadsheet file
        file: String,
        /// Owner of the imported transactions
        #[arg(long)]
        user: String,
        /// Bank preset: tinkoff, alfa, other (default: inferred from the header)
        #[arg(long)]
        preset: Option<String>,
        /// Worksheet to read from a workbook (default: the first one)
        #[arg(long)]
        sheet: Option<String>,
        /// Account for rows without one
        #[arg(long)]
        account: Option<String>,
        /// Project for rows without one
        #[arg(long)]
        project: Option<String>,
        /// Category for rows without one
        #[arg(long)]
        category: Option<String>,
    },
    /// Manage the currency list.
    Currencies {
        #[command(subcommand)]
        command: CurrenciesCommands,
    },
    /// Show a user's dashboard for a period.
    Dashboard {
        #[arg(long)]
        user: String,
        /// First day, YYYY-MM-DD (default: start of the current month)
        #[arg(long)]
        start: Option<String>,
        /// Last day, YYYY-MM-DD (default: today)
        #[arg(long)]
        end: Option<String>,
    },
    /// Show the current database and row counts.
    Status,
    /// Brokerage account ETL.
    Broker {
        #[command(subcommand)]
        command: BrokerCommands,
    },
    /// Load bank card exports waiting in the inbox directory.
    BankFeed {
        /// Inbox directory (default from settings)
        #[arg(long)]
        inbox: Option<String>,
        /// Where processed files are moved (default from settings)
        #[arg(long)]
        processed: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UsersCommands {
    /// Register a user. Prompts for the password unless --password is given.
    Add {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// List registered users.
    List,
}

#[derive(Subcommand)]
pub enum CurrenciesCommands {
    /// List active currencies.
    List,
    /// Hide a currency from new transactions.
    Archive {
        /// ISO code, e.g. KZT
        code: String,
    },
}

#[derive(Subcommand)]
pub enum BrokerCommands {
    /// Download accounts from the broker API into the staging file.
    Fetch,
    /// Upsert the staging file into the database.
    Load,
    /// Fetch, then load.
    Sync,
}
