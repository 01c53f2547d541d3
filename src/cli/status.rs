use crate::db::{count, get_connection};
use crate::error::Result;
use crate::settings::load_settings;

const TABLES: &[(&str, &str)] = &[
    ("Users", "users"),
    ("Accounts", "accounts"),
    ("Projects", "projects"),
    ("Transactions", "transactions"),
    ("Imports", "import_sessions"),
    ("Broker accts", "invest_accounts_list"),
    ("Bank feed", "banking_raw"),
];

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Bind:       {}", settings.bind_addr);

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `kopilka init` to set up.");
        return Ok(());
    }

    let size = std::fs::metadata(&db_path)?.len();
    println!("DB size:    {:.1} KB", size as f64 / 1024.0);

    let conn = get_connection(&db_path)?;
    println!();
    for (label, table) in TABLES {
        // older databases may predate the batch tables
        let n = count(&conn, table).unwrap_or(0);
        println!("{:<14}{n}", format!("{label}:"));
    }
    Ok(())
}
