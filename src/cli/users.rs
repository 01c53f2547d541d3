use comfy_table::{Cell, Table};
use zeroize::Zeroizing;

use crate::auth;
use crate::error::{KopilkaError, Result};
use crate::settings::load_settings;

pub fn add(username: &str, password: Option<String>) -> Result<()> {
    let conn = super::open_db(&load_settings())?;
    let password = match password {
        Some(p) => Zeroizing::new(p),
        None => {
            let first = Zeroizing::new(rpassword::prompt_password("Password: ")?);
            let confirm = Zeroizing::new(rpassword::prompt_password("Confirm password: ")?);
            if *first != *confirm {
                return Err(KopilkaError::Other("passwords do not match".into()));
            }
            first
        }
    };
    let user = auth::register(&conn, username, &password)?;
    println!("Added user: {} (id {})", user.username, user.id);
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = super::open_db(&load_settings())?;
    let users = auth::list_users(&conn)?;
    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["ID", "Username"]);
    for user in users {
        table.add_row(vec![Cell::new(user.id), Cell::new(user.username)]);
    }
    println!("Users\n{table}");
    Ok(())
}
