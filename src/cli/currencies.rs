use comfy_table::{Cell, Table};

use crate::currencies;
use crate::error::Result;
use crate::settings::load_settings;

pub fn list() -> Result<()> {
    let conn = super::open_db(&load_settings())?;
    let mut table = Table::new();
    table.set_header(vec!["Code", "Name"]);
    for currency in currencies::list_active(&conn)? {
        table.add_row(vec![Cell::new(currency.code), Cell::new(currency.name)]);
    }
    println!("Active currencies\n{table}");
    Ok(())
}

pub fn archive(code: &str) -> Result<()> {
    let conn = super::open_db(&load_settings())?;
    currencies::archive(&conn, code)?;
    println!("Archived currency: {}", code.trim().to_uppercase());
    Ok(())
}
