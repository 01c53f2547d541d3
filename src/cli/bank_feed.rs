use std::path::PathBuf;

use crate::bank_feed;
use crate::error::Result;
use crate::settings::{load_settings, shellexpand_path};

pub fn run(inbox: Option<String>, processed: Option<String>) -> Result<()> {
    let settings = load_settings();
    let inbox = inbox
        .map(|p| PathBuf::from(shellexpand_path(&p)))
        .unwrap_or_else(|| settings.inbox_path());
    let processed = processed
        .map(|p| PathBuf::from(shellexpand_path(&p)))
        .unwrap_or_else(|| settings.processed_path());

    let conn = super::open_db(&settings)?;
    match bank_feed::run(&conn, &inbox, &processed)? {
        None => println!("No new files in {}", inbox.display()),
        Some(summary) => println!(
            "{} files, {} rows loaded, {} archived to {}",
            summary.files,
            summary.rows,
            summary.archived,
            processed.display()
        ),
    }
    Ok(())
}
