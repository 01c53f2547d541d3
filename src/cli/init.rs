use std::path::PathBuf;

use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    let data_path = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&data_path)?;

    let conn = super::open_db(&settings)?;
    save_settings(&settings)?;

    let users = crate::db::count(&conn, "users")?;
    println!("Data dir:  {}", data_path.display());
    println!("Database:  {}", settings.db_path().display());
    if users == 0 {
        println!("\nNo users yet. Run `kopilka users add <name>` to create one.");
    }
    Ok(())
}
