use rusqlite::Connection;

use crate::error::{KopilkaError, Result};
use crate::models::{Currency, Status};

pub fn list_active(conn: &Connection) -> Result<Vec<Currency>> {
    let mut stmt =
        conn.prepare("SELECT code, name, status FROM currencies WHERE status = 'active' ORDER BY code")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Currency {
                code: row.get(0)?,
                name: row.get(1)?,
                status: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn is_active(conn: &Connection, code: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM currencies WHERE code = ?1 AND status = ?2")?;
    Ok(stmt.exists(rusqlite::params![code, Status::Active])?)
}

/// RUB when it is active, otherwise the first active code.
pub fn preferred_default(conn: &Connection) -> Result<Option<String>> {
    let codes = list_active(conn)?;
    Ok(codes
        .iter()
        .find(|c| c.code == "RUB")
        .or_else(|| codes.first())
        .map(|c| c.code.clone()))
}

pub fn archive(conn: &Connection, code: &str) -> Result<()> {
    let code = code.trim().to_uppercase();
    let n = conn.execute(
        "UPDATE currencies SET status = ?1 WHERE code = ?2",
        rusqlite::params![Status::Archived, code],
    )?;
    if n == 0 {
        return Err(KopilkaError::NotFound(format!("currency {code}")));
    }
    Ok(())
}
