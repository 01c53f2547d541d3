use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{KopilkaError, Result};
use crate::models::{Status, UserPreferences};

pub fn get_or_create(conn: &Connection, user_id: i64) -> Result<UserPreferences> {
    conn.execute(
        "INSERT INTO user_preferences (user_id) VALUES (?1) ON CONFLICT(user_id) DO NOTHING",
        [user_id],
    )?;
    let prefs = conn.query_row(
        "SELECT user_id, default_account_id, default_project_id FROM user_preferences WHERE user_id = ?1",
        [user_id],
        |row| {
            Ok(UserPreferences {
                user_id: row.get(0)?,
                default_account_id: row.get(1)?,
                default_project_id: row.get(2)?,
            })
        },
    )?;
    Ok(prefs)
}

/// Preferences with defaults that no longer point at an active row cleared (and persisted).
pub fn sanitized(conn: &Connection, user_id: i64) -> Result<UserPreferences> {
    let mut prefs = get_or_create(conn, user_id)?;
    if let Some(account_id) = prefs.default_account_id {
        if !is_active(conn, "accounts", user_id, account_id)? {
            debug!(user_id, account_id, "clearing inactive default account");
            clear_default_account(conn, user_id)?;
            prefs.default_account_id = None;
        }
    }
    if let Some(project_id) = prefs.default_project_id {
        if !is_active(conn, "projects", user_id, project_id)? {
            debug!(user_id, project_id, "clearing inactive default project");
            clear_default_project(conn, user_id)?;
            prefs.default_project_id = None;
        }
    }
    Ok(prefs)
}

pub fn set_default_account(conn: &Connection, user_id: i64, account_id: i64) -> Result<()> {
    if !is_active(conn, "accounts", user_id, account_id)? {
        return Err(KopilkaError::NotFound(format!("account {account_id}")));
    }
    get_or_create(conn, user_id)?;
    conn.execute(
        "UPDATE user_preferences SET default_account_id = ?1 WHERE user_id = ?2",
        [account_id, user_id],
    )?;
    Ok(())
}

pub fn set_default_project(conn: &Connection, user_id: i64, project_id: i64) -> Result<()> {
    if !is_active(conn, "projects", user_id, project_id)? {
        return Err(KopilkaError::NotFound(format!("project {project_id}")));
    }
    get_or_create(conn, user_id)?;
    conn.execute(
        "UPDATE user_preferences SET default_project_id = ?1 WHERE user_id = ?2",
        [project_id, user_id],
    )?;
    Ok(())
}

pub fn clear_default_account(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE user_preferences SET default_account_id = NULL WHERE user_id = ?1",
        [user_id],
    )?;
    Ok(())
}

pub fn clear_default_project(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE user_preferences SET default_project_id = NULL WHERE user_id = ?1",
        [user_id],
    )?;
    Ok(())
}

/// Clear the default account when it is `account_id`.
pub fn forget_account(conn: &Connection, user_id: i64, account_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE user_preferences SET default_account_id = NULL \
         WHERE user_id = ?1 AND default_account_id = ?2",
        [user_id, account_id],
    )?;
    Ok(())
}

/// Clear the default project when it is `project_id`.
pub fn forget_project(conn: &Connection, user_id: i64, project_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE user_preferences SET default_project_id = NULL \
         WHERE user_id = ?1 AND default_project_id = ?2",
        [user_id, project_id],
    )?;
    Ok(())
}

fn is_active(conn: &Connection, table: &str, user_id: i64, id: i64) -> Result<bool> {
    let status: Option<Status> = conn
        .query_row(
            &format!("SELECT status FROM {table} WHERE id = ?1 AND user_id = ?2"),
            [id, user_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(status == Some(Status::Active))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn seed(conn: &Connection) -> (i64, i64, i64) {
        conn.execute("INSERT INTO users (username, password_hash) VALUES ('u', 'x')", [])
            .unwrap();
        let user_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO accounts (user_id, name) VALUES (?1, 'Cash')",
            [user_id],
        )
        .unwrap();
        let account_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO projects (user_id, name) VALUES (?1, 'Home')",
            [user_id],
        )
        .unwrap();
        (user_id, account_id, conn.last_insert_rowid())
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let conn = open_in_memory().unwrap();
        let (user_id, _, _) = seed(&conn);
        get_or_create(&conn, user_id).unwrap();
        let prefs = get_or_create(&conn, user_id).unwrap();
        assert_eq!(prefs.user_id, user_id);
        assert!(prefs.default_account_id.is_none());
        assert_eq!(crate::db::count(&conn, "user_preferences").unwrap(), 1);
    }

    #[test]
    fn test_sanitized_clears_deleted_defaults() {
        let conn = open_in_memory().unwrap();
        let (user_id, account_id, project_id) = seed(&conn);
        set_default_account(&conn, user_id, account_id).unwrap();
        set_default_project(&conn, user_id, project_id).unwrap();
        conn.execute("UPDATE accounts SET status = 'deleted'", []).unwrap();

        let prefs = sanitized(&conn, user_id).unwrap();
        assert_eq!(prefs.default_account_id, None);
        assert_eq!(prefs.default_project_id, Some(project_id));
        // persisted, not just masked
        assert_eq!(get_or_create(&conn, user_id).unwrap().default_account_id, None);
    }

    #[test]
    fn test_set_default_rejects_inactive_or_foreign() {
        let conn = open_in_memory().unwrap();
        let (user_id, account_id, _) = seed(&conn);
        conn.execute("UPDATE accounts SET status = 'archived'", []).unwrap();
        assert!(matches!(
            set_default_account(&conn, user_id, account_id),
            Err(KopilkaError::NotFound(_))
        ));
        assert!(set_default_project(&conn, user_id + 1, 1).is_err());
    }
}
