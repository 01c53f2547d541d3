//! Users, password hashing and login sessions.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::catalog;
use crate::error::{FieldErrors, KopilkaError, Result};
use crate::models::User;
use crate::preferences;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Login sessions older than this are refused and purged.
pub const SESSION_TTL_DAYS: i64 = 30;

pub const DEFAULT_PROJECT_NAME: &str = "Личные финансы";

/// Categories (and their subcategories) every new user starts with.
pub const DEFAULT_STRUCTURE: &[(&str, &[&str])] = &[
    ("Долг", &["Долг", "Кредит"]),
    ("Другие доходы", &["Кэшбек", "Подарки"]),
    ("Другие покупки", &["Другие покупки", "Одежда и обувь", "Техника"]),
    ("Еда", &["Готовая еда", "Супермаркет"]),
    ("Жилье", &["Оплата квартиры", "Кварплата"]),
    ("Здоровье", &["Медицинские расходы", "Стоматолог"]),
    ("ЗП", &["Работа"]),
    ("Переводы", &["Перевод между людьми", "Перевод между счетами"]),
    ("Подарки", &["Подарки"]),
    ("Развлечения", &["Развлечения"]),
    (
        "Транспорт",
        &["Машина", "Общественный транспорт", "Самолет/поезд", "Такси/каршеринг"],
    ),
    (
        "Услуги и связь",
        &["Интернет и мобильная связь", "Подписки", "Услуги"],
    ),
    ("Уход за собой", &["Парикмахерская", "Средства личной гигиены"]),
];

/// Hash a password with Argon2id. Returns a PHC-format string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| KopilkaError::Other(format!("Failed to hash password: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a PHC-format hash. A malformed hash is an error, a mismatch is `false`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| KopilkaError::Other(format!("Invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn map_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
    })
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<User> {
    conn.query_row(
        "SELECT id, username, password_hash FROM users WHERE id = ?1",
        [user_id],
        map_user,
    )
    .optional()?
    .ok_or_else(|| KopilkaError::NotFound(format!("user {user_id}")))
}

pub fn find_user(conn: &Connection, username: &str) -> Result<Option<User>> {
    let key = catalog::name_key(username);
    let mut stmt = conn.prepare("SELECT id, username, password_hash FROM users ORDER BY id")?;
    let users = stmt.query_map([], map_user)?;
    for user in users {
        let user = user?;
        if catalog::name_key(&user.username) == key {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare("SELECT id, username, password_hash FROM users ORDER BY username")?;
    let users = stmt
        .query_map([], map_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Create a user with preferences and the default finance structure.
pub fn register(conn: &Connection, username: &str, password: &str) -> Result<User> {
    let username = username.trim();
    let mut errors = FieldErrors::new();
    if username.is_empty() {
        errors.add("username", "Username is required");
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        );
    }
    errors.into_result()?;

    if find_user(conn, username)?.is_some() {
        return Err(KopilkaError::Conflict(format!("username \"{username}\" is taken")));
    }

    let hash = hash_password(password)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
        params![username, hash],
    )?;
    let user_id = tx.last_insert_rowid();
    preferences::get_or_create(&tx, user_id)?;
    create_default_finance_structure(&tx, user_id)?;
    tx.commit()?;

    info!(user_id, username, "user registered");
    get_user(conn, user_id)
}

pub fn authenticate(conn: &Connection, username: &str, password: &str) -> Result<User> {
    let Some(user) = find_user(conn, username)? else {
        warn!(username, "login for unknown user");
        return Err(KopilkaError::Unauthorized);
    };
    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = user.id, "login with wrong password");
        return Err(KopilkaError::Unauthorized);
    }
    Ok(user)
}

/// `datetime()` modifier marking the oldest session still accepted.
fn session_cutoff() -> String {
    format!("-{SESSION_TTL_DAYS} days")
}

pub fn create_session(conn: &Connection, user_id: i64) -> Result<String> {
    let purged = conn.execute(
        "DELETE FROM sessions WHERE created_at < datetime('now', ?1)",
        [session_cutoff()],
    )?;
    if purged > 0 {
        info!(purged, "expired sessions removed");
    }
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    conn.execute(
        "INSERT INTO sessions (token, user_id) VALUES (?1, ?2)",
        params![token, user_id],
    )?;
    Ok(token)
}

pub fn user_for_token(conn: &Connection, token: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT u.id, u.username, u.password_hash FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.created_at >= datetime('now', ?2)",
            params![token, session_cutoff()],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn destroy_session(conn: &Connection, token: &str) -> Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
    Ok(())
}

/// Seed the default project with its categories and subcategories.
///
/// Safe to call again: rows are matched by name and reactivated, links are reused.
pub fn create_default_finance_structure(conn: &Connection, user_id: i64) -> Result<()> {
    let project = match catalog::find_project_by_name(conn, user_id, DEFAULT_PROJECT_NAME)? {
        Some(project) => {
            if project.status != crate::models::Status::Active {
                conn.execute(
                    "UPDATE projects SET status = 'active' WHERE id = ?1",
                    [project.id],
                )?;
            }
            project
        }
        None => catalog::create_project(conn, user_id, DEFAULT_PROJECT_NAME, None)?,
    };

    for (category_name, subcategories) in DEFAULT_STRUCTURE {
        let category = catalog::find_or_create_category(conn, user_id, category_name)?;
        catalog::ensure_expense_link(conn, user_id, project.id, category.id, None)?;
        for sub_name in subcategories.iter() {
            let sub = catalog::find_or_create_subcategory(conn, user_id, sub_name)?;
            catalog::ensure_expense_link(conn, user_id, project.id, category.id, Some(sub.id))?;
        }
    }
    Ok(())
}
