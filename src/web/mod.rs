//! JSON HTTP API.

use std::sync::{Mutex, PoisonError};

use actix_web::dev::Server;
use actix_web::http::StatusCode;
use actix_web::{middleware, web, App, HttpResponse, HttpServer, ResponseError};
use rusqlite::Connection;
use serde_json::json;
use tracing::{error, info};

use crate::error::{KopilkaError, Result};
use crate::settings::Settings;

pub mod accounts;
pub mod auth;
pub mod catalog;
pub mod dashboard;
pub mod import;
pub mod transactions;

pub use auth::CurrentUser;

/// Largest accepted import upload.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub struct AppState {
    pub conn: Mutex<Connection>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(conn: Connection, settings: Settings) -> Self {
        Self {
            conn: Mutex::new(conn),
            settings,
        }
    }

    /// Run `f` with the connection locked.
    ///
    /// A handler that panicked while holding the lock leaves the connection
    /// usable: SQLite rolls back whatever that statement had open.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }
}

impl ResponseError for KopilkaError {
    fn status_code(&self) -> StatusCode {
        match self {
            KopilkaError::Validation(_) | KopilkaError::Import(_) => StatusCode::BAD_REQUEST,
            KopilkaError::Unauthorized => StatusCode::UNAUTHORIZED,
            KopilkaError::NotFound(_) => StatusCode::NOT_FOUND,
            KopilkaError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            KopilkaError::Validation(errors) => json!({ "success": false, "errors": errors }),
            _ if status.is_server_error() => {
                error!(error = %self, "request failed");
                json!({ "success": false, "error": "internal server error" })
            }
            _ => json!({ "success": false, "error": self.to_string() }),
        };
        HttpResponse::build(status).json(body)
    }
}

/// `{"success": true, ...fields}`
pub(crate) fn success(fields: serde_json::Value) -> HttpResponse {
    let mut body = json!({ "success": true });
    if let (Some(target), serde_json::Value::Object(extra)) = (body.as_object_mut(), fields) {
        target.extend(extra);
    }
    HttpResponse::Ok().json(body)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
        .configure(auth::routes)
        .configure(dashboard::routes)
        .configure(catalog::routes)
        .configure(accounts::routes)
        .configure(import::routes)
        .configure(transactions::routes);
}

pub fn build_server(state: web::Data<AppState>, bind: &str) -> std::io::Result<Server> {
    info!(%bind, "starting HTTP server");
    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(bind)?
    .run();
    Ok(server)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            KopilkaError::Validation(crate::error::FieldErrors::single("name", "x")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(KopilkaError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(KopilkaError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(KopilkaError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(KopilkaError::Other("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_connection_survives_panicking_handler() {
        let state = test_support::state();
        let shared = state.clone();
        let crashed = std::thread::spawn(move || {
            let _ = shared.with_conn(|_| -> Result<()> { panic!("handler bug") });
        })
        .join();
        assert!(crashed.is_err());
        assert!(state.conn.is_poisoned());

        let users: i64 = state
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(users, 0);
        let (_, bearer) = test_support::login(&state, "vera");
        assert!(bearer.starts_with("Bearer "));
    }
}
