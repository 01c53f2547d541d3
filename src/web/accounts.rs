use actix_web::{delete, get, post, put, web, HttpResponse};
use serde_json::json;

use super::{success, AppState, CurrentUser};
use crate::accounts::{self, AccountInput};
use crate::error::Result;
use crate::{currencies, preferences};

#[get("/accounts")]
async fn list(current: CurrentUser, state: web::Data<AppState>) -> Result<HttpResponse> {
    let accounts = state.with_conn(|conn| accounts::list_accounts(conn, current.id()))?;
    Ok(HttpResponse::Ok().json(json!({ "accounts": accounts })))
}

#[post("/accounts")]
async fn create(
    current: CurrentUser,
    state: web::Data<AppState>,
    body: web::Json<AccountInput>,
) -> Result<HttpResponse> {
    let account = state.with_conn(|conn| accounts::create_account(conn, current.id(), &body))?;
    Ok(success(json!({ "account": account })))
}

#[put("/accounts/{id}")]
async fn update(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<AccountInput>,
) -> Result<HttpResponse> {
    let account = state.with_conn(|conn| accounts::update_account(conn, current.id(), *path, &body))?;
    Ok(success(json!({ "account": account })))
}

#[delete("/accounts/{id}")]
async fn remove(current: CurrentUser, state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    state.with_conn(|conn| accounts::delete_account(conn, current.id(), *path))?;
    Ok(success(json!({})))
}

#[post("/accounts/{id}/archive")]
async fn archive(current: CurrentUser, state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    state.with_conn(|conn| accounts::archive_account(conn, current.id(), *path))?;
    Ok(success(json!({})))
}

#[post("/accounts/{id}/default")]
async fn make_default(current: CurrentUser, state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    state.with_conn(|conn| preferences::set_default_account(conn, current.id(), *path))?;
    Ok(success(json!({ "default_account_id": *path })))
}

#[get("/currencies")]
async fn active_currencies(_current: CurrentUser, state: web::Data<AppState>) -> Result<HttpResponse> {
    let codes = state.with_conn(currencies::list_active)?;
    Ok(HttpResponse::Ok().json(json!({ "currencies": codes })))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list)
        .service(create)
        .service(update)
        .service(remove)
        .service(archive)
        .service(make_default)
        .service(active_currencies);
}
