use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::{success, AppState, CurrentUser};
use crate::error::Result;
use crate::{catalog, preferences};

#[derive(Debug, Deserialize)]
pub struct ProjectBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameBody {
    pub name: String,
}

#[get("/catalog")]
async fn tree(current: CurrentUser, state: web::Data<AppState>) -> Result<HttpResponse> {
    let (projects, prefs) = state.with_conn(|conn| {
        Ok((
            catalog::project_tree(conn, current.id())?,
            preferences::sanitized(conn, current.id())?,
        ))
    })?;
    Ok(HttpResponse::Ok().json(json!({
        "projects": projects,
        "default_project_id": prefs.default_project_id,
    })))
}

#[post("/catalog/projects")]
async fn create_project(
    current: CurrentUser,
    state: web::Data<AppState>,
    body: web::Json<ProjectBody>,
) -> Result<HttpResponse> {
    let project = state.with_conn(|conn| {
        catalog::create_project(conn, current.id(), &body.name, body.description.as_deref())
    })?;
    Ok(success(json!({ "project": project })))
}

#[put("/catalog/projects/{id}")]
async fn update_project(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<ProjectBody>,
) -> Result<HttpResponse> {
    let project = state.with_conn(|conn| {
        catalog::update_project(conn, current.id(), *path, &body.name, body.description.as_deref())
    })?;
    Ok(success(json!({ "project": project })))
}

#[delete("/catalog/projects/{id}")]
async fn delete_project(current: CurrentUser, state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    state.with_conn(|conn| catalog::delete_project(conn, current.id(), *path))?;
    Ok(success(json!({})))
}

#[post("/catalog/projects/{id}/archive")]
async fn archive_project(current: CurrentUser, state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    state.with_conn(|conn| catalog::archive_project(conn, current.id(), *path))?;
    Ok(success(json!({})))
}

#[post("/catalog/projects/{id}/default")]
async fn default_project(current: CurrentUser, state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    state.with_conn(|conn| preferences::set_default_project(conn, current.id(), *path))?;
    Ok(success(json!({ "default_project_id": *path })))
}

#[post("/catalog/projects/{pid}/categories")]
async fn add_category(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<NameBody>,
) -> Result<HttpResponse> {
    let category = state.with_conn(|conn| catalog::add_category(conn, current.id(), *path, &body.name))?;
    Ok(success(json!({ "category": category })))
}

#[put("/catalog/projects/{pid}/categories/{cid}")]
async fn rename_category(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
    body: web::Json<NameBody>,
) -> Result<HttpResponse> {
    let (project_id, category_id) = path.into_inner();
    let category = state
        .with_conn(|conn| catalog::rename_category(conn, current.id(), project_id, category_id, &body.name))?;
    Ok(success(json!({ "category": category })))
}

#[delete("/catalog/projects/{pid}/categories/{cid}")]
async fn delete_category(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    let (project_id, category_id) = path.into_inner();
    state.with_conn(|conn| catalog::delete_category(conn, current.id(), project_id, category_id))?;
    Ok(success(json!({})))
}

#[post("/catalog/projects/{pid}/categories/{cid}/subcategories")]
async fn add_subcategory(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
    body: web::Json<NameBody>,
) -> Result<HttpResponse> {
    let (project_id, category_id) = path.into_inner();
    let subcategory = state
        .with_conn(|conn| catalog::add_subcategory(conn, current.id(), project_id, category_id, &body.name))?;
    Ok(success(json!({ "subcategory": subcategory })))
}

#[put("/catalog/projects/{pid}/categories/{cid}/subcategories/{sid}")]
async fn rename_subcategory(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<(i64, i64, i64)>,
    body: web::Json<NameBody>,
) -> Result<HttpResponse> {
    let (project_id, category_id, subcategory_id) = path.into_inner();
    let subcategory = state.with_conn(|conn| {
        catalog::rename_subcategory(conn, current.id(), project_id, category_id, subcategory_id, &body.name)
    })?;
    Ok(success(json!({ "subcategory": subcategory })))
}

#[delete("/catalog/projects/{pid}/categories/{cid}/subcategories/{sid}")]
async fn delete_subcategory(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<(i64, i64, i64)>,
) -> Result<HttpResponse> {
    let (project_id, category_id, subcategory_id) = path.into_inner();
    state.with_conn(|conn| {
        catalog::delete_subcategory(conn, current.id(), project_id, category_id, subcategory_id)
    })?;
    Ok(success(json!({})))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(tree)
        .service(create_project)
        .service(update_project)
        .service(delete_project)
        .service(archive_project)
        .service(default_project)
        .service(add_category)
        .service(rename_category)
        .service(delete_category)
        .service(add_subcategory)
        .service(rename_subcategory)
        .service(delete_subcategory);
}
