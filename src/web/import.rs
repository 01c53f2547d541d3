use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::{success, AppState, CurrentUser};
use crate::error::{KopilkaError, Result};
use crate::importer::{session, BankPreset, Mapping};

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub filename: String,
    /// `tinkoff`, `alfa`, `other`; anything else infers the preset.
    #[serde(default)]
    pub bank_preset: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SheetBody {
    pub sheet: String,
}

/// The file is the raw request body.
#[post("/transactions/import/upload")]
async fn upload(
    current: CurrentUser,
    state: web::Data<AppState>,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let filename = query.filename.trim();
    if filename.is_empty() || body.is_empty() {
        return Err(KopilkaError::Import("no file uploaded".into()));
    }
    let preset = query.bank_preset.as_deref().and_then(BankPreset::parse);
    let outcome = state.with_conn(|conn| session::upload(conn, current.id(), filename, &body, preset))?;
    Ok(success(serde_json::to_value(outcome)?))
}

#[post("/transactions/import/{sid}/sheet")]
async fn choose_sheet(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<SheetBody>,
) -> Result<HttpResponse> {
    let chosen = state.with_conn(|conn| session::select_sheet(conn, current.id(), *path, &body.sheet))?;
    Ok(success(json!({
        "step": "mapping",
        "session_id": chosen.id,
        "rows": chosen.rows.len(),
    })))
}

#[get("/transactions/import/{sid}")]
async fn proposal(current: CurrentUser, state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let initial = state.with_conn(|conn| session::proposal(conn, current.id(), *path))?;
    Ok(HttpResponse::Ok().json(initial))
}

#[post("/transactions/import/{sid}/mapping")]
async fn apply(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<Mapping>,
) -> Result<HttpResponse> {
    let result = state.with_conn(|conn| session::apply(conn, current.id(), *path, &body))?;
    Ok(success(serde_json::to_value(result)?))
}

#[delete("/transactions/import/{sid}")]
async fn discard(current: CurrentUser, state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    state.with_conn(|conn| session::discard(conn, current.id(), *path))?;
    Ok(success(json!({})))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(upload)
        .service(choose_sheet)
        .service(proposal)
        .service(apply)
        .service(discard);
}

#[cfg(test)]
mod tests {
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use serde_json::{json, Value};

    use crate::web::configure;
    use crate::web::test_support::{login, state};

    const STATEMENT: &str = "Дата,Сумма,Счет,Категория\n\
        01.03.2025 09:15,-350,Кошелек,Кафе\n\
        02.03.2025,не число,Кошелек,Кафе\n\
        03.03.2025,12000,Кошелек,Зарплата\n";

    #[actix_web::test]
    async fn test_csv_upload_map_apply() {
        let state = state();
        let (_, bearer) = login(&state, "olga");
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;
        let auth = (header::AUTHORIZATION, bearer);

        let req = test::TestRequest::post()
            .uri("/transactions/import/upload?filename=statement.csv&bank_preset=auto")
            .insert_header(auth.clone())
            .set_payload(STATEMENT)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["step"], "mapping");
        let sid = body["session_id"].as_i64().unwrap();

        let req = test::TestRequest::get()
            .uri(&format!("/transactions/import/{sid}"))
            .insert_header(auth.clone())
            .to_request();
        let proposal: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(proposal["columns"].as_array().unwrap().len(), 4);
        assert_eq!(proposal["sample_rows"].as_array().unwrap().len(), 3);
        assert_eq!(proposal["auto_mapping"]["column_date"], "Дата");
        assert_eq!(proposal["auto_mapping"]["column_amount"], "Сумма");

        let req = test::TestRequest::post()
            .uri(&format!("/transactions/import/{sid}/mapping"))
            .insert_header(auth.clone())
            .set_json(json!({
                "column_date": "Дата",
                "column_amount": "Сумма",
                "column_account": "Счет",
                "column_category": "Категория",
                "default_currency": "RUB",
                "default_project_name": "Личные финансы"
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["created"], 2);
        assert_eq!(body["errors"][0]["row"], 2);
        assert_eq!(body["session_id"], sid);

        // the failing row is kept for another attempt
        let req = test::TestRequest::get()
            .uri(&format!("/transactions/import/{sid}"))
            .insert_header(auth.clone())
            .to_request();
        let proposal: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(proposal["sample_rows"].as_array().unwrap().len(), 1);
        assert_eq!(proposal["initial"]["column_category"], "Категория");

        let req = test::TestRequest::delete()
            .uri(&format!("/transactions/import/{sid}"))
            .insert_header(auth.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri(&format!("/transactions/import/{sid}"))
            .insert_header(auth)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_mapping_without_date_column_is_rejected() {
        let state = state();
        let (_, bearer) = login(&state, "petr");
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;
        let auth = (header::AUTHORIZATION, bearer);

        let req = test::TestRequest::post()
            .uri("/transactions/import/upload?filename=s.csv")
            .insert_header(auth.clone())
            .set_payload(STATEMENT)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let sid = body["session_id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/transactions/import/{sid}/mapping"))
            .insert_header(auth)
            .set_json(json!({"column_amount": "Сумма", "default_account_name": "Кошелек"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["errors"]["fields"]["column_date"], "Select a column");
    }

    #[actix_web::test]
    async fn test_empty_upload_is_bad_request() {
        let state = state();
        let (_, bearer) = login(&state, "rita");
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/transactions/import/upload?filename=empty.csv")
            .insert_header((header::AUTHORIZATION, bearer))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
