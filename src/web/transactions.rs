use actix_web::{get, post, web, HttpResponse};
use serde_json::json;

use super::{success, AppState, CurrentUser};
use crate::error::Result;
use crate::ledger::{self, TableQuery, TransactionInput, TransferInput};

#[get("/transactions")]
async fn form(current: CurrentUser, state: web::Data<AppState>) -> Result<HttpResponse> {
    let context = state.with_conn(|conn| ledger::form_context(conn, current.id()))?;
    Ok(HttpResponse::Ok().json(context))
}

#[post("/transactions")]
async fn create(
    current: CurrentUser,
    state: web::Data<AppState>,
    body: web::Json<TransactionInput>,
) -> Result<HttpResponse> {
    let entry = state.with_conn(|conn| ledger::create_transaction(conn, current.id(), &body))?;
    Ok(success(json!({ "transaction": entry })))
}

#[get("/transactions/data")]
async fn table(
    current: CurrentUser,
    state: web::Data<AppState>,
    query: web::Query<TableQuery>,
) -> Result<HttpResponse> {
    let page = state.with_conn(|conn| ledger::query_table(conn, current.id(), &query))?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/transactions/{id}/update")]
async fn update(
    current: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<TransactionInput>,
) -> Result<HttpResponse> {
    let row = state.with_conn(|conn| ledger::update_transaction(conn, current.id(), *path, &body))?;
    Ok(success(json!({ "transaction": row })))
}

#[post("/transactions/{id}/delete")]
async fn remove(current: CurrentUser, state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    state.with_conn(|conn| ledger::delete_transaction(conn, current.id(), *path))?;
    Ok(success(json!({})))
}

#[post("/transactions/transfer")]
async fn transfer(
    current: CurrentUser,
    state: web::Data<AppState>,
    body: web::Json<TransferInput>,
) -> Result<HttpResponse> {
    let (outgoing, incoming) = state.with_conn(|conn| ledger::create_transfer(conn, current.id(), &body))?;
    Ok(success(json!({ "outgoing": outgoing, "incoming": incoming })))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(form)
        .service(create)
        .service(table)
        .service(transfer)
        .service(update)
        .service(remove);
}

#[cfg(test)]
mod tests {
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use serde_json::{json, Value};

    use crate::accounts::{create_account, AccountInput};
    use crate::web::configure;
    use crate::web::test_support::{login, state};

    #[actix_web::test]
    async fn test_entry_grid_edit_delete() {
        let state = state();
        let (user_id, bearer) = login(&state, "lev");
        let account_id = state
            .with_conn(|conn| create_account(conn, user_id, &AccountInput::named("Карта", "RUB")))
            .unwrap()
            .id;
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;
        let auth = (header::AUTHORIZATION, bearer);

        let req = test::TestRequest::get().uri("/transactions").insert_header(auth.clone()).to_request();
        let ctx: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(ctx["accounts"][0]["id"], account_id);
        let project = &ctx["project_tree"][0];
        let category = &project["categories"][0];
        let subcategory = &category["subcategories"][0];

        let req = test::TestRequest::post()
            .uri("/transactions")
            .insert_header(auth.clone())
            .set_json(json!({
                "date": "2025-05-01T12:30",
                "amount": "-1 250,50",
                "currency": "rub",
                "account_id": account_id,
                "project_id": project["id"],
                "category_id": category["id"],
                "subcategory_id": subcategory["id"],
                "comment": "обед"
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["transaction"]["transaction_type"], "expense");
        let id = body["transaction"]["id"].as_i64().unwrap();

        let req = test::TestRequest::get()
            .uri("/transactions/data?draw=3&start=0&length=10&search_query=%D0%9E%D0%91%D0%95%D0%94")
            .insert_header(auth.clone())
            .to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(page["draw"], 3);
        assert_eq!(page["recordsTotal"], 1);
        assert_eq!(page["recordsFiltered"], 1);
        assert_eq!(page["data"][0]["amount_raw"], "-1250.50");

        let req = test::TestRequest::post()
            .uri(&format!("/transactions/{id}/update"))
            .insert_header(auth.clone())
            .set_json(json!({
                "date": "2025-05-02T09:00",
                "amount": 300,
                "account_id": account_id,
                "project_id": project["id"],
                "category_id": category["id"],
                "comment": ""
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["transaction"]["type_raw"], "income");
        assert_eq!(body["transaction"]["subcategory"], "—");

        let req = test::TestRequest::post()
            .uri(&format!("/transactions/{id}/delete"))
            .insert_header(auth.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri(&format!("/transactions/{id}/delete"))
            .insert_header(auth)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_create_collects_field_errors() {
        let state = state();
        let (_, bearer) = login(&state, "mila");
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/transactions")
            .insert_header((header::AUTHORIZATION, bearer))
            .set_json(json!({"amount": "abc", "date": "yesterday"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        let fields = &body["errors"]["fields"];
        assert!(fields["amount"].is_string());
        assert!(fields["date"].is_string());
        assert!(fields["currency"].is_string());
        assert!(fields["account"].is_string());
    }

    #[actix_web::test]
    async fn test_table_date_range_filter() {
        let state = state();
        let (user_id, bearer) = login(&state, "zoya");
        let account_id = state
            .with_conn(|conn| create_account(conn, user_id, &AccountInput::named("Наличные", "RUB")))
            .unwrap()
            .id;
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;
        let auth = (header::AUTHORIZATION, bearer);

        let req = test::TestRequest::get().uri("/transactions").insert_header(auth.clone()).to_request();
        let ctx: Value = test::call_and_read_body_json(&app, req).await;
        let project = &ctx["project_tree"][0];

        for date in ["2025-04-30T23:59", "2025-05-01T00:00", "2025-05-20T08:00"] {
            let req = test::TestRequest::post()
                .uri("/transactions")
                .insert_header(auth.clone())
                .set_json(json!({
                    "date": date,
                    "amount": -10,
                    "currency": "RUB",
                    "account_id": account_id,
                    "project_id": project["id"],
                    "category_id": project["categories"][0]["id"]
                }))
                .to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body["success"], true, "{date}: {body}");
        }

        let req = test::TestRequest::get()
            .uri("/transactions/data?date_start=2025-05-01")
            .insert_header(auth.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let page: Value = test::read_body_json(resp).await;
        assert_eq!(page["recordsTotal"], 3);
        assert_eq!(page["recordsFiltered"], 2);

        // the connection is still usable afterwards
        let req = test::TestRequest::get()
            .uri("/transactions/data?date_start=2025-05-01&date_end=2025-05-01")
            .insert_header(auth)
            .to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(page["recordsFiltered"], 1);
    }
}
