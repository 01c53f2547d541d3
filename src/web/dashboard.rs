use actix_web::{get, web, HttpResponse};

use super::{AppState, CurrentUser};
use crate::error::Result;
use crate::{db, reports};

#[get("/dashboard")]
async fn dashboard(
    current: CurrentUser,
    state: web::Data<AppState>,
    filter: web::Query<reports::DashboardFilter>,
) -> Result<HttpResponse> {
    let today = db::now().date();
    let data = state.with_conn(|conn| reports::dashboard(conn, current.id(), &filter, today))?;
    Ok(HttpResponse::Ok().json(data))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(dashboard);
}
