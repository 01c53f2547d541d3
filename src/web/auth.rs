use std::future::{ready, Ready};

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{get, post, web, FromRequest, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::auth;
use crate::error::{KopilkaError, Result};
use crate::models::User;

pub const SESSION_COOKIE: &str = "kopilka_session";

/// The authenticated user, from the session cookie or a bearer token.
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }
}

fn request_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn current_user(req: &HttpRequest) -> Result<CurrentUser> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| KopilkaError::Other("application state is not configured".into()))?;
    let token = request_token(req).ok_or(KopilkaError::Unauthorized)?;
    let user = state
        .with_conn(|conn| auth::user_for_token(conn, &token))?
        .ok_or(KopilkaError::Unauthorized)?;
    Ok(CurrentUser { user, token })
}

impl FromRequest for CurrentUser {
    type Error = KopilkaError;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(current_user(req))
    }
}

fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(auth::SESSION_TTL_DAYS))
        .finish()
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

fn logged_in(user: &User, token: &str) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(session_cookie(token))
        .json(json!({ "success": true, "user": user, "token": token }))
}

#[post("/auth/register")]
async fn register(state: web::Data<AppState>, body: web::Json<Credentials>) -> Result<HttpResponse> {
    let (user, token) = state.with_conn(|conn| {
        let user = auth::register(conn, &body.username, &body.password)?;
        let token = auth::create_session(conn, user.id)?;
        Ok((user, token))
    })?;
    Ok(logged_in(&user, &token))
}

#[post("/auth/login")]
async fn login(state: web::Data<AppState>, body: web::Json<Credentials>) -> Result<HttpResponse> {
    let (user, token) = state.with_conn(|conn| {
        let user = auth::authenticate(conn, &body.username, &body.password)?;
        let token = auth::create_session(conn, user.id)?;
        Ok((user, token))
    })?;
    Ok(logged_in(&user, &token))
}

#[post("/auth/logout")]
async fn logout(state: web::Data<AppState>, current: CurrentUser) -> Result<HttpResponse> {
    state.with_conn(|conn| auth::destroy_session(conn, &current.token))?;
    let mut cookie = session_cookie("");
    cookie.make_removal();
    Ok(HttpResponse::Ok().cookie(cookie).json(json!({ "success": true })))
}

#[get("/auth/me")]
async fn me(current: CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(&current.user)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(register).service(login).service(logout).service(me);
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, App};
    use serde_json::Value;

    use super::*;
    use crate::web::configure;
    use crate::web::test_support::{login as seed_login, state};

    #[actix_web::test]
    async fn test_register_then_me_with_cookie() {
        let state = state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({"username": "anna", "password": "long-enough"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .unwrap()
            .into_owned();
        assert_eq!(cookie.max_age(), Some(Duration::days(auth::SESSION_TTL_DAYS)));

        let req = test::TestRequest::get().uri("/auth/me").cookie(cookie).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["username"], "anna");
        assert!(body.get("password_hash").is_none());
    }

    #[actix_web::test]
    async fn test_register_validation_and_conflict() {
        let state = state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({"username": " ", "password": "short"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["errors"]["fields"]["username"].is_string());
        assert!(body["errors"]["fields"]["password"].is_string());

        seed_login(&state, "boris");
        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({"username": "BORIS", "password": "long-enough"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_login_wrong_password_is_unauthorized() {
        let state = state();
        seed_login(&state, "vera");
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "vera", "password": "wrong-password"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "Vera", "password": "secret-password"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["token"].as_str().unwrap().len(), 64);
    }

    #[actix_web::test]
    async fn test_logout_invalidates_token() {
        let state = state();
        let (_, bearer) = seed_login(&state, "gleb");
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/auth/me")
            .insert_header((header::AUTHORIZATION, bearer.clone()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/auth/logout")
            .insert_header((header::AUTHORIZATION, bearer.clone()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/auth/me")
            .insert_header((header::AUTHORIZATION, bearer))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_anonymous_request_is_rejected() {
        let state = state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;
        let req = test::TestRequest::get().uri("/dashboard").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
