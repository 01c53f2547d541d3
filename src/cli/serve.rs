use actix_web::web;

use crate::error::Result;
use crate::settings::load_settings;
use crate::web::{build_server, AppState};

pub fn run(bind: Option<String>) -> Result<()> {
    let settings = load_settings();
    let bind = bind.unwrap_or_else(|| settings.bind_addr.clone());
    let conn = super::open_db(&settings)?;
    let state = web::Data::new(AppState::new(conn, settings));

    println!("Listening on http://{bind}");
    actix_web::rt::System::new().block_on(async move { build_server(state, &bind)?.await })?;
    Ok(())
}
