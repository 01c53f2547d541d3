use crate::broker::{self, BrokerClient};
use crate::error::Result;
use crate::settings::{load_settings, Settings};

fn fetch(settings: &Settings) -> Result<()> {
    let client = BrokerClient::from_settings(&settings.broker)?;
    let staging = settings.staging_path();
    let runtime = tokio::runtime::Runtime::new()?;
    let n = runtime.block_on(broker::fetch(&client, &staging))?;
    println!("{n} accounts written to {}", staging.display());
    Ok(())
}

fn load(settings: &Settings) -> Result<()> {
    let conn = super::open_db(settings)?;
    let n = broker::load(&conn, &settings.staging_path())?;
    println!("{n} accounts upserted");
    Ok(())
}

pub fn run_fetch() -> Result<()> {
    fetch(&load_settings())
}

pub fn run_load() -> Result<()> {
    load(&load_settings())
}

pub fn run_sync() -> Result<()> {
    let settings = load_settings();
    fetch(&settings)?;
    load(&settings)
}
