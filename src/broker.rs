//! Brokerage account list: fetch from the broker's REST API, stage as JSON,
//! upsert into `invest_accounts_list`.

use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::db;
use crate::error::{KopilkaError, Result};
use crate::settings::BrokerSettings;

const GET_ACCOUNTS: &str = ".UsersService/GetAccounts";
const API_DATE_FMT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One brokerage account, as staged between the fetch and load steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestAccount {
    pub account_id: i64,
    pub name: String,
    pub status: String,
    pub opened_date: Option<NaiveDateTime>,
    pub closed_date: Option<NaiveDateTime>,
}

pub struct BrokerClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl BrokerClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Token comes from the environment variable named in the settings.
    pub fn from_settings(settings: &BrokerSettings) -> Result<Self> {
        let token = std::env::var(&settings.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| KopilkaError::Broker(format!("{} is not set", settings.token_env)))?;
        Ok(Self::new(&settings.api_base_url, &token))
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{method}", self.base_url);
        debug!(%url, "broker request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(KopilkaError::Broker(format!("{method} returned {status}: {text}")));
        }
        Ok(response.json().await?)
    }

    pub async fn get_accounts(&self) -> Result<Value> {
        self.call(GET_ACCOUNTS, &serde_json::json!({})).await
    }
}

fn api_date(account: &Value, key: &str) -> Result<Option<NaiveDateTime>> {
    match account.get(key).and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => NaiveDateTime::parse_from_str(raw, API_DATE_FMT)
            .map(Some)
            .map_err(|_| KopilkaError::Broker(format!("bad {key} '{raw}'"))),
    }
}

/// Turn a `GetAccounts` response into staged records. Any malformed account
/// fails the whole batch.
pub fn prepare_accounts(payload: &Value) -> Result<Vec<InvestAccount>> {
    let accounts = payload
        .get("accounts")
        .and_then(Value::as_array)
        .ok_or_else(|| KopilkaError::Broker("response has no accounts list".into()))?;

    accounts
        .iter()
        .map(|account| {
            let id = account.get("id").and_then(Value::as_str).unwrap_or_default();
            let account_id = id
                .trim()
                .parse::<i64>()
                .map_err(|_| KopilkaError::Broker(format!("bad account id '{id}'")))?;
            Ok(InvestAccount {
                account_id,
                name: account.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                status: account.get("status").and_then(Value::as_str).unwrap_or_default().to_string(),
                opened_date: api_date(account, "openedDate")?,
                closed_date: api_date(account, "closedDate")?,
            })
        })
        .collect()
}

pub fn write_staging(path: &Path, records: &[InvestAccount]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(records)?)?;
    Ok(())
}

pub fn read_staging(path: &Path) -> Result<Vec<InvestAccount>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| KopilkaError::Broker(format!("cannot read staging file {}: {e}", path.display())))?;
    Ok(serde_json::from_str(&content)?)
}

/// Upsert every record, stamping `processed_dttm` with `now`.
pub fn load_accounts(conn: &Connection, records: &[InvestAccount], now: NaiveDateTime) -> Result<usize> {
    let processed = db::format_datetime(&now);
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO invest_accounts_list (account_id, name, status, opened_date, closed_date, processed_dttm) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(account_id) DO UPDATE SET \
                name = excluded.name, \
                status = excluded.status, \
                opened_date = excluded.opened_date, \
                closed_date = excluded.closed_date, \
                processed_dttm = excluded.processed_dttm",
        )?;
        for r in records {
            stmt.execute(params![
                r.account_id,
                r.name,
                r.status,
                r.opened_date.as_ref().map(db::format_datetime),
                r.closed_date.as_ref().map(db::format_datetime),
                processed,
            ])?;
        }
    }
    tx.commit()?;
    info!(accounts = records.len(), "invest accounts loaded");
    Ok(records.len())
}

/// Fetch and stage. Returns the number of staged accounts.
pub async fn fetch(client: &BrokerClient, staging: &Path) -> Result<usize> {
    let payload = client.get_accounts().await?;
    let records = prepare_accounts(&payload)?;
    write_staging(staging, &records)?;
    info!(accounts = records.len(), staging = %staging.display(), "invest accounts fetched");
    Ok(records.len())
}

pub fn load(conn: &Connection, staging: &Path) -> Result<usize> {
    let records = read_staging(staging)?;
    load_accounts(conn, &records, db::now())
}
