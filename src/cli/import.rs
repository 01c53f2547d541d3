use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::{KopilkaError, Result};
use crate::importer::session::{self, UploadOutcome};
use crate::importer::BankPreset;
use crate::settings::load_settings;

pub struct ImportArgs {
    pub file: String,
    pub user: String,
    pub preset: Option<String>,
    pub sheet: Option<String>,
    pub account: Option<String>,
    pub project: Option<String>,
    pub category: Option<String>,
}

fn preset_arg(raw: Option<&str>) -> Result<Option<BankPreset>> {
    match raw {
        None => Ok(None),
        Some(name) => BankPreset::parse(name)
            .map(Some)
            .ok_or_else(|| KopilkaError::Other(format!("unknown bank preset '{name}' (tinkoff, alfa, other)"))),
    }
}

/// Runs the upload, sheet and mapping steps in one go, taking the
/// auto-detected mapping with the command-line defaults on top.
pub fn run(args: ImportArgs) -> Result<()> {
    let path = Path::new(&args.file);
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| args.file.clone());
    let preset = preset_arg(args.preset.as_deref())?;

    let conn = super::open_db(&load_settings())?;
    let user = super::require_user(&conn, &args.user)?;

    let session_id = match session::upload(&conn, user.id, &filename, &bytes, preset)? {
        UploadOutcome::Mapping { session_id } => session_id,
        UploadOutcome::Sheet { session_id, sheet_names } => {
            let sheet = match &args.sheet {
                Some(s) => s.clone(),
                None => sheet_names.first().cloned().unwrap_or_default(),
            };
            println!("Sheet: {sheet}");
            session::select_sheet(&conn, user.id, session_id, &sheet)?.id
        }
    };

    let proposal = session::proposal(&conn, user.id, session_id)?;
    let mut mapping = proposal.initial;
    if args.account.is_some() {
        mapping.default_account_id = None;
        mapping.default_account_name = args.account;
    }
    if args.project.is_some() {
        mapping.default_project_id = None;
        mapping.default_project_name = args.project;
    }
    if args.category.is_some() {
        mapping.default_category_name = args.category;
    }
    println!("Preset: {}", proposal.bank_preset.as_str());

    let result = match session::apply(&conn, user.id, session_id, &mapping) {
        Ok(result) => result,
        Err(e) => {
            session::discard(&conn, user.id, session_id)?;
            return Err(e);
        }
    };
    let outcome = result.outcome;
    println!("{} transactions created", outcome.created.to_string().green());

    if let Some(leftover) = result.session_id {
        println!("{} rows failed", outcome.errors.len().to_string().red());
        let mut table = Table::new();
        table.set_header(vec!["Row", "Error", "Data"]);
        for failure in &outcome.errors {
            let data = failure
                .row_data
                .iter()
                .map(|(k, v)| format!("{k}={}", v.as_str().unwrap_or_default()))
                .collect::<Vec<_>>()
                .join(", ");
            table.add_row(vec![Cell::new(failure.row), Cell::new(&failure.message), Cell::new(data)]);
        }
        println!("{table}");
        session::discard(&conn, user.id, leftover)?;
    }
    Ok(())
}
