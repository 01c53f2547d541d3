use std::collections::HashSet;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::{FieldErrors, KopilkaError, Result};
use crate::importer::parse::split_markers;
use crate::models::{Account, Project};
use crate::{accounts, catalog};

pub const DEFAULT_INCOME_MARKERS: &str = "доход,поступление,пополнение";
pub const DEFAULT_EXPENSE_MARKERS: &str = "расход,списание,платёж,платеж";
pub const FALLBACK_CURRENCY: &str = "RUB";

/// A mappable column, in the order auto-detection claims them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnField {
    Date,
    Amount,
    Currency,
    Account,
    Project,
    Category,
    Subcategory,
    Comment,
    Type,
}

impl ColumnField {
    pub const ALL: [ColumnField; 9] = [
        Self::Date,
        Self::Amount,
        Self::Currency,
        Self::Account,
        Self::Project,
        Self::Category,
        Self::Subcategory,
        Self::Comment,
        Self::Type,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Date => "column_date",
            Self::Amount => "column_amount",
            Self::Currency => "column_currency",
            Self::Account => "column_account",
            Self::Project => "column_project",
            Self::Category => "column_category",
            Self::Subcategory => "column_subcategory",
            Self::Comment => "column_comment",
            Self::Type => "column_type",
        }
    }
}

/// What the user chose on the mapping step. Every field is optional on the wire;
/// [`Mapping::resolve`] decides what is actually required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mapping {
    pub column_date: Option<String>,
    pub column_amount: Option<String>,
    pub column_currency: Option<String>,
    pub column_type: Option<String>,
    pub column_account: Option<String>,
    pub column_project: Option<String>,
    pub column_category: Option<String>,
    pub column_subcategory: Option<String>,
    pub column_comment: Option<String>,
    pub default_currency: Option<String>,
    pub income_markers: Option<String>,
    pub expense_markers: Option<String>,
    pub default_account_id: Option<i64>,
    pub default_account_name: Option<String>,
    pub default_project_id: Option<i64>,
    pub default_project_name: Option<String>,
    pub default_category_name: Option<String>,
    pub default_subcategory_name: Option<String>,
    pub default_comment: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn fill(slot: &mut Option<String>, from: &Option<String>) {
    if present(slot).is_none() {
        if let Some(v) = present(from) {
            *slot = Some(v.to_string());
        }
    }
}

fn overwrite(slot: &mut Option<String>, from: &Option<String>) {
    if let Some(v) = present(from) {
        *slot = Some(v.to_string());
    }
}

impl Mapping {
    pub fn column(&self, field: ColumnField) -> Option<&str> {
        let slot = match field {
            ColumnField::Date => &self.column_date,
            ColumnField::Amount => &self.column_amount,
            ColumnField::Currency => &self.column_currency,
            ColumnField::Account => &self.column_account,
            ColumnField::Project => &self.column_project,
            ColumnField::Category => &self.column_category,
            ColumnField::Subcategory => &self.column_subcategory,
            ColumnField::Comment => &self.column_comment,
            ColumnField::Type => &self.column_type,
        };
        present(slot)
    }

    pub fn set_column(&mut self, field: ColumnField, column: &str) {
        let slot = match field {
            ColumnField::Date => &mut self.column_date,
            ColumnField::Amount => &mut self.column_amount,
            ColumnField::Currency => &mut self.column_currency,
            ColumnField::Account => &mut self.column_account,
            ColumnField::Project => &mut self.column_project,
            ColumnField::Category => &mut self.column_category,
            ColumnField::Subcategory => &mut self.column_subcategory,
            ColumnField::Comment => &mut self.column_comment,
            ColumnField::Type => &mut self.column_type,
        };
        *slot = Some(column.to_string());
    }

    /// Apply every non-empty value of `other` over this mapping.
    pub fn overlay(&mut self, other: &Mapping) {
        for field in ColumnField::ALL {
            if let Some(col) = other.column(field) {
                self.set_column(field, col);
            }
        }
        overwrite(&mut self.default_currency, &other.default_currency);
        overwrite(&mut self.income_markers, &other.income_markers);
        overwrite(&mut self.expense_markers, &other.expense_markers);
        overwrite(&mut self.default_account_name, &other.default_account_name);
        overwrite(&mut self.default_project_name, &other.default_project_name);
        overwrite(&mut self.default_category_name, &other.default_category_name);
        overwrite(&mut self.default_subcategory_name, &other.default_subcategory_name);
        overwrite(&mut self.default_comment, &other.default_comment);
        if other.default_account_id.is_some() {
            self.default_account_id = other.default_account_id;
        }
        if other.default_project_id.is_some() {
            self.default_project_id = other.default_project_id;
        }
    }

    /// Fill only the columns still unset from `other`.
    pub fn fill_columns(&mut self, other: &Mapping) {
        for field in ColumnField::ALL {
            if self.column(field).is_none() {
                if let Some(col) = other.column(field) {
                    self.set_column(field, col);
                }
            }
        }
    }

    pub fn fill_default_names(&mut self, account: Option<&Account>, project: Option<&Project>) {
        if let Some(account) = account {
            if self.default_account_id.is_none() {
                self.default_account_id = Some(account.id);
            }
            fill(&mut self.default_account_name, &Some(account.name.clone()));
        }
        if let Some(project) = project {
            if self.default_project_id.is_none() {
                self.default_project_id = Some(project.id);
            }
            fill(&mut self.default_project_name, &Some(project.name.clone()));
        }
    }

    /// Check the mapping against the file's columns and the user's rows.
    pub fn resolve(&self, conn: &Connection, user_id: i64, columns: &[String]) -> Result<ResolvedMapping> {
        let mut errors = FieldErrors::new();
        let index_of = |name: &str| columns.iter().position(|c| c == name);

        let mut indices = [None; 9];
        for (i, field) in ColumnField::ALL.iter().enumerate() {
            let required = matches!(field, ColumnField::Date | ColumnField::Amount);
            match self.column(*field) {
                None if required => errors.add(field.key(), "Select a column"),
                None => {}
                Some(name) => match index_of(name) {
                    Some(idx) => indices[i] = Some(idx),
                    None => errors.add(field.key(), format!("Unknown column '{name}'")),
                },
            }
        }

        let default_account = match self.default_account_id {
            None => None,
            Some(id) => match accounts::get_active_account(conn, user_id, id) {
                Ok(a) => Some(a),
                Err(KopilkaError::NotFound(_)) => {
                    errors.add("default_account_id", "Account not found");
                    None
                }
                Err(e) => return Err(e),
            },
        };
        let default_project = match self.default_project_id {
            None => None,
            Some(id) => match catalog::get_active_project(conn, user_id, id) {
                Ok(p) => Some(p),
                Err(KopilkaError::NotFound(_)) => {
                    errors.add("default_project_id", "Project not found");
                    None
                }
                Err(e) => return Err(e),
            },
        };

        let default_account_name = present(&self.default_account_name).map(str::to_string);
        let default_project_name = present(&self.default_project_name).map(str::to_string);
        let default_category_name = present(&self.default_category_name).map(str::to_string);

        if self.column(ColumnField::Account).is_none()
            && self.default_account_id.is_none()
            && default_account_name.is_none()
        {
            errors.add_non_field("Select an account column or set a default account");
        }
        if self.column(ColumnField::Project).is_none()
            && self.default_project_id.is_none()
            && default_project_name.is_none()
        {
            errors.add_non_field("Select a project column or set a default project");
        }
        if self.column(ColumnField::Category).is_none() && default_category_name.is_none() {
            errors.add_non_field("Select a category column or set a default category");
        }
        errors.into_result()?;

        let [date, amount, currency, account, project, category, subcategory, comment, kind] = indices;
        let (Some(date), Some(amount)) = (date, amount) else {
            return Err(KopilkaError::Other("date and amount columns are required".into()));
        };

        let markers = |value: &Option<String>, default: &str| -> HashSet<String> {
            split_markers(value.as_deref().unwrap_or(default)).into_iter().collect()
        };

        Ok(ResolvedMapping {
            date,
            amount,
            currency,
            account,
            project,
            category,
            subcategory,
            comment,
            kind,
            default_currency: present(&self.default_currency)
                .map(str::to_uppercase)
                .unwrap_or_else(|| FALLBACK_CURRENCY.to_string()),
            income_markers: markers(&self.income_markers, DEFAULT_INCOME_MARKERS),
            expense_markers: markers(&self.expense_markers, DEFAULT_EXPENSE_MARKERS),
            default_account,
            default_account_name,
            default_project,
            default_project_name,
            default_category_name,
            default_subcategory_name: present(&self.default_subcategory_name).map(str::to_string),
            default_comment: present(&self.default_comment).map(str::to_string),
        })
    }
}

/// A validated mapping: column positions and loaded default rows.
#[derive(Debug, Clone)]
pub struct ResolvedMapping {
    pub date: usize,
    pub amount: usize,
    pub currency: Option<usize>,
    pub account: Option<usize>,
    pub project: Option<usize>,
    pub category: Option<usize>,
    pub subcategory: Option<usize>,
    pub comment: Option<usize>,
    pub kind: Option<usize>,
    pub default_currency: String,
    pub income_markers: HashSet<String>,
    pub expense_markers: HashSet<String>,
    pub default_account: Option<Account>,
    pub default_account_name: Option<String>,
    pub default_project: Option<Project>,
    pub default_project_name: Option<String>,
    pub default_category_name: Option<String>,
    pub default_subcategory_name: Option<String>,
    pub default_comment: Option<String>,
}
