use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Implements text-column conversions for a string-backed enum.
macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                <$ty>::parse(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} value: {text}", stringify!($ty)).into())
                })
            }
        }
    };
}

/// Lifecycle of user-owned rows. Deletion is a status flip, never a row removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Archived,
    Deleted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

sql_text_enum!(Status);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Normal,
    Debt,
    Saving,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Debt => "debt",
            Self::Saving => "saving",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "normal" => Some(Self::Normal),
            "debt" => Some(Self::Debt),
            "saving" => Some(Self::Saving),
            _ => None,
        }
    }
}

sql_text_enum!(AccountType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            "transfer" => Some(Self::Transfer),
            _ => None,
        }
    }

    /// Income for zero and positive amounts, expense otherwise.
    pub fn from_amount(amount: f64) -> Self {
        if amount >= 0.0 {
            Self::Income
        } else {
            Self::Expense
        }
    }
}

sql_text_enum!(TransactionType);

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subcategory {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub account_type: AccountType,
    pub currency: String,
    pub status: Status,
    pub include_in_total: bool,
    pub show_in_expenses: bool,
    pub credit_limit: f64,
    pub account_target: f64,
    pub total_debt: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseLink {
    pub id: i64,
    pub user_id: i64,
    pub project_id: i64,
    pub category_id: i64,
    pub subcategory_id: Option<i64>,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub expense_link_id: i64,
    pub amount: f64,
    pub currency: String,
    pub date: chrono::NaiveDateTime,
    pub transaction_type: TransactionType,
    pub comment: Option<String>,
    pub related_transaction_id: Option<i64>,
}

/// A transaction about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: i64,
    pub expense_link_id: i64,
    pub amount: f64,
    pub currency: String,
    pub date: chrono::NaiveDateTime,
    pub transaction_type: TransactionType,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Currency {
    pub code: String,
    pub name: String,
    pub status: Status,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserPreferences {
    pub user_id: i64,
    pub default_account_id: Option<i64>,
    pub default_project_id: Option<i64>,
}

/// Round to whole cents, the precision money columns keep.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
