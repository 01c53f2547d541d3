use chrono::{Datelike, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ToSql};
use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::error::Result;
use crate::fmt;
use crate::ledger::{self, AccountOption};
use crate::models::{round_cents, Status};

const TOP_CATEGORIES: usize = 5;
const RECENT_TRANSACTIONS: usize = 5;
const NO_COMMENT: &str = "—";

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Raw query-string filter. Values that do not parse are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DashboardFilter {
    pub start: Option<String>,
    pub end: Option<String>,
    pub account: Option<String>,
    pub project: Option<String>,
}

/// The filter as applied, echoed back for the pickers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub account: Option<i64>,
    pub project: Option<i64>,
}

fn parse_day(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|r| NaiveDate::parse_from_str(r.trim(), "%Y-%m-%d").ok())
}

fn parse_id(raw: Option<&str>) -> Option<i64> {
    raw.map(str::trim)
        .filter(|r| !r.is_empty() && r.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|r| r.parse().ok())
}

impl DashboardFilter {
    /// Period defaults to the first of `today`'s month through `today`.
    pub fn apply(&self, today: NaiveDate) -> AppliedFilter {
        let month_start = today.with_day(1).unwrap_or(today);
        AppliedFilter {
            start: parse_day(self.start.as_deref()).unwrap_or(month_start),
            end: parse_day(self.end.as_deref()).unwrap_or(today),
            account: parse_id(self.account.as_deref()),
            project: parse_id(self.project.as_deref()),
        }
    }
}

/// WHERE fragment over `t` (transactions), `a` (accounts) and `l` (links).
/// `?1` is the user id; the parameter list includes it.
fn scope(user_id: i64, filter: &AppliedFilter) -> (String, Vec<Value>) {
    let mut clause = String::from("t.date >= ?2 AND t.date <= ?3");
    let mut params = vec![
        Value::Integer(user_id),
        Value::Text(format!("{} 00:00:00", filter.start.format("%Y-%m-%d"))),
        Value::Text(format!("{} 23:59:59", filter.end.format("%Y-%m-%d"))),
    ];
    if let Some(account) = filter.account {
        params.push(Value::Integer(account));
        clause.push_str(&format!(" AND t.account_id = ?{}", params.len()));
    }
    if let Some(project) = filter.project {
        params.push(Value::Integer(project));
        clause.push_str(&format!(" AND l.project_id = ?{}", params.len()));
    }
    (clause, params)
}

const SCOPED_FROM: &str = "FROM transactions t \
     JOIN accounts a ON a.id = t.account_id \
     JOIN expense_links l ON l.id = t.expense_link_id";

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub name: String,
    pub currency: String,
    pub balance: f64,
    pub is_negative: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryShare {
    pub name: String,
    /// Absolute spend.
    pub total: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub label: String,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentTransaction {
    pub date: String,
    pub account: String,
    pub project: String,
    pub category: String,
    pub amount: f64,
    pub amount_display: String,
    pub is_income: bool,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectOption {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub filters: AppliedFilter,
    pub total_income: f64,
    /// Absolute sum of the period's negative amounts.
    pub total_expense: f64,
    pub net: f64,
    pub net_positive: bool,
    pub operation_count: i64,
    pub account_balances: Vec<AccountBalance>,
    pub top_expense_categories: Vec<CategoryShare>,
    pub trend: Vec<TrendPoint>,
    pub recent_transactions: Vec<RecentTransaction>,
    pub accounts: Vec<AccountOption>,
    pub projects: Vec<ProjectOption>,
}

pub fn dashboard(conn: &Connection, user_id: i64, filter: &DashboardFilter, today: NaiveDate) -> Result<Dashboard> {
    let filters = filter.apply(today);
    let (clause, params) = scope(user_id, &filters);
    let where_sql = format!("WHERE a.user_id = ?1 AND {clause}");

    let (total_income, total_expense, operation_count): (f64, f64, i64) = conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(CASE WHEN t.amount > 0 THEN t.amount END), 0), \
             COALESCE(SUM(CASE WHEN t.amount < 0 THEN t.amount END), 0), COUNT(*) \
             {SCOPED_FROM} {where_sql}"
        ),
        params_from_iter(params.iter()),
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    let total_income = round_cents(total_income);
    let total_expense = round_cents(total_expense.abs());
    let net = round_cents(total_income - total_expense);

    let account_balances = {
        let mut stmt = conn.prepare(&format!(
            "SELECT a.name, a.currency, SUM(t.amount) {SCOPED_FROM} {where_sql} \
             GROUP BY a.id ORDER BY a.name"
        ))?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |r| {
            let balance = round_cents(r.get::<_, f64>(2)?);
            Ok(AccountBalance {
                name: r.get(0)?,
                currency: r.get(1)?,
                balance,
                is_negative: balance < 0.0,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let top_expense_categories = {
        let mut stmt = conn.prepare(&format!(
            "SELECT c.name, SUM(t.amount) AS total {SCOPED_FROM} \
             JOIN categories c ON c.id = l.category_id \
             {where_sql} AND t.amount < 0 \
             GROUP BY c.name ORDER BY total ASC LIMIT {TOP_CATEGORIES}"
        ))?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(name, total)| {
                let total = round_cents(total.abs());
                let percent = if total_expense > 0.0 {
                    (total / total_expense * 1000.0).round() / 10.0
                } else {
                    0.0
                };
                CategoryShare { name, total, percent }
            })
            .collect()
    };

    let trend = {
        let mut stmt = conn.prepare(&format!(
            "SELECT substr(t.date, 1, 10) AS day, SUM(t.amount) {SCOPED_FROM} {where_sql} \
             GROUP BY day ORDER BY day"
        ))?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(day, total)| TrendPoint {
                label: NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map(|d| d.format("%d.%m").to_string())
                    .unwrap_or(day),
                total: round_cents(total),
            })
            .collect()
    };

    let extra: Vec<&dyn ToSql> = params[1..].iter().map(|p| p as &dyn ToSql).collect();
    let recent_transactions = ledger::query_entries(
        conn,
        user_id,
        &format!("AND {clause}"),
        &extra,
        &format!("ORDER BY t.date DESC, t.id DESC LIMIT {RECENT_TRANSACTIONS}"),
    )?
    .into_iter()
    .map(|entry| {
        let amount = entry.transaction.amount;
        RecentTransaction {
            date: entry.transaction.date.format("%d.%m.%Y %H:%M").to_string(),
            account: entry.account_name,
            project: entry.project_name,
            category: entry.category_name,
            amount,
            amount_display: format!("{} {}", fmt::signed_amount(amount), entry.transaction.currency),
            is_income: amount >= 0.0,
            comment: entry.transaction.comment.unwrap_or_else(|| NO_COMMENT.to_string()),
        }
    })
    .collect();

    let accounts = crate::accounts::list_active(conn, user_id)?
        .into_iter()
        .map(|a| AccountOption {
            id: a.id,
            name: a.name,
            currency: a.currency,
        })
        .collect();
    let projects = catalog::list_projects(conn, user_id, Some(Status::Active))?
        .into_iter()
        .map(|p| ProjectOption { id: p.id, name: p.name })
        .collect();

    Ok(Dashboard {
        filters,
        total_income,
        total_expense,
        net,
        net_positive: net >= 0.0,
        operation_count,
        account_balances,
        top_expense_categories,
        trend,
        recent_transactions,
        accounts,
        projects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{create_account, AccountInput};
    use crate::catalog::{create_project, ensure_expense_link, find_or_create_category};
    use crate::db::open_in_memory;
    use rusqlite::params;

    struct Fixture {
        conn: Connection,
        user_id: i64,
        card: i64,
        cash: i64,
        home: i64,
        work: i64,
    }

    fn fixture() -> Fixture {
        let conn = open_in_memory().unwrap();
        conn.execute("INSERT INTO users (username, password_hash) VALUES ('u', 'x')", [])
            .unwrap();
        let user_id = 1;
        let card = create_account(&conn, user_id, &AccountInput::named("Карта", "RUB")).unwrap().id;
        let cash = create_account(&conn, user_id, &AccountInput::named("Наличные", "RUB")).unwrap().id;
        let home = create_project(&conn, user_id, "Дом", None).unwrap().id;
        let work = create_project(&conn, user_id, "Работа", None).unwrap().id;
        Fixture {
            conn,
            user_id,
            card,
            cash,
            home,
            work,
        }
    }

    fn add(f: &Fixture, account: i64, project: i64, category: &str, amount: f64, date: &str) {
        let category = find_or_create_category(&f.conn, f.user_id, category).unwrap();
        let link = ensure_expense_link(&f.conn, f.user_id, project, category.id, None).unwrap();
        f.conn
            .execute(
                "INSERT INTO transactions (account_id, expense_link_id, amount, currency, date, transaction_type) \
                 VALUES (?1, ?2, ?3, 'RUB', ?4, ?5)",
                params![account, link.id, amount, date, if amount >= 0.0 { "income" } else { "expense" }],
            )
            .unwrap();
    }

    fn seed(f: &Fixture) {
        add(f, f.card, f.work, "Зарплата", 100000.0, "2025-03-01 09:00:00");
        add(f, f.card, f.home, "Еда", -3000.0, "2025-03-02 12:00:00");
        add(f, f.card, f.home, "Еда", -1500.5, "2025-03-02 18:30:00");
        add(f, f.cash, f.home, "Транспорт", -500.0, "2025-03-05 08:00:00");
        // outside the default period
        add(f, f.cash, f.home, "Еда", -999.0, "2025-02-28 23:59:59");
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[test]
    fn test_filter_defaults_and_garbage() {
        let applied = DashboardFilter {
            start: Some("not a date".into()),
            end: None,
            account: Some("12x".into()),
            project: Some("7".into()),
        }
        .apply(today());
        assert_eq!(applied.start, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(applied.end, today());
        assert_eq!(applied.account, None);
        assert_eq!(applied.project, Some(7));
    }

    #[test]
    fn test_totals_for_current_month() {
        let f = fixture();
        seed(&f);
        let d = dashboard(&f.conn, f.user_id, &DashboardFilter::default(), today()).unwrap();
        assert_eq!(d.total_income, 100000.0);
        assert_eq!(d.total_expense, 5000.5);
        assert_eq!(d.net, 94999.5);
        assert!(d.net_positive);
        assert_eq!(d.operation_count, 4);
    }

    #[test]
    fn test_balances_categories_and_trend() {
        let f = fixture();
        seed(&f);
        let d = dashboard(&f.conn, f.user_id, &DashboardFilter::default(), today()).unwrap();

        let balances: Vec<(&str, f64)> = d.account_balances.iter().map(|b| (b.name.as_str(), b.balance)).collect();
        assert_eq!(balances, vec![("Карта", 95499.5), ("Наличные", -500.0)]);
        assert!(d.account_balances[1].is_negative);

        assert_eq!(d.top_expense_categories[0].name, "Еда");
        assert_eq!(d.top_expense_categories[0].total, 4500.5);
        assert_eq!(d.top_expense_categories[0].percent, 90.0);
        assert_eq!(d.top_expense_categories[1].percent, 10.0);

        let labels: Vec<&str> = d.trend.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["01.03", "02.03", "05.03"]);
        assert_eq!(d.trend[1].total, -4500.5);
    }

    #[test]
    fn test_recent_transactions_newest_first() {
        let f = fixture();
        seed(&f);
        let d = dashboard(&f.conn, f.user_id, &DashboardFilter::default(), today()).unwrap();
        assert_eq!(d.recent_transactions.len(), 4);
        let first = &d.recent_transactions[0];
        assert_eq!(first.date, "05.03.2025 08:00");
        assert_eq!(first.account, "Наличные");
        assert_eq!(first.comment, "—");
        assert!(!first.is_income);
        assert_eq!(first.amount_display, "-500 RUB");
    }

    #[test]
    fn test_account_and_project_filters() {
        let f = fixture();
        seed(&f);
        let by_account = DashboardFilter {
            account: Some(f.cash.to_string()),
            ..DashboardFilter::default()
        };
        let d = dashboard(&f.conn, f.user_id, &by_account, today()).unwrap();
        assert_eq!(d.operation_count, 1);
        assert_eq!(d.total_expense, 500.0);

        let by_project = DashboardFilter {
            project: Some(f.work.to_string()),
            start: Some("2025-01-01".into()),
            ..DashboardFilter::default()
        };
        let d = dashboard(&f.conn, f.user_id, &by_project, today()).unwrap();
        assert_eq!(d.operation_count, 1);
        assert_eq!(d.total_expense, 0.0);
        assert!(d.top_expense_categories.is_empty());
    }

    #[test]
    fn test_wider_period_and_pickers() {
        let f = fixture();
        seed(&f);
        let filter = DashboardFilter {
            start: Some("2025-02-01".into()),
            end: Some("2025-02-28".into()),
            ..DashboardFilter::default()
        };
        let d = dashboard(&f.conn, f.user_id, &filter, today()).unwrap();
        // end day is inclusive to 23:59:59
        assert_eq!(d.operation_count, 1);
        assert_eq!(d.accounts.len(), 2);
        assert_eq!(d.projects.len(), 2);
        assert_eq!(d.projects.iter().filter(|p| p.id == f.home).count(), 1);
    }
}
