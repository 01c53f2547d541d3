use chrono::Local;
use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::error::Result;
use crate::fmt;
use crate::reports::{dashboard, DashboardFilter};
use crate::settings::load_settings;

pub fn run(user: &str, start: Option<String>, end: Option<String>) -> Result<()> {
    let conn = super::open_db(&load_settings())?;
    let user = super::require_user(&conn, user)?;
    let filter = DashboardFilter {
        start,
        end,
        ..DashboardFilter::default()
    };
    let report = dashboard(&conn, user.id, &filter, Local::now().date_naive())?;

    println!(
        "{} {} - {}",
        "Dashboard".bold(),
        report.filters.start.format("%d.%m.%Y"),
        report.filters.end.format("%d.%m.%Y")
    );
    println!("Income:     {}", fmt::amount(report.total_income).green());
    println!("Expenses:   {}", fmt::amount(report.total_expense).red());
    let net = fmt::signed_amount(report.net);
    println!("Net:        {}", if report.net_positive { net.green() } else { net.red() });
    println!("Operations: {}", report.operation_count);

    if !report.account_balances.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Account", "Balance"]);
        for b in &report.account_balances {
            table.add_row(vec![
                Cell::new(&b.name),
                Cell::new(fmt::with_currency(b.balance, &b.currency)).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("\nBalances\n{table}");
    }

    if !report.top_expense_categories.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Category", "Spent", "%"]);
        for share in &report.top_expense_categories {
            table.add_row(vec![
                Cell::new(&share.name),
                Cell::new(fmt::amount(share.total)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1}", share.percent)).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("\nTop expenses\n{table}");
    }

    if !report.recent_transactions.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Date", "Account", "Category", "Amount", "Comment"]);
        for t in &report.recent_transactions {
            let amount = if t.is_income {
                t.amount_display.green()
            } else {
                t.amount_display.red()
            };
            table.add_row(vec![
                Cell::new(&t.date),
                Cell::new(&t.account),
                Cell::new(&t.category),
                Cell::new(amount).set_alignment(CellAlignment::Right),
                Cell::new(&t.comment),
            ]);
        }
        println!("\nRecent\n{table}");
    }
    Ok(())
}
