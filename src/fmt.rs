/// Format an amount with space-grouped thousands and a decimal comma: 1 234,56.
/// Whole amounts drop the ",00" tail.
pub fn amount(val: f64) -> String {
    let negative = val < 0.0 && format!("{:.2}", val.abs()) != "0.00";
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    let body = if dec_part == "00" {
        grouped
    } else {
        format!("{grouped},{dec_part}")
    };
    if negative {
        format!("-{body}")
    } else {
        body
    }
}

/// Explicit sign, non-negative amounts get "+".
pub fn signed_amount(val: f64) -> String {
    let sign = if val >= 0.0 { '+' } else { '-' };
    format!("{sign}{}", amount(val.abs()))
}

pub fn with_currency(val: f64, currency: &str) -> String {
    format!("{} {currency}", signed_amount(val))
}
