use serde::{Deserialize, Serialize};

use crate::importer::mapping::{ColumnField, Mapping};

const SAMPLE_LIMIT: usize = 5;

const KNOWN_CURRENCY_CODES: &[&str] = &[
    "RUB", "USD", "EUR", "KZT", "KGS", "GBP", "CHF", "JPY", "CNY", "UAH", "BYN", "CAD", "AUD", "NOK", "SEK",
];
const CURRENCY_WORDS: &[&str] = &["РУБ", "ДОЛЛАР", "ЕВРО"];

const INCOME_VALUE_MARKERS: &[&str] = &["доход", "поступление", "пополнение", "income", "credit", "приход"];
const EXPENSE_VALUE_MARKERS: &[&str] = &["расход", "списание", "перевод", "expense", "debit", "платеж", "платёж"];

fn hints(field: ColumnField) -> &'static [&'static str] {
    match field {
        ColumnField::Date => &["дата", "date", "posting", "operation"],
        ColumnField::Amount => &["сумма", "amount", "итог", "total", "debit", "credit"],
        ColumnField::Currency => &["валют", "currency", "curr"],
        ColumnField::Account => &["счет", "счёт", "account", "card", "карта", "номер карты"],
        ColumnField::Project => &["проект", "project", "client", "контрагент", "partner"],
        ColumnField::Category => &["категор", "category", "section"],
        ColumnField::Subcategory => &["подкат", "subcategory", "subcat"],
        ColumnField::Comment => &["коммент", "comment", "описан", "description", "details", "назначение"],
        ColumnField::Type => &["тип", "вид операц", "operation type", "доход", "расход"],
    }
}

/// Value check a column must pass to be claimed for a field, if any.
fn predicate(field: ColumnField) -> Option<fn(&[String]) -> bool> {
    match field {
        ColumnField::Amount => Some(looks_like_numeric),
        ColumnField::Currency => Some(looks_like_currency),
        ColumnField::Type => Some(looks_like_type_markers),
        _ => None,
    }
}

/// Lowercase, with every run of characters outside `[a-z0-9а-яё]` collapsed to one space.
pub fn normalize_header(header: &str) -> String {
    let lowered = header.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut gap = false;
    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || ('а'..='я').contains(&c) || c == 'ё' {
            if gap && !out.is_empty() {
                out.push(' ');
            }
            gap = false;
            out.push(c);
        } else {
            gap = true;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSamples {
    pub column: String,
    pub values: Vec<String>,
}

/// Up to five non-empty values per column, taken from the sample rows.
pub fn collect_column_samples(columns: &[String], sample_rows: &[Vec<String>]) -> Vec<ColumnSamples> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| ColumnSamples {
            column: column.clone(),
            values: sample_rows
                .iter()
                .filter_map(|row| row.get(idx))
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .take(SAMPLE_LIMIT)
                .map(str::to_string)
                .collect(),
        })
        .collect()
}

fn enough_hits(hits: usize, total: usize) -> bool {
    hits >= (total / 2).max(1)
}

pub fn looks_like_numeric(values: &[String]) -> bool {
    let hits = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .filter(|v| {
            let normalized: String = v
                .chars()
                .filter(|c| !matches!(c, ' ' | '\u{a0}'))
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            normalized.parse::<f64>().is_ok()
        })
        .count();
    enough_hits(hits, values.len())
}

pub fn looks_like_currency(values: &[String]) -> bool {
    let hits = values
        .iter()
        .map(|v| v.trim().to_uppercase())
        .filter(|token| {
            KNOWN_CURRENCY_CODES.contains(&token.as_str()) || CURRENCY_WORDS.contains(&token.as_str())
        })
        .count();
    enough_hits(hits, values.len())
}

pub fn looks_like_type_markers(values: &[String]) -> bool {
    let hits = values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|token| !token.is_empty())
        .filter(|token| {
            INCOME_VALUE_MARKERS.contains(&token.as_str()) || EXPENSE_VALUE_MARKERS.contains(&token.as_str())
        })
        .count();
    enough_hits(hits, values.len())
}

/// Suggest a column for each field.
///
/// Fields are claimed in [`ColumnField::ALL`] order and a column is used at most
/// once. A header hint wins unless the field's value check vetoes it; fields with
/// a value check then fall back to the first column whose values pass.
pub fn auto_detect_columns(columns: &[String], sample_rows: &[Vec<String>]) -> (Mapping, Vec<ColumnSamples>) {
    let normalized: Vec<String> = columns.iter().map(|c| normalize_header(c)).collect();
    let samples = collect_column_samples(columns, sample_rows);
    let mut used = vec![false; columns.len()];
    let mut suggestions = Mapping::default();

    for field in ColumnField::ALL {
        let check = predicate(field);
        let passes = |idx: usize| check.map_or(true, |f| f(&samples[idx].values));

        let by_hint = (0..columns.len()).find(|&idx| {
            !used[idx] && hints(field).iter().any(|h| normalized[idx].contains(h)) && passes(idx)
        });
        let chosen = by_hint.or_else(|| {
            check.and_then(|f| (0..columns.len()).find(|&idx| !used[idx] && f(&samples[idx].values)))
        });

        if let Some(idx) = chosen {
            used[idx] = true;
            suggestions.set_column(field, &columns[idx]);
        }
    }
    (suggestions, samples)
}

/// Known export layouts with a ready-made mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankPreset {
    Tinkoff,
    Alfa,
    #[default]
    Other,
}

impl BankPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tinkoff => "tinkoff",
            Self::Alfa => "alfa",
            Self::Other => "other",
        }
    }

    /// `None` for "auto" (and anything unknown): the preset is inferred from the columns.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "tinkoff" => Some(Self::Tinkoff),
            "alfa" => Some(Self::Alfa),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn mapping(&self) -> Mapping {
        let s = |v: &str| Some(v.to_string());
        match self {
            Self::Tinkoff => Mapping {
                column_date: s("Дата операции"),
                column_amount: s("Сумма операции"),
                column_currency: s("Валюта операции"),
                column_category: s("Категория"),
                column_comment: s("Описание"),
                column_account: s("Номер карты"),
                default_project_name: s("Тинькофф"),
                default_account_name: s("Карта Тинькофф"),
                ..Mapping::default()
            },
            Self::Alfa => Mapping {
                column_date: s("Дата операции"),
                column_amount: s("Сумма"),
                column_currency: s("Валюта"),
                column_category: s("Категория"),
                column_comment: s("Описание операции"),
                column_account: s("Название счета"),
                default_project_name: s("Альфа-Банк"),
                default_account_name: s("Счёт Альфа"),
                ..Mapping::default()
            },
            Self::Other => Mapping::default(),
        }
    }
}

pub fn infer_preset(columns: &[String]) -> BankPreset {
    let lower: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    let has = |name: &str| lower.iter().any(|c| c == name);
    if has("дата операции") && has("сумма операции") && has("категория") && has("описание") {
        BankPreset::Tinkoff
    } else if has("описание операции") && has("название счета") && has("дата проводки") {
        BankPreset::Alfa
    } else {
        BankPreset::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Дата операции  "), "дата операции");
        assert_eq!(normalize_header("Сумма (RUB)"), "сумма rub");
        assert_eq!(normalize_header("Номер_карты/№"), "номер карты");
        assert_eq!(normalize_header("Ёлка"), "ёлка");
    }

    #[test]
    fn test_numeric_predicate_majority() {
        assert!(looks_like_numeric(&strings(&["1 200,50", "-300", "abc"])));
        assert!(!looks_like_numeric(&strings(&["abc", "def"])));
        assert!(!looks_like_numeric(&[]));
    }

    #[test]
    fn test_currency_and_marker_predicates() {
        assert!(looks_like_currency(&strings(&["RUB", "usd", "руб"])));
        assert!(!looks_like_currency(&strings(&["ABC", "XYZ"])));
        assert!(looks_like_type_markers(&strings(&["Доход", "Расход", "прочее"])));
        assert!(!looks_like_type_markers(&strings(&["кафе", "такси"])));
    }

    #[test]
    fn test_auto_detect_tinkoff_headers() {
        let columns = strings(&[
            "Дата операции",
            "Номер карты",
            "Статус",
            "Сумма операции",
            "Валюта операции",
            "Категория",
            "Описание",
        ]);
        let rows = vec![strings(&[
            "05.01.2024 14:22:10",
            "*1234",
            "OK",
            "-350,00",
            "RUB",
            "Кафе",
            "Шоколадница",
        ])];
        let (mapping, samples) = auto_detect_columns(&columns, &rows);
        assert_eq!(mapping.column(ColumnField::Date), Some("Дата операции"));
        assert_eq!(mapping.column(ColumnField::Amount), Some("Сумма операции"));
        assert_eq!(mapping.column(ColumnField::Currency), Some("Валюта операции"));
        assert_eq!(mapping.column(ColumnField::Account), Some("Номер карты"));
        assert_eq!(mapping.column(ColumnField::Category), Some("Категория"));
        assert_eq!(mapping.column(ColumnField::Comment), Some("Описание"));
        assert_eq!(mapping.column(ColumnField::Type), None);
        assert_eq!(samples[3].values, vec!["-350,00"]);
        assert_eq!(infer_preset(&columns), BankPreset::Tinkoff);
    }

    #[test]
    fn test_auto_detect_falls_back_to_value_predicates() {
        let columns = strings(&["when", "col_a", "col_b", "col_c"]);
        let rows = vec![
            strings(&["2024-01-01", "доход", "1000", "USD"]),
            strings(&["2024-01-02", "расход", "-20,5", "USD"]),
        ];
        let (mapping, _) = auto_detect_columns(&columns, &rows);
        assert_eq!(mapping.column(ColumnField::Date), None);
        assert_eq!(mapping.column(ColumnField::Amount), Some("col_b"));
        assert_eq!(mapping.column(ColumnField::Currency), Some("col_c"));
        assert_eq!(mapping.column(ColumnField::Type), Some("col_a"));
    }

    #[test]
    fn test_hint_vetoed_by_predicate() {
        // "Сумма прописью" matches the amount hint but holds words
        let columns = strings(&["Сумма прописью", "Итого"]);
        let rows = vec![strings(&["сто рублей", "100"])];
        let (mapping, _) = auto_detect_columns(&columns, &rows);
        assert_eq!(mapping.column(ColumnField::Amount), Some("Итого"));
    }

    #[test]
    fn test_infer_alfa_and_other() {
        let alfa = strings(&["Дата проводки", "Описание операции", "Название счета", "Сумма"]);
        assert_eq!(infer_preset(&alfa), BankPreset::Alfa);
        assert_eq!(infer_preset(&strings(&["date", "amount"])), BankPreset::Other);
        assert_eq!(BankPreset::parse("auto"), None);
        assert_eq!(BankPreset::Alfa.mapping().column(ColumnField::Amount), Some("Сумма"));
    }
}
