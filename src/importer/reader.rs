use serde_json::{Map, Value};

use crate::error::{KopilkaError, Result};

const DELIMITERS: &[u8] = b",;\t|";
const FALLBACK_DELIMITER: u8 = b';';
pub const SAMPLE_ROWS: usize = 10;

/// A file read into a header row and a matrix of string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFile {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ParsedFile {
    /// Trim and de-duplicate headers, blank out whitespace-only cells, square
    /// every row to the header width and drop rows with nothing in them.
    fn from_matrix(header: Vec<String>, body: Vec<Vec<String>>) -> Self {
        let mut columns: Vec<String> = Vec::with_capacity(header.len());
        for (idx, raw) in header.into_iter().enumerate() {
            let name = raw.trim();
            let base = if name.is_empty() {
                format!("Unnamed: {idx}")
            } else {
                name.to_string()
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while columns.contains(&candidate) {
                candidate = format!("{base}.{n}");
                n += 1;
            }
            columns.push(candidate);
        }

        let width = columns.len();
        let rows = body
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row.into_iter()
                    .map(|cell| if cell.trim().is_empty() { String::new() } else { cell })
                    .collect::<Vec<_>>()
            })
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect();

        Self { columns, rows }
    }

    pub fn sample_rows(&self) -> Vec<Vec<String>> {
        self.rows.iter().take(SAMPLE_ROWS).cloned().collect()
    }
}

/// A row as an ordered `column -> value` object, for error reports.
pub fn row_object(columns: &[String], row: &[String]) -> Map<String, Value> {
    columns
        .iter()
        .zip(row.iter().chain(std::iter::repeat(&String::new())))
        .map(|(c, v)| (c.clone(), Value::String(v.clone())))
        .collect()
}

pub fn is_spreadsheet(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    [".xlsx", ".xls", ".xlsm", ".xlsb", ".ods"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Most frequent candidate delimiter on the header line, `;` when none occurs.
pub fn sniff_delimiter(header_line: &str) -> u8 {
    DELIMITERS
        .iter()
        .map(|&d| (d, header_line.bytes().filter(|&b| b == d).count()))
        .filter(|&(_, n)| n > 0)
        .max_by_key(|&(d, n)| (n, std::cmp::Reverse(DELIMITERS.iter().position(|&x| x == d))))
        .map(|(d, _)| d)
        .unwrap_or(FALLBACK_DELIMITER)
}

fn unreadable(detail: impl std::fmt::Display) -> KopilkaError {
    KopilkaError::Import(format!(
        "could not read file; make sure the format is supported ({detail})"
    ))
}

pub fn read_csv(bytes: &[u8]) -> Result<ParsedFile> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|_| unreadable("not UTF-8 text"))?;
    let header_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if header_line.is_empty() {
        return Err(unreadable("empty file"));
    }

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(header_line))
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let header: Vec<String> = rdr.headers().map_err(unreadable)?.iter().map(str::to_string).collect();
    let mut body = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(unreadable)?;
        body.push(record.iter().map(str::to_string).collect());
    }
    Ok(ParsedFile::from_matrix(header, body))
}

#[cfg(feature = "excel")]
mod excel {
    use std::io::Cursor;

    use calamine::{Data, Reader};

    use super::{unreadable, ParsedFile};
    use crate::error::{KopilkaError, Result};

    /// Excel serial day number to an ISO timestamp (1899-12-30 epoch).
    /// Serials outside chrono's range come back as the plain number.
    pub fn excel_serial_to_iso(serial: f64) -> String {
        let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)
            .unwrap_or_default()
            .and_time(chrono::NaiveTime::MIN);
        let seconds = (serial * 86_400.0).round() as i64;
        chrono::TimeDelta::try_seconds(seconds)
            .and_then(|delta| base.checked_add_signed(delta))
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|| serial.to_string())
    }

    pub fn cell_to_string(cell: &Data) -> String {
        match cell {
            Data::Empty | Data::Error(_) => String::new(),
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
            Data::Int(i) => i.to_string(),
            Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            Data::Float(f) => f.to_string(),
            Data::Bool(b) => b.to_string(),
            Data::DateTime(dt) => excel_serial_to_iso(dt.as_f64()),
        }
    }

    fn open(bytes: &[u8]) -> Result<calamine::Sheets<Cursor<Vec<u8>>>> {
        calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(unreadable)
    }

    pub fn sheet_names(bytes: &[u8]) -> Result<Vec<String>> {
        Ok(open(bytes)?.sheet_names().to_vec())
    }

    pub fn read_sheet(bytes: &[u8], sheet: Option<&str>) -> Result<ParsedFile> {
        let mut workbook = open(bytes)?;
        let name = match sheet {
            Some(name) => name.to_string(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| KopilkaError::Import("the workbook has no sheets".into()))?,
        };
        let range = workbook.worksheet_range(&name).map_err(unreadable)?;
        let mut rows = range.rows();
        let header = rows
            .next()
            .map(|r| r.iter().map(cell_to_string).collect())
            .unwrap_or_default();
        let body = rows.map(|r| r.iter().map(cell_to_string).collect()).collect();
        Ok(ParsedFile::from_matrix(header, body))
    }
}

#[cfg(feature = "excel")]
pub use excel::{cell_to_string, excel_serial_to_iso, read_sheet, sheet_names};

#[cfg(not(feature = "excel"))]
pub fn sheet_names(_bytes: &[u8]) -> Result<Vec<String>> {
    Err(KopilkaError::Import("spreadsheet support is not enabled in this build".into()))
}

#[cfg(not(feature = "excel"))]
pub fn read_sheet(_bytes: &[u8], _sheet: Option<&str>) -> Result<ParsedFile> {
    Err(KopilkaError::Import("spreadsheet support is not enabled in this build".into()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a;b;c"), b';');
        assert_eq!(sniff_delimiter("a,b,c"), b',');
        assert_eq!(sniff_delimiter("a\tb"), b'\t');
        assert_eq!(sniff_delimiter("single"), b';');
        // tie goes to the earlier candidate
        assert_eq!(sniff_delimiter("a,b;c"), b',');
    }

    #[test]
    fn test_read_csv_semicolon_with_bom() {
        let data = "\u{feff}Дата;Сумма;Комментарий\n01.02.2024;-100,50;кофе\n;;\n02.02.2024;200;\n";
        let parsed = read_csv(data.as_bytes()).unwrap();
        assert_eq!(parsed.columns, vec!["Дата", "Сумма", "Комментарий"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0], vec!["01.02.2024", "-100,50", "кофе"]);
        assert_eq!(parsed.rows[1], vec!["02.02.2024", "200", ""]);
    }

    #[test]
    fn test_read_csv_quoted_commas_and_short_rows() {
        let data = "date,amount,comment\n2024-01-01,\"1,5\",\"a, b\"\n2024-01-02,3\n";
        let parsed = read_csv(data.as_bytes()).unwrap();
        assert_eq!(parsed.rows[0], vec!["2024-01-01", "1,5", "a, b"]);
        assert_eq!(parsed.rows[1], vec!["2024-01-02", "3", ""]);
    }

    #[test]
    fn test_headers_trimmed_and_deduplicated() {
        let data = " A ;A;;B\n1;2;3;4\n";
        let parsed = read_csv(data.as_bytes()).unwrap();
        assert_eq!(parsed.columns, vec!["A", "A.1", "Unnamed: 2", "B"]);
    }

    #[test]
    fn test_read_csv_rejects_garbage() {
        assert!(matches!(read_csv(b""), Err(KopilkaError::Import(_))));
        assert!(matches!(read_csv(&[0xff, 0xfe, 0x00]), Err(KopilkaError::Import(_))));
    }

    #[test]
    fn test_row_object_keeps_column_order() {
        let columns = vec!["b".to_string(), "a".to_string()];
        let obj = row_object(&columns, &["1".to_string()]);
        let keys: Vec<&String> = obj.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(obj["a"], Value::String(String::new()));
    }

    #[test]
    fn test_is_spreadsheet() {
        assert!(is_spreadsheet("Выписка.XLSX"));
        assert!(is_spreadsheet("old.xls"));
        assert!(!is_spreadsheet("export.csv"));
    }

    #[cfg(feature = "excel")]
    #[test]
    fn test_excel_cells() {
        use calamine::Data;
        assert_eq!(cell_to_string(&Data::Float(1500.0)), "1500");
        assert_eq!(cell_to_string(&Data::Float(-12.5)), "-12.5");
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(excel_serial_to_iso(45296.5), "2024-01-05T12:00:00");
    }

    #[cfg(feature = "excel")]
    #[test]
    fn test_read_real_workbook() {
        let bytes = test_workbook::build(&[
            ("Сводка", vec![vec!["Итого"]]),
            (
                "Операции",
                vec![
                    vec!["Дата", "Сумма", " Сумма "],
                    vec!["2024-01-05", "1500", ""],
                    vec!["", "", ""],
                    vec!["2024-01-06", "-12.5", "наличные"],
                ],
            ),
        ]);
        assert_eq!(sheet_names(&bytes).unwrap(), vec!["Сводка", "Операции"]);

        let first = read_sheet(&bytes, None).unwrap();
        assert_eq!(first.columns, vec!["Итого"]);
        assert!(first.rows.is_empty());

        let ops = read_sheet(&bytes, Some("Операции")).unwrap();
        assert_eq!(ops.columns, vec!["Дата", "Сумма", "Сумма.1"]);
        assert_eq!(
            ops.rows,
            vec![
                vec!["2024-01-05".to_string(), "1500".into(), String::new()],
                vec!["2024-01-06".to_string(), "-12.5".into(), "наличные".into()],
            ]
        );
        assert!(matches!(read_sheet(&bytes, Some("Нет такого")), Err(KopilkaError::Import(_))));
    }

    #[cfg(feature = "excel")]
    #[test]
    fn test_excel_serial_out_of_range() {
        assert_eq!(excel_serial_to_iso(1.0e12), "1000000000000");
        assert_eq!(excel_serial_to_iso(-1.0e12), "-1000000000000");
        assert_eq!(excel_serial_to_iso(f64::MAX), f64::MAX.to_string());
    }

    #[cfg(feature = "excel")]
    #[test]
    fn test_read_sheet_rejects_non_workbook() {
        assert!(matches!(read_sheet(b"not a workbook", None), Err(KopilkaError::Import(_))));
    }
}
