//! Symbol-history page parsing.
//!
//! Hand-rolled slicing over the returned markup: the table is small, its
//! shape is fixed, and malformed rows are data-quality noise to drop rather
//! than errors to raise.

use chrono::NaiveDate;
use core_types::record::{HistoryRecord, EMPTY_CELL};

/// Date format used in the table's first column.
const CELL_DATE_FMT: &str = "%m/%d/%Y";

/// Cells per row: date, last trade price, max, min, avg price, %chg,
/// volume, turnover in BEST, total turnover.
const CELLS_PER_ROW: usize = 9;

/// Extracts all valid trading rows from one history page, tagging each with
/// `instrument`. Never fails; anything unrecognizable yields no rows.
pub fn parse_history_page(html: &str, instrument: &str) -> Vec<HistoryRecord> {
    let Some(body) = tag_body(html, "tbody", 0).map(|(inner, _)| inner) else {
        return Vec::new();
    };
    let mut records = Vec::new();
    let mut pos = 0;
    while let Some((row, next)) = tag_body(body, "tr", pos) {
        pos = next;
        if let Some(record) = parse_row(row, instrument) {
            records.push(record);
        }
    }
    records
}

fn parse_row(row: &str, instrument: &str) -> Option<HistoryRecord> {
    let mut cells = Vec::with_capacity(CELLS_PER_ROW);
    let mut pos = 0;
    while let Some((cell, next)) = tag_body(row, "td", pos) {
        pos = next;
        cells.push(clean_text(cell));
    }
    if cells.len() != CELLS_PER_ROW {
        return None;
    }
    // An empty max-price cell marks a day without trades.
    if cells[2].is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(&cells[0], CELL_DATE_FMT).ok()?;
    let cell = |idx: usize| {
        if cells[idx].is_empty() {
            EMPTY_CELL.to_string()
        } else {
            cells[idx].clone()
        }
    };
    Some(HistoryRecord {
        date,
        instrument: instrument.to_string(),
        last_trade_price: cell(1),
        max_price: cell(2),
        min_price: cell(3),
        avg_price: cell(4),
        percent_change: cell(5),
        volume: cell(6),
        turnover_best: cell(7),
        total_turnover: cell(8),
    })
}

/// Finds the next `<name ...>...</name>` block at or after `from` and returns
/// its inner content plus the scan position past the closing tag.
fn tag_body<'a>(html: &'a str, name: &str, from: usize) -> Option<(&'a str, usize)> {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{name}");
    let close = format!("</{name}");
    let mut cursor = from;
    loop {
        let start = lower.get(cursor..)?.find(&open)? + cursor;
        let after_name = start + open.len();
        // Reject prefix matches like <thead> when scanning for <th>.
        match lower.as_bytes().get(after_name) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {}
            _ => {
                cursor = after_name;
                continue;
            }
        }
        let open_end = html.get(start..)?.find('>')? + start + 1;
        let end = lower.get(open_end..)?.find(&close)? + open_end;
        let next = html.get(end..)?.find('>').map(|p| end + p + 1).unwrap_or(end);
        return Some((&html[open_end..end], next));
    }
}

/// Strips tags, decodes the entities the exchange emits, and collapses
/// whitespace runs to single spaces.
fn clean_text(block: &str) -> String {
    let mut text = String::with_capacity(block.len());
    let mut in_tag = false;
    for ch in block.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    let text = text.replace("&nbsp;", " ").replace("&amp;", "&");
    let mut out = String::with_capacity(text.len());
    let mut prev_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> String {
        let tds: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
        format!("<tr>{tds}</tr>")
    }

    fn page(rows: &[String]) -> String {
        format!(
            "<html><body><table id=\"resultsTable\"><thead><tr><th>Date</th></tr></thead>\
             <tbody>{}</tbody></table></body></html>",
            rows.concat()
        )
    }

    #[test]
    fn parses_well_formed_rows() {
        let html = page(&[
            row(&[
                "6/10/2024", "21,600.00", "21,700.00", "21,500.00", "21,611.73", "-0.32",
                "1,204", "26,020,523", "26,020,523",
            ]),
            row(&[
                "6/11/2024", "21,650.00", "21,650.00", "21,600.00", "21,640.00", "0.23",
                "312", "6,751,680", "6,751,680",
            ]),
        ]);
        let records = parse_history_page(&html, "ALK");
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].date,
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
        );
        assert_eq!(records[0].instrument, "ALK");
        assert_eq!(records[0].last_trade_price, "21,600.00");
        assert_eq!(records[1].percent_change, "0.23");
    }

    #[test]
    fn drops_rows_with_an_empty_max_cell() {
        let html = page(&[
            row(&["6/10/2024", "21,600.00", "", "", "", "", "0", "0", "0"]),
            row(&[
                "6/11/2024", "21,650.00", "21,650.00", "21,600.00", "21,640.00", "0.23",
                "312", "6,751,680", "6,751,680",
            ]),
        ]);
        let records = parse_history_page(&html, "ALK");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 6, 11).unwrap());
    }

    #[test]
    fn drops_rows_with_the_wrong_cell_count() {
        let html = page(&[row(&["6/10/2024", "21,600.00", "21,700.00"])]);
        assert!(parse_history_page(&html, "ALK").is_empty());
    }

    #[test]
    fn drops_rows_with_an_unparseable_date() {
        let html = page(&[row(&[
            "yesterday", "1", "1", "1", "1", "0", "0", "0", "0",
        ])]);
        assert!(parse_history_page(&html, "ALK").is_empty());
    }

    #[test]
    fn empty_optional_cells_become_placeholders() {
        let html = page(&[row(&[
            "6/10/2024", "", "21,700.00", "21,500.00", "", "", "1,204", "", "26,020,523",
        ])]);
        let records = parse_history_page(&html, "ALK");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].last_trade_price, "/");
        assert_eq!(records[0].avg_price, "/");
        assert_eq!(records[0].turnover_best, "/");
        assert_eq!(records[0].max_price, "21,700.00");
    }

    #[test]
    fn unwraps_nested_markup_and_entities() {
        let html = page(&[row(&[
            "6/10/2024",
            "<span class=\"num\">21,600.00</span>",
            " 21,700.00&nbsp;",
            "21,500.00",
            "21,611.73",
            "-0.32",
            "1,204",
            "26,020,523",
            "26,020,523",
        ])]);
        let records = parse_history_page(&html, "ALK");
        assert_eq!(records[0].last_trade_price, "21,600.00");
        assert_eq!(records[0].max_price, "21,700.00");
    }

    #[test]
    fn pages_without_a_result_table_yield_nothing() {
        assert!(parse_history_page("", "ALK").is_empty());
        assert!(parse_history_page("<html><body>No data</body></html>", "ALK").is_empty());
        assert!(parse_history_page("<tbody></tbody>", "ALK").is_empty());
    }
}
