// Copyright (c) James Kassemi, SC, US. All rights reserved.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Placeholder persisted for table cells the exchange leaves empty.
pub const EMPTY_CELL: &str = "/";

/// One daily trading row for a single instrument.
///
/// Field values stay in the textual form the exchange serves them in; the
/// merge path runs them through [`HistoryRecord::normalized`] so persisted
/// numbers use the Macedonian separator convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date: NaiveDate,
    pub instrument: String,
    pub last_trade_price: String,
    pub max_price: String,
    pub min_price: String,
    pub avg_price: String,
    pub percent_change: String,
    pub volume: String,
    pub turnover_best: String,
    pub total_turnover: String,
}

/// Dataset primary key. Ordered by instrument first so snapshot iteration
/// yields each instrument's history as one contiguous, date-sorted run.
pub type RecordKey = (String, NaiveDate);

impl HistoryRecord {
    pub fn key(&self) -> RecordKey {
        (self.instrument.clone(), self.date)
    }

    /// Re-formats every numeric field from the English locale the site serves
    /// (`21,600.00`) to the Macedonian one (`21.600,00`).
    pub fn normalized(mut self) -> Self {
        self.last_trade_price = normalize_price(&self.last_trade_price);
        self.max_price = normalize_price(&self.max_price);
        self.min_price = normalize_price(&self.min_price);
        self.avg_price = normalize_price(&self.avg_price);
        self.percent_change = normalize_price(&self.percent_change);
        self.volume = normalize_price(&self.volume);
        self.turnover_best = normalize_price(&self.turnover_best);
        self.total_turnover = normalize_price(&self.total_turnover);
        self
    }
}

/// Swaps thousands/decimal separators on one numeric cell, fixing two decimal
/// places. The `/` placeholder and text that does not parse pass through
/// untouched.
pub fn normalize_price(value: &str) -> String {
    if value == EMPTY_CELL {
        return value.to_string();
    }
    let plain: String = value
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let Ok(parsed) = plain.parse::<f64>() else {
        return value.to_string();
    };
    let fixed = format!("{parsed:.2}");
    let (int_part, dec_part) = match fixed.split_once('.') {
        Some(parts) => parts,
        None => (fixed.as_str(), "00"),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        let remaining = digits.len() - idx;
        if idx > 0 && remaining % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped},{dec_part}")
}
