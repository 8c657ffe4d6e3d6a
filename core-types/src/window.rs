// Copyright (c) James Kassemi, SC, US. All rights reserved.

use chrono::{Days, NaiveDate};

/// Default cap on one request's inclusive day count, matching the upstream
/// symbol-history page limit.
pub const DEFAULT_MAX_SPAN_DAYS: u32 = 364;

/// Closed date interval requested from the exchange in one page fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    /// Inclusive number of calendar days the window covers.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Lazy partition of the pending range `[watermark+1, today]` into ordered,
/// gap-free windows of at most `max_span_days` days each.
///
/// Cloning yields a fresh plan positioned at the first window.
#[derive(Clone, Debug)]
pub struct WindowPlan {
    next_start: Option<NaiveDate>,
    today: NaiveDate,
    max_span_days: u32,
}

impl WindowPlan {
    pub fn new(watermark: NaiveDate, today: NaiveDate, max_span_days: u32) -> Self {
        let next_start = if watermark >= today {
            None
        } else {
            watermark.checked_add_days(Days::new(1))
        };
        Self {
            next_start,
            today,
            max_span_days: max_span_days.max(1),
        }
    }
}

impl Iterator for WindowPlan {
    type Item = FetchWindow;

    fn next(&mut self) -> Option<FetchWindow> {
        let start = self.next_start.take()?;
        if start > self.today {
            return None;
        }
        let span = Days::new(u64::from(self.max_span_days) - 1);
        let end = match start.checked_add_days(span) {
            Some(cap) => cap.min(self.today),
            None => self.today,
        };
        self.next_start = end.checked_add_days(Days::new(1));
        Some(FetchWindow { start, end })
    }
}
