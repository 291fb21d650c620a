//! Historical data coverage checks.
//!
//! Jobs assume that every pair/timeframe has candles starting early enough
//! to cover the requested timerange plus a warmup window. The engine's
//! `list-data --show-timerange` listing tells us where each series starts.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::error::PreconditionError;

const LISTING_MARKER: &str = "data starts at ";

/// Default warmup buffer in days before the timerange start.
pub const DEFAULT_WARMUP_DAYS: i64 = 45;

/// Parse the start date of a `YYYYMMDD-YYYYMMDD` (or `YYYYMMDD-`) timerange.
pub fn timerange_start(timerange: &str) -> Result<NaiveDate, PreconditionError> {
    let start = timerange.split('-').next().unwrap_or_default();
    NaiveDate::parse_from_str(start, "%Y%m%d").map_err(|e| PreconditionError::InvalidTimerange {
        value: timerange.to_string(),
        reason: e.to_string(),
    })
}

/// Extract `(pair, timeframe) -> first candle date` from a data listing.
///
/// Lines look like `BTC/USDT:USDT, futures, 5m, data starts at 2023-11-17 00:00:00, ...`.
/// Anything else is ignored.
#[must_use]
pub fn parse_listing(output: &str) -> HashMap<(String, String), NaiveDate> {
    output
        .lines()
        .filter_map(|line| parse_listing_line(line.trim()))
        .collect()
}

fn parse_listing_line(line: &str) -> Option<((String, String), NaiveDate)> {
    let mut fields = line.splitn(4, ',');
    let pair = fields.next()?.trim();
    let _trading_mode = fields.next()?;
    let timeframe = fields.next()?.trim();
    let rest = fields.next()?.trim_start();

    if pair.is_empty() || timeframe.is_empty() {
        return None;
    }
    if !rest.to_ascii_lowercase().starts_with(LISTING_MARKER) {
        return None;
    }
    let date = rest[LISTING_MARKER.len()..].get(..10)?;
    let start = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;

    Some(((pair.to_string(), timeframe.to_string()), start))
}

/// A pair/timeframe whose data does not reach back far enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageGap {
    pub pair: String,
    pub timeframe: String,
    /// First available date, or `None` when the series is missing entirely.
    pub starts_at: Option<NaiveDate>,
}

/// Result of a coverage check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub timerange_start: NaiveDate,
    pub warmup_days: i64,
    pub required_start: NaiveDate,
    pub gaps: Vec<CoverageGap>,
}

impl CoverageReport {
    /// Compare listed start dates against `timerange_start - warmup_days`.
    #[must_use]
    pub fn check(
        pairs: &[String],
        timeframes: &[String],
        starts: &HashMap<(String, String), NaiveDate>,
        timerange_start: NaiveDate,
        warmup_days: i64,
    ) -> Self {
        let required_start = timerange_start - Duration::days(warmup_days);
        let mut gaps = Vec::new();

        for pair in pairs {
            for timeframe in timeframes {
                match starts.get(&(pair.clone(), timeframe.clone())) {
                    None => gaps.push(CoverageGap {
                        pair: pair.clone(),
                        timeframe: timeframe.clone(),
                        starts_at: None,
                    }),
                    Some(start) if *start > required_start => gaps.push(CoverageGap {
                        pair: pair.clone(),
                        timeframe: timeframe.clone(),
                        starts_at: Some(*start),
                    }),
                    Some(_) => {}
                }
            }
        }

        Self {
            timerange_start,
            warmup_days,
            required_start,
            gaps,
        }
    }

    #[must_use]
    pub fn is_sufficient(&self) -> bool {
        self.gaps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Found 3 pair / timeframe combinations.
BTC/USDT:USDT, futures, 5m, data starts at 2023-10-01 00:00:00, data ends at 2025-09-30 23:55:00
BTC/USDT:USDT, futures, 1h, data starts at 2023-12-15 00:00:00, data ends at 2025-09-30 23:00:00
ETH/USDT:USDT, futures, 5m, Data starts at 2023-09-01 00:00:00, data ends at 2025-09-30 23:55:00
garbage, line
";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn timerange_start_accepts_open_and_closed_ranges() {
        assert_eq!(timerange_start("20240101-20250930").unwrap(), date(2024, 1, 1));
        assert_eq!(timerange_start("20240101-").unwrap(), date(2024, 1, 1));
        assert_eq!(timerange_start("20240101").unwrap(), date(2024, 1, 1));
    }

    #[test]
    fn timerange_start_rejects_missing_start() {
        assert!(timerange_start("-20250930").is_err());
        assert!(timerange_start("2024-01-01").is_err());
    }

    #[test]
    fn parse_listing_extracts_starts() {
        let starts = parse_listing(LISTING);
        assert_eq!(starts.len(), 3);
        assert_eq!(
            starts[&("BTC/USDT:USDT".to_string(), "5m".to_string())],
            date(2023, 10, 1)
        );
        assert_eq!(
            starts[&("ETH/USDT:USDT".to_string(), "5m".to_string())],
            date(2023, 9, 1)
        );
    }

    #[test]
    fn check_reports_late_and_missing_series() {
        let starts = parse_listing(LISTING);
        let pairs = vec!["BTC/USDT:USDT".to_string(), "ETH/USDT:USDT".to_string()];
        let timeframes = vec!["5m".to_string(), "1h".to_string()];

        let report = CoverageReport::check(&pairs, &timeframes, &starts, date(2024, 1, 1), 45);

        assert_eq!(report.required_start, date(2023, 11, 17));
        assert!(!report.is_sufficient());
        assert_eq!(
            report.gaps,
            vec![
                CoverageGap {
                    pair: "BTC/USDT:USDT".into(),
                    timeframe: "1h".into(),
                    starts_at: Some(date(2023, 12, 15)),
                },
                CoverageGap {
                    pair: "ETH/USDT:USDT".into(),
                    timeframe: "1h".into(),
                    starts_at: None,
                },
            ]
        );
    }

    #[test]
    fn check_passes_when_everything_starts_early() {
        let starts = parse_listing(LISTING);
        let pairs = vec!["BTC/USDT:USDT".to_string()];
        let timeframes = vec!["5m".to_string()];

        let report = CoverageReport::check(&pairs, &timeframes, &starts, date(2024, 1, 1), 45);
        assert!(report.is_sufficient());
    }
}
