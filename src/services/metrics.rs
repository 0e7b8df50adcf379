use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::models::portfolio::PortfolioSnapshot;
use crate::validation::portfolio::parse_iso_date;

/// A raw `{date, value}` pair as supplied by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioPoint {
    pub date: String,
    pub value: f64,
}

impl From<&PortfolioSnapshot> for PortfolioPoint {
    fn from(snapshot: &PortfolioSnapshot) -> Self {
        Self {
            date: snapshot.date.format("%Y-%m-%d").to_string(),
            value: snapshot.value,
        }
    }
}

/// Change over one trailing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformancePeriod {
    pub label: &'static str,
    pub delta: Option<f64>,
    pub delta_percent: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_partial: bool,
}

impl PerformancePeriod {
    fn empty(label: &'static str) -> Self {
        Self {
            label,
            delta: None,
            delta_percent: None,
            start_date: None,
            end_date: None,
            is_partial: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CadenceSummary {
    pub average_gap_days: Option<f64>,
    pub days_since_last: Option<i64>,
    pub last_snapshot_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceHighlights {
    pub periods: Vec<PerformancePeriod>,
    pub cadence: CadenceSummary,
}

impl PerformanceHighlights {
    pub fn period(&self, label: &str) -> Option<&PerformancePeriod> {
        self.periods.iter().find(|p| p.label == label)
    }
}

struct Point<'a> {
    iso: &'a str,
    date: NaiveDate,
    value: f64,
}

fn build_period(label: &'static str, start: NaiveDate, points: &[Point<'_>]) -> PerformancePeriod {
    let earliest = &points[0];
    let latest = &points[points.len() - 1];

    let anchor = points
        .iter()
        .rev()
        .find(|p| p.date <= start)
        .unwrap_or(earliest);

    if points.len() < 2 || anchor.date == latest.date {
        return PerformancePeriod {
            start_date: Some(anchor.iso.to_string()),
            end_date: Some(latest.iso.to_string()),
            ..PerformancePeriod::empty(label)
        };
    }

    let delta = latest.value - anchor.value;
    let delta_percent = (anchor.value != 0.0).then(|| delta / anchor.value * 100.0);
    PerformancePeriod {
        label,
        delta: Some(delta),
        delta_percent,
        start_date: Some(anchor.iso.to_string()),
        end_date: Some(latest.iso.to_string()),
        is_partial: anchor.date > start,
    }
}

/// Computes 7D / 30D / YTD changes and snapshot cadence as of `today`.
///
/// Points with malformed dates or non-finite values are ignored.
pub fn performance_highlights(points: &[PortfolioPoint], today: NaiveDate) -> PerformanceHighlights {
    let mut ordered: Vec<Point<'_>> = points
        .iter()
        .filter(|p| p.value.is_finite())
        .filter_map(|p| {
            parse_iso_date(&p.date).map(|date| Point {
                iso: p.date.as_str(),
                date,
                value: p.value,
            })
        })
        .collect();
    ordered.sort_by(|a, b| a.iso.cmp(b.iso));

    let Some(latest) = ordered.last() else {
        return PerformanceHighlights {
            periods: vec![
                PerformancePeriod::empty("7D"),
                PerformancePeriod::empty("30D"),
                PerformancePeriod::empty("YTD"),
            ],
            cadence: CadenceSummary {
                average_gap_days: None,
                days_since_last: None,
                last_snapshot_date: None,
            },
        };
    };

    let latest_date = latest.date;
    let start_of_year = NaiveDate::from_ymd_opt(latest_date.year(), 1, 1).unwrap_or(latest_date);

    let periods = vec![
        build_period("7D", latest_date - Duration::days(7), &ordered),
        build_period("30D", latest_date - Duration::days(30), &ordered),
        build_period("YTD", start_of_year, &ordered),
    ];

    let gaps: Vec<i64> = ordered
        .windows(2)
        .map(|pair| (pair[1].date - pair[0].date).num_days().max(0))
        .collect();
    let average_gap_days = (!gaps.is_empty()).then(|| {
        let mean = gaps.iter().sum::<i64>() as f64 / gaps.len() as f64;
        (mean * 10.0).round() / 10.0
    });
    let days_since_last =
        (ordered.len() > 1).then(|| (today - latest_date).num_days().max(0));

    PerformanceHighlights {
        periods,
        cadence: CadenceSummary {
            average_gap_days,
            days_since_last,
            last_snapshot_date: Some(latest.iso.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(date: &str, value: f64) -> PortfolioPoint {
        PortfolioPoint {
            date: date.to_string(),
            value,
        }
    }

    fn day(iso: &str) -> NaiveDate {
        parse_iso_date(iso).unwrap()
    }

    fn round1(value: f64) -> f64 {
        (value * 10.0).round() / 10.0
    }

    #[test]
    fn computes_period_deltas_and_cadence() {
        let points = vec![
            point("2025-02-08", 150.0),
            point("2025-01-01", 100.0),
            point("2025-01-31", 130.0),
            point("2025-01-08", 110.0),
            point("2025-02-01", 140.0),
        ];
        let highlights = performance_highlights(&points, day("2025-02-10"));

        let seven = highlights.period("7D").unwrap();
        assert_eq!(seven.delta, Some(10.0));
        assert_eq!(seven.delta_percent.map(round1), Some(7.1));
        assert_eq!(seven.start_date.as_deref(), Some("2025-02-01"));
        assert!(!seven.is_partial);

        let thirty = highlights.period("30D").unwrap();
        assert_eq!(thirty.delta, Some(40.0));
        assert_eq!(thirty.delta_percent.map(round1), Some(36.4));

        let ytd = highlights.period("YTD").unwrap();
        assert_eq!(ytd.delta, Some(50.0));
        assert_eq!(ytd.delta_percent, Some(50.0));

        assert_eq!(highlights.cadence.average_gap_days, Some(9.5));
        assert_eq!(highlights.cadence.days_since_last, Some(2));
        assert_eq!(highlights.cadence.last_snapshot_date.as_deref(), Some("2025-02-08"));
    }

    #[test]
    fn single_point_has_no_history() {
        let highlights = performance_highlights(&[point("2025-01-05", 100.0)], day("2025-01-10"));
        for period in &highlights.periods {
            assert_eq!(period.delta, None);
            assert!(period.is_partial);
        }
        assert_eq!(highlights.cadence.average_gap_days, None);
        assert_eq!(highlights.cadence.days_since_last, None);
    }

    #[test]
    fn empty_series_is_all_null() {
        let highlights = performance_highlights(&[], day("2025-01-10"));
        assert_eq!(highlights.periods.len(), 3);
        assert!(highlights.periods.iter().all(|p| p.start_date.is_none()));
        assert_eq!(highlights.cadence.last_snapshot_date, None);
    }

    #[test]
    fn ignores_invalid_dates_and_values() {
        let points = vec![
            point("not-a-date", 100.0),
            point("2025-01-05", 100.0),
            point("2025-01-06", 110.0),
            point("2025-01-07", f64::NAN),
        ];
        let highlights = performance_highlights(&points, day("2025-01-06"));
        assert_eq!(highlights.cadence.last_snapshot_date.as_deref(), Some("2025-01-06"));
    }

    #[test]
    fn partial_when_history_is_short() {
        let points = vec![point("2025-03-01", 50.0), point("2025-03-05", 60.0)];
        let highlights = performance_highlights(&points, day("2025-03-05"));
        let thirty = highlights.period("30D").unwrap();
        assert_eq!(thirty.delta, Some(10.0));
        assert!(thirty.is_partial);
        assert_eq!(thirty.start_date.as_deref(), Some("2025-03-01"));
    }

    #[test]
    fn zero_anchor_has_no_percent() {
        let points = vec![point("2025-01-01", 0.0), point("2025-01-09", 25.0)];
        let highlights = performance_highlights(&points, day("2025-01-09"));
        let seven = highlights.period("7D").unwrap();
        assert_eq!(seven.delta, Some(25.0));
        assert_eq!(seven.delta_percent, None);
    }

    #[test]
    fn clock_skew_never_goes_negative() {
        let points = vec![point("2025-01-01", 1.0), point("2025-01-09", 2.0)];
        let highlights = performance_highlights(&points, day("2024-12-31"));
        assert_eq!(highlights.cadence.days_since_last, Some(0));
    }
}
