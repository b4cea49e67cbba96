//! Property-based tests for series invariants
//!
//! Invariants checked:
//! 1. Ingestion Ordering: dates strictly ascend after ingestion, whatever the row order
//! 2. Bar Consistency: every ingested bar has low <= {open, close} <= high, all positive
//! 3. Aggregation: weekly buckets keep the extremes and total volume, and a
//!    series with one bar per week rebuckets one-to-one whatever its period tag
//! 4. Calendar Persistence: a bear-market table survives a text round-trip

use chartoutcome::prelude::*;
use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

fn base_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap()
}

/// One raw row: day offset and four prices in cents, zeros allowed
fn raw_row() -> impl Strategy<Value = (i64, [u32; 4])> {
    (0i64..400, prop::array::uniform4(0u32..5_000))
}

fn quote_text(rows: &[(i64, [u32; 4])]) -> String {
    rows.iter()
        .map(|(offset, [o, h, l, c])| {
            let date = base_day() + Duration::days(*offset);
            let cents = |v: u32| format!("{:.2}", v as f64 / 100.0);
            format!("{date},{},{},{},{},100\n", cents(*o), cents(*h), cents(*l), cents(*c))
        })
        .collect()
}

/// Monday 2010-01-04
fn base_monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 4).unwrap()
}

/// One bar per chosen week, each on an arbitrary weekday (Mon..=Fri).
/// Missing weeks stand in for holiday gaps.
fn one_bar_per_week(weeks: &[(i64, i64)]) -> BarRepository {
    let bars = weeks
        .iter()
        .map(|&(week, weekday)| {
            let day = base_monday() + Duration::days(week * 7 + weekday);
            let close = 20.0 + (week % 5) as f64;
            Bar::daily(day, Some(close), close + 2.0, close - 2.0, close).with_volume(week as f64)
        })
        .collect();
    BarRepository::new(bars, false, 2)
}

fn daily_series(offsets: &std::collections::BTreeSet<i64>) -> BarRepository {
    let bars = offsets
        .iter()
        .map(|&offset| {
            let day = base_day() + Duration::days(offset);
            let close = 10.0 + (offset % 7) as f64;
            Bar::daily(day, Some(close), close + 1.0, close - 1.0, close).with_volume(offset as f64)
        })
        .collect();
    BarRepository::new(bars, false, 2)
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    /// Proves: ingestion yields an ascending, consistent series from any rows
    #[test]
    fn ingested_series_is_ordered_and_consistent(
        rows in prop::collection::vec(raw_row(), 2..60),
    ) {
        let text = quote_text(&rows);
        // Rows whose only content was junk may leave nothing usable
        if let Ok(ingested) = QuoteIngestor::with_defaults().ingest(&text) {
            let bars = ingested.repository.bars();
            prop_assert!(!bars.is_empty());
            for pair in bars.windows(2) {
                prop_assert!(pair[0].date < pair[1].date);
            }
            for bar in bars {
                prop_assert!(bar.is_consistent(), "inconsistent bar {:?}", bar);
            }
            prop_assert!(ingested.repository.spread() >= 0.0);
        }
    }

    /// Proves: weekly aggregation keeps extremes and volume
    #[test]
    fn weekly_aggregation_invariants(
        offsets in prop::collection::btree_set(0i64..365, 1..120),
    ) {
        let daily = daily_series(&offsets);
        let weekly = aggregate(&daily, BarPeriod::Weekly);

        prop_assert!(weekly.len() <= daily.len());
        prop_assert_eq!(weekly.max_high(), daily.max_high());
        prop_assert_eq!(weekly.min_low(), daily.min_low());

        let volume = |repo: &BarRepository| repo.bars().iter().filter_map(|b| b.volume).sum::<f64>();
        prop_assert_eq!(volume(&weekly), volume(&daily));

        for pair in weekly.bars().windows(2) {
            prop_assert!(pair[0].date < pair[1].date);
        }
    }

    /// Proves: a Daily-tagged series with one bar per week keeps every bar
    /// when aggregated weekly, so reaggregating weekly output changes nothing
    #[test]
    fn weekly_series_survives_reaggregation(
        weeks in prop::collection::btree_map(0i64..150, 0i64..5, 1..60),
    ) {
        let weeks: Vec<(i64, i64)> = weeks.into_iter().collect();
        let daily = one_bar_per_week(&weeks);
        prop_assert_eq!(daily.period(), BarPeriod::Daily);

        let weekly = aggregate(&daily, BarPeriod::Weekly);
        prop_assert_eq!(weekly.len(), daily.len());
        prop_assert_eq!(weekly.bars(), daily.bars());

        let retagged = BarRepository::new(weekly.bars().to_vec(), false, 2);
        let reaggregated = aggregate(&retagged, BarPeriod::Weekly);
        prop_assert_eq!(reaggregated.bars(), weekly.bars());
    }

    /// Proves: the persisted calendar text parses back to the same windows
    #[test]
    fn bear_calendar_text_roundtrip(
        windows in prop::collection::vec((0i64..20_000, 0i64..800, "[A-Z][a-z0-9]{0,10}"), 0..8),
    ) {
        let calendar = BearMarketCalendar::new(
            windows
                .iter()
                .map(|(start, length, label)| {
                    let start = base_day() + Duration::days(*start);
                    BearMarketWindow::new(start, start + Duration::days(*length), label.clone())
                })
                .collect(),
        );

        let text = calendar.to_text().unwrap();
        let loaded = BearMarketCalendar::parse(&text);
        prop_assert_eq!(loaded.diagnostics, None);
        prop_assert_eq!(loaded.calendar, calendar);
    }
}
