//! Rebinning daily or intraday series into weekly and monthly bars.

use chrono::{Datelike, NaiveTime, Weekday};
use tracing::{info, warn};

use crate::bars::{Bar, BarPeriod, BarRepository};

/// Days after a bucket's first bar at which a new week always starts
const WEEK_DAYS: i64 = 7;

/// Rebin `repo` into `period` buckets, returning a new repository.
///
/// Aggregating to the period the series already has, or to a finer one,
/// returns an unchanged copy.
pub fn aggregate(repo: &BarRepository, period: BarPeriod) -> BarRepository {
    if period <= repo.period() {
        if period < repo.period() {
            warn!(
                event_type = "aggregate_finer_period",
                from = ?repo.period(),
                to = ?period,
                "Cannot split bars into a finer period, series returned unchanged"
            );
        }
        return repo.clone();
    }

    let bars = repo.bars();
    let mut out: Vec<Bar> = Vec::new();
    let mut current: Option<Bar> = None;

    for (i, bar) in bars.iter().enumerate() {
        let starts_bucket = match (i, current.as_ref()) {
            (0, _) | (_, None) => true,
            (_, Some(bucket)) => starts_new_bucket(bucket, &bars[i - 1], bar, period),
        };

        match current.as_mut() {
            Some(acc) if !starts_bucket => merge(acc, bar),
            _ => {
                out.extend(current.take());
                current = Some(open_bucket(bar));
            },
        }
    }
    out.extend(current);

    info!(
        event_type = "aggregate_complete",
        period = ?period,
        input_bars = bars.len(),
        output_bars = out.len(),
        "Series aggregated"
    );

    // Buckets are dated at midnight of their first bar, so the result is never
    // intraday.
    BarRepository::new(out, false, repo.decimals()).with_period(period)
}

/// `bucket` is the open bucket, dated at its first bar
fn starts_new_bucket(bucket: &Bar, prev: &Bar, bar: &Bar, period: BarPeriod) -> bool {
    match period {
        BarPeriod::Daily => true,
        BarPeriod::Weekly => starts_new_week(bucket, prev, bar),
        BarPeriod::Monthly => {
            prev.date.year() != bar.date.year() || prev.date.month() != bar.date.month()
        },
    }
}

/// Monday, a weekday wrap (ignoring weekend bars), or a week or more since
/// the bucket's first bar
fn starts_new_week(bucket: &Bar, prev: &Bar, bar: &Bar) -> bool {
    if prev.day() == bar.day() {
        return false;
    }

    let weekday = bar.date.weekday();
    let wrapped = weekday.num_days_from_sunday() < prev.date.weekday().num_days_from_sunday()
        && !matches!(weekday, Weekday::Sat | Weekday::Sun);
    let full_week = (bar.day() - bucket.day()).num_days() >= WEEK_DAYS;

    weekday == Weekday::Mon || wrapped || full_week
}

fn open_bucket(bar: &Bar) -> Bar {
    Bar {
        date: bar.day().and_time(NaiveTime::MIN),
        ..*bar
    }
}

fn merge(acc: &mut Bar, bar: &Bar) {
    acc.high = acc.high.max(bar.high);
    acc.low = acc.low.min(bar.low);
    acc.close = bar.close;
    acc.volume = match (acc.volume, bar.volume) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    };
    if bar.adj_close.is_some() {
        acc.adj_close = bar.adj_close;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(y: i32, m: u32, d: u32, high: f64, low: f64, close: f64) -> Bar {
        Bar::daily(NaiveDate::from_ymd_opt(y, m, d).unwrap(), Some(close), high, low, close)
            .with_volume(100.0)
    }

    /// Mon 2024-01-01 .. Fri 2024-01-12, weekdays only
    fn two_weeks() -> BarRepository {
        let days = [1, 2, 3, 4, 5, 8, 9, 10, 11, 12];
        let bars = days
            .iter()
            .map(|&d| bar(2024, 1, d, 10.0 + d as f64, 5.0 + d as f64, 8.0 + d as f64))
            .collect();
        BarRepository::new(bars, false, 2)
    }

    #[test]
    fn test_daily_passthrough() {
        let repo = two_weeks();
        assert_eq!(aggregate(&repo, BarPeriod::Daily), repo);
    }

    #[test]
    fn test_weekly_buckets() {
        let weekly = aggregate(&two_weeks(), BarPeriod::Weekly);
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly.period(), BarPeriod::Weekly);

        let first = weekly.bars()[0];
        assert_eq!(first.day(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(first.open, Some(9.0));
        assert_eq!(first.high, 15.0);
        assert_eq!(first.low, 6.0);
        assert_eq!(first.close, 13.0);
        assert_eq!(first.volume, Some(500.0));
    }

    #[test]
    fn test_week_without_monday_splits_on_wrap() {
        // Tue-Fri then Tue-Wed of the following week (Monday holiday)
        let bars = [2, 3, 4, 5, 9, 10]
            .iter()
            .map(|&d| bar(2024, 1, d, 12.0, 10.0, 11.0))
            .collect();
        let weekly = aggregate(&BarRepository::new(bars, false, 2), BarPeriod::Weekly);
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly.bars()[1].day(), NaiveDate::from_ymd_opt(2024, 1, 9).unwrap());
    }

    #[test]
    fn test_long_gap_starts_new_week() {
        // Wednesday, then Thursday two weeks later: no wrap, no Monday
        let bars = vec![bar(2024, 1, 3, 12.0, 10.0, 11.0), bar(2024, 1, 18, 12.0, 10.0, 11.0)];
        let weekly = aggregate(&BarRepository::new(bars, false, 2), BarPeriod::Weekly);
        assert_eq!(weekly.len(), 2);
    }

    #[test]
    fn test_weekend_bars_stay_in_week() {
        // Fri, Sat, Sun: Saturday and Sunday do not wrap
        let bars = vec![
            bar(2024, 1, 5, 12.0, 10.0, 11.0),
            bar(2024, 1, 6, 12.0, 10.0, 11.0),
            bar(2024, 1, 7, 12.0, 10.0, 11.0),
        ];
        let weekly = aggregate(&BarRepository::new(bars, false, 2), BarPeriod::Weekly);
        assert_eq!(weekly.len(), 1);
    }

    #[test]
    fn test_intraday_bars_merge_within_day() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = (0..5)
            .map(|h| Bar::new(day.and_hms_opt(9 + h, 0, 0).unwrap(), None, 12.0 + h as f64, 10.0, 11.0))
            .collect();
        let weekly = aggregate(&BarRepository::new(bars, true, 2), BarPeriod::Weekly);
        assert_eq!(weekly.len(), 1);
        assert!(!weekly.is_intraday());
        assert_eq!(weekly.bars()[0].high, 16.0);
        assert_eq!(weekly.bars()[0].date.time(), NaiveTime::MIN);
    }

    #[test]
    fn test_monthly_buckets() {
        let bars = vec![
            bar(2024, 1, 30, 12.0, 10.0, 11.0),
            bar(2024, 1, 31, 14.0, 9.0, 13.0).with_adj_close(12.5),
            bar(2024, 2, 1, 15.0, 12.0, 14.0),
            bar(2025, 2, 3, 15.0, 12.0, 14.0),
        ];
        let monthly = aggregate(&BarRepository::new(bars, false, 2), BarPeriod::Monthly);
        assert_eq!(monthly.len(), 3);
        let jan = monthly.bars()[0];
        assert_eq!((jan.high, jan.low, jan.close), (14.0, 9.0, 13.0));
        assert_eq!(jan.adj_close, Some(12.5));
        assert_eq!(jan.volume, Some(200.0));
    }

    #[test]
    fn test_weekly_is_idempotent() {
        let weekly = aggregate(&two_weeks(), BarPeriod::Weekly);
        assert_eq!(aggregate(&weekly, BarPeriod::Weekly), weekly);

        // Same bars without the weekly tag still bucket one-to-one
        let untagged = BarRepository::new(weekly.bars().to_vec(), false, 2);
        assert_eq!(aggregate(&untagged, BarPeriod::Weekly).bars(), weekly.bars());
    }

    #[test]
    fn test_same_weekday_each_week_stays_apart() {
        // Ten Fridays from 2024-01-05
        let first = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let bars = (0..10)
            .map(|w| {
                Bar::daily(first + chrono::Duration::days(7 * w), Some(11.0), 12.0, 9.0, 11.0)
                    .with_volume(100.0)
            })
            .collect();
        let repo = BarRepository::new(bars, false, 2);
        let weekly = aggregate(&repo, BarPeriod::Weekly);
        assert_eq!(weekly.len(), 10);
        assert_eq!(weekly.bars(), repo.bars());
    }

    #[test]
    fn test_week_ends_seven_days_after_first_bar() {
        // Thu, Sun, then the following Thu: no Monday and no weekday wrap,
        // and only four days after the Sunday bar
        let bars = vec![
            bar(2024, 1, 4, 12.0, 10.0, 11.0),
            bar(2024, 1, 7, 12.0, 10.0, 11.0),
            bar(2024, 1, 11, 12.0, 10.0, 11.0),
        ];
        let weekly = aggregate(&BarRepository::new(bars, false, 2), BarPeriod::Weekly);
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly.bars()[0].volume, Some(200.0));
    }

    #[test]
    fn test_finer_period_returns_copy() {
        let monthly = aggregate(&two_weeks(), BarPeriod::Monthly);
        assert_eq!(monthly.len(), 1);
        assert_eq!(aggregate(&monthly, BarPeriod::Weekly), monthly);
    }

    #[test]
    fn test_input_untouched() {
        let repo = two_weeks();
        let before = repo.clone();
        let _ = aggregate(&repo, BarPeriod::Monthly);
        assert_eq!(repo, before);
    }
}
