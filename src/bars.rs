//! Bars and the validated bar series they live in.

use std::ops::Range;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, OHLCV};

/// Spread (max high - min low) at or below which a series is treated as futures
pub const FUTURES_SPREAD: f64 = 0.25;
/// Spread at or below which a series is treated as near-futures
pub const NEAR_FUTURES_SPREAD: f64 = 2.5;

/// Calendar days covered by the 3-month average volume on daily series
pub const VOLUME_WINDOW_DAYS: i64 = 91;
/// Bars covered by the 3-month average volume on intraday series
pub const VOLUME_WINDOW_INTRADAY_BARS: usize = 65;

/// One price observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Date, with time of day on intraday series (midnight otherwise)
    pub date: NaiveDateTime,
    pub open: Option<f64>,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
    pub adj_close: Option<f64>,
}

impl Bar {
    pub fn new(date: NaiveDateTime, open: Option<f64>, high: f64, low: f64, close: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume: None,
            adj_close: None,
        }
    }

    /// Daily bar dated at midnight
    pub fn daily(day: NaiveDate, open: Option<f64>, high: f64, low: f64, close: f64) -> Self {
        Self::new(day.and_time(NaiveTime::MIN), open, high, low, close)
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_adj_close(mut self, adj_close: f64) -> Self {
        self.adj_close = Some(adj_close);
        self
    }

    #[inline]
    pub fn day(&self) -> NaiveDate {
        self.date.date()
    }
}

impl OHLCV for Bar {
    fn open(&self) -> Option<f64> {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> Option<f64> {
        self.volume
    }
}

/// Bucket size of the bars in a series. Intraday series are `Daily` with the
/// intraday flag set on the repository.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BarPeriod {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

/// Chronologically ordered, validated series for one instrument.
///
/// Built by the ingestion and aggregation pipeline; read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRepository {
    bars: Vec<Bar>,
    period: BarPeriod,
    intraday: bool,
    decimals: u32,
    active: Range<usize>,
    min_low: f64,
    max_high: f64,
}

impl BarRepository {
    pub fn new(bars: Vec<Bar>, intraday: bool, decimals: u32) -> Self {
        let (min_low, max_high) = if bars.is_empty() {
            (0.0, 0.0)
        } else {
            bars.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), b| {
                (lo.min(b.low), hi.max(b.high))
            })
        };
        let active = 0..bars.len();

        Self {
            bars,
            period: BarPeriod::Daily,
            intraday,
            decimals: decimals.min(15),
            active,
            min_low,
            max_high,
        }
    }

    pub(crate) fn with_period(mut self, period: BarPeriod) -> Self {
        self.period = period;
        self
    }

    /// Restrict the active index range (e.g. the bars currently charted).
    ///
    /// Bars past `range.end` count as not yet traded when outcomes are
    /// computed. The start is for callers only; scans still look back before
    /// it for volatility and volume windows.
    pub fn with_active_range(mut self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.bars.len() {
            return Err(Error::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                len: self.bars.len(),
            });
        }
        self.active = range;
        Ok(self)
    }

    #[inline]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn period(&self) -> BarPeriod {
        self.period
    }

    pub fn is_intraday(&self) -> bool {
        self.intraday
    }

    /// Decimal places all prices are rounded to
    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn active_range(&self) -> Range<usize> {
        self.active.clone()
    }

    pub fn min_low(&self) -> f64 {
        self.min_low
    }

    pub fn max_high(&self) -> f64 {
        self.max_high
    }

    /// Highest high minus lowest low across the whole series
    pub fn spread(&self) -> f64 {
        self.max_high - self.min_low
    }

    pub fn is_futures(&self) -> bool {
        !self.bars.is_empty() && self.spread() <= FUTURES_SPREAD
    }

    pub fn is_near_futures(&self) -> bool {
        !self.bars.is_empty() && self.spread() <= NEAR_FUTURES_SPREAD
    }

    /// Round a price to the series precision
    pub fn round_price(&self, price: f64) -> f64 {
        round_to(price, self.decimals)
    }

    /// chrono format used when dates are shown to users
    pub fn date_format(&self) -> &'static str {
        if self.intraday {
            "%Y-%m-%d %H:%M"
        } else {
            "%Y-%m-%d"
        }
    }

    pub fn format_date(&self, date: NaiveDateTime) -> String {
        date.format(self.date_format()).to_string()
    }

    /// Mean volume over roughly three months ending at `index` (91 calendar
    /// days, or 65 bars on intraday series). `None` without volume data.
    pub fn average_volume_3m(&self, index: usize) -> Option<f64> {
        let end = self.bars.get(index)?;
        let window = if self.intraday {
            let start = (index + 1).saturating_sub(VOLUME_WINDOW_INTRADAY_BARS);
            &self.bars[start..=index]
        } else {
            let cutoff = end.date - Duration::days(VOLUME_WINDOW_DAYS);
            let start = self.bars[..=index].partition_point(|b| b.date <= cutoff);
            &self.bars[start..=index]
        };

        let (sum, count) = window
            .iter()
            .filter_map(|b| b.volume)
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (count > 0).then(|| sum / count as f64)
    }
}

/// Round half away from zero to `decimals` places
pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(15) as i32);
    (value * factor).round() / factor
}
