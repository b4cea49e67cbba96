//! Pattern outcome engine.
//!
//! Given a pattern's anchors the engine scans forward from the pattern's last
//! anchor for the first close beyond the pattern boundary, then derives the
//! price target, volatility stop, ultimate high/low and trade status. Each
//! pattern type supplies its boundary and target through the rule of its
//! [`Family`](crate::patterns::Family).
//!
//! When no breakout happens the outcome still carries a "last known" target
//! and stop projected from the final bar, with the breakout left empty.

mod rules;
pub mod stop;
pub mod ultimate;

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bars::BarRepository;
use crate::bear::{self, BearMarketCalendar};
use crate::classify::{HeightClass, HeightClassifier};
use crate::config::{OutcomeConfig, StopMode};
use crate::patterns::PatternInstance;
use crate::Direction;

use rules::{BreakoutRule, Geometry, Rule};

// ============================================================
// OUTCOME TYPES
// ============================================================

/// First bar that closed beyond the pattern boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakout {
    pub direction: Direction,
    pub index: usize,
    pub date: NaiveDateTime,
    /// Boundary level crossed at the breakout bar
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLevel {
    pub price: f64,
    /// Date of the bar the stop was anchored on
    pub date: NaiveDateTime,
    pub mode: StopMode,
}

/// Best price reached after breakout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UltimateExtreme {
    pub price: f64,
    pub date: NaiveDateTime,
    pub index: usize,
    pub is_high: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Neither target nor stop touched yet
    Open,
    TargetReached { index: usize, date: String },
    StopTriggered { index: usize, date: String },
    /// Fewer than 20 bars before the stop anchor
    StopUnavailable,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "Open"),
            TradeStatus::TargetReached { date, .. } => write!(f, "Target reached on {date}"),
            TradeStatus::StopTriggered { date, .. } => write!(f, "Stop triggered on {date}"),
            TradeStatus::StopUnavailable => write!(f, "Not enough data to calculate stop."),
        }
    }
}

/// Everything computed for one pattern instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// `None` while the pattern is unconfirmed
    pub breakout: Option<Breakout>,
    /// Direction target and stop were computed for
    pub projection: Option<Direction>,
    pub price_target: Option<f64>,
    pub stop: Option<StopLevel>,
    pub ultimate: Option<UltimateExtreme>,
    pub trade_status: TradeStatus,
    pub height_class: HeightClass,
    /// Highest high over the anchored span
    pub pattern_top: f64,
    /// Lowest low over the anchored span
    pub pattern_bottom: f64,
    /// Three-month average volume at the pattern's last anchor
    pub average_volume: Option<f64>,
}

impl Outcome {
    /// Outcome for anchors that do not fit the series
    fn unavailable() -> Self {
        Self {
            breakout: None,
            projection: None,
            price_target: None,
            stop: None,
            ultimate: None,
            trade_status: TradeStatus::StopUnavailable,
            height_class: HeightClass::Unknown,
            pattern_top: 0.0,
            pattern_bottom: 0.0,
            average_volume: None,
        }
    }

    pub fn breakout_direction(&self) -> Option<Direction> {
        self.breakout.as_ref().map(|b| b.direction)
    }

    pub fn breakout_date(&self) -> Option<NaiveDateTime> {
        self.breakout.as_ref().map(|b| b.date)
    }

    pub fn is_confirmed(&self) -> bool {
        self.breakout.is_some()
    }
}

// ============================================================
// ENGINE
// ============================================================

/// Computes [`Outcome`]s for pattern instances over one series.
///
/// The bear-market calendar used for height classification is, in order: the
/// one given to [`with_calendar`](Self::with_calendar), the process-wide
/// cached snapshot, or none (all patterns judged as bull market).
#[derive(Debug, Clone, Default)]
pub struct OutcomeEngine {
    config: OutcomeConfig,
    calendar: Option<Arc<BearMarketCalendar>>,
}

impl OutcomeEngine {
    pub fn new(config: OutcomeConfig) -> Self {
        Self {
            config,
            calendar: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn with_calendar(mut self, calendar: Arc<BearMarketCalendar>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn config(&self) -> &OutcomeConfig {
        &self.config
    }

    /// Outcome using the configured stop mode
    pub fn compute_outcome(&self, repo: &BarRepository, pattern: &PatternInstance) -> Outcome {
        self.compute_outcome_with(repo, pattern, self.config.stop_mode)
    }

    /// Compute and store the outcome on the pattern
    pub fn apply(&self, repo: &BarRepository, pattern: &mut PatternInstance) {
        pattern.outcome = Some(self.compute_outcome(repo, pattern));
    }

    /// Outcome with an explicit stop mode.
    ///
    /// Bars past the end of the repository's active range are treated as not
    /// yet traded: the scan, stop check and ultimate extreme all stop there.
    pub fn compute_outcome_with(
        &self,
        repo: &BarRepository,
        pattern: &PatternInstance,
        mode: StopMode,
    ) -> Outcome {
        let available = &repo.bars()[..repo.active_range().end];
        let Some(geo) = Geometry::new(available, pattern) else {
            warn!(
                event_type = "outcome_bad_anchors",
                pattern = %pattern.pattern_type,
                start = pattern.anchors.start,
                end = pattern.anchors.end,
                bars = available.len(),
                "Pattern anchors do not fit the series"
            );
            return Outcome::unavailable();
        };

        let rule = Rule::for_type(pattern.pattern_type);
        let last_anchor = pattern.anchors.last();
        let average_volume = repo.average_volume_3m(last_anchor);

        match find_breakout(&rule, &geo, repo, pattern) {
            Some(breakout) => {
                let direction = breakout.direction;
                let target = rule
                    .target(&geo, direction, breakout.index, breakout.price)
                    .map(|t| repo.round_price(t));
                let stop_level = self.stop_level(repo, stop::stop_anchor(breakout.index, mode), direction, mode);
                let trade_status = stop::check_trade_status(
                    repo,
                    breakout.index,
                    direction,
                    target,
                    stop_level.as_ref().map(|s| s.price),
                );

                let extreme = ultimate::ultimate_extreme(available, breakout.index, direction, geo.top, geo.bottom)
                    .map(|(index, price)| UltimateExtreme {
                        price,
                        date: available[index].date,
                        index,
                        is_high: direction.is_up(),
                    });

                let height_class = self.classifier_for(|classifier| {
                    classifier.classify(
                        repo,
                        pattern.pattern_type,
                        geo.top,
                        geo.bottom,
                        Some(direction),
                        last_anchor,
                    )
                });

                debug!(
                    event_type = "outcome_breakout",
                    pattern = %pattern.pattern_type,
                    direction = %direction,
                    index = breakout.index,
                    status = %trade_status,
                    "Pattern confirmed"
                );

                Outcome {
                    projection: Some(direction),
                    breakout: Some(breakout),
                    price_target: target,
                    stop: stop_level,
                    ultimate: extreme,
                    trade_status,
                    height_class,
                    pattern_top: geo.top,
                    pattern_bottom: geo.bottom,
                    average_volume,
                }
            },
            None => {
                let last = available.len() - 1;
                let close = available[last].close;
                let direction = pattern
                    .pattern_type
                    .bias()
                    .direction()
                    .unwrap_or(if close >= (geo.top + geo.bottom) / 2.0 {
                        Direction::Up
                    } else {
                        Direction::Down
                    });

                let target = rule
                    .target(&geo, direction, last, close)
                    .map(|t| repo.round_price(t));
                let stop_level = self.stop_level(repo, Some(last), direction, mode);
                let trade_status = if stop_level.is_some() {
                    TradeStatus::Open
                } else {
                    TradeStatus::StopUnavailable
                };

                Outcome {
                    breakout: None,
                    projection: Some(direction),
                    price_target: target,
                    stop: stop_level,
                    ultimate: None,
                    trade_status,
                    height_class: HeightClass::Unknown,
                    pattern_top: geo.top,
                    pattern_bottom: geo.bottom,
                    average_volume,
                }
            },
        }
    }

    fn stop_level(
        &self,
        repo: &BarRepository,
        anchor: Option<usize>,
        direction: Direction,
        mode: StopMode,
    ) -> Option<StopLevel> {
        let anchor = anchor?;
        let price = stop::volatility_stop(repo.bars(), anchor, direction)?;
        Some(StopLevel {
            price: repo.round_price(price),
            date: repo.bars()[anchor].date,
            mode,
        })
    }

    fn classifier_for<R>(&self, f: impl FnOnce(&HeightClassifier<'_>) -> R) -> R {
        let calendar = self.calendar.clone().or_else(bear::cached);
        let classifier = HeightClassifier::new(calendar.as_deref(), self.config.bear_market_heights);
        f(&classifier)
    }
}

/// First bar after the pattern, within the geometry's bars, that closes
/// beyond its boundary. Bars where the geometry cannot be evaluated are
/// skipped.
fn find_breakout(
    rule: &Rule,
    geo: &Geometry<'_>,
    repo: &BarRepository,
    pattern: &PatternInstance,
) -> Option<Breakout> {
    let mut skipped = 0usize;
    let mut found = None;

    for (index, bar) in geo.bars.iter().enumerate().skip(pattern.anchors.last() + 1) {
        let Some(boundaries) = rule.boundaries(geo, index) else {
            skipped += 1;
            continue;
        };
        if let Some((direction, price)) = boundaries.broken_by(bar.close) {
            found = Some(Breakout {
                direction,
                index,
                date: bar.date,
                price: repo.round_price(price),
            });
            break;
        }
    }

    if skipped > 0 {
        warn!(
            event_type = "outcome_degenerate_geometry",
            pattern = %pattern.pattern_type,
            skipped_bars = skipped,
            "Pattern boundary could not be evaluated on some bars"
        );
    }
    found
}

/// Compute outcomes for many patterns on the same series in parallel,
/// storing each on its instance
pub fn compute_outcomes_parallel(
    engine: &OutcomeEngine,
    repo: &BarRepository,
    patterns: &mut [PatternInstance],
) {
    patterns
        .par_iter_mut()
        .for_each(|pattern| engine.apply(repo, pattern));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::Bar;
    use crate::patterns::{Anchors, PatternType};
    use chrono::{Duration, NaiveDate};

    fn day0() -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 1, 4).unwrap()
    }

    /// `n` quiet bars (range 1.0 around 10.5)
    fn quiet(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar::daily(day0() + Duration::days(i as i64), Some(10.5), 11.0, 10.0, 10.5))
            .collect()
    }

    fn push(bars: &mut Vec<Bar>, high: f64, low: f64, close: f64) {
        let date = day0() + Duration::days(bars.len() as i64);
        bars.push(Bar::daily(date, Some(close), high, low, close));
    }

    fn rectangle(bars: &[Bar]) -> (BarRepository, PatternInstance) {
        let repo = BarRepository::new(bars.to_vec(), false, 2);
        // Box over bars 20..=24: top 11, bottom 10
        let pattern = PatternInstance::new(PatternType::RectangleBottom, Anchors::new(20, 24));
        (repo, pattern)
    }

    #[test]
    fn test_upward_breakout_reaches_target() {
        let mut bars = quiet(25);
        push(&mut bars, 11.6, 10.9, 11.5); // 25: breakout
        push(&mut bars, 12.2, 11.4, 12.1); // 26: target 12 reached
        let (repo, pattern) = rectangle(&bars);

        let outcome = OutcomeEngine::with_defaults().compute_outcome(&repo, &pattern);
        let breakout = outcome.breakout.as_ref().unwrap();
        assert_eq!(breakout.direction, Direction::Up);
        assert_eq!(breakout.index, 25);
        assert_eq!(breakout.price, 11.0);
        assert_eq!(outcome.price_target, Some(12.0));
        assert_eq!(outcome.trade_status.to_string(), "Target reached on 2016-01-30");
        assert_eq!((outcome.pattern_top, outcome.pattern_bottom), (11.0, 10.0));

        // Lenient stop anchors on bar 24: 10 - 2 * 1.0
        let stop = outcome.stop.unwrap();
        assert_eq!(stop.price, 8.0);
        assert_eq!(stop.mode, StopMode::Lenient);

        let ultimate = outcome.ultimate.unwrap();
        assert_eq!((ultimate.index, ultimate.price, ultimate.is_high), (26, 12.2, true));
    }

    #[test]
    fn test_strict_stop_uses_breakout_bar() {
        let mut bars = quiet(25);
        push(&mut bars, 11.6, 10.9, 11.5);
        let (repo, pattern) = rectangle(&bars);

        let outcome = OutcomeEngine::with_defaults().compute_outcome_with(&repo, &pattern, StopMode::Strict);
        let stop = outcome.stop.unwrap();
        // tally over bars 6..=25: 19 * 1.0 + 0.7
        assert_eq!(stop.price, 8.93);
        assert_eq!(stop.date, repo.bars()[25].date);
        assert_eq!(outcome.trade_status, TradeStatus::Open);
    }

    #[test]
    fn test_downward_breakout_stopped() {
        let mut bars = quiet(25);
        push(&mut bars, 10.2, 9.6, 9.7); // 25: breakout down
        push(&mut bars, 13.5, 9.5, 13.0); // 26: above stop 11 + 2
        let (repo, pattern) = rectangle(&bars);

        let outcome = OutcomeEngine::with_defaults().compute_outcome(&repo, &pattern);
        assert_eq!(outcome.breakout_direction(), Some(Direction::Down));
        assert_eq!(outcome.price_target, Some(9.0));
        assert_eq!(outcome.stop.as_ref().unwrap().price, 13.0);
        assert_eq!(outcome.trade_status.to_string(), "Stop triggered on 2016-01-30");
    }

    #[test]
    fn test_short_history_has_no_stop() {
        let mut bars = quiet(5);
        push(&mut bars, 11.6, 10.9, 11.5);
        let repo = BarRepository::new(bars, false, 2);
        let pattern = PatternInstance::new(PatternType::RectangleBottom, Anchors::new(0, 4));

        let outcome = OutcomeEngine::with_defaults().compute_outcome(&repo, &pattern);
        assert!(outcome.is_confirmed());
        assert!(outcome.stop.is_none());
        assert_eq!(outcome.trade_status.to_string(), "Not enough data to calculate stop.");
    }

    #[test]
    fn test_no_breakout_projects_from_last_bar() {
        let bars = quiet(30);
        let repo = BarRepository::new(bars, false, 2);
        let pattern = PatternInstance::new(PatternType::EngulfingBearish, Anchors::new(23, 24));

        let outcome = OutcomeEngine::with_defaults().compute_outcome(&repo, &pattern);
        assert!(outcome.breakout.is_none());
        assert_eq!(outcome.breakout_date(), None);
        assert_eq!(outcome.projection, Some(Direction::Down));
        // 4% below the final close of 10.5
        assert_eq!(outcome.price_target, Some(10.08));
        assert_eq!(outcome.stop.as_ref().unwrap().date, repo.bars()[29].date);
        assert_eq!(outcome.trade_status, TradeStatus::Open);
        assert_eq!(outcome.height_class, HeightClass::Unknown);
    }

    #[test]
    fn test_breakout_after_active_range_ignored() {
        let mut bars = quiet(25);
        push(&mut bars, 11.6, 10.9, 11.5); // 25: breakout, not yet traded
        let (repo, pattern) = rectangle(&bars);
        let repo = repo.with_active_range(0..25).unwrap();

        let outcome = OutcomeEngine::with_defaults().compute_outcome(&repo, &pattern);
        assert!(outcome.breakout.is_none());
        assert_eq!(outcome.stop.as_ref().unwrap().date, repo.bars()[24].date);
        assert_eq!(outcome.trade_status, TradeStatus::Open);
    }

    #[test]
    fn test_target_after_active_range_not_reached() {
        let mut bars = quiet(25);
        push(&mut bars, 11.6, 10.9, 11.5); // 25: breakout
        push(&mut bars, 12.2, 11.4, 12.1); // 26: target, not yet traded
        let (repo, pattern) = rectangle(&bars);
        let repo = repo.with_active_range(20..26).unwrap();

        let outcome = OutcomeEngine::with_defaults().compute_outcome(&repo, &pattern);
        assert_eq!(outcome.breakout.as_ref().unwrap().index, 25);
        assert_eq!(outcome.trade_status, TradeStatus::Open);
        assert_eq!(outcome.ultimate.unwrap().index, 25);
    }

    #[test]
    fn test_anchors_past_active_range_degrade() {
        let mut bars = quiet(25);
        push(&mut bars, 11.6, 10.9, 11.5);
        let (repo, pattern) = rectangle(&bars);
        let repo = repo.with_active_range(0..22).unwrap();

        let outcome = OutcomeEngine::with_defaults().compute_outcome(&repo, &pattern);
        assert!(outcome.projection.is_none());
        assert_eq!(outcome.trade_status, TradeStatus::StopUnavailable);
    }

    #[test]
    fn test_bad_anchors_degrade() {
        let repo = BarRepository::new(quiet(5), false, 2);
        let pattern = PatternInstance::new(PatternType::RectangleTop, Anchors::new(3, 9));
        let outcome = OutcomeEngine::with_defaults().compute_outcome(&repo, &pattern);
        assert!(outcome.breakout.is_none());
        assert!(outcome.price_target.is_none());
        assert_eq!(outcome.trade_status, TradeStatus::StopUnavailable);
    }

    #[test]
    fn test_height_class_with_calendar() {
        let mut bars = quiet(25);
        push(&mut bars, 11.6, 10.9, 11.5);
        let (repo, pattern) = rectangle(&bars);
        let engine = OutcomeEngine::with_defaults().with_calendar(Arc::new(BearMarketCalendar::defaults()));
        // height 1.0 on close 10.5 is 9.5%, under the 12.5% bull/up cell
        assert_eq!(engine.compute_outcome(&repo, &pattern).height_class, HeightClass::Short);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut bars = quiet(25);
        push(&mut bars, 11.6, 10.9, 11.5);
        push(&mut bars, 12.2, 11.4, 12.1);
        let repo = BarRepository::new(bars, false, 2);
        let engine = OutcomeEngine::with_defaults();

        let mut patterns: Vec<PatternInstance> = (18..=22)
            .map(|start| PatternInstance::new(PatternType::RectangleBottom, Anchors::new(start, 24)))
            .collect();
        compute_outcomes_parallel(&engine, &repo, &mut patterns);

        for pattern in &patterns {
            let expected = engine.compute_outcome(&repo, pattern);
            assert_eq!(pattern.outcome.as_ref(), Some(&expected));
        }
    }

    #[test]
    fn test_outcome_serde_roundtrip() {
        let mut bars = quiet(25);
        push(&mut bars, 11.6, 10.9, 11.5);
        let (repo, mut pattern) = rectangle(&bars);
        OutcomeEngine::with_defaults().apply(&repo, &mut pattern);

        let json = serde_json::to_string(&pattern).unwrap();
        let back: PatternInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pattern);
    }
}
