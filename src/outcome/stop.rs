//! Volatility stop and trade status.

use crate::bars::{Bar, BarRepository};
use crate::config::StopMode;
use crate::Direction;

use super::TradeStatus;

/// Bars in the trailing volatility tally
pub const VOLATILITY_BARS: usize = 20;
/// Stop distance in average bar ranges
const STOP_RANGES: f64 = 2.0;

/// Bar whose extreme anchors the stop for a breakout at `breakout`
pub fn stop_anchor(breakout: usize, mode: StopMode) -> Option<usize> {
    match mode {
        StopMode::Strict => Some(breakout),
        StopMode::Lenient => breakout.checked_sub(1),
    }
}

/// Sum of `high - low` over the 20 bars ending at `anchor`
pub fn volatility_tally(bars: &[Bar], anchor: usize) -> Option<f64> {
    if anchor >= bars.len() || anchor + 1 < VOLATILITY_BARS {
        return None;
    }
    Some(
        bars[anchor + 1 - VOLATILITY_BARS..=anchor]
            .iter()
            .map(|b| b.high - b.low)
            .sum(),
    )
}

/// Stop below the anchor low (up moves) or above the anchor high (down
/// moves), twice the average range away. `None` with under 20 bars of history.
pub fn volatility_stop(bars: &[Bar], anchor: usize, direction: Direction) -> Option<f64> {
    let distance = volatility_tally(bars, anchor)? * STOP_RANGES / VOLATILITY_BARS as f64;
    let bar = &bars[anchor];
    Some(match direction {
        Direction::Up => bar.low - distance,
        Direction::Down => bar.high + distance,
    })
}

/// Walk forward from `from` to the end of the active range, reporting the
/// first bar that touches the target or the stop. The target is checked
/// first within a bar.
pub fn check_trade_status(
    repo: &BarRepository,
    from: usize,
    direction: Direction,
    target: Option<f64>,
    stop: Option<f64>,
) -> TradeStatus {
    let Some(stop) = stop else {
        return TradeStatus::StopUnavailable;
    };

    let bars = &repo.bars()[..repo.active_range().end];
    for (index, bar) in bars.iter().enumerate().skip(from) {
        let (hit_target, hit_stop) = match direction {
            Direction::Up => (target.is_some_and(|t| bar.high >= t), bar.low <= stop),
            Direction::Down => (target.is_some_and(|t| bar.low <= t), bar.high >= stop),
        };

        if hit_target {
            return TradeStatus::TargetReached {
                index,
                date: repo.format_date(bar.date),
            };
        }
        if hit_stop {
            return TradeStatus::StopTriggered {
                index,
                date: repo.format_date(bar.date),
            };
        }
    }
    TradeStatus::Open
}
