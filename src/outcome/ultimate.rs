//! Ultimate high/low: the best price reached before the move reverses.

use crate::bars::Bar;
use crate::Direction;

/// An up move ends when a low falls below this fraction of the running high
pub const UP_REVERSAL: f64 = 0.8;
/// A down move ends when a high rises above this multiple of the running low
pub const DOWN_REVERSAL: f64 = 1.2;

/// Index and price of the running extreme when the move ended.
///
/// The scan starts with the breakout bar's high (up) or low (down) and stops
/// at the first bar that reverses 20% from the extreme or closes beyond the
/// opposite side of the pattern (`bottom` for up moves, `top` for down moves).
pub fn ultimate_extreme(
    bars: &[Bar],
    breakout: usize,
    direction: Direction,
    top: f64,
    bottom: f64,
) -> Option<(usize, f64)> {
    let first = bars.get(breakout)?;
    let mut best = match direction {
        Direction::Up => (breakout, first.high),
        Direction::Down => (breakout, first.low),
    };

    for (index, bar) in bars.iter().enumerate().skip(breakout + 1) {
        match direction {
            Direction::Up => {
                if bar.low < best.1 * UP_REVERSAL || bar.close < bottom {
                    break;
                }
                if bar.high > best.1 {
                    best = (index, bar.high);
                }
            },
            Direction::Down => {
                if bar.high > best.1 * DOWN_REVERSAL || bar.close > top {
                    break;
                }
                if bar.low < best.1 {
                    best = (index, bar.low);
                }
            },
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bars(hlc: &[(f64, f64, f64)]) -> Vec<Bar> {
        let day0 = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
        hlc.iter()
            .enumerate()
            .map(|(i, &(h, l, c))| Bar::daily(day0 + Duration::days(i as i64), None, h, l, c))
            .collect()
    }

    #[test]
    fn test_up_move_ends_on_reversal() {
        let data = bars(&[
            (10.0, 9.0, 9.5),
            (12.0, 11.0, 11.5),
            (15.0, 13.0, 14.0),
            (14.0, 11.9, 12.0), // 11.9 < 0.8 * 15
            (20.0, 18.0, 19.0),
        ]);
        assert_eq!(ultimate_extreme(&data, 1, Direction::Up, 10.0, 9.0), Some((2, 15.0)));
    }

    #[test]
    fn test_up_move_ends_below_pattern_bottom() {
        let data = bars(&[(10.0, 9.0, 9.5), (12.0, 11.0, 11.5), (13.0, 10.0, 10.5), (16.0, 15.0, 15.5)]);
        assert_eq!(ultimate_extreme(&data, 1, Direction::Up, 12.0, 10.8), Some((1, 12.0)));
    }

    #[test]
    fn test_down_move_tracks_lowest_low() {
        let data = bars(&[
            (10.0, 9.0, 9.5),
            (9.0, 8.0, 8.5),
            (8.0, 7.0, 7.5),
            (8.3, 7.5, 8.0),
            (9.0, 8.0, 8.5), // 9.0 > 1.2 * 7
        ]);
        assert_eq!(ultimate_extreme(&data, 1, Direction::Down, 11.0, 9.0), Some((2, 7.0)));
    }

    #[test]
    fn test_runs_to_end_of_series() {
        let data = bars(&[(10.0, 9.0, 9.5), (11.0, 10.0, 10.5), (12.0, 11.0, 11.5)]);
        assert_eq!(ultimate_extreme(&data, 1, Direction::Up, 10.0, 9.0), Some((2, 12.0)));
        assert_eq!(ultimate_extreme(&data, 5, Direction::Up, 10.0, 9.0), None);
    }
}
