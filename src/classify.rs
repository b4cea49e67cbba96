//! Tall/short classification of pattern heights.

use serde::{Deserialize, Serialize};

use crate::bars::BarRepository;
use crate::bear::BearMarketCalendar;
use crate::patterns::PatternType;
use crate::Direction;

/// Height category of a pattern relative to price
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeightClass {
    Tall,
    Short,
    #[default]
    Unknown,
}

impl std::fmt::Display for HeightClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeightClass::Tall => write!(f, "tall"),
            HeightClass::Short => write!(f, "short"),
            HeightClass::Unknown => write!(f, "unknown"),
        }
    }
}

/// Compares a pattern's height percentage against its type's thresholds.
///
/// Without a calendar, or with bear-market adjustment off, every pattern is
/// judged against the bull-market thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeightClassifier<'a> {
    calendar: Option<&'a BearMarketCalendar>,
    bear_adjusted: bool,
}

impl<'a> HeightClassifier<'a> {
    pub fn new(calendar: Option<&'a BearMarketCalendar>, bear_adjusted: bool) -> Self {
        Self {
            calendar,
            bear_adjusted,
        }
    }

    /// `100 * (top - bottom) / close`, `None` unless `close > 0`
    pub fn height_percent(top: f64, bottom: f64, close: f64) -> Option<f64> {
        (close > 0.0).then(|| 100.0 * (top - bottom) / close)
    }

    pub fn classify(
        &self,
        repo: &BarRepository,
        pattern_type: PatternType,
        top: f64,
        bottom: f64,
        direction: Option<Direction>,
        end_index: usize,
    ) -> HeightClass {
        let (Some(thresholds), Some(direction), Some(end)) =
            (pattern_type.height_thresholds(), direction, repo.get(end_index))
        else {
            return HeightClass::Unknown;
        };

        let bear_market = self.bear_adjusted
            && self
                .calendar
                .is_some_and(|calendar| calendar.is_bear_market(end.day()));

        let (Some(threshold), Some(percent)) = (
            thresholds.select(direction, bear_market),
            Self::height_percent(top, bottom, end.close),
        ) else {
            return HeightClass::Unknown;
        };

        if percent >= threshold {
            HeightClass::Tall
        } else {
            HeightClass::Short
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::Bar;
    use chrono::NaiveDate;

    fn repo_at(date: NaiveDate, close: f64) -> BarRepository {
        BarRepository::new(vec![Bar::daily(date, None, close + 1.0, close.max(0.01), close)], false, 2)
    }

    fn bull_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 6, 1).unwrap()
    }

    #[test]
    fn test_rectangle_bottom_boundary() {
        let calendar = BearMarketCalendar::defaults();
        let classifier = HeightClassifier::new(Some(&calendar), true);
        let repo = repo_at(bull_day(), 10.0);
        let classify = |top| {
            classifier.classify(&repo, PatternType::RectangleBottom, top, 10.0, Some(Direction::Up), 0)
        };

        assert_eq!(HeightClassifier::height_percent(12.0, 10.0, 10.0), Some(20.0));
        assert_eq!(classify(12.0), HeightClass::Tall);
        // Bull-market up threshold is 12.5%
        assert_eq!(classify(11.25), HeightClass::Tall);
        assert_eq!(classify(11.24), HeightClass::Short);
    }

    #[test]
    fn test_bear_market_thresholds() {
        let calendar = BearMarketCalendar::defaults();
        let bear_day = NaiveDate::from_ymd_opt(2008, 6, 2).unwrap();
        let repo = repo_at(bear_day, 10.0);

        // 13% is tall in a bull market but short against the 15% bear cell
        let adjusted = HeightClassifier::new(Some(&calendar), true);
        assert_eq!(
            adjusted.classify(&repo, PatternType::RectangleBottom, 11.3, 10.0, Some(Direction::Up), 0),
            HeightClass::Short
        );

        let unadjusted = HeightClassifier::new(Some(&calendar), false);
        assert_eq!(
            unadjusted.classify(&repo, PatternType::RectangleBottom, 11.3, 10.0, Some(Direction::Up), 0),
            HeightClass::Tall
        );
    }

    #[test]
    fn test_unknown_cases() {
        let classifier = HeightClassifier::default();
        let repo = repo_at(bull_day(), 10.0);

        // Unclassified type
        assert_eq!(
            classifier.classify(&repo, PatternType::Hammer, 12.0, 10.0, Some(Direction::Up), 0),
            HeightClass::Unknown
        );
        // No breakout direction
        assert_eq!(
            classifier.classify(&repo, PatternType::RectangleBottom, 12.0, 10.0, None, 0),
            HeightClass::Unknown
        );
        // Index past the series
        assert_eq!(
            classifier.classify(&repo, PatternType::RectangleBottom, 12.0, 10.0, Some(Direction::Up), 5),
            HeightClass::Unknown
        );
        // Non-positive close
        assert_eq!(HeightClassifier::height_percent(12.0, 10.0, 0.0), None);
    }

    #[test]
    fn test_triple_bottom_bear_down_is_unknown() {
        let calendar = BearMarketCalendar::defaults();
        let classifier = HeightClassifier::new(Some(&calendar), true);
        let repo = repo_at(NaiveDate::from_ymd_opt(2008, 6, 2).unwrap(), 10.0);
        assert_eq!(
            classifier.classify(&repo, PatternType::TripleBottom, 15.0, 10.0, Some(Direction::Down), 0),
            HeightClass::Unknown
        );
        assert_eq!(
            classifier.classify(&repo, PatternType::TripleBottom, 15.0, 10.0, Some(Direction::Up), 0),
            HeightClass::Tall
        );
    }
}
