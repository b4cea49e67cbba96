//! Breakout predicates and target formulas, one rule per pattern family.

use crate::bars::Bar;
use crate::patterns::{Anchors, Bias, Family, PatternInstance, PatternType};
use crate::Direction;

/// Fraction of the leg price must retrace to confirm a harmonic pattern
const FIB_TRIGGER: f64 = 0.382;
/// Fraction of the leg a harmonic pattern is expected to retrace
const FIB_TARGET: f64 = 0.618;

// ============================================================
// GEOMETRY
// ============================================================

/// Straight line through two anchor points, in bar-index units
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Line {
    x1: f64,
    y1: f64,
    slope: f64,
}

impl Line {
    /// `None` when both points share an index
    pub fn through(x1: usize, y1: f64, x2: usize, y2: f64) -> Option<Self> {
        if x1 == x2 {
            return None;
        }
        let slope = (y2 - y1) / (x2 as f64 - x1 as f64);
        Some(Self {
            x1: x1 as f64,
            y1,
            slope,
        })
    }

    #[inline]
    pub fn at(&self, x: usize) -> f64 {
        self.y1 + self.slope * (x as f64 - self.x1)
    }
}

/// A pattern's anchors resolved against the series
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry<'a> {
    pub bars: &'a [Bar],
    pub anchors: Anchors,
    pub bias: Bias,
    pub channel_height: Option<f64>,
    /// Highest high over the anchored span
    pub top: f64,
    /// Lowest low over the anchored span
    pub bottom: f64,
}

impl<'a> Geometry<'a> {
    /// `None` when the anchors do not fit the series
    pub fn new(bars: &'a [Bar], pattern: &PatternInstance) -> Option<Self> {
        let anchors = pattern.anchors;
        if anchors.start > anchors.end || anchors.last() >= bars.len() {
            return None;
        }

        let span = &bars[anchors.first()..=anchors.last()];
        let top = span.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let bottom = span.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);

        Some(Self {
            bars,
            anchors,
            bias: pattern.pattern_type.bias(),
            channel_height: pattern.channel_height,
            top,
            bottom,
        })
    }

    #[inline]
    fn bar(&self, index: usize) -> &Bar {
        &self.bars[index]
    }

    fn lowest_low(&self, from: usize, to: usize) -> usize {
        (from.min(to)..=from.max(to))
            .min_by(|&a, &b| self.bars[a].low.total_cmp(&self.bars[b].low))
            .unwrap_or(from)
    }

    fn highest_high(&self, from: usize, to: usize) -> usize {
        (from.min(to)..=from.max(to))
            .max_by(|&a, &b| self.bars[a].high.total_cmp(&self.bars[b].high))
            .unwrap_or(from)
    }

    /// Bias direction, or `up` / `down` by `prefer_up` for unbiased types
    fn leaning(&self, prefer_up: bool) -> Direction {
        self.bias.direction().unwrap_or(if prefer_up {
            Direction::Up
        } else {
            Direction::Down
        })
    }

    /// The boundary on the side `direction` points to
    fn one_sided(direction: Direction, level: f64) -> Boundaries {
        match direction {
            Direction::Up => Boundaries {
                upper: Some(level),
                lower: None,
            },
            Direction::Down => Boundaries {
                upper: None,
                lower: Some(level),
            },
        }
    }
}

/// Levels a close must cross at one bar
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Boundaries {
    pub upper: Option<f64>,
    pub lower: Option<f64>,
}

impl Boundaries {
    /// Direction and crossed level when `close` is beyond a boundary
    pub fn broken_by(&self, close: f64) -> Option<(Direction, f64)> {
        if let Some(upper) = self.upper.filter(|&u| close > u) {
            return Some((Direction::Up, upper));
        }
        self.lower
            .filter(|&l| close < l)
            .map(|lower| (Direction::Down, lower))
    }
}

// ============================================================
// RULES
// ============================================================

/// Breakout predicate and target formula for one family
pub(crate) trait BreakoutRule {
    /// Boundaries at bar `index`, `None` when the geometry cannot be evaluated there
    fn boundaries(&self, geo: &Geometry<'_>, index: usize) -> Option<Boundaries>;

    /// Target for a move in `direction` confirmed at `index` and `price`
    fn target(&self, geo: &Geometry<'_>, direction: Direction, index: usize, price: f64) -> Option<f64>;
}

/// Highest high / lowest low box over the anchors
#[derive(Debug, Clone, Copy)]
pub(crate) struct FormationRule;

impl BreakoutRule for FormationRule {
    fn boundaries(&self, geo: &Geometry<'_>, _index: usize) -> Option<Boundaries> {
        Some(Boundaries {
            upper: Some(geo.top),
            lower: Some(geo.bottom),
        })
    }

    fn target(&self, geo: &Geometry<'_>, direction: Direction, _index: usize, _price: f64) -> Option<f64> {
        let height = geo.top - geo.bottom;
        Some(match direction {
            Direction::Up => geo.top + height,
            Direction::Down => geo.bottom - height,
        })
    }
}

/// Double and triple tops/bottoms: the middle pivot confirms
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConfirmationRule;

impl ConfirmationRule {
    /// Breakout direction and confirmation level
    fn level(geo: &Geometry<'_>) -> Option<(Direction, f64)> {
        let mid = geo.bar(geo.anchors.mid?);
        let direction = geo.leaning(geo.top - mid.high < mid.low - geo.bottom);
        Some(match direction {
            Direction::Up => (Direction::Up, mid.high),
            Direction::Down => (Direction::Down, mid.low),
        })
    }
}

impl BreakoutRule for ConfirmationRule {
    fn boundaries(&self, geo: &Geometry<'_>, _index: usize) -> Option<Boundaries> {
        let (direction, level) = Self::level(geo)?;
        Some(Geometry::one_sided(direction, level))
    }

    fn target(&self, geo: &Geometry<'_>, direction: Direction, _index: usize, _price: f64) -> Option<f64> {
        let (_, level) = Self::level(geo)?;
        Some(match direction {
            Direction::Up => level + (level - geo.bottom),
            Direction::Down => level - (geo.top - level),
        })
    }
}

/// Head-and-shoulders: the head reflected about the neckline
#[derive(Debug, Clone, Copy)]
pub(crate) struct NecklineRule;

impl NecklineRule {
    /// Expected breakout direction, neckline and head index
    fn neckline(geo: &Geometry<'_>) -> Option<(Direction, Line, usize)> {
        let anchors = geo.anchors;
        let head = anchors.mid?;
        let head_bar = geo.bar(head);
        let direction = geo.leaning(head_bar.low <= geo.bottom);

        let (left, right) = match (anchors.start2, anchors.end2) {
            (Some(left), Some(right)) => (left, right),
            _ => match direction {
                // Inverted pattern: neckline joins the highs on either side of the head
                Direction::Up => (
                    geo.highest_high(anchors.start, head),
                    geo.highest_high(head, anchors.end),
                ),
                Direction::Down => (
                    geo.lowest_low(anchors.start, head),
                    geo.lowest_low(head, anchors.end),
                ),
            },
        };

        let price = |i: usize| match direction {
            Direction::Up => geo.bar(i).high,
            Direction::Down => geo.bar(i).low,
        };
        let line = Line::through(left, price(left), right, price(right))?;
        Some((direction, line, head))
    }
}

impl BreakoutRule for NecklineRule {
    fn boundaries(&self, geo: &Geometry<'_>, index: usize) -> Option<Boundaries> {
        let (direction, line, _) = Self::neckline(geo)?;
        Some(Geometry::one_sided(direction, line.at(index)))
    }

    fn target(&self, geo: &Geometry<'_>, direction: Direction, index: usize, _price: f64) -> Option<f64> {
        let (_, line, head) = Self::neckline(geo)?;
        let head_price = match direction {
            Direction::Up => geo.bar(head).low,
            Direction::Down => geo.bar(head).high,
        };
        let depth = line.at(head) - head_price;
        Some(line.at(index) + depth)
    }
}

/// Upper line through highs at `start`/`end`, lower line through lows at
/// `start2`/`end2` (or `start`/`end` when unset)
fn trendlines(geo: &Geometry<'_>) -> Option<(Line, Line)> {
    let a = geo.anchors;
    let upper = Line::through(a.start, geo.bar(a.start).high, a.end, geo.bar(a.end).high)?;
    let (s2, e2) = (a.start2.unwrap_or(a.start), a.end2.unwrap_or(a.end));
    let lower = Line::through(s2, geo.bar(s2).low, e2, geo.bar(e2).low)?;
    Some((upper, lower))
}

fn line_boundaries(geo: &Geometry<'_>, index: usize) -> Option<Boundaries> {
    let (upper, lower) = trendlines(geo)?;
    let (upper, lower) = (upper.at(index), lower.at(index));
    // Lines that crossed can no longer be broken meaningfully
    (upper > lower).then_some(Boundaries {
        upper: Some(upper),
        lower: Some(lower),
    })
}

/// Triangles and wedges
#[derive(Debug, Clone, Copy)]
pub(crate) struct TrendlineRule;

impl BreakoutRule for TrendlineRule {
    fn boundaries(&self, geo: &Geometry<'_>, index: usize) -> Option<Boundaries> {
        line_boundaries(geo, index)
    }

    fn target(&self, geo: &Geometry<'_>, direction: Direction, _index: usize, price: f64) -> Option<f64> {
        let (upper, lower) = trendlines(geo)?;
        let first = geo.anchors.first();
        let height = (upper.at(first) - lower.at(first)).abs();
        Some(price + direction.sign() * height)
    }
}

/// Sloped channels
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChannelRule;

impl BreakoutRule for ChannelRule {
    fn boundaries(&self, geo: &Geometry<'_>, index: usize) -> Option<Boundaries> {
        line_boundaries(geo, index)
    }

    fn target(&self, geo: &Geometry<'_>, direction: Direction, index: usize, price: f64) -> Option<f64> {
        let height = match geo.channel_height.filter(|h| *h > 0.0) {
            Some(height) => height,
            None => {
                let (upper, lower) = trendlines(geo)?;
                (upper.at(index) - lower.at(index)).abs()
            },
        };
        Some(price + direction.sign() * height)
    }
}

/// First leg `start -> mid`, corrective leg `mid -> end`
#[derive(Debug, Clone, Copy)]
pub(crate) struct MeasuredMoveRule;

impl MeasuredMoveRule {
    /// Direction, breakout level and first-leg length
    fn leg(geo: &Geometry<'_>) -> Option<(Direction, f64, f64)> {
        let (start, mid) = (geo.bar(geo.anchors.start), geo.bar(geo.anchors.mid?));
        let direction = geo.leaning(mid.close >= start.close);
        let (level, length) = match direction {
            Direction::Up => (mid.high, mid.high - start.low),
            Direction::Down => (mid.low, start.high - mid.low),
        };
        (length > 0.0).then_some((direction, level, length))
    }
}

impl BreakoutRule for MeasuredMoveRule {
    fn boundaries(&self, geo: &Geometry<'_>, _index: usize) -> Option<Boundaries> {
        let (direction, level, _) = Self::leg(geo)?;
        Some(Geometry::one_sided(direction, level))
    }

    fn target(&self, geo: &Geometry<'_>, direction: Direction, _index: usize, _price: f64) -> Option<f64> {
        let (_, _, length) = Self::leg(geo)?;
        let end = geo.bar(geo.anchors.end);
        Some(match direction {
            Direction::Up => end.low + length,
            Direction::Down => end.high - length,
        })
    }
}

/// Harmonic and ABCD patterns: leg from `start` to `end`
#[derive(Debug, Clone, Copy)]
pub(crate) struct FibonacciRule;

impl FibonacciRule {
    /// Direction of the expected retracement, the leg's far end and its length
    fn leg(geo: &Geometry<'_>) -> Option<(Direction, f64, f64)> {
        let (start, end) = (geo.bar(geo.anchors.start), geo.bar(geo.anchors.end));
        let direction = geo.leaning(end.close < start.close);
        let (from, length) = match direction {
            // Leg fell into `end`; price should retrace upward
            Direction::Up => (end.low, start.high - end.low),
            Direction::Down => (end.high, end.high - start.low),
        };
        (length > 0.0).then_some((direction, from, length))
    }
}

impl BreakoutRule for FibonacciRule {
    fn boundaries(&self, geo: &Geometry<'_>, _index: usize) -> Option<Boundaries> {
        let (direction, from, length) = Self::leg(geo)?;
        Some(Geometry::one_sided(direction, from + direction.sign() * FIB_TRIGGER * length))
    }

    fn target(&self, geo: &Geometry<'_>, direction: Direction, _index: usize, _price: f64) -> Option<f64> {
        let (_, from, length) = Self::leg(geo)?;
        Some(from + direction.sign() * FIB_TARGET * length)
    }
}

/// Events, gaps and candlesticks: beyond the `end` bar, fixed percentage move
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedPercentRule {
    percent: f64,
}

impl BreakoutRule for FixedPercentRule {
    fn boundaries(&self, geo: &Geometry<'_>, _index: usize) -> Option<Boundaries> {
        let end = geo.bar(geo.anchors.end);
        Some(Boundaries {
            upper: geo.bias.allows(Direction::Up).then_some(end.high),
            lower: geo.bias.allows(Direction::Down).then_some(end.low),
        })
    }

    fn target(&self, _geo: &Geometry<'_>, direction: Direction, _index: usize, price: f64) -> Option<f64> {
        Some(price * (1.0 + direction.sign() * self.percent / 100.0))
    }
}

/// Rule dispatch for one pattern type
#[derive(Debug, Clone, Copy)]
pub(crate) enum Rule {
    Formation(FormationRule),
    Confirmation(ConfirmationRule),
    Neckline(NecklineRule),
    Trendline(TrendlineRule),
    Channel(ChannelRule),
    MeasuredMove(MeasuredMoveRule),
    Fibonacci(FibonacciRule),
    FixedPercent(FixedPercentRule),
}

impl Rule {
    pub fn for_type(pattern_type: PatternType) -> Self {
        match pattern_type.family() {
            Family::Formation => Rule::Formation(FormationRule),
            Family::Confirmation => Rule::Confirmation(ConfirmationRule),
            Family::Neckline => Rule::Neckline(NecklineRule),
            Family::Trendline => Rule::Trendline(TrendlineRule),
            Family::Channel => Rule::Channel(ChannelRule),
            Family::MeasuredMove => Rule::MeasuredMove(MeasuredMoveRule),
            Family::Fibonacci => Rule::Fibonacci(FibonacciRule),
            Family::FixedPercent(percent) => Rule::FixedPercent(FixedPercentRule { percent }),
        }
    }
}

impl BreakoutRule for Rule {
    #[inline]
    fn boundaries(&self, geo: &Geometry<'_>, index: usize) -> Option<Boundaries> {
        match self {
            Rule::Formation(r) => r.boundaries(geo, index),
            Rule::Confirmation(r) => r.boundaries(geo, index),
            Rule::Neckline(r) => r.boundaries(geo, index),
            Rule::Trendline(r) => r.boundaries(geo, index),
            Rule::Channel(r) => r.boundaries(geo, index),
            Rule::MeasuredMove(r) => r.boundaries(geo, index),
            Rule::Fibonacci(r) => r.boundaries(geo, index),
            Rule::FixedPercent(r) => r.boundaries(geo, index),
        }
    }

    #[inline]
    fn target(&self, geo: &Geometry<'_>, direction: Direction, index: usize, price: f64) -> Option<f64> {
        match self {
            Rule::Formation(r) => r.target(geo, direction, index, price),
            Rule::Confirmation(r) => r.target(geo, direction, index, price),
            Rule::Neckline(r) => r.target(geo, direction, index, price),
            Rule::Trendline(r) => r.target(geo, direction, index, price),
            Rule::Channel(r) => r.target(geo, direction, index, price),
            Rule::MeasuredMove(r) => r.target(geo, direction, index, price),
            Rule::Fibonacci(r) => r.target(geo, direction, index, price),
            Rule::FixedPercent(r) => r.target(geo, direction, index, price),
        }
    }
}
