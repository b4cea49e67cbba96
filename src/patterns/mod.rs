//! Pattern types and the instances an external detector hands over.
//!
//! # Families
//!
//! Every [`PatternType`] belongs to one [`Family`], which decides how its
//! breakout is confirmed and how its target is projected:
//!
//! - **Formation**: box over the anchors (rectangles, broadening patterns, cups)
//! - **Confirmation**: double/triple tops and bottoms, confirmed at the middle pivot
//! - **Neckline**: head-and-shoulders, head reflected about the neckline
//! - **Trendline**: triangles and wedges, two extrapolated lines
//! - **Channel**: sloped channels, projecting the channel height
//! - **MeasuredMove**: flags, pennants and measured moves, repeating the first leg
//! - **Fibonacci**: harmonic and ABCD patterns, 38.2% trigger and 61.8% target
//! - **FixedPercent**: events, gaps and candlesticks, fixed move from breakout

mod catalog;

pub use catalog::PatternType;

use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;
use crate::Direction;

/// Which breakout direction a pattern type expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bias {
    Up,
    Down,
    Either,
}

impl Bias {
    #[inline]
    pub fn allows(self, direction: Direction) -> bool {
        match self {
            Bias::Up => direction.is_up(),
            Bias::Down => direction.is_down(),
            Bias::Either => true,
        }
    }

    /// The single direction a biased pattern breaks toward
    pub fn direction(self) -> Option<Direction> {
        match self {
            Bias::Up => Some(Direction::Up),
            Bias::Down => Some(Direction::Down),
            Bias::Either => None,
        }
    }
}

/// Breakout and target strategy shared by a group of pattern types
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Family {
    Formation,
    Confirmation,
    Neckline,
    Trendline,
    Channel,
    MeasuredMove,
    Fibonacci,
    /// Target is this percentage of the breakout price
    FixedPercent(f64),
}

/// Empirical height percentages separating tall from short patterns.
///
/// `None` marks a cell with no usable threshold; patterns falling in it
/// classify as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightThresholds {
    pub bull_up: Option<f64>,
    pub bear_up: Option<f64>,
    pub bull_down: Option<f64>,
    pub bear_down: Option<f64>,
}

impl HeightThresholds {
    pub const fn new(bull_up: f64, bear_up: f64, bull_down: f64, bear_down: f64) -> Self {
        Self {
            bull_up: Some(bull_up),
            bear_up: Some(bear_up),
            bull_down: Some(bull_down),
            bear_down: Some(bear_down),
        }
    }

    pub fn select(&self, direction: Direction, bear_market: bool) -> Option<f64> {
        match (direction, bear_market) {
            (Direction::Up, false) => self.bull_up,
            (Direction::Up, true) => self.bear_up,
            (Direction::Down, false) => self.bull_down,
            (Direction::Down, true) => self.bear_down,
        }
    }
}

// ============================================================
// ANCHORS
// ============================================================

/// Bar indices marking a pattern's structure.
///
/// Geometries use different subsets: formations need `start`/`end`,
/// confirmations and head-and-shoulders add `mid`, trendline patterns put the
/// lower line on `start2`/`end2`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchors {
    pub start: usize,
    pub mid: Option<usize>,
    pub end: usize,
    pub start2: Option<usize>,
    pub mid2: Option<usize>,
    pub end2: Option<usize>,
}

impl Anchors {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            ..Self::default()
        }
    }

    pub fn with_mid(mut self, mid: usize) -> Self {
        self.mid = Some(mid);
        self
    }

    /// Second line or second pivot set
    pub fn with_second(mut self, start2: usize, end2: usize) -> Self {
        self.start2 = Some(start2);
        self.end2 = Some(end2);
        self
    }

    pub fn with_mid2(mut self, mid2: usize) -> Self {
        self.mid2 = Some(mid2);
        self
    }

    fn all(&self) -> impl Iterator<Item = usize> + '_ {
        [Some(self.start), self.mid, Some(self.end), self.start2, self.mid2, self.end2]
            .into_iter()
            .flatten()
    }

    /// Earliest anchor
    pub fn first(&self) -> usize {
        self.all().min().unwrap_or(self.start)
    }

    /// Latest anchor; the forward scan starts after it
    pub fn last(&self) -> usize {
        self.all().max().unwrap_or(self.end)
    }
}

// ============================================================
// INSTANCE
// ============================================================

/// One detected pattern and, once computed, its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInstance {
    pub pattern_type: PatternType,
    pub anchors: Anchors,
    /// Channel height supplied by the detector for channel patterns
    pub channel_height: Option<f64>,
    pub outcome: Option<Outcome>,
}

impl PatternInstance {
    pub fn new(pattern_type: PatternType, anchors: Anchors) -> Self {
        Self {
            pattern_type,
            anchors,
            channel_height: None,
            outcome: None,
        }
    }

    pub fn with_channel_height(mut self, height: f64) -> Self {
        self.channel_height = Some(height);
        self
    }
}
