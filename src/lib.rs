//! # chartoutcome - chart pattern outcomes over clean quote series
//!
//! Turns raw delimited quote files into a validated, ordered bar series and
//! computes the trading outcome of chart patterns found on that series by an
//! external detector: breakout, price target, volatility stop, ultimate
//! high/low and trade status.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartoutcome::prelude::*;
//!
//! let text = "2020-01-01,10,12,9,11,1000\n2020-01-02,11,13,10,12,1000\n";
//! let ingested = QuoteIngestor::with_defaults().ingest(text).unwrap();
//! assert_eq!(ingested.repository.len(), 2);
//!
//! // Anchors come from a pattern detector
//! let pattern = PatternInstance::new(PatternType::RectangleBottom, Anchors::new(0, 1));
//! let engine = OutcomeEngine::with_defaults();
//! let outcome = engine.compute_outcome(&ingested.repository, &pattern);
//! assert!(outcome.breakout.is_none());
//! ```

pub mod aggregate;
pub mod bars;
pub mod bear;
pub mod classify;
pub mod config;
pub mod ingest;
pub mod outcome;
pub mod patterns;

pub mod prelude {
    pub use crate::{
        // Aggregation
        aggregate::aggregate,
        // Series
        bars::{Bar, BarPeriod, BarRepository},
        // Bear markets
        bear::{BearMarketCalendar, BearMarketWindow, LoadedCalendar},
        // Height classification
        classify::{HeightClass, HeightClassifier},
        // Configuration
        config::{ColumnMap, IngestConfig, OutcomeConfig, PrecisionSource, StopMode},
        // Ingestion
        ingest::{Decision, DiagnosticLog, IngestReport, IngestSession, Ingested, Progress, QuoteIngestor},
        // Outcomes
        outcome::{
            compute_outcomes_parallel, Breakout, Outcome, OutcomeEngine, StopLevel, TradeStatus,
            UltimateExtreme,
        },
        // Patterns
        patterns::{Anchors, Bias, Family, HeightThresholds, PatternInstance, PatternType},
        // Core
        Direction,
        Error,
        Result,
        OHLCV,
        OHLCVExt,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an operation. Row-level problems never surface here;
/// they are repaired and recorded in the ingestion diagnostic log instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} appears to be zero length")]
    EmptyFile(String),

    #[error("Delimiter not found")]
    DelimiterNotFound,

    #[error("No usable bars in {0}")]
    NoBars(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unknown pattern type: {0}")]
    UnknownPattern(String),

    #[error("Index range {start}..{end} out of bounds for {len} bars")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },
}

// ============================================================
// DIRECTION
// ============================================================

/// Direction of a breakout or of a projected move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Direction::Up)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Direction::Down)
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// +1.0 for up, -1.0 for down
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core price data trait. Open and volume are optional columns in quote files.
pub trait OHLCV {
    fn open(&self) -> Option<f64>;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> Option<f64>;
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Midpoint of the high/low range
    #[inline]
    fn midpoint(&self) -> f64 {
        (self.high() + self.low()) / 2.0
    }

    /// `low <= {open, close} <= high` with every price positive
    fn is_consistent(&self) -> bool {
        let (high, low, close) = (self.high(), self.low(), self.close());
        let open_ok = self.open().map_or(true, |o| o >= low && o <= high && o > 0.0);
        low > 0.0 && low <= high && close >= low && close <= high && open_ok
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// TESTS
// ============================================================
