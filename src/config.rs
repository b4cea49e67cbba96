//! Configuration consumed read-only by ingestion and the outcome engine.
//!
//! These mirror the settings an application persists for its users; the
//! crate never stores them itself.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default error count after which quick-exit mode stops ingestion
pub const QUICK_EXIT_ERRORS: usize = 25;
/// Default error count past which the caller is asked whether to continue
pub const DECISION_ERRORS: usize = 100;
/// Most fractional digits tracked for price precision
pub const MAX_DECIMALS: u32 = 15;

// ============================================================
// COLUMN MAP
// ============================================================

/// Field index of each logical column in a quote row. `None` marks a column
/// as unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub date: Option<usize>,
    pub time: Option<usize>,
    pub open: Option<usize>,
    pub high: Option<usize>,
    pub low: Option<usize>,
    pub close: Option<usize>,
    pub volume: Option<usize>,
    pub adj_close: Option<usize>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            date: Some(0),
            time: None,
            open: Some(1),
            high: Some(2),
            low: Some(3),
            close: Some(4),
            volume: Some(5),
            adj_close: None,
        }
    }
}

impl ColumnMap {
    /// Logical columns a row may carry
    pub const MAX_COLUMNS: usize = 8;

    /// Map with only the required columns assigned
    pub fn required(date: usize, high: usize, low: usize, close: usize) -> Self {
        Self {
            date: Some(date),
            time: None,
            open: None,
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: None,
            adj_close: None,
        }
    }

    fn entries(&self) -> [(&'static str, Option<usize>); 8] {
        [
            ("date", self.date),
            ("time", self.time),
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
            ("adjusted close", self.adj_close),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (name, index) in [("date", self.date), ("high", self.high), ("low", self.low), ("close", self.close)] {
            if index.is_none() {
                return Err(Error::InvalidConfig(format!("{name} column must be assigned")));
            }
        }

        let entries = self.entries();
        for (i, (name, index)) in entries.iter().enumerate() {
            let Some(index) = index else { continue };
            if *index >= Self::MAX_COLUMNS {
                return Err(Error::InvalidConfig(format!(
                    "{name} column {index} exceeds the {} supported columns",
                    Self::MAX_COLUMNS
                )));
            }
            if let Some((other, _)) = entries[i + 1..].iter().find(|(_, o)| *o == Some(*index)) {
                return Err(Error::InvalidConfig(format!(
                    "{name} and {other} both use column {index}"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================
// PRECISION
// ============================================================

/// Where the number of decimal places for prices comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecisionSource {
    /// Always the user's value
    User(u32),
    /// Most fractional digits seen in the file
    #[default]
    File,
    /// The smaller of the user's value and the file's
    MinOfBoth(u32),
}

impl PrecisionSource {
    /// Effective decimals given what the file showed
    pub fn resolve(self, inferred: u32) -> u32 {
        let decimals = match self {
            PrecisionSource::User(user) => user,
            PrecisionSource::File => inferred,
            PrecisionSource::MinOfBoth(user) => user.min(inferred),
        };
        decimals.min(MAX_DECIMALS)
    }
}

// ============================================================
// INGESTION
// ============================================================

/// Quote ingestion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub columns: ColumnMap,
    /// Date pattern using day/month/year letter codes, e.g. `yyyy-MM-dd` or
    /// `MM/dd/yyyy HH:mm`
    pub date_format: String,
    pub precision: PrecisionSource,
    /// Drop rows whose volume is zero instead of keeping them
    pub discard_zero_volume: bool,
    /// Stop after `quick_exit_threshold` errors
    pub quick_exit: bool,
    pub quick_exit_threshold: usize,
    /// Errors past which the caller gets a continue/abort checkpoint
    pub decision_threshold: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMap::default(),
            date_format: "yyyy-MM-dd".to_string(),
            precision: PrecisionSource::default(),
            discard_zero_volume: false,
            quick_exit: false,
            quick_exit_threshold: QUICK_EXIT_ERRORS,
            decision_threshold: DECISION_ERRORS,
        }
    }
}

impl IngestConfig {
    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    pub fn with_precision(mut self, precision: PrecisionSource) -> Self {
        self.precision = precision;
        self
    }

    pub fn discard_zero_volume(mut self, enable: bool) -> Self {
        self.discard_zero_volume = enable;
        self
    }

    pub fn quick_exit(mut self, enable: bool) -> Self {
        self.quick_exit = enable;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.columns.validate()?;
        if self.date_format.trim().is_empty() {
            return Err(Error::InvalidConfig("date format is empty".into()));
        }
        if self.quick_exit_threshold == 0 {
            return Err(Error::InvalidConfig("quick exit threshold must be > 0".into()));
        }
        Ok(())
    }
}

// ============================================================
// OUTCOME
// ============================================================

/// Which bar anchors the volatility stop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopMode {
    /// The breakout bar itself
    Strict,
    /// The bar before the breakout
    #[default]
    Lenient,
}

/// Outcome engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeConfig {
    /// Default stop anchor; callers may override per call
    pub stop_mode: StopMode,
    /// Use bear-market thresholds for patterns ending inside a bear market
    pub bear_market_heights: bool,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            stop_mode: StopMode::Lenient,
            bear_market_heights: true,
        }
    }
}
