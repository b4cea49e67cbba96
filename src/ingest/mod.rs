//! Quote ingestion: raw delimited text to a validated [`BarRepository`].
//!
//! Malformed rows never abort ingestion. Unreadable dates drop the row, bad
//! prices are repaired in place, and every problem is counted and appended
//! to a [`DiagnosticLog`]. Only an unreadable or empty file, or a file with no
//! recognizable delimiter, is fatal.
//!
//! Ingestion runs as an [`IngestSession`] so that callers can be asked
//! whether to carry on once errors pile up, without the crate blocking:
//!
//! ```rust
//! use chartoutcome::ingest::{Progress, QuoteIngestor};
//!
//! let ingestor = QuoteIngestor::with_defaults();
//! let mut session = ingestor.start("2020-01-01,10,12,9,11,1000\n").unwrap();
//! while let Progress::Checkpoint { errors, .. } = session.advance() {
//!     // ask the user; here we always continue
//!     let _ = errors;
//! }
//! let ingested = session.finish().unwrap();
//! assert_eq!(ingested.repository.len(), 1);
//! ```

pub mod format;
pub mod repair;

use std::path::Path;

use chrono::{Datelike, NaiveDateTime, NaiveTime};
use tracing::{debug, info, warn};

pub use format::{infer_delimiter, parse_number, DateFormat, DateParser, Delimiter};
pub use repair::{Prices, Repair, RepairKind};

use crate::bars::{round_to, Bar, BarRepository};
use crate::config::IngestConfig;
use crate::{Error, Result};

/// Dates before this year on the trailing row mark it as junk
const MIN_PLAUSIBLE_YEAR: i32 = 1900;

// ============================================================
// DIAGNOSTICS
// ============================================================

/// Append-only, human-readable record of everything ingestion fixed or skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticLog {
    text: String,
    lines: usize,
}

impl DiagnosticLog {
    pub fn push(&mut self, line: impl AsRef<str>) {
        self.text.push_str(line.as_ref());
        self.text.push('\n');
        self.lines += 1;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl std::fmt::Display for DiagnosticLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Summary of one ingestion run
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub log: DiagnosticLog,
    /// Rows repaired, rejected or reordered
    pub errors: usize,
    /// Rows dropped by policy (zero volume, junk trailing row)
    pub discarded: usize,
    /// Data rows seen, header excluded
    pub rows_read: usize,
    /// Stopped early by quick exit or by the caller
    pub aborted: bool,
    pub delimiter: Delimiter,
    /// Date pattern after intraday detection added or removed the time part
    pub date_format: String,
}

/// A successfully built series and how it was built
#[derive(Debug, Clone)]
pub struct Ingested {
    pub repository: BarRepository,
    pub report: IngestReport,
}

// ============================================================
// SESSION
// ============================================================

/// Caller's answer at the error checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Abort,
}

/// Where [`IngestSession::advance`] stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Errors just passed the decision threshold. Call `advance` again to
    /// continue or `abort` to stop with what has been read.
    Checkpoint { errors: usize, line: usize },
    /// All rows processed, or ingestion stopped
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Aborted,
}

/// One row split into fields, with its physical line number
#[derive(Debug, Clone)]
struct Record {
    line: usize,
    fields: Vec<String>,
}

/// In-progress ingestion of one text
#[derive(Debug)]
pub struct IngestSession<'a> {
    config: &'a IngestConfig,
    records: Vec<Record>,
    cursor: usize,
    delimiter: Delimiter,
    dates: DateParser,
    decimal_comma: bool,
    bars: Vec<Bar>,
    log: DiagnosticLog,
    errors: usize,
    discarded: usize,
    max_decimals: u32,
    last_date: Option<NaiveDateTime>,
    checkpoint_offered: bool,
    state: State,
}

impl<'a> IngestSession<'a> {
    fn new(config: &'a IngestConfig, text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(Error::EmptyFile("Quote data".into()));
        }

        let has_header = text.to_ascii_uppercase().contains("DATE");
        let (body, first_line) = if has_header {
            (text.split_once('\n').map_or("", |(_, rest)| rest), 2)
        } else {
            (text, 1)
        };

        let sample = body
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::NoBars("quote data (header only)".into()))?;
        let delimiter = infer_delimiter(sample)?;

        let mut session = Self {
            config,
            records: Vec::new(),
            cursor: 0,
            delimiter,
            dates: DateParser::new(DateFormat::new(&config.date_format)),
            decimal_comma: delimiter == Delimiter::Semicolon,
            bars: Vec::new(),
            log: DiagnosticLog::default(),
            errors: 0,
            discarded: 0,
            max_decimals: 0,
            last_date: None,
            checkpoint_offered: false,
            state: State::Running,
        };
        session.split_records(body, first_line);

        debug!(
            event_type = "ingest_start",
            delimiter = ?delimiter,
            header = has_header,
            rows = session.records.len(),
            "Quote text split into rows"
        );
        Ok(session)
    }

    fn split_records(&mut self, body: &str, first_line: usize) {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .delimiter(self.delimiter.as_byte())
            .from_reader(body.as_bytes());

        let space = self.delimiter == Delimiter::Space;
        for result in reader.records() {
            match result {
                Ok(record) => {
                    let line = record
                        .position()
                        .map_or(0, |p| p.line() as usize + first_line - 1);
                    let fields: Vec<String> = record
                        .iter()
                        .filter(|f| !(space && f.is_empty()))
                        .map(str::to_owned)
                        .collect();
                    if fields.iter().all(|f| f.is_empty()) {
                        continue;
                    }
                    self.records.push(Record { line, fields });
                },
                Err(e) => {
                    let line = e.position().map_or(0, |p| p.line() as usize + first_line - 1);
                    self.record_error(line, format!("unreadable row ({e})"));
                },
            }
        }
    }

    /// Errors counted so far
    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Diagnostics so far
    pub fn log(&self) -> &DiagnosticLog {
        &self.log
    }

    /// Process rows until the error checkpoint or the end of the data
    pub fn advance(&mut self) -> Progress {
        while self.state == State::Running && self.cursor < self.records.len() {
            let index = self.cursor;
            self.cursor += 1;
            let line = self.records[index].line;
            self.process_record(index);

            if self.config.quick_exit && self.errors >= self.config.quick_exit_threshold {
                warn!(
                    event_type = "ingest_quick_exit",
                    errors = self.errors,
                    line = line,
                    "Too many errors, stopping early"
                );
                self.log.push(format!(
                    "Stopped at line {line} after {} errors (quick exit).",
                    self.errors
                ));
                self.state = State::Aborted;
                break;
            }

            if !self.checkpoint_offered && self.errors > self.config.decision_threshold {
                self.checkpoint_offered = true;
                return Progress::Checkpoint {
                    errors: self.errors,
                    line,
                };
            }
        }
        Progress::Done
    }

    /// Stop reading; rows processed so far are kept
    pub fn abort(&mut self) {
        if self.state == State::Running {
            self.log.push(format!(
                "Stopped by request after {} errors; {} rows were not read.",
                self.errors,
                self.records.len() - self.cursor
            ));
            self.state = State::Aborted;
        }
    }

    /// Build the repository from everything read. Rows not yet processed are
    /// processed first unless the session was aborted.
    pub fn finish(mut self) -> Result<Ingested> {
        while let Progress::Checkpoint { .. } = self.advance() {}

        let mut bars = std::mem::take(&mut self.bars);
        if bars.is_empty() {
            return Err(Error::NoBars(format!(
                "quote data ({} errors)",
                self.errors
            )));
        }

        let intraday = detect_intraday(&bars);
        let date_format = if intraday {
            self.dates.format().with_time()
        } else {
            for bar in &mut bars {
                bar.date = bar.date.date().and_time(NaiveTime::MIN);
            }
            self.dates.format().without_time()
        };

        self.order(&mut bars);

        let decimals = self.config.precision.resolve(self.max_decimals);
        for bar in &mut bars {
            round_bar(bar, decimals);
        }

        let repository = BarRepository::new(bars, intraday, decimals);
        info!(
            event_type = "ingest_complete",
            bars = repository.len(),
            errors = self.errors,
            discarded = self.discarded,
            intraday = intraday,
            decimals = decimals,
            futures = repository.is_futures(),
            "Quote ingestion finished"
        );

        Ok(Ingested {
            repository,
            report: IngestReport {
                log: self.log,
                errors: self.errors,
                discarded: self.discarded,
                rows_read: self.records.len(),
                aborted: self.state == State::Aborted,
                delimiter: self.delimiter,
                date_format: date_format.pattern().to_string(),
            },
        })
    }

    fn record_error(&mut self, line: usize, message: impl AsRef<str>) {
        self.errors += 1;
        self.log.push(format!("Line {line}: {}", message.as_ref()));
    }

    /// Parse one numeric column. Unreadable text is returned in `unreadable`
    /// rather than counted, since the row may still be discarded.
    fn read_number(
        &mut self,
        record: &Record,
        column: Option<usize>,
        name: &'static str,
        unreadable: &mut Vec<(&'static str, String)>,
    ) -> Option<f64> {
        let index = column?;
        let field = record.fields.get(index).map(String::as_str).unwrap_or("");
        match parse_number(field, self.decimal_comma) {
            Some((value, decimals)) => {
                self.max_decimals = self.max_decimals.max(decimals);
                Some(value)
            },
            None => {
                unreadable.push((name, field.to_string()));
                None
            },
        }
    }

    fn process_record(&mut self, index: usize) {
        let record = std::mem::replace(
            &mut self.records[index],
            Record {
                line: 0,
                fields: Vec::new(),
            },
        );
        self.process_fields(index, &record);
        self.records[index] = record;
    }

    fn process_fields(&mut self, index: usize, record: &Record) {
        let columns = self.config.columns;
        let line = record.line;
        let field = |column: Option<usize>| column.and_then(|i| record.fields.get(i)).map(String::as_str);

        let date_text = field(columns.date).unwrap_or("");
        let Some(date) = self.dates.parse(date_text, field(columns.time)) else {
            let previous = self
                .last_date
                .map_or_else(|| "none".to_string(), |d| d.to_string());
            self.record_error(
                line,
                format!("cannot read date '{date_text}' (last good date {previous}), row skipped"),
            );
            return;
        };

        let mut unreadable = Vec::new();
        let open = self.read_number(record, columns.open, "open", &mut unreadable);
        let high = self.read_number(record, columns.high, "high", &mut unreadable).unwrap_or(0.0);
        let low = self.read_number(record, columns.low, "low", &mut unreadable).unwrap_or(0.0);
        let close = self.read_number(record, columns.close, "close", &mut unreadable).unwrap_or(0.0);
        let volume = self.read_number(record, columns.volume, "volume", &mut unreadable);
        let adj_close =
            self.read_number(record, columns.adj_close, "adjusted close", &mut unreadable);

        if index + 1 == self.records.len()
            && (date.year() < MIN_PLAUSIBLE_YEAR || (close == 0.0 && high == 0.0))
        {
            self.discarded += 1;
            self.log.push(format!("Line {line}: trailing row dropped ({date})."));
            return;
        }

        if self.config.discard_zero_volume && volume == Some(0.0) {
            self.discarded += 1;
            self.log.push(format!("Line {line}: zero volume, row dropped."));
            return;
        }

        for (name, text) in &unreadable {
            self.record_error(line, format!("cannot read {name} '{text}'"));
        }

        let mut prices = Prices {
            open,
            high,
            low,
            close,
        };
        for fix in repair::repair(&mut prices) {
            debug!(
                event_type = "bar_repair",
                line = line,
                kind = ?fix.kind,
                "{fix}"
            );
            let message = format!("{}: {fix}", date.date());
            if fills_unreadable(&fix, &unreadable) {
                // Already counted as unreadable
                self.log.push(format!("Line {line}: {message}"));
            } else {
                self.record_error(line, message);
            }
        }

        self.last_date = Some(date);
        self.bars.push(Bar {
            date,
            open: prices.open,
            high: prices.high,
            low: prices.low,
            close: prices.close,
            volume,
            adj_close,
        });
    }

    /// Ascending order without duplicate timestamps
    fn order(&mut self, bars: &mut Vec<Bar>) {
        if bars.len() >= 2 && bars[1].date < bars[0].date {
            bars.reverse();
            self.log.push("Dates are descending; series reversed.");
        }

        if bars.windows(2).any(|w| w[1].date < w[0].date) {
            bars.sort_by_key(|b| b.date);
            self.errors += 1;
            self.log.push("Dates out of order; series sorted.");
        }

        let before = bars.len();
        bars.dedup_by(|later, earlier| later.date == earlier.date);
        let removed = before - bars.len();
        if removed > 0 {
            self.errors += removed;
            self.log.push(format!("{removed} rows with duplicate dates removed."));
        }
    }
}

/// Whether `fix` only filled in prices whose text could not be read
fn fills_unreadable(fix: &Repair, unreadable: &[(&'static str, String)]) -> bool {
    let missing = |field: &str| unreadable.iter().any(|(name, _)| *name == field);
    match fix.kind {
        RepairKind::AllZero => ["high", "low", "close"].into_iter().all(missing),
        RepairKind::HighZero | RepairKind::LowZero | RepairKind::CloseZero => missing(fix.field),
        _ => false,
    }
}

/// Intraday when any of the first three bars share a calendar day
fn detect_intraday(bars: &[Bar]) -> bool {
    let days: Vec<_> = bars.iter().take(3).map(Bar::day).collect();
    days.iter()
        .enumerate()
        .any(|(i, d)| days[i + 1..].contains(d))
}

/// Round to `decimals` without letting a tiny positive price collapse to 0
fn round_bar(bar: &mut Bar, decimals: u32) {
    let round = |value: f64| {
        let rounded = round_to(value, decimals);
        if rounded > 0.0 {
            rounded
        } else {
            value
        }
    };
    bar.open = bar.open.map(round);
    bar.high = round(bar.high);
    bar.low = round(bar.low);
    bar.close = round(bar.close);
    bar.adj_close = bar.adj_close.map(round);
}

// ============================================================
// INGESTOR
// ============================================================

/// Parses quote text into a [`BarRepository`]
#[derive(Debug, Clone, Default)]
pub struct QuoteIngestor {
    config: IngestConfig,
}

impl QuoteIngestor {
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Begin a resumable ingestion of `text`
    pub fn start<'a>(&'a self, text: &str) -> Result<IngestSession<'a>> {
        IngestSession::new(&self.config, text)
    }

    /// Ingest `text`, continuing past the error checkpoint
    pub fn ingest(&self, text: &str) -> Result<Ingested> {
        self.ingest_with(text, |_| Decision::Continue)
    }

    /// Ingest `text`, asking `decide` at the error checkpoint
    pub fn ingest_with<F>(&self, text: &str, mut decide: F) -> Result<Ingested>
    where
        F: FnMut(usize) -> Decision,
    {
        let mut session = self.start(text)?;
        while let Progress::Checkpoint { errors, .. } = session.advance() {
            if decide(errors) == Decision::Abort {
                session.abort();
                break;
            }
        }
        session.finish()
    }

    /// Read and ingest a quote file
    pub fn ingest_file(&self, path: impl AsRef<Path>) -> Result<Ingested> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(Error::EmptyFile(path.display().to_string()));
        }

        let text = String::from_utf8_lossy(&bytes);
        self.ingest(&text).map_err(|e| match e {
            Error::EmptyFile(_) => Error::EmptyFile(path.display().to_string()),
            other => other,
        })
    }
}
