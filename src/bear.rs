//! Historical bear-market windows.
//!
//! The calendar is a small table persisted as text (a header line, then
//! `start,end,label` rows). A process-wide snapshot can be kept with
//! [`load_cached`] so the height classifier does not reread the file for
//! every pattern.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One bear market, inclusive at both ends
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BearMarketWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

impl BearMarketWindow {
    pub fn new(start: NaiveDate, end: NaiveDate, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Ordered, append-only table of bear-market windows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearMarketCalendar {
    windows: Vec<BearMarketWindow>,
}

/// A parsed calendar and the problems met on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedCalendar {
    pub calendar: BearMarketCalendar,
    /// One line per rejected row, `None` when every row parsed
    pub diagnostics: Option<String>,
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

impl BearMarketCalendar {
    pub fn new(windows: Vec<BearMarketWindow>) -> Self {
        Self { windows }
    }

    /// The three windows seeded when no table exists yet
    pub fn defaults() -> Self {
        Self::new(vec![
            BearMarketWindow::new(ymd(2000, 3, 24), ymd(2002, 10, 9), "Dot-com bust"),
            BearMarketWindow::new(ymd(2007, 10, 9), ymd(2009, 3, 9), "Financial crisis"),
            BearMarketWindow::new(ymd(2020, 2, 19), ymd(2020, 3, 23), "COVID-19 crash"),
        ])
    }

    pub fn windows(&self) -> &[BearMarketWindow] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn push(&mut self, window: BearMarketWindow) {
        self.windows.push(window);
    }

    pub fn is_bear_market(&self, date: NaiveDate) -> bool {
        self.window_for(date).is_some()
    }

    pub fn window_for(&self, date: NaiveDate) -> Option<&BearMarketWindow> {
        self.windows.iter().find(|w| w.contains(date))
    }

    /// Parse the persisted text form. Bad rows are skipped and reported in
    /// [`LoadedCalendar::diagnostics`].
    pub fn parse(text: &str) -> LoadedCalendar {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut windows = Vec::new();
        let mut problems = Vec::new();

        for (i, result) in reader.records().enumerate() {
            // Header is line 1
            let line = i + 2;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    problems.push(format!("Line {line}: {e}"));
                    continue;
                },
            };
            if record.iter().all(str::is_empty) {
                continue;
            }

            match parse_row(&record) {
                Ok(window) => windows.push(window),
                Err(reason) => problems.push(format!("Line {line}: {reason}")),
            }
        }

        if !problems.is_empty() {
            warn!(
                event_type = "bear_calendar_rows_rejected",
                rejected = problems.len(),
                kept = windows.len(),
                "Bear-market table has unreadable rows"
            );
        }

        LoadedCalendar {
            calendar: Self::new(windows),
            diagnostics: (!problems.is_empty()).then(|| problems.join("\n")),
        }
    }

    /// Persisted text form, header first
    pub fn to_text(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for window in &self.windows {
            writer.serialize(Row::from(window))?;
        }
        if self.windows.is_empty() {
            writer.write_record(["start", "end", "label"])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Csv(csv::Error::from(e.into_error())))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Load the table at `path`, seeding and saving the defaults when the
    /// file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<LoadedCalendar> {
        let path = path.as_ref();
        if !path.exists() {
            let calendar = Self::defaults();
            calendar.save(path)?;
            debug!(
                event_type = "bear_calendar_seeded",
                path = %path.display(),
                "Bear-market table created with defaults"
            );
            return Ok(LoadedCalendar {
                calendar,
                diagnostics: None,
            });
        }

        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = self.to_text()?;
        std::fs::write(path, text).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// On-disk row layout; field names double as the header
#[derive(Serialize)]
struct Row<'a> {
    start: String,
    end: String,
    label: &'a str,
}

impl<'a> From<&'a BearMarketWindow> for Row<'a> {
    fn from(window: &'a BearMarketWindow) -> Self {
        Self {
            start: window.start.format(DATE_FORMAT).to_string(),
            end: window.end.format(DATE_FORMAT).to_string(),
            label: &window.label,
        }
    }
}

fn parse_row(record: &csv::StringRecord) -> std::result::Result<BearMarketWindow, String> {
    let field = |i: usize, name: &str| record.get(i).filter(|f| !f.is_empty()).ok_or(format!("missing {name}"));
    let date = |text: &str, name: &str| {
        NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|e| format!("bad {name} date '{text}' ({e})"))
    };

    let start = date(field(0, "start date")?, "start")?;
    let end = date(field(1, "end date")?, "end")?;
    if end < start {
        return Err(format!("end {end} precedes start {start}"));
    }
    let label = record.get(2).unwrap_or("").to_string();
    Ok(BearMarketWindow { start, end, label })
}

// ============================================================
// PROCESS-WIDE CACHE
// ============================================================

static CACHE: Lazy<ArcSwapOption<BearMarketCalendar>> = Lazy::new(ArcSwapOption::empty);

/// Load the table at `path` and make it the cached snapshot
pub fn load_cached(path: impl AsRef<Path>) -> Result<(Arc<BearMarketCalendar>, Option<String>)> {
    let loaded = BearMarketCalendar::load(path)?;
    let calendar = Arc::new(loaded.calendar);
    CACHE.store(Some(Arc::clone(&calendar)));
    Ok((calendar, loaded.diagnostics))
}

/// Current snapshot, if one was loaded
pub fn cached() -> Option<Arc<BearMarketCalendar>> {
    CACHE.load_full()
}

pub fn set_cached(calendar: BearMarketCalendar) -> Arc<BearMarketCalendar> {
    let calendar = Arc::new(calendar);
    CACHE.store(Some(Arc::clone(&calendar)));
    calendar
}

/// Drop the snapshot; the next [`load_cached`] rereads the file
pub fn invalidate() {
    CACHE.store(None);
}
