//! Per-bar price repair.
//!
//! Every fix is returned as a [`Repair`] so the ingestion driver can count it
//! and write it to the diagnostic log; nothing here fails.

use std::fmt;

/// Raw prices of one row before validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prices {
    pub open: Option<f64>,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// What was wrong with a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairKind {
    /// A negative or non-finite price was zeroed before repair
    Negative,
    /// High, low and close were all zero
    AllZero,
    HighZero,
    LowZero,
    CloseZero,
    OpenZero,
    HighBelowLow,
    OpenAboveHigh,
    OpenBelowLow,
    CloseAboveHigh,
    CloseBelowLow,
}

/// One fix applied to a row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Repair {
    pub kind: RepairKind,
    pub field: &'static str,
    pub before: f64,
    pub after: f64,
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RepairKind::Negative => write!(f, "{} of {} is not a valid price, treated as 0", self.field, self.before),
            RepairKind::AllZero => write!(f, "high, low and close are all 0, set to {}", self.after),
            RepairKind::HighZero | RepairKind::LowZero | RepairKind::CloseZero | RepairKind::OpenZero => {
                write!(f, "{} is 0, replaced by {}", self.field, self.after)
            },
            RepairKind::HighBelowLow => {
                write!(f, "high {} below low {}, swapped", self.before, self.after)
            },
            RepairKind::OpenAboveHigh | RepairKind::CloseAboveHigh => write!(
                f,
                "{} {} above high {}, swapped",
                self.field, self.before, self.after
            ),
            RepairKind::OpenBelowLow | RepairKind::CloseBelowLow => write!(
                f,
                "{} {} below low {}, swapped",
                self.field, self.before, self.after
            ),
        }
    }
}

fn sanitize(value: &mut f64, field: &'static str, repairs: &mut Vec<Repair>) {
    if !value.is_finite() || *value < 0.0 {
        repairs.push(Repair {
            kind: RepairKind::Negative,
            field,
            before: *value,
            after: 0.0,
        });
        *value = 0.0;
    }
}

/// Bring a row into `low <= {open, close} <= high` with positive prices.
///
/// Zero prices are filled from the others (all three zero becomes 1), an
/// inverted high/low pair is swapped, then an open or close outside the range
/// trades places with the bound it crossed.
pub fn repair(prices: &mut Prices) -> Vec<Repair> {
    let mut repairs = Vec::new();

    sanitize(&mut prices.high, "high", &mut repairs);
    sanitize(&mut prices.low, "low", &mut repairs);
    sanitize(&mut prices.close, "close", &mut repairs);
    if let Some(open) = prices.open.as_mut() {
        sanitize(open, "open", &mut repairs);
    }

    if prices.high == 0.0 && prices.low == 0.0 && prices.close == 0.0 {
        prices.high = 1.0;
        prices.low = 1.0;
        prices.close = 1.0;
        if prices.open.is_some() {
            prices.open = Some(1.0);
        }
        repairs.push(Repair {
            kind: RepairKind::AllZero,
            field: "high/low/close",
            before: 0.0,
            after: 1.0,
        });
    } else {
        let positive = |values: &[Option<f64>]| -> Vec<f64> {
            values.iter().flatten().copied().filter(|v| *v > 0.0).collect()
        };

        if prices.high == 0.0 {
            let others = positive(&[prices.open, Some(prices.low), Some(prices.close)]);
            prices.high = others.iter().copied().fold(0.0, f64::max);
            repairs.push(Repair {
                kind: RepairKind::HighZero,
                field: "high",
                before: 0.0,
                after: prices.high,
            });
        }

        if prices.low == 0.0 {
            let others = positive(&[prices.open, Some(prices.high), Some(prices.close)]);
            prices.low = others.iter().copied().fold(f64::INFINITY, f64::min);
            repairs.push(Repair {
                kind: RepairKind::LowZero,
                field: "low",
                before: 0.0,
                after: prices.low,
            });
        }

        if prices.close == 0.0 {
            prices.close = (prices.high + prices.low) / 2.0;
            repairs.push(Repair {
                kind: RepairKind::CloseZero,
                field: "close",
                before: 0.0,
                after: prices.close,
            });
        }
    }

    if prices.open == Some(0.0) {
        prices.open = Some(prices.close);
        repairs.push(Repair {
            kind: RepairKind::OpenZero,
            field: "open",
            before: 0.0,
            after: prices.close,
        });
    }

    if prices.high < prices.low {
        repairs.push(Repair {
            kind: RepairKind::HighBelowLow,
            field: "high",
            before: prices.high,
            after: prices.low,
        });
        std::mem::swap(&mut prices.high, &mut prices.low);
    }

    if let Some(open) = prices.open {
        if open > prices.high {
            repairs.push(Repair {
                kind: RepairKind::OpenAboveHigh,
                field: "open",
                before: open,
                after: prices.high,
            });
            prices.open = Some(prices.high);
            prices.high = open;
        } else if open < prices.low {
            repairs.push(Repair {
                kind: RepairKind::OpenBelowLow,
                field: "open",
                before: open,
                after: prices.low,
            });
            prices.open = Some(prices.low);
            prices.low = open;
        }
    }

    if prices.close > prices.high {
        repairs.push(Repair {
            kind: RepairKind::CloseAboveHigh,
            field: "close",
            before: prices.close,
            after: prices.high,
        });
        std::mem::swap(&mut prices.close, &mut prices.high);
    } else if prices.close < prices.low {
        repairs.push(Repair {
            kind: RepairKind::CloseBelowLow,
            field: "close",
            before: prices.close,
            after: prices.low,
        });
        std::mem::swap(&mut prices.close, &mut prices.low);
    }

    repairs
}
