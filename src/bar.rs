use chrono::NaiveDate;
use std::fmt;

/// Fixed-point multiplier applied to every price field.
pub const PRICE_SCALE: i64 = 10_000;

/// Daily bars carry no intraday time; every record is stamped at midnight.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d 00:00";

/// One calendar day's adjusted quote as delivered by a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// One output line: prices scaled by [`PRICE_SCALE`] and truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedRecord {
    pub date: NaiveDate,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: u64,
}

impl EncodedRecord {
    pub fn timestamp(&self) -> String {
        self.date.format(TIMESTAMP_FORMAT).to_string()
    }
}

// `YYYYMMDD HH:mm,open,high,low,close,volume`
impl fmt::Display for EncodedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.date.format(TIMESTAMP_FORMAT),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume
        )
    }
}
