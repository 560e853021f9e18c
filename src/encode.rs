//! Fixed-point encoding of adjusted daily bars.
//!
//! Prices are scaled by [`PRICE_SCALE`] and truncated toward zero. The scaling
//! runs on the shortest decimal rendering of each float rather than on the
//! binary product, so a quote of `129.25` always becomes `1292500`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;
use thiserror::Error;

use crate::bar::{EncodedRecord, PRICE_SCALE, RawBar};

#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("{field} on {date} is not a finite number ({value})")]
    NonFinite {
        date: NaiveDate,
        field: &'static str,
        value: f64,
    },
    #[error("{field} on {date} is negative ({value})")]
    Negative {
        date: NaiveDate,
        field: &'static str,
        value: f64,
    },
    #[error("{field} on {date} does not fit the fixed-point range ({value})")]
    OutOfRange {
        date: NaiveDate,
        field: &'static str,
        value: f64,
    },
}

/// Encode one bar. Pure; order of fields follows the wire format.
pub fn encode(bar: &RawBar) -> Result<EncodedRecord, EncodeError> {
    Ok(EncodedRecord {
        date: bar.date,
        open: scale_price(bar.date, "open", bar.open)?,
        high: scale_price(bar.date, "high", bar.high)?,
        low: scale_price(bar.date, "low", bar.low)?,
        close: scale_price(bar.date, "close", bar.close)?,
        volume: bar.volume,
    })
}

/// Encode a whole series, keeping order and count.
pub fn encode_all(bars: &[RawBar]) -> Result<Vec<EncodedRecord>, EncodeError> {
    bars.iter().map(encode).collect()
}

/// `trunc(value * PRICE_SCALE)` computed in decimal.
pub fn scale_price(date: NaiveDate, field: &'static str, value: f64) -> Result<i64, EncodeError> {
    if !value.is_finite() {
        return Err(EncodeError::NonFinite { date, field, value });
    }
    if value < 0.0 {
        return Err(EncodeError::Negative { date, field, value });
    }
    let out_of_range = || EncodeError::OutOfRange { date, field, value };

    // `Display` for f64 is the shortest string that round-trips, never exponential.
    let dec = Decimal::from_str(&value.to_string()).map_err(|_| out_of_range())?;
    dec.checked_mul(Decimal::from(PRICE_SCALE))
        .map(|scaled| scaled.trunc())
        .and_then(|scaled| scaled.to_i64())
        .ok_or_else(out_of_range)
}
