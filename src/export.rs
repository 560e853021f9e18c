use anyhow::{Context, Result};
use chrono::NaiveDate;
use fs2::FileExt; // for file locking
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    ExportArgs, archive,
    encode::encode_all,
    source::{BarSource, DEFAULT_CHART_URL, YahooSource},
};

/// Failures the shell reports distinctly from raw retrieval or I/O errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{0}")]
    Usage(String),
    #[error("No data found for {symbol} in this date range.")]
    NoData { symbol: String },
}

/// One validated invocation: a symbol and an inclusive date range.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub symbol: String,
    pub archive: PathBuf,
    pub bars: usize,
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl ExportRequest {
    /// Validate CLI args. Expects `data_dir` to be resolved already.
    pub fn from_args(args: &ExportArgs) -> Result<Self, ExportError> {
        let symbol = args.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(ExportError::Usage("symbol must not be empty".into()));
        }
        let start = parse_date("start_date", &args.start)?;
        let end = parse_date("end_date", &args.end)?;
        if start > end {
            return Err(ExportError::Usage(format!(
                "start_date {} is after end_date {}",
                start, end
            )));
        }
        let data_dir = args
            .data_dir
            .clone()
            .ok_or_else(|| ExportError::Usage("no data directory configured".into()))?;
        Ok(Self {
            symbol,
            start,
            end,
            data_dir,
        })
    }
}

fn parse_date(what: &str, s: &str) -> Result<NaiveDate, ExportError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| ExportError::Usage(format!("invalid {} {:?} (expected YYYY-MM-DD): {}", what, s, e)))
}

pub async fn execute(args: &ExportArgs) -> Result<()> {
    let request = ExportRequest::from_args(args)?;

    // Optional single-instance lock; same-symbol runs otherwise race on the staging file
    let _lock_guard = args
        .lock_file
        .as_deref()
        .map(acquire_lock)
        .transpose()?;

    let base_url = args.base_url.as_deref().unwrap_or(DEFAULT_CHART_URL);
    let source = YahooSource::new(base_url)?;

    println!(
        "Downloading {} data from {} ({} → {})...",
        request.symbol,
        source.name(),
        request.start,
        request.end
    );
    let summary = run(&source, &request).await?;

    let (entry, text) = archive::read_archive_entry(&summary.archive)?;
    debug!("verified {} ({} lines)", entry, text.lines().count());

    println!("\nData ready: {}", summary.archive.display());
    println!(
        "Contains {} daily bars for {} ({} → {}).",
        summary.bars, summary.symbol, summary.first, summary.last
    );
    Ok(())
}

/// Fetch, encode and archive one symbol.
pub async fn run<S: BarSource>(source: &S, request: &ExportRequest) -> Result<ExportSummary> {
    let bars = source
        .fetch_daily_bars(&request.symbol, request.start, request.end)
        .await
        .with_context(|| format!("fetch {} from {}", request.symbol, source.name()))?;

    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        return Err(ExportError::NoData {
            symbol: request.symbol.clone(),
        }
        .into());
    };
    let (first, last) = (first.date, last.date);

    let records = encode_all(&bars).with_context(|| format!("encode {}", request.symbol))?;

    println!(
        "Saving data to {}...",
        archive::daily_dir(&request.data_dir).display()
    );
    let archive = archive::write_archive(&request.symbol, &records, &request.data_dir)?;
    info!("{} records for {} in {}", records.len(), request.symbol, archive.display());

    Ok(ExportSummary {
        symbol: request.symbol.clone(),
        archive,
        bars: records.len(),
        first,
        last,
    })
}

/// Acquire an exclusive file lock; keep the file handle alive to hold the lock.
pub fn acquire_lock(lock_path: &Path) -> Result<fs::File> {
    if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(lock_path)
        .with_context(|| format!("open lock file {}", lock_path.display()))?;
    file.lock_exclusive()?;
    Ok(file)
}
