pub mod archive;
pub mod bar;
pub mod encode;
pub mod export;
pub mod source;

use clap::Parser;
use std::path::PathBuf;

pub use export::ExportError;

/// CLI args
#[derive(Parser, Debug, Clone, Default)]
#[command(
    version,
    about = "Adjusted daily bar exporter: writes <root>/equity/usa/daily/<symbol>.zip in fixed-point CSV"
)]
pub struct ExportArgs {
    /// Ticker symbol, e.g. AAPL (case-insensitive)
    pub symbol: String,

    /// Start date (inclusive), format YYYY-MM-DD
    pub start: String,

    /// End date (inclusive), format YYYY-MM-DD
    pub end: String,

    /// Data root holding the equity/usa/daily tree (or set LEAN_DATA_DIR env)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Chart API base URL (or set YAHOO_CHART_URL env)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Optional lock file path to prevent concurrent runs
    #[arg(long)]
    pub lock_file: Option<PathBuf>,
}
