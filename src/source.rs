use anyhow::{Context, Result, bail};
use chrono::{DateTime, Days, NaiveDate};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::bar::RawBar;

pub const DEFAULT_CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Provider of adjusted daily bars.
///
/// Implementations return bars for the inclusive `[start, end]` range in
/// ascending date order, an empty vector when the provider has nothing for
/// the symbol or range, and an error only when retrieval itself failed.
#[allow(async_fn_in_trait)]
pub trait BarSource {
    fn name(&self) -> &str;

    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>>;
}

/// Yahoo Finance v8 chart API, split/dividend adjusted.
pub struct YahooSource {
    client: Client,
    base_url: String,
}

impl YahooSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: mk_client()?,
            base_url: base_url.into(),
        })
    }

    /// Chart URL for `[start, end]`; `period2` is exclusive so it points at the next midnight.
    pub fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<reqwest::Url> {
        let period1 = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let after_end = end
            .checked_add_days(Days::new(1))
            .context("end date out of range")?;
        let period2 = after_end
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp();
        let base = format!("{}/{}", self.base_url.trim_end_matches('/'), symbol);
        let url = reqwest::Url::parse_with_params(
            &base,
            &[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".into()),
                ("includeAdjustedClose", "true".into()),
                ("events", "div,splits".into()),
            ],
        )?;
        Ok(url)
    }
}

impl BarSource for YahooSource {
    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>> {
        let url = self.chart_url(symbol, start, end)?;
        debug!("GET {}", url);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        // unknown symbols come back as 404 with a chart error payload
        let parsed = serde_json::from_str::<ChartResponse>(&body);
        if let Ok(chart) = &parsed
            && chart.is_not_found()
        {
            info!("{} not found at provider", symbol);
            return Ok(vec![]);
        }
        if !status.is_success() {
            bail!("HTTP {} for {}; body: {}", status, symbol, body);
        }
        let chart = parsed.with_context(|| format!("parse chart response for {}", symbol))?;
        let bars = parse_chart(chart, start, end)?;
        info!("{} bars for {} ({} → {})", bars.len(), symbol, start, end);
        Ok(bars)
    }
}

/// Make an HTTP client the chart endpoint accepts
pub fn mk_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent("Mozilla/5.0 (X11; Linux x86_64) lean_daily_export/0.1 (rust)")
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()?;
    Ok(client)
}

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
    #[serde(default, rename = "exchangeTimezoneName")]
    exchange_timezone_name: Option<String>,
}

impl ChartMeta {
    /// Exchange-local calendar day of a bar timestamp.
    ///
    /// `gmtoffset` is the offset in force today, so it is only used when the
    /// exchange zone is missing or unknown.
    fn local_date(&self, ts: i64) -> Option<NaiveDate> {
        let tz = self
            .exchange_timezone_name
            .as_deref()
            .and_then(|name| name.parse::<Tz>().ok());
        match tz {
            Some(tz) => DateTime::from_timestamp(ts, 0).map(|dt| dt.with_timezone(&tz).date_naive()),
            None => DateTime::from_timestamp(ts + self.gmtoffset, 0).map(|dt| dt.date_naive()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    adjclose: Vec<Option<f64>>,
}

impl ChartResponse {
    fn is_not_found(&self) -> bool {
        self.chart
            .error
            .as_ref()
            .is_some_and(|e| e.code == "Not Found")
    }
}

/// Turn a chart payload into adjusted bars within `[start, end]`, ascending.
pub fn parse_chart(resp: ChartResponse, start: NaiveDate, end: NaiveDate) -> Result<Vec<RawBar>> {
    if let Some(err) = resp.chart.error {
        if err.code == "Not Found" {
            return Ok(vec![]);
        }
        bail!("chart error {}: {}", err.code, err.description);
    }
    let Some(data) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(vec![]);
    };
    // empty ranges omit the timestamp array entirely
    let Some(timestamps) = data.timestamp else {
        return Ok(vec![]);
    };
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adj = data
        .indicators
        .adjclose
        .and_then(|a| a.into_iter().next())
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let mut out = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.into_iter().enumerate() {
        let date = data
            .meta
            .local_date(ts)
            .with_context(|| format!("invalid timestamp {}", ts))?;
        if date < start || date > end {
            continue;
        }
        let at = |v: &[Option<f64>]| v.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close)) =
            (at(&quote.open), at(&quote.high), at(&quote.low), at(&quote.close))
        else {
            debug!("skipping {} (incomplete quote)", date);
            continue;
        };
        let factor = match at(&adj) {
            Some(adj_close) if close > 0.0 => adj_close / close,
            _ => 1.0,
        };
        out.push(RawBar {
            date,
            open: open * factor,
            high: high * factor,
            low: low * factor,
            close: close * factor,
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
        });
    }
    out.sort_by_key(|b| b.date);
    Ok(out)
}
