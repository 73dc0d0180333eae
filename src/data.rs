use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart/";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(StatusCode),

    #[error("invalid provider url: {0}")]
    InvalidUrl(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closing prices for one symbol, oldest first, missing rows removed.
#[derive(Clone, Debug)]
pub struct PriceHistory {
    pub symbol: String,
    pub history: Vec<PricePoint>,
}

impl PriceHistory {
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            history: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.history.iter().map(|p| p.close).collect()
    }

    pub fn dates(&self) -> Vec<String> {
        self.history
            .iter()
            .map(|p| p.date.format("%Y-%m-%d").to_string())
            .collect()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.history.last().map(|p| p.date)
    }
}

/// Source of daily closing prices. `range` uses provider notation (`1y`, `2y`).
///
/// An unknown symbol is not an error: implementations return an empty
/// history and let the caller decide.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn daily_closes(&self, symbol: &str, range: &str) -> Result<PriceHistory, FetchError>;
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooChartError>,
}

#[derive(Deserialize, Debug)]
struct YahooChartError {
    code: String,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    #[serde(default)]
    meta: YahooMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug, Default)]
struct YahooMeta {
    // Exchange offset from UTC in seconds.
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    #[serde(default)]
    quote: Vec<YahooQuote>,
    #[serde(default)]
    adjclose: Vec<YahooAdjClose>,
}

#[derive(Deserialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Deserialize, Debug)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn parse_chart(symbol: &str, resp: YahooChartResponse) -> PriceHistory {
    if let Some(err) = &resp.chart.error {
        debug!(
            symbol,
            code = %err.code,
            description = err.description.as_deref().unwrap_or(""),
            "provider returned chart error"
        );
    }

    let Some(result) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
        return PriceHistory::empty(symbol);
    };

    // Split- and dividend-adjusted closes when available.
    let adjusted = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .filter(|v| !v.is_empty());
    let closes = match adjusted {
        Some(closes) => closes,
        None => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default(),
    };

    let offset = result.meta.gmtoffset;
    let mut history = Vec::with_capacity(result.timestamp.len());

    for (i, &timestamp) in result.timestamp.iter().enumerate() {
        let Some(close) = closes.get(i).copied().flatten().filter(|c| c.is_finite()) else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(timestamp.saturating_add(offset), 0) else {
            continue;
        };
        history.push(PricePoint {
            date: date.date_naive(),
            close,
        });
    }

    PriceHistory {
        symbol: symbol.to_string(),
        history,
    }
}

/// Yahoo Finance chart API client.
pub struct YahooSource {
    client: reqwest::Client,
}

impl YahooSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn chart_url(symbol: &str, range: &str) -> Result<Url, FetchError> {
        let mut url = Url::parse(YAHOO_CHART_URL).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(YAHOO_CHART_URL.to_string()))?
            .pop_if_empty()
            .push(symbol);
        url.query_pairs_mut()
            .append_pair("range", range)
            .append_pair("interval", "1d");
        Ok(url)
    }
}

#[async_trait]
impl PriceSource for YahooSource {
    async fn daily_closes(&self, symbol: &str, range: &str) -> Result<PriceHistory, FetchError> {
        let url = Self::chart_url(symbol, range)?;
        debug!(%url, "fetching price history");

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(symbol, "provider does not know symbol");
            return Ok(PriceHistory::empty(symbol));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let chart = resp.json::<YahooChartResponse>().await?;
        Ok(parse_chart(symbol, chart))
    }
}

#[cfg(test)]
impl PriceHistory {
    pub fn new_mock(symbol: &str, days: usize) -> Self {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let mut history = Vec::with_capacity(days);
        let mut current_price: f64 = 100.0;
        let mut current_date = NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date");

        for _ in 0..days {
            let volatility = 0.02; // 2% daily volatility
            let change_pct: f64 = rng.gen_range(-volatility..volatility);
            current_price *= 1.0 + change_pct;
            history.push(PricePoint {
                date: current_date,
                close: current_price,
            });
            current_date = current_date.succ_opt().expect("date in range");
        }

        Self {
            symbol: symbol.to_string(),
            history,
        }
    }
}
