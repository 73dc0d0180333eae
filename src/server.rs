//! HTTP surface: one `GET /predict` route behind a CORS allow-list.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use candle_core::Device;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{ForecastSettings, DEFAULT_DAYS, DEFAULT_SYMBOL};
use crate::data::PriceSource;
use crate::error::{ForecastError, Result};
use crate::inference::{self, Forecast};

/// Shared across requests. Holds configuration only; every model, scaler and
/// dataset is built inside the request that uses it.
pub struct AppState {
    pub source: Arc<dyn PriceSource>,
    pub settings: ForecastSettings,
    pub device: Device,
    pub allowed_origins: Vec<HeaderValue>,
    /// Bounds how many training jobs run at once.
    pub training_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        source: Arc<dyn PriceSource>,
        settings: ForecastSettings,
        device: Device,
        allowed_origins: Vec<HeaderValue>,
        max_concurrent_forecasts: usize,
    ) -> Self {
        Self {
            source,
            settings,
            device,
            allowed_origins,
            training_slots: Arc::new(Semaphore::new(max_concurrent_forecasts.max(1))),
        }
    }

    /// Runs `job` on the blocking pool while holding a training slot.
    ///
    /// The slot moves into the blocking task, so it stays taken until `job`
    /// returns even if the caller stops waiting (client disconnect).
    pub async fn run_blocking<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .training_slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ForecastError::Internal(e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| ForecastError::Internal(format!("forecast task failed: {e}")))?
    }
}

/// Query parameters. Repeated keys keep their first value.
#[derive(Debug, Default, PartialEq)]
pub struct PredictParams {
    pub symbol: Option<String>,
    pub days: Option<String>,
}

impl PredictParams {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "symbol" if params.symbol.is_none() => params.symbol = Some(value),
                "days" if params.days.is_none() => params.days = Some(value),
                _ => {}
            }
        }
        params
    }

    pub fn resolve(&self) -> Result<(String, usize)> {
        let symbol = self
            .symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SYMBOL)
            .to_string();

        let days = match self.days.as_deref().and_then(parse_days) {
            None => DEFAULT_DAYS,
            Some(days) => days?,
        };

        Ok((symbol, days))
    }
}

/// `None` when `raw` is not an integer at all. Integers too large for
/// `usize` saturate so the history check can reject them.
fn parse_days(raw: &str) -> Option<Result<usize>> {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if negative || digits.bytes().all(|b| b == b'0') {
        return Some(Err(ForecastError::InvalidHorizon));
    }
    Some(Ok(digits.parse::<usize>().unwrap_or(usize::MAX)))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.allowed_origins.clone()))
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/predict", get(predict))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<Forecast>> {
    let pairs = match query {
        Ok(Query(pairs)) => pairs,
        Err(rejection) => {
            warn!(error = %rejection, "unreadable query string, using defaults");
            Vec::new()
        }
    };
    let (symbol, days) = PredictParams::from_pairs(pairs).resolve()?;
    let range = state.settings.variant.lookback_range();
    info!(%symbol, days, range, "forecast requested");

    let history = state.source.daily_closes(&symbol, range).await?;
    if history.is_empty() {
        return Err(ForecastError::NoData);
    }

    let settings = state.settings.clone();
    let device = state.device.clone();
    let forecast = state
        .run_blocking(move || inference::run_forecast(&history, days, &settings, &device))
        .await?;

    Ok(Json(forecast))
}
