//! Error taxonomy for the forecast pipeline and its HTTP mapping.
//!
//! Client errors carry a fixed, user-facing message. Everything else is
//! collapsed into a generic 500 body; the detail only goes to the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::data::FetchError;

pub const NO_DATA_MESSAGE: &str = "No data found for this ticker.";
pub const INTERNAL_MESSAGE: &str = "Internal server error.";

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("{}", NO_DATA_MESSAGE)]
    NoData,

    #[error("Forecast horizon must be a positive number of days.")]
    InvalidHorizon,

    #[error(
        "Not enough price history for a {horizon}-day forecast: \
         {available} trading days available, at least {required} required."
    )]
    InsufficientHistory {
        horizon: usize,
        available: usize,
        required: usize,
    },

    #[error("price provider error: {0}")]
    Provider(#[from] FetchError),

    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

impl ForecastError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForecastError::NoData
            | ForecastError::InvalidHorizon
            | ForecastError::InsufficientHistory { .. } => StatusCode::BAD_REQUEST,
            ForecastError::Provider(_) | ForecastError::Model(_) | ForecastError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand to the caller.
    pub fn client_message(&self) -> String {
        if self.status().is_server_error() {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for ForecastError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "forecast failed");
        }
        let body = Json(json!({ "error": self.client_message() }));
        (status, body).into_response()
    }
}
