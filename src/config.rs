use candle_core::Device;
use clap::ValueEnum;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

pub fn get_device(use_cuda: bool) -> Device {
    if use_cuda {
        #[cfg(feature = "cuda")]
        {
            match Device::new_cuda(0) {
                Ok(device) => {
                    info!("Using CUDA device 0");
                    return device;
                }
                Err(e) => {
                    warn!("Failed to initialize CUDA: {}. Falling back to CPU.", e);
                }
            }
        }
        #[cfg(not(feature = "cuda"))]
        {
            warn!("--cuda flag set but binary was compiled without the 'cuda' feature. Falling back to CPU.");
        }
    }
    info!("Using CPU device");
    Device::Cpu
}

pub const WINDOW_SIZE: usize = 30;
pub const DEFAULT_SYMBOL: &str = "AAPL";
pub const DEFAULT_DAYS: usize = 10;
pub const BATCH_SIZE: usize = 32;
pub const LEARNING_RATE: f64 = 1e-3;
pub const TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "https://stock-sight-gamma.vercel.app",
    "https://stock-sight-vteja.vercel.app",
    "https://stock-sight-git-main-vteja.vercel.app",
];

/// Which of the two forecasting networks the service trains per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModelVariant {
    /// Stacked LSTM with dropout and a dense head, two years of history,
    /// reports a held-out R² score.
    Lstm,
    /// Feed-forward network over the flattened window, one year of history.
    Dense,
}

impl ModelVariant {
    /// Lookback range passed to the price provider.
    pub fn lookback_range(self) -> &'static str {
        match self {
            ModelVariant::Lstm => "2y",
            ModelVariant::Dense => "1y",
        }
    }

    pub fn default_epochs(self) -> usize {
        match self {
            ModelVariant::Lstm => 50,
            ModelVariant::Dense => 20,
        }
    }

    /// Fraction of windowed examples held out for the accuracy score, if any.
    pub fn holdout_fraction(self) -> Option<f64> {
        match self {
            ModelVariant::Lstm => Some(TEST_FRACTION),
            ModelVariant::Dense => None,
        }
    }

    /// Smallest number of windowed examples the variant can train on.
    /// A held-out split needs at least one train and one test example.
    pub fn min_examples(self) -> usize {
        match self.holdout_fraction() {
            Some(_) => 2,
            None => 1,
        }
    }
}

/// Hyperparameters for one forecast. Cloned into each request.
#[derive(Clone, Debug)]
pub struct ForecastSettings {
    pub variant: ModelVariant,
    pub window: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

impl ForecastSettings {
    pub fn new(variant: ModelVariant, epochs: Option<usize>) -> Self {
        Self {
            variant,
            window: WINDOW_SIZE,
            epochs: epochs.unwrap_or_else(|| variant.default_epochs()).max(1),
            batch_size: BATCH_SIZE,
            learning_rate: LEARNING_RATE,
        }
    }

    /// Observations needed to forecast `horizon` days.
    pub fn required_history(&self, horizon: usize) -> usize {
        self.window
            .saturating_add(horizon)
            .saturating_add(self.variant.min_examples())
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub allowed_origins: Vec<String>,
    pub fetch_timeout: Duration,
    pub max_concurrent_forecasts: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_concurrent_forecasts: default_max_concurrent_forecasts(),
        }
    }
}

pub fn default_max_concurrent_forecasts() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_lookback() {
        assert_eq!(ModelVariant::Lstm.lookback_range(), "2y");
        assert_eq!(ModelVariant::Dense.lookback_range(), "1y");
    }

    #[test]
    fn test_required_history() {
        let lstm = ForecastSettings::new(ModelVariant::Lstm, None);
        assert_eq!(lstm.epochs, 50);
        assert_eq!(lstm.required_history(10), 42);

        let dense = ForecastSettings::new(ModelVariant::Dense, Some(3));
        assert_eq!(dense.epochs, 3);
        assert_eq!(dense.required_history(10), 41);

        assert_eq!(ForecastSettings::new(ModelVariant::Dense, Some(0)).epochs, 1);
    }

    #[test]
    fn test_required_history_saturates() {
        let lstm = ForecastSettings::new(ModelVariant::Lstm, None);
        assert_eq!(lstm.required_history(usize::MAX), usize::MAX);
        assert_eq!(lstm.required_history(usize::MAX - 5), usize::MAX);
    }

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 5001);
        assert_eq!(config.allowed_origins.len(), 4);
        assert!(config.max_concurrent_forecasts >= 1);
    }
}
