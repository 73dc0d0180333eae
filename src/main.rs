mod config;
mod data;
mod dataset;
mod error;
mod inference;
mod metrics;
mod models;
mod scaler;
mod server;
mod train;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use config::{ForecastSettings, ModelVariant, ServerConfig};
use data::YahooSource;
use server::AppState;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stock price forecast service: fits a small neural network on each request",
    after_help = "EXAMPLES:
    # Serve the LSTM variant on the default port
    cargo run --release

    # Serve the dense variant on all interfaces
    cargo run --release -- --variant dense --host 0.0.0.0 --port 8080

    # Restrict cross-origin callers
    cargo run --release -- --allowed-origin https://app.example.com"
)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Network trained per request (lstm: 2y history with accuracy score, dense: 1y history)
    #[arg(long, value_enum, default_value_t = ModelVariant::Lstm)]
    variant: ModelVariant,

    /// Training epochs (default: 50 for lstm, 20 for dense)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    epochs: Option<u64>,

    /// Origin allowed to call the API; repeat for several (default: the deployment list)
    #[arg(long = "allowed-origin")]
    allowed_origins: Vec<String>,

    /// Timeout for the price provider request, in seconds
    #[arg(long, default_value_t = config::DEFAULT_FETCH_TIMEOUT_SECS)]
    fetch_timeout_secs: u64,

    /// Maximum number of forecasts trained at the same time (default: available CPUs)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_concurrent_forecasts: Option<u64>,

    /// Use CUDA GPU acceleration (requires --features cuda at compile time)
    #[arg(long)]
    cuda: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            bind_addr: SocketAddr::new(self.host, self.port),
            allowed_origins: if self.allowed_origins.is_empty() {
                defaults.allowed_origins
            } else {
                self.allowed_origins.clone()
            },
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_concurrent_forecasts: self
                .max_concurrent_forecasts
                .map_or(defaults.max_concurrent_forecasts, |n| n as usize),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let server_config = args.server_config();
    let settings = ForecastSettings::new(args.variant, args.epochs.map(|n| n as usize));

    let allowed_origins = server_config
        .allowed_origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid origin: {o}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let source = YahooSource::new(server_config.fetch_timeout).context("failed to build HTTP client")?;
    let device = config::get_device(args.cuda);

    info!(
        variant = ?settings.variant,
        epochs = settings.epochs,
        window = settings.window,
        max_concurrent = server_config.max_concurrent_forecasts,
        "forecast settings"
    );

    let state = Arc::new(AppState::new(
        Arc::new(source),
        settings,
        device,
        allowed_origins,
        server_config.max_concurrent_forecasts,
    ));
    let router = server::create_router(state);

    let listener = TcpListener::bind(server_config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind_addr))?;
    info!("Forecast service listening on {}", server_config.bind_addr);

    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_epochs_rejected() {
        assert!(Args::try_parse_from(["stock-forecast", "--epochs", "0"]).is_err());
        assert!(Args::try_parse_from(["stock-forecast", "--max-concurrent-forecasts", "0"]).is_err());
    }

    #[test]
    fn test_explicit_epochs_and_limits() {
        let args = Args::try_parse_from([
            "stock-forecast",
            "--variant",
            "dense",
            "--epochs",
            "5",
            "--max-concurrent-forecasts",
            "3",
        ])
        .unwrap();
        assert_eq!(args.epochs, Some(5));

        let settings = ForecastSettings::new(args.variant, args.epochs.map(|n| n as usize));
        assert_eq!(settings.variant, ModelVariant::Dense);
        assert_eq!(settings.epochs, 5);
        assert_eq!(args.server_config().max_concurrent_forecasts, 3);
    }
}
