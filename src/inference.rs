use crate::config::ForecastSettings;
use crate::data::PriceHistory;
use crate::dataset::WindowedDataset;
use crate::error::{ForecastError, Result};
use crate::metrics::{r2_score, round_to};
use crate::models::ForecastNet;
use crate::scaler::MinMaxScaler;
use crate::train;
use candle_core::{DType, Device, ModuleT, Tensor};
use candle_nn::{VarBuilder, VarMap};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::info;

/// Response payload of one forecast.
#[derive(Clone, Debug, Serialize)]
pub struct Forecast {
    pub historical_dates: Vec<String>,
    pub historical_prices: Vec<f64>,
    pub future_dates: Vec<String>,
    pub predicted_prices: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_accuracy: Option<f64>,
}

/// `horizon` consecutive calendar days after `last`. Weekends and market
/// holidays are not skipped.
pub fn future_dates(last: NaiveDate, horizon: usize) -> Option<Vec<NaiveDate>> {
    (1..=horizon as u64)
        .map(|i| last.checked_add_days(Days::new(i)))
        .collect()
}

fn to_f64(values: Vec<f32>) -> Vec<f64> {
    values.into_iter().map(f64::from).collect()
}

/// Fits a fresh model on `data` and forecasts the next `horizon` closes.
///
/// Everything built here (scaler, dataset, parameters, optimizer state) is
/// dropped on return. CPU-bound; call from a blocking context.
pub fn run_forecast(
    data: &PriceHistory,
    horizon: usize,
    settings: &ForecastSettings,
    device: &Device,
) -> Result<Forecast> {
    if data.is_empty() {
        return Err(ForecastError::NoData);
    }
    if horizon == 0 {
        return Err(ForecastError::InvalidHorizon);
    }

    let insufficient = || ForecastError::InsufficientHistory {
        horizon,
        available: data.len(),
        required: settings.required_history(horizon),
    };
    if data.len() < settings.required_history(horizon) {
        return Err(insufficient());
    }

    // 1. Normalize
    let closes = data.closes();
    let scaler = MinMaxScaler::fit(&closes).ok_or(ForecastError::NoData)?;
    let scaled = scaler.transform(&closes);

    // 2. Window
    let window = settings.window;
    let dataset = WindowedDataset::build(&scaled, window, horizon);
    if dataset.is_empty() {
        return Err(insufficient());
    }

    // 3. Initialize Model
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let net = ForecastNet::new(settings.variant, window, horizon, vb)?;

    // 4. Train, scoring on a held-out split when the variant keeps one
    let (final_loss, model_accuracy) = match settings.variant.holdout_fraction() {
        Some(fraction) => {
            let (train_set, test_set) = dataset
                .split(fraction, &mut rand::thread_rng())
                .ok_or_else(insufficient)?;
            let loss = train::fit(&net, &varmap, &train_set, settings, device)?;

            let (x_test, y_test) = test_set.to_tensors(device)?;
            let predicted = net.forward_t(&x_test, false)?.flatten_all()?.to_vec1::<f32>()?;
            let actual = y_test.flatten_all()?.to_vec1::<f32>()?;
            let r2 = r2_score(&to_f64(actual), &to_f64(predicted));
            (loss, Some(round_to(r2, 3)))
        }
        None => (train::fit(&net, &varmap, &dataset, settings, device)?, None),
    };

    // 5. Forecast from the most recent window
    let last_window: Vec<f32> = scaled[scaled.len() - window..]
        .iter()
        .map(|&v| v as f32)
        .collect();
    let last_window = Tensor::from_vec(last_window, (1, window), device)?;
    let prediction = net.forward_t(&last_window, false)?.squeeze(0)?.to_vec1::<f32>()?;
    let predicted_prices = scaler.inverse_transform(&to_f64(prediction));

    // 6. Assemble
    let last_date = data.last_date().ok_or(ForecastError::NoData)?;
    let future_dates = future_dates(last_date, horizon)
        .ok_or_else(|| ForecastError::Internal(format!("date overflow after {last_date}")))?
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();

    info!(
        symbol = %data.symbol,
        horizon,
        examples = dataset.len(),
        final_loss,
        accuracy = ?model_accuracy,
        "forecast complete"
    );

    Ok(Forecast {
        historical_dates: data.dates(),
        historical_prices: closes,
        future_dates,
        predicted_prices,
        model_accuracy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelVariant;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_future_dates_are_consecutive_calendar_days() {
        let dates = future_dates(date(2024, 2, 27), 4).unwrap();
        assert_eq!(
            dates,
            vec![date(2024, 2, 28), date(2024, 2, 29), date(2024, 3, 1), date(2024, 3, 2)]
        );
        assert!(future_dates(date(2024, 2, 27), 0).unwrap().is_empty());
    }

    #[test]
    fn test_empty_history_is_no_data() {
        let settings = ForecastSettings::new(ModelVariant::Dense, Some(1));
        let err = run_forecast(&PriceHistory::empty("NOPE"), 10, &settings, &Device::Cpu).unwrap_err();
        assert!(matches!(err, ForecastError::NoData));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let settings = ForecastSettings::new(ModelVariant::Dense, Some(1));
        let data = PriceHistory::new_mock("MOCK", 100);
        let err = run_forecast(&data, 0, &settings, &Device::Cpu).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidHorizon));
    }

    #[test]
    fn test_horizon_beyond_history_is_reported() {
        let settings = ForecastSettings::new(ModelVariant::Lstm, Some(1));
        let data = PriceHistory::new_mock("MOCK", 41);
        let err = run_forecast(&data, 10, &settings, &Device::Cpu).unwrap_err();
        match err {
            ForecastError::InsufficientHistory {
                horizon,
                available,
                required,
            } => {
                assert_eq!(horizon, 10);
                assert_eq!(available, 41);
                assert_eq!(required, 42);
            }
            other => panic!("unexpected error: {other}"),
        }

        // The dense variant needs no test split, so one example suffices.
        let dense = ForecastSettings::new(ModelVariant::Dense, Some(1));
        assert!(run_forecast(&data, 10, &dense, &Device::Cpu).is_ok());
    }

    #[test]
    fn test_dense_forecast_shape() {
        let settings = ForecastSettings::new(ModelVariant::Dense, Some(3));
        let data = PriceHistory::new_mock("MOCK", 120);
        let forecast = run_forecast(&data, 10, &settings, &Device::Cpu).unwrap();

        assert_eq!(forecast.historical_dates.len(), 120);
        assert_eq!(forecast.historical_prices, data.closes());
        assert_eq!(forecast.future_dates.len(), 10);
        assert_eq!(forecast.predicted_prices.len(), 10);
        assert!(forecast.predicted_prices.iter().all(|p| p.is_finite()));
        assert_eq!(forecast.model_accuracy, None);

        let last = data.last_date().unwrap();
        assert_eq!(forecast.future_dates[0], last.succ_opt().unwrap().format("%Y-%m-%d").to_string());
    }

    #[test]
    fn test_lstm_forecast_reports_accuracy() {
        let settings = ForecastSettings::new(ModelVariant::Lstm, Some(1));
        let data = PriceHistory::new_mock("MOCK", 60);
        let forecast = run_forecast(&data, 5, &settings, &Device::Cpu).unwrap();

        assert_eq!(forecast.future_dates.len(), 5);
        assert_eq!(forecast.predicted_prices.len(), 5);
        let accuracy = forecast.model_accuracy.expect("lstm variant scores a held-out split");
        assert!(accuracy.is_finite());
        assert_eq!(accuracy, round_to(accuracy, 3));
    }

    #[test]
    fn test_predictions_stay_near_history() {
        let data = PriceHistory::new_mock("MOCK", 200);
        let closes = data.closes();
        let min = closes.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = closes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        for (variant, epochs) in [(ModelVariant::Dense, 20), (ModelVariant::Lstm, 3)] {
            let settings = ForecastSettings::new(variant, Some(epochs));
            let forecast = run_forecast(&data, 7, &settings, &Device::Cpu).unwrap();
            for &price in &forecast.predicted_prices {
                assert!(price.is_finite(), "{variant:?} produced {price}");
                assert!(
                    price >= min - range && price <= max + range,
                    "{variant:?} forecast {price} outside [{}, {}]",
                    min - range,
                    max + range
                );
            }
        }
    }

    #[test]
    fn test_forecast_serializes_without_accuracy() {
        let forecast = Forecast {
            historical_dates: vec!["2024-01-02".into()],
            historical_prices: vec![1.0],
            future_dates: vec!["2024-01-03".into()],
            predicted_prices: vec![1.5],
            model_accuracy: None,
        };
        let json = serde_json::to_value(&forecast).unwrap();
        assert!(json.get("model_accuracy").is_none());
        assert_eq!(json["predicted_prices"][0], 1.5);
    }
}
