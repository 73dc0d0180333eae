use crate::config::ForecastSettings;
use crate::dataset::WindowedDataset;
use crate::models::ForecastNet;
use candle_core::{Device, ModuleT, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use rand::seq::SliceRandom;
use tracing::debug;

/// Mini-batch MSE training of `net` (whose parameters live in `varmap`).
/// Batches are reshuffled every epoch. Returns the mean loss of the last epoch.
pub fn fit(
    net: &ForecastNet,
    varmap: &VarMap,
    data: &WindowedDataset,
    settings: &ForecastSettings,
    device: &Device,
) -> candle_core::Result<f64> {
    if data.is_empty() {
        return Err(candle_core::Error::Msg("No training data available.".into()));
    }

    let (x, y) = data.to_tensors(device)?;

    let params = ParamsAdamW {
        lr: settings.learning_rate,
        weight_decay: 0.0,
        ..Default::default()
    };
    let mut opt = AdamW::new(varmap.all_vars(), params)?;

    let batch_size = settings.batch_size.max(1);
    let mut indices: Vec<u32> = (0..data.len() as u32).collect();
    let mut rng = rand::thread_rng();
    let mut epoch_loss = f64::NAN;

    for epoch in 0..settings.epochs {
        indices.shuffle(&mut rng);

        let mut total_loss = 0.0;
        let mut num_batches = 0usize;

        for batch in indices.chunks(batch_size) {
            let idx = Tensor::from_slice(batch, batch.len(), device)?;
            let x_batch = x.index_select(&idx, 0)?;
            let y_batch = y.index_select(&idx, 0)?;

            let pred = net.forward_t(&x_batch, true)?;
            let loss = candle_nn::loss::mse(&pred, &y_batch)?;

            opt.backward_step(&loss)?;
            total_loss += loss.to_scalar::<f32>()? as f64;
            num_batches += 1;
        }

        epoch_loss = total_loss / num_batches as f64;
        debug!("Epoch {}: Loss = {:.6}", epoch + 1, epoch_loss);
    }

    Ok(epoch_loss)
}
