pub mod dense;
pub mod lstm;

use candle_core::{ModuleT, Result, Tensor};
use candle_nn::VarBuilder;

use crate::config::ModelVariant;
use dense::DenseNet;
use lstm::LstmNet;

/// Maps a `[batch, window]` block of normalized closes to `[batch, horizon]`
/// normalized forecasts.
pub enum ForecastNet {
    Lstm(LstmNet),
    Dense(DenseNet),
}

impl ForecastNet {
    pub fn new(variant: ModelVariant, window: usize, horizon: usize, vb: VarBuilder) -> Result<Self> {
        Ok(match variant {
            ModelVariant::Lstm => ForecastNet::Lstm(LstmNet::new(horizon, vb.pp("lstm"))?),
            ModelVariant::Dense => ForecastNet::Dense(DenseNet::new(window, horizon, vb.pp("dense"))?),
        })
    }
}

impl ModuleT for ForecastNet {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            ForecastNet::Lstm(net) => net.forward_t(xs, train),
            ForecastNet::Dense(net) => net.forward_t(xs, train),
        }
    }
}
