use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{Dropout, LSTMConfig, Linear, VarBuilder, LSTM, RNN};

pub const ENCODER_HIDDEN: usize = 64;
pub const DECODER_HIDDEN: usize = 32;
pub const HEAD_HIDDEN: usize = 64;
pub const DROPOUT: f32 = 0.2;

fn lstm_config() -> LSTMConfig {
    LSTMConfig {
        layer_idx: 0,
        ..Default::default()
    }
}

/// Two stacked LSTMs over the price window followed by a dense head that
/// emits the whole horizon at once.
pub struct LstmNet {
    encoder: LSTM,
    dropout: Dropout,
    decoder: LSTM,
    hidden: Linear,
    head: Linear,
}

impl LstmNet {
    pub fn new(horizon: usize, vb: VarBuilder) -> Result<Self> {
        // One feature per timestep: the normalized close.
        let encoder = candle_nn::lstm(1, ENCODER_HIDDEN, lstm_config(), vb.pp("encoder"))?;
        let decoder = candle_nn::lstm(ENCODER_HIDDEN, DECODER_HIDDEN, lstm_config(), vb.pp("decoder"))?;
        let hidden = candle_nn::linear(DECODER_HIDDEN, HEAD_HIDDEN, vb.pp("hidden"))?;
        let head = candle_nn::linear(HEAD_HIDDEN, horizon, vb.pp("head"))?;

        Ok(Self {
            encoder,
            dropout: Dropout::new(DROPOUT),
            decoder,
            hidden,
            head,
        })
    }
}

impl ModuleT for LstmNet {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        // [batch, window] -> [batch, window, 1]
        let xs = xs.unsqueeze(2)?;

        // Full sequence out of the first layer.
        let states = self.encoder.seq(&xs)?;
        let seq = self.encoder.states_to_tensor(&states)?; // [batch, window, 64]
        let seq = self.dropout.forward_t(&seq, train)?;

        // Only the final state out of the second.
        let states = self.decoder.seq(&seq)?;
        let last = states
            .last()
            .ok_or_else(|| candle_core::Error::Msg("Empty LSTM sequence".into()))?;

        let h = self.hidden.forward(&last.h)?.relu()?;
        self.head.forward(&h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_output_shape() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let net = LstmNet::new(7, vb)?;

        let xs = Tensor::rand(0f32, 1f32, (3, 30), &device)?;
        assert_eq!(net.forward_t(&xs, true)?.dims2()?, (3, 7));
        assert_eq!(net.forward_t(&xs, false)?.dims2()?, (3, 7));
        Ok(())
    }

    #[test]
    fn test_inference_is_stable() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let net = LstmNet::new(4, vb)?;

        // Dropout is off outside training.
        let xs = Tensor::rand(0f32, 1f32, (2, 30), &device)?;
        let a = net.forward_t(&xs, false)?.flatten_all()?.to_vec1::<f32>()?;
        let b = net.forward_t(&xs, false)?.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(a, b);
        Ok(())
    }
}
