use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{Linear, VarBuilder};

pub const HIDDEN1: usize = 64;
pub const HIDDEN2: usize = 32;

/// Feed-forward network over the flattened price window.
pub struct DenseNet {
    layer1: Linear,
    layer2: Linear,
    head: Linear,
}

impl DenseNet {
    pub fn new(window: usize, horizon: usize, vb: VarBuilder) -> Result<Self> {
        let layer1 = candle_nn::linear(window, HIDDEN1, vb.pp("layer1"))?;
        let layer2 = candle_nn::linear(HIDDEN1, HIDDEN2, vb.pp("layer2"))?;
        let head = candle_nn::linear(HIDDEN2, horizon, vb.pp("head"))?;
        Ok(Self { layer1, layer2, head })
    }
}

impl ModuleT for DenseNet {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> Result<Tensor> {
        let xs = xs.flatten_from(1)?;
        let x = self.layer1.forward(&xs)?.relu()?;
        let x = self.layer2.forward(&x)?.relu()?;
        self.head.forward(&x)
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
        let net = DenseNet::new(30, 10, vb)?;

        let xs = Tensor::rand(0f32, 1f32, (5, 30), &device)?;
        assert_eq!(net.forward_t(&xs, true)?.dims2()?, (5, 10));
        assert_eq!(varmap.all_vars().len(), 6);
        Ok(())
    }
}
