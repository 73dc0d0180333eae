use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::Rng;

/// Supervised pairs cut from a normalized series: each input is `window`
/// consecutive values, each target the `horizon` values that follow it.
#[derive(Clone, Debug)]
pub struct WindowedDataset {
    pub window: usize,
    pub horizon: usize,
    pub inputs: Vec<Vec<f32>>,  // [n, window]
    pub targets: Vec<Vec<f32>>, // [n, horizon]
}

impl WindowedDataset {
    /// Produces `max(0, N - window - horizon)` examples, cursor `i` running
    /// from `window` up to (excluding) `N - horizon`.
    pub fn build(series: &[f64], window: usize, horizon: usize) -> Self {
        let count = series.len().saturating_sub(window.saturating_add(horizon));
        let mut inputs = Vec::with_capacity(count);
        let mut targets = Vec::with_capacity(count);

        for i in window..window + count {
            inputs.push(series[i - window..i].iter().map(|&v| v as f32).collect());
            targets.push(series[i..i + horizon].iter().map(|&v| v as f32).collect());
        }

        Self {
            window,
            horizon,
            inputs,
            targets,
        }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            window: self.window,
            horizon: self.horizon,
            inputs: indices.iter().map(|&i| self.inputs[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i].clone()).collect(),
        }
    }

    /// Shuffled train/test split with `ceil(n * test_fraction)` test examples.
    /// Returns `None` when either side would be empty.
    pub fn split<R: Rng + ?Sized>(&self, test_fraction: f64, rng: &mut R) -> Option<(Self, Self)> {
        let n = self.len();
        let n_test = (n as f64 * test_fraction).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return None;
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        let (test_idx, train_idx) = indices.split_at(n_test);
        Some((self.subset(train_idx), self.subset(test_idx)))
    }

    /// `([n, window], [n, horizon])` f32 tensors.
    pub fn to_tensors(&self, device: &Device) -> candle_core::Result<(Tensor, Tensor)> {
        let n = self.len();
        let x: Vec<f32> = self.inputs.iter().flatten().copied().collect();
        let y: Vec<f32> = self.targets.iter().flatten().copied().collect();
        let x = Tensor::from_vec(x, (n, self.window), device)?;
        let y = Tensor::from_vec(y, (n, self.horizon), device)?;
        Ok((x, y))
    }
}
