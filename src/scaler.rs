/// Linear rescaling of a single column to `[0, 1]`.
///
/// A constant column has zero range; like the usual min-max convention the
/// range is then treated as 1 so the transform stays finite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    /// Returns `None` for an empty column.
    pub fn fit(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self { min, max })
    }

    fn range(&self) -> f64 {
        let range = self.max - self.min;
        if range == 0.0 {
            1.0
        } else {
            range
        }
    }

    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        let range = self.range();
        values.iter().map(|v| (v - self.min) / range).collect()
    }

    /// Model outputs outside `[0, 1]` are mapped back linearly, not clipped.
    pub fn inverse_transform(&self, values: &[f64]) -> Vec<f64> {
        let range = self.range();
        values.iter().map(|v| v * range + self.min).collect()
    }
}
