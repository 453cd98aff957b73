// Internal imports
use crate::data::sequence::SequenceSlice;
use crate::error::{ModelError, Result};

/// Supplies one loss weight per sample of a prepared split. Injected
/// into the attention regressor's `fit`; when absent, every sample
/// weighs 1.
pub trait Reweighter {
    fn reweight(&self, slice: &SequenceSlice) -> Result<Vec<f32>>;
}

/// Exponential time decay: the newest sample weighs 1 and the weight
/// halves every `half_life` rows going backwards.
#[derive(Debug, Clone)]
pub struct HalfLifeReweighter {
    pub half_life: usize,
}

impl HalfLifeReweighter {
    pub fn new(half_life: usize) -> Result<Self> {
        if half_life == 0 {
            return Err(ModelError::Data("half_life must be positive".into()));
        }
        Ok(Self { half_life })
    }
}

impl Reweighter for HalfLifeReweighter {
    fn reweight(&self, slice: &SequenceSlice) -> Result<Vec<f32>> {
        let n = slice.len();
        Ok((0..n)
            .map(|i| {
                let age = (n - 1 - i) as f32 / self.half_life as f32;
                0.5_f32.powf(age)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn newest_sample_weighs_one_and_decay_halves() {
        let data = Array3::<f32>::zeros((5, 2, 2));
        let index = (0..5).map(|i| format!("r{}", i)).collect();
        let slice = SequenceSlice::new(data, index).unwrap();

        let weights = HalfLifeReweighter::new(2).unwrap().reweight(&slice).unwrap();
        assert!((weights[4] - 1.0).abs() < 1e-6);
        assert!((weights[2] - 0.5).abs() < 1e-6);
        assert!((weights[0] - 0.25).abs() < 1e-6);
    }
}
