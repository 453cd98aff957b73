// External imports
use burn::tensor::{backend::Backend, ElementConversion, Int, Shape, Tensor, TensorData};
use std::str::FromStr;

// Internal imports
use crate::error::ModelError;

/// Lifecycle of a regressor instance.
///
/// `predict` is only permitted from `Loaded` (weights restored from a
/// checkpoint at construction) or `Fitted` (a fit run completed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Uninit,
    Loaded,
    Fitting,
    Fitted,
    Failed,
}

impl ModelState {
    pub fn can_predict(self) -> bool {
        matches!(self, ModelState::Loaded | ModelState::Fitted)
    }
}

/// Per-epoch training and validation scores, appended during `fit` and
/// read by the caller afterwards.
#[derive(Debug, Clone, Default)]
pub struct EvalsResult {
    pub train: Vec<f64>,
    pub valid: Vec<f64>,
}

/// The supported optimizer families, resolved from the configuration
/// string when a regressor is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    /// Plain gradient descent ("gd"), mapped onto burn's SGD.
    Gd,
}

impl FromStr for OptimizerKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "gd" => Ok(OptimizerKind::Gd),
            other => Err(ModelError::UnsupportedOptimizer(other.to_string())),
        }
    }
}

/// Splits `indices` into `batch_size` chunks, optionally dropping a
/// trailing partial batch (training and evaluation loops drop it,
/// prediction keeps it).
pub fn batch_chunks(
    indices: &[usize],
    batch_size: usize,
    drop_last: bool,
) -> impl Iterator<Item = &[usize]> + '_ {
    indices
        .chunks(batch_size)
        .filter(move |chunk| !drop_last || chunk.len() == batch_size)
}

/// Builds an integer index tensor for `Tensor::select` from row positions.
pub fn index_tensor<B: Backend>(rows: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let idx: Vec<i64> = rows.iter().map(|&r| r as i64).collect();
    let data = TensorData::new(idx, Shape::new([rows.len()]));
    Tensor::from_data(data, device)
}

/// Extracts a single-element tensor as `f64`.
pub fn scalar_f64<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}

/// Mean squared error over the entries whose label is a real number.
///
/// NaN labels are always excluded; `exclude_infinite` additionally drops
/// infinite labels (the metric path uses this, mirroring a finiteness
/// check rather than a NaN check). `weight` scales each surviving
/// sample's squared error; `None` is the all-ones weighting.
///
/// Excluded entries contribute neither to the numerator nor to the
/// denominator, so the result equals the plain MSE over a pre-filtered
/// label set.
pub fn masked_weighted_mse<B: Backend>(
    pred: Tensor<B, 1>,
    label: Tensor<B, 1>,
    weight: Option<Tensor<B, 1>>,
    exclude_infinite: bool,
) -> Tensor<B, 1> {
    let mut keep = label.clone().is_nan().bool_not().float();
    if exclude_infinite {
        keep = keep * label.clone().abs().lower_elem(f32::INFINITY).float();
    }
    // Zero the excluded labels so NaN/inf cannot leak through the product.
    let invalid = keep.clone().lower_elem(0.5);
    let label = label.mask_fill(invalid, 0.0);

    let diff = pred - label;
    let mut sq = diff.clone() * diff * keep.clone();
    if let Some(w) = weight {
        sq = sq * w;
    }
    sq.sum() / keep.sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GRAD_CLIP_VALUE;
    use burn::grad_clipping::GradientClippingConfig;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn optimizer_kind_parses_known_names() {
        assert_eq!("adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert_eq!("Adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert_eq!("gd".parse::<OptimizerKind>().unwrap(), OptimizerKind::Gd);
        assert!(matches!(
            "rmsprop".parse::<OptimizerKind>(),
            Err(ModelError::UnsupportedOptimizer(_))
        ));
    }

    #[test]
    fn batch_chunks_drops_partial_tail_only_when_asked() {
        let indices: Vec<usize> = (0..10).collect();
        let dropped: Vec<_> = batch_chunks(&indices, 4, true).collect();
        assert_eq!(dropped.len(), 2);
        let kept: Vec<_> = batch_chunks(&indices, 4, false).collect();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[2].len(), 2);
    }

    #[test]
    fn masked_mse_matches_prefiltered_computation() {
        let device = NdArrayDevice::Cpu;
        let pred = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0], &device);
        let label =
            Tensor::<TestBackend, 1>::from_floats([1.5, f32::NAN, 2.0, f32::NAN], &device);

        let masked = scalar_f64(masked_weighted_mse(pred, label, None, false));

        // Same computation over the pre-filtered pairs (1.0, 1.5), (3.0, 2.0).
        let expected = (0.25 + 1.0) / 2.0;
        assert!((masked - expected).abs() < 1e-6);
    }

    #[test]
    fn finite_mask_also_excludes_infinite_labels() {
        let device = NdArrayDevice::Cpu;
        let pred = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0], &device);
        let label =
            Tensor::<TestBackend, 1>::from_floats([0.0, f32::INFINITY, 4.0], &device);

        let value = scalar_f64(masked_weighted_mse(pred, label, None, true));
        let expected = (1.0 + 1.0) / 2.0;
        assert!((value - expected).abs() < 1e-6);
    }

    #[test]
    fn value_clipping_bounds_gradient_elements() {
        let device = NdArrayDevice::Cpu;
        let clipper = GradientClippingConfig::Value(GRAD_CLIP_VALUE).init();
        let grad = Tensor::<TestBackend, 1>::from_floats([-7.0, -1.0, 0.5, 9.0], &device);

        let clipped = clipper.clip_gradient(grad).into_data();
        let clipped = clipped.as_slice::<f32>().unwrap();
        assert_eq!(clipped, [-3.0, -1.0, 0.5, 3.0]);
    }

    #[test]
    fn weighted_mse_scales_per_sample() {
        let device = NdArrayDevice::Cpu;
        let pred = Tensor::<TestBackend, 1>::from_floats([1.0, 3.0], &device);
        let label = Tensor::<TestBackend, 1>::from_floats([0.0, 0.0], &device);
        let weight = Tensor::<TestBackend, 1>::from_floats([2.0, 1.0], &device);

        let value = scalar_f64(masked_weighted_mse(pred, label, Some(weight), false));
        let expected = (2.0 * 1.0 + 1.0 * 9.0) / 2.0;
        assert!((value - expected).abs() < 1e-6);
    }
}
