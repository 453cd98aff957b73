// External imports
use ndarray::Array3;
use rayon::prelude::*;

// Internal imports
use crate::data::FillStrategy;
use crate::error::{ModelError, Result};

/// A prepared sequence split: `[N, T, d_feat + 1]` where the last
/// channel carries the label. The label of a sample is the last time
/// step's last channel; the remaining channels are features.
#[derive(Debug, Clone)]
pub struct SequenceSlice {
    data: Array3<f32>,
    index: Vec<String>,
}

impl SequenceSlice {
    pub fn new(data: Array3<f32>, index: Vec<String>) -> Result<Self> {
        if data.shape()[0] != index.len() {
            return Err(ModelError::Data(format!(
                "index length {} does not match sample count {}",
                index.len(),
                data.shape()[0]
            )));
        }
        if data.shape()[2] < 2 {
            return Err(ModelError::Data(
                "sequence data needs at least one feature channel and the label channel".into(),
            ));
        }
        Ok(Self { data, index })
    }

    pub fn len(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn seq_len(&self) -> usize {
        self.data.shape()[1]
    }

    /// Feature channels plus the label channel.
    pub fn channels(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn feature_dim(&self) -> usize {
        self.channels() - 1
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Applies the NaN policy to the feature channels of every sample.
    /// The label channel is left untouched so loss masking still sees
    /// missing targets.
    pub fn fill_na(&mut self, strategy: FillStrategy) -> Result<()> {
        let (steps, channels) = (self.seq_len(), self.channels());
        let features = channels - 1;
        let slice = self.data.as_slice_mut().ok_or_else(|| {
            ModelError::Data("sequence data is not contiguous".into())
        })?;

        match strategy {
            FillStrategy::FfillBfill => {
                slice.par_chunks_mut(steps * channels).for_each(|sample| {
                    for channel in 0..features {
                        ffill_bfill(sample, steps, channels, channel);
                    }
                });
            }
        }
        Ok(())
    }

    /// Gathers the selected samples' feature channels into a contiguous
    /// `[rows, T, d_feat]` buffer, one sample per rayon task.
    pub fn features_flat(&self, rows: &[usize]) -> Vec<f32> {
        let (steps, channels) = (self.seq_len(), self.channels());
        let features = channels - 1;
        rows.par_iter()
            .flat_map_iter(|&row| {
                let sample = self.data.index_axis(ndarray::Axis(0), row);
                (0..steps)
                    .flat_map(move |t| (0..features).map(move |c| sample[[t, c]]))
                    .collect::<Vec<f32>>()
            })
            .collect()
    }

    /// Label per selected sample: the last time step's last channel.
    pub fn labels(&self, rows: &[usize]) -> Vec<f32> {
        let last_step = self.seq_len() - 1;
        let label_channel = self.channels() - 1;
        rows.iter()
            .map(|&row| self.data[[row, last_step, label_channel]])
            .collect()
    }
}

/// Forward-fill then backward-fill one channel of one `[T, C]` sample
/// stored row-major in `sample`.
fn ffill_bfill(sample: &mut [f32], steps: usize, channels: usize, channel: usize) {
    let mut last_valid = f32::NAN;
    for t in 0..steps {
        let at = t * channels + channel;
        if sample[at].is_nan() {
            sample[at] = last_valid;
        } else {
            last_valid = sample[at];
        }
    }
    let mut next_valid = f32::NAN;
    for t in (0..steps).rev() {
        let at = t * channels + channel;
        if sample[at].is_nan() {
            sample[at] = next_valid;
        } else {
            next_valid = sample[at];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr3;

    #[test]
    fn ffill_bfill_repairs_feature_channels_only() {
        let data = arr3(&[[
            [f32::NAN, 0.5, f32::NAN],
            [2.0, f32::NAN, 0.6],
            [f32::NAN, 0.7, f32::NAN],
        ]]);
        let mut slice = SequenceSlice::new(data, vec!["r0".into()]).unwrap();
        slice.fill_na(FillStrategy::FfillBfill).unwrap();

        let data = slice.data();
        // First channel: bfilled to 2.0, then ffilled from 2.0.
        assert_eq!(data[[0, 0, 0]], 2.0);
        assert_eq!(data[[0, 2, 0]], 2.0);
        // Second channel ffilled.
        assert_eq!(data[[0, 1, 1]], 0.5);
        // Label channel (last) stays NaN.
        assert!(data[[0, 2, 2]].is_nan());
    }

    #[test]
    fn labels_read_last_step_last_channel() {
        let data = arr3(&[
            [[1.0, 10.0], [2.0, 20.0]],
            [[3.0, 30.0], [4.0, 40.0]],
        ]);
        let slice = SequenceSlice::new(data, vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(slice.labels(&[0, 1]), vec![20.0, 40.0]);
        assert_eq!(slice.features_flat(&[1]), vec![3.0, 4.0]);
    }
}
