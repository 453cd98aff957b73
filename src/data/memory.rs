// External imports
use ndarray::Array3;
use rayon::prelude::*;
use std::collections::HashMap;

// Internal imports
use crate::data::sequence::SequenceSlice;
use crate::data::tabular::TabularSlice;
use crate::data::{DataKey, Segment, SequenceSource, TabularSource};
use crate::error::{ModelError, Result};

/// A dataset held fully in memory, with independently registered tabular
/// and sequence slices per segment. Serves the demo binary and the test
/// suite; production data handlers implement the source traits directly.
///
/// Both data keys return the same slice: an in-memory dataset carries a
/// single processed view of its data.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDataset {
    tabular: HashMap<Segment, TabularSlice>,
    sequence: HashMap<Segment, SequenceSlice>,
}

impl InMemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tabular(mut self, segment: Segment, slice: TabularSlice) -> Self {
        self.tabular.insert(segment, slice);
        self
    }

    pub fn with_sequence(mut self, segment: Segment, slice: SequenceSlice) -> Self {
        self.sequence.insert(segment, slice);
        self
    }
}

impl TabularSource for InMemoryDataset {
    fn segments(&self) -> Vec<Segment> {
        self.tabular.keys().cloned().collect()
    }

    fn prepare(&self, segment: &Segment, _data_key: DataKey) -> Result<TabularSlice> {
        self.tabular.get(segment).cloned().ok_or_else(|| {
            ModelError::Data(format!("segment `{}` has no tabular data", segment))
        })
    }
}

impl SequenceSource for InMemoryDataset {
    fn segments(&self) -> Vec<Segment> {
        self.sequence.keys().cloned().collect()
    }

    fn prepare(&self, segment: &Segment, _data_key: DataKey) -> Result<SequenceSlice> {
        self.sequence.get(segment).cloned().ok_or_else(|| {
            ModelError::Data(format!("segment `{}` has no sequence data", segment))
        })
    }
}

/// Builds flattened `[d_feat * T]` windows over per-row feature vectors.
/// Window `i` covers rows `i..i + seq_len`; its label and index row are
/// taken from the window's last row.
pub fn tabular_windows(
    rows: &[Vec<f64>],
    labels: &[f64],
    index: &[String],
    seq_len: usize,
) -> Result<TabularSlice> {
    check_window_inputs(rows, labels, index, seq_len)?;
    let count = rows.len() + 1 - seq_len;
    let d_feat = rows[0].len();

    let windows: Vec<Vec<f64>> = (0..count)
        .into_par_iter()
        .map(|start| {
            // Feature-major layout: all of feature f's steps, then the next
            // feature, matching the [N, F, T] reshape the GRU applies.
            let mut flat = Vec::with_capacity(d_feat * seq_len);
            for feature in 0..d_feat {
                for step in 0..seq_len {
                    flat.push(rows[start + step][feature]);
                }
            }
            flat
        })
        .collect();
    let window_labels: Vec<f64> = (0..count).map(|i| labels[i + seq_len - 1]).collect();
    let window_index: Vec<String> = (0..count).map(|i| index[i + seq_len - 1].clone()).collect();

    TabularSlice::from_rows(&windows, &window_labels, window_index)
}

/// Builds `[N, T, d_feat + 1]` sliding windows with the label as the
/// trailing channel, the layout the attention regressor consumes.
pub fn sequence_windows(
    rows: &[Vec<f64>],
    labels: &[f64],
    index: &[String],
    seq_len: usize,
) -> Result<SequenceSlice> {
    check_window_inputs(rows, labels, index, seq_len)?;
    let count = rows.len() + 1 - seq_len;
    let d_feat = rows[0].len();
    let channels = d_feat + 1;

    let buffer: Vec<f32> = (0..count)
        .into_par_iter()
        .flat_map_iter(|start| {
            let mut window = Vec::with_capacity(seq_len * channels);
            for step in 0..seq_len {
                let row = start + step;
                for feature in 0..d_feat {
                    window.push(rows[row][feature] as f32);
                }
                window.push(labels[row] as f32);
            }
            window
        })
        .collect();

    let data = Array3::from_shape_vec((count, seq_len, channels), buffer)
        .map_err(|e| ModelError::Data(e.to_string()))?;
    let window_index: Vec<String> = (0..count).map(|i| index[i + seq_len - 1].clone()).collect();
    SequenceSlice::new(data, window_index)
}

fn check_window_inputs(
    rows: &[Vec<f64>],
    labels: &[f64],
    index: &[String],
    seq_len: usize,
) -> Result<()> {
    if seq_len == 0 {
        return Err(ModelError::Data("seq_len must be positive".into()));
    }
    if rows.len() < seq_len {
        return Err(ModelError::Data(format!(
            "{} rows cannot form a window of {} steps",
            rows.len(),
            seq_len
        )));
    }
    if rows.len() != labels.len() || rows.len() != index.len() {
        return Err(ModelError::Data(format!(
            "rows ({}), labels ({}) and index ({}) must align",
            rows.len(),
            labels.len(),
            index.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
        let rows = vec![
            vec![1.0, 10.0],
            vec![2.0, 20.0],
            vec![3.0, 30.0],
            vec![4.0, 40.0],
        ];
        let labels = vec![0.1, 0.2, 0.3, 0.4];
        let index = (0..4).map(|i| format!("r{}", i)).collect();
        (rows, labels, index)
    }

    #[test]
    fn tabular_windows_are_feature_major() {
        let (rows, labels, index) = rows();
        let slice = tabular_windows(&rows, &labels, &index, 3).unwrap();
        assert_eq!(slice.len(), 2);
        assert_eq!(slice.feature_dim(), 6);
        // First window: feature 0 over steps 0..3, then feature 1.
        assert_eq!(
            slice.features().unwrap()[..6],
            [1.0, 2.0, 3.0, 10.0, 20.0, 30.0]
        );
        assert_eq!(slice.index(), &["r2".to_string(), "r3".to_string()]);
    }

    #[test]
    fn sequence_windows_append_label_channel() {
        let (rows, labels, index) = rows();
        let slice = sequence_windows(&rows, &labels, &index, 2).unwrap();
        assert_eq!(slice.len(), 3);
        assert_eq!(slice.channels(), 3);
        let data = slice.data();
        assert_eq!(data[[0, 0, 0]], 1.0);
        assert!((data[[0, 1, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn unknown_segment_is_an_error() {
        let dataset = InMemoryDataset::new();
        let err = TabularSource::prepare(&dataset, &Segment::Train, DataKey::Learn);
        assert!(matches!(err, Err(ModelError::Data(_))));
    }
}
