pub mod memory;
pub mod reweight;
pub mod sequence;
pub mod tabular;

// External imports
use polars::prelude::*;
use std::fmt;

// Internal imports
use crate::error::Result;
use sequence::SequenceSlice;
use tabular::TabularSlice;

/// A named partition of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Train,
    Valid,
    Test,
    Custom(String),
}

impl Segment {
    pub fn name(&self) -> &str {
        match self {
            Segment::Train => "train",
            Segment::Valid => "valid",
            Segment::Test => "test",
            Segment::Custom(name) => name,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which processing stage of the data to prepare: label-fitted data for
/// learning, inference-processed data for prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKey {
    Learn,
    Infer,
}

/// NaN-handling policy applied to a prepared slice before batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStrategy {
    /// Forward-fill along the time axis, then backward-fill what remains.
    FfillBfill,
}

/// Source of flat feature rows (`[N, d_feat * T]`) with a scalar label
/// per row. The GRU regressor consumes this.
pub trait TabularSource {
    fn segments(&self) -> Vec<Segment>;
    fn prepare(&self, segment: &Segment, data_key: DataKey) -> Result<TabularSlice>;
}

/// Source of per-step sequences (`[N, T, d_feat + 1]`, label in the last
/// channel). The attention regressor consumes this.
pub trait SequenceSource {
    fn segments(&self) -> Vec<Segment>;
    fn prepare(&self, segment: &Segment, data_key: DataKey) -> Result<SequenceSlice>;
}

/// Predictions aligned one-to-one with the prepared slice's row index,
/// in the same order.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub index: Vec<String>,
    pub values: Vec<f64>,
}

impl Prediction {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let df = DataFrame::new(vec![
            Series::new("index".into(), self.index.clone()).into(),
            Series::new("pred".into(), self.values.clone()).into(),
        ])?;
        Ok(df)
    }
}
