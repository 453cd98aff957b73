// External imports
use polars::prelude::*;

// Internal imports
use crate::constants::LABEL_COLUMN;
use crate::error::{ModelError, Result};

/// A prepared tabular split: one DataFrame row per sample, feature
/// columns holding the flattened `[d_feat * T]` window and a `label`
/// column that may contain NaN entries.
///
/// The row index travels alongside the frame so predictions can be
/// returned aligned to the original rows.
#[derive(Debug, Clone)]
pub struct TabularSlice {
    frame: DataFrame,
    index: Vec<String>,
}

impl TabularSlice {
    pub fn new(frame: DataFrame, index: Vec<String>) -> Result<Self> {
        if frame.height() != index.len() {
            return Err(ModelError::Data(format!(
                "index length {} does not match frame height {}",
                index.len(),
                frame.height()
            )));
        }
        if !frame.schema().contains(LABEL_COLUMN) {
            return Err(ModelError::Data(format!(
                "missing required column: {}",
                LABEL_COLUMN
            )));
        }
        Ok(Self { frame, index })
    }

    /// Builds a slice from per-sample feature rows and labels. Feature
    /// columns are named `f0..f{k-1}` in row order.
    pub fn from_rows(rows: &[Vec<f64>], labels: &[f64], index: Vec<String>) -> Result<Self> {
        if rows.len() != labels.len() {
            return Err(ModelError::Data(format!(
                "{} feature rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let width = rows.first().map_or(0, |r| r.len());
        let mut columns = Vec::with_capacity(width + 1);
        for j in 0..width {
            let values: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            columns.push(Series::new(format!("f{}", j).into(), values).into());
        }
        columns.push(Series::new(LABEL_COLUMN.into(), labels.to_vec()).into());
        Self::new(DataFrame::new(columns)?, index)
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Width of the flattened feature vector (`d_feat * T`).
    pub fn feature_dim(&self) -> usize {
        self.frame.width().saturating_sub(1)
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Drops every row containing a null or NaN entry in any feature or
    /// in the label.
    pub fn drop_na(&self) -> Result<TabularSlice> {
        let height = self.frame.height();
        let mut keep = vec![true; height];
        for column in self.frame.get_columns() {
            let values = column.f64()?;
            for row in 0..height {
                match values.get(row) {
                    Some(v) if !v.is_nan() => {}
                    _ => keep[row] = false,
                }
            }
        }

        let mask = BooleanChunked::from_slice("mask".into(), &keep);
        let frame = self.frame.filter(&mask)?;
        let index = self
            .index
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(name, _)| name.clone())
            .collect();
        TabularSlice::new(frame, index)
    }

    /// Flattens the feature columns into a contiguous row-major `f32`
    /// buffer of shape `[N, feature_dim]`.
    pub fn features(&self) -> Result<Vec<f32>> {
        let height = self.frame.height();
        let feature_columns: Vec<_> = self
            .frame
            .get_columns()
            .iter()
            .filter(|c| c.name() != LABEL_COLUMN)
            .collect();

        let mut buffer = Vec::with_capacity(height * feature_columns.len());
        let arrays: Vec<_> = feature_columns
            .iter()
            .map(|c| c.f64())
            .collect::<std::result::Result<_, _>>()?;
        for row in 0..height {
            for values in &arrays {
                buffer.push(values.get(row).unwrap_or(f64::NAN) as f32);
            }
        }
        Ok(buffer)
    }

    pub fn labels(&self) -> Result<Vec<f32>> {
        let values = self.frame.column(LABEL_COLUMN)?.f64()?;
        Ok((0..self.frame.height())
            .map(|row| values.get(row).unwrap_or(f64::NAN) as f32)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice_with_nan() -> TabularSlice {
        TabularSlice::from_rows(
            &[
                vec![1.0, 2.0],
                vec![f64::NAN, 3.0],
                vec![4.0, 5.0],
                vec![6.0, 7.0],
            ],
            &[0.1, 0.2, f64::NAN, 0.4],
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
        )
        .unwrap()
    }

    #[test]
    fn drop_na_removes_rows_with_nan_features_or_labels() {
        let clean = slice_with_nan().drop_na().unwrap();
        assert_eq!(clean.len(), 2);
        assert_eq!(clean.index(), &["a".to_string(), "d".to_string()]);
    }

    #[test]
    fn features_are_row_major() {
        let slice = slice_with_nan().drop_na().unwrap();
        assert_eq!(slice.features().unwrap(), vec![1.0, 2.0, 6.0, 7.0]);
        assert_eq!(slice.labels().unwrap(), vec![0.1, 0.4]);
    }

    #[test]
    fn missing_label_column_is_rejected() {
        let frame = DataFrame::new(vec![Series::new("f0".into(), vec![1.0]).into()]).unwrap();
        assert!(matches!(
            TabularSlice::new(frame, vec!["a".into()]),
            Err(ModelError::Data(_))
        ));
    }
}
