//! Labeled test set loading
//!
//! The test CSV carries numeric telemetry columns plus one string label
//! column. The sorted set of distinct labels becomes the [`LabelUniverse`]
//! used as the axis order for every confusion matrix and per-class metric.

use ndarray::{s, Array2, Axis};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{EvalError, Result};

/// Sorted, de-duplicated class labels observed in the test set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelUniverse {
    labels: Vec<String>,
}

impl LabelUniverse {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();
        Self { labels }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Position of `label` on the matrix axes.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels
            .binary_search_by(|candidate| candidate.as_str().cmp(label))
            .ok()
    }
}

/// Named numeric feature columns, one row per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(EvalError::DataLoad(format!(
                "{} column names for {} feature columns",
                columns.len(),
                values.ncols()
            )));
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// First `min(n, rows)` rows, used for warm-up predictions.
    pub fn head(&self, n: usize) -> FeatureTable {
        let n = n.min(self.n_rows());
        FeatureTable {
            columns: self.columns.clone(),
            values: self.values.slice(s![..n, ..]).to_owned(),
        }
    }

    /// Reorder columns to match a model's feature schema.
    ///
    /// The column sets must be identical; a missing or unexpected column is
    /// a schema mismatch.
    pub fn project(&self, schema: &[String]) -> Result<Array2<f64>> {
        let missing: Vec<&str> = schema
            .iter()
            .filter(|name| !self.columns.contains(name))
            .map(String::as_str)
            .collect();
        let unexpected: Vec<&str> = self
            .columns
            .iter()
            .filter(|name| !schema.contains(name))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(EvalError::Prediction(format!(
                "feature schema mismatch (missing: [{}], unexpected: [{}])",
                missing.join(", "),
                unexpected.join(", ")
            )));
        }

        if schema == self.columns.as_slice() {
            return Ok(self.values.clone());
        }

        let order: Vec<usize> = schema
            .iter()
            .filter_map(|name| self.columns.iter().position(|c| c == name))
            .collect();
        Ok(self.values.select(Axis(1), &order))
    }
}

/// Feature rows with their ground-truth labels.
#[derive(Debug, Clone)]
pub struct TestDataset {
    pub features: FeatureTable,
    pub labels: Vec<String>,
    pub universe: LabelUniverse,
}

impl TestDataset {
    pub fn new(features: FeatureTable, labels: Vec<String>) -> Result<Self> {
        if features.n_rows() != labels.len() {
            return Err(EvalError::DataLoad(format!(
                "{} feature rows but {} labels",
                features.n_rows(),
                labels.len()
            )));
        }
        if labels.is_empty() {
            return Err(EvalError::DataLoad("test set has no rows".to_string()));
        }
        let universe = LabelUniverse::from_labels(labels.iter().cloned());
        Ok(Self {
            features,
            labels,
            universe,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }
}

/// Load the labeled test CSV at `path`.
pub fn load_test_dataset(path: &Path, label_column: &str) -> Result<TestDataset> {
    info!("Loading test set from {:?}", path);

    if !path.is_file() {
        return Err(EvalError::DataLoad(format!(
            "test file not found: {}",
            path.display()
        )));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| EvalError::DataLoad(format!("{}: {e}", path.display())))?;

    dataset_from_frame(&df, label_column)
}

fn dataset_from_frame(df: &DataFrame, label_column: &str) -> Result<TestDataset> {
    let label_series = df
        .column(label_column)
        .map_err(|_| EvalError::DataLoad(format!("missing label column '{label_column}'")))?
        .cast(&DataType::String)
        .map_err(|e| EvalError::DataLoad(format!("label column: {e}")))?;
    let label_values = label_series
        .str()
        .map_err(|e| EvalError::DataLoad(format!("label column: {e}")))?;

    if label_values.null_count() > 0 {
        return Err(EvalError::DataLoad(format!(
            "label column '{label_column}' has {} empty entries",
            label_values.null_count()
        )));
    }
    let labels: Vec<String> = label_values
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect();

    let feature_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| *name != label_column)
        .map(str::to_string)
        .collect();
    if feature_names.is_empty() {
        return Err(EvalError::DataLoad("test set has no feature columns".to_string()));
    }

    let n_rows = df.height();
    let mut values = Array2::<f64>::zeros((n_rows, feature_names.len()));
    for (j, name) in feature_names.iter().enumerate() {
        let column = df
            .column(name)
            .and_then(|series| series.cast(&DataType::Float64))
            .map_err(|e| EvalError::DataLoad(format!("column '{name}': {e}")))?;
        let column = column
            .f64()
            .map_err(|e| EvalError::DataLoad(format!("column '{name}': {e}")))?;

        for (i, cell) in column.into_iter().enumerate() {
            values[[i, j]] = cell.ok_or_else(|| {
                EvalError::DataLoad(format!(
                    "column '{name}' row {} is empty or not numeric",
                    i + 1
                ))
            })?;
        }
    }

    let dataset = TestDataset::new(FeatureTable::new(feature_names, values)?, labels)?;
    debug!(
        "Loaded {} rows, {} features, classes {:?}",
        dataset.n_rows(),
        dataset.features.columns().len(),
        dataset.universe.labels()
    );
    Ok(dataset)
}
