//! Feature transformation for tabular data
//!
//! A `FeatureTransformer` is built unfit from `FeatureParams`, fitted once on
//! training data, and then applied unchanged to validation and inference
//! tables:
//! - Categorical columns: most-frequent imputation + one-hot encoding
//! - Numerical columns: mean imputation + optional standard scaling
//!
//! Categories unseen during fitting encode as an all-zero one-hot block.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::dataset::{Cell, Dataset};
use crate::errors::{PipelineError, Result};

/// Binary class labels (0 or 1)
pub type Labels = Vec<u8>;

/// Column roles for the feature pipeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureParams {
    pub target_col: String,
    #[serde(default)]
    pub categorical_features: Vec<String>,
    #[serde(default)]
    pub numerical_features: Vec<String>,
    #[serde(default)]
    pub features_to_drop: Vec<String>,
    #[serde(default = "default_normalize")]
    pub normalize_numerical: bool,
}

fn default_normalize() -> bool {
    true
}

impl FeatureParams {
    /// Feature columns in output order (categorical first)
    pub fn feature_columns(&self) -> Vec<String> {
        self.categorical_features
            .iter()
            .chain(&self.numerical_features)
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_col.trim().is_empty() {
            return Err(PipelineError::config("feature_params.target_col is empty"));
        }

        let columns = self.feature_columns();
        if columns.is_empty() {
            return Err(PipelineError::config(
                "feature_params needs at least one categorical or numerical feature",
            ));
        }

        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(PipelineError::config(format!(
                    "feature '{}' is listed more than once",
                    name
                )));
            }
            if *name == self.target_col {
                return Err(PipelineError::config(format!(
                    "target column '{}' is also listed as a feature",
                    name
                )));
            }
            if self.features_to_drop.contains(name) {
                return Err(PipelineError::config(format!(
                    "feature '{}' is also listed in features_to_drop",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Numeric feature matrix, row-major
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(feature_names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != feature_names.len())
        {
            return Err(PipelineError::config(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                feature_names.len()
            )));
        }
        Ok(Self {
            feature_names,
            rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

/// Most-frequent imputation followed by one-hot encoding
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub column: String,
    pub fill_value: String,
    pub categories: Vec<String>,
}

impl CategoricalEncoder {
    fn fit(column: &str, cells: &[Cell]) -> Result<Self> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for key in cells.iter().filter_map(Cell::category_key) {
            *counts.entry(key).or_insert(0) += 1;
        }

        // BTreeMap iterates in key order, so ties go to the smallest category
        let fill_value = counts
            .iter()
            .fold(None::<(&String, usize)>, |best, (key, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((key, count)),
            })
            .map(|(key, _)| key.clone())
            .ok_or_else(|| {
                PipelineError::format(format!("categorical column '{}' has no values", column))
            })?;

        Ok(Self {
            column: column.to_string(),
            fill_value,
            categories: counts.into_keys().collect(),
        })
    }

    fn feature_names(&self) -> impl Iterator<Item = String> + '_ {
        self.categories
            .iter()
            .map(move |category| format!("{}={}", self.column, category))
    }

    fn encode(&self, cell: &Cell, out: &mut Vec<f64>) {
        let key = cell.category_key().unwrap_or_else(|| self.fill_value.clone());
        out.extend(
            self.categories
                .iter()
                .map(|category| if *category == key { 1.0 } else { 0.0 }),
        );
    }
}

/// Mean imputation followed by optional standard scaling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumericalScaler {
    pub column: String,
    pub mean: f64,
    /// Divisor applied after centering; 1.0 when scaling is off or the
    /// column is constant
    pub scale: f64,
    pub center: bool,
}

impl NumericalScaler {
    fn fit(column: &str, cells: &[Cell], normalize: bool) -> Result<Self> {
        let values = numeric_values(column, cells)?;
        let observed: Vec<f64> = values.iter().flatten().copied().collect();
        if observed.is_empty() {
            return Err(PipelineError::format(format!(
                "numerical column '{}' has no values",
                column
            )));
        }

        let mean = observed.iter().sum::<f64>() / observed.len() as f64;

        // Variance of the imputed column: imputed rows sit on the mean
        let variance =
            observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        let std_dev = variance.sqrt();

        let scale = if normalize && std_dev > f64::EPSILON {
            std_dev
        } else {
            1.0
        };

        Ok(Self {
            column: column.to_string(),
            mean,
            scale,
            center: normalize,
        })
    }

    fn apply(&self, value: Option<f64>) -> f64 {
        let value = value.unwrap_or(self.mean);
        if self.center {
            (value - self.mean) / self.scale
        } else {
            value
        }
    }
}

fn numeric_values(column: &str, cells: &[Cell]) -> Result<Vec<Option<f64>>> {
    cells
        .iter()
        .enumerate()
        .map(|(row, cell)| match cell {
            Cell::Number(v) => Ok(Some(*v)),
            Cell::Missing => Ok(None),
            Cell::Text(text) => Err(PipelineError::format(format!(
                "numerical column '{}' row {}: '{}' is not a number",
                column, row, text
            ))),
        })
        .collect()
}

/// Statistics computed during fitting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedColumns {
    pub categorical: Vec<CategoricalEncoder>,
    pub numerical: Vec<NumericalScaler>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransformerState {
    Unfit,
    Fitted(FittedColumns),
}

/// Mapping from raw columns to a numeric feature matrix
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransformer {
    params: FeatureParams,
    state: TransformerState,
}

impl FeatureTransformer {
    pub fn params(&self) -> &FeatureParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.state, TransformerState::Fitted(_))
    }

    fn fitted(&self) -> Result<&FittedColumns> {
        match &self.state {
            TransformerState::Fitted(columns) => Ok(columns),
            TransformerState::Unfit => Err(PipelineError::state(
                "feature transformer is not fitted (call fit_transformer first)",
            )),
        }
    }

    /// Output feature names in matrix column order
    pub fn feature_names(&self) -> Result<Vec<String>> {
        let fitted = self.fitted()?;
        let mut names: Vec<String> = fitted
            .categorical
            .iter()
            .flat_map(CategoricalEncoder::feature_names)
            .collect();
        names.extend(fitted.numerical.iter().map(|n| n.column.clone()));
        Ok(names)
    }
}

/// Construct an unfit transformer
pub fn build_transformer(params: &FeatureParams) -> FeatureTransformer {
    FeatureTransformer {
        params: params.clone(),
        state: TransformerState::Unfit,
    }
}

/// Fit the transformer on training data
///
/// Returns the fitted transformer together with the input projected onto
/// the feature columns. This is the only place statistics are computed.
#[instrument(skip_all, fields(rows = data.len()))]
pub fn fit_transformer(
    transformer: FeatureTransformer,
    data: &Dataset,
) -> Result<(FeatureTransformer, Dataset)> {
    if transformer.is_fitted() {
        return Err(PipelineError::state(
            "feature transformer is already fitted; build a new one to refit",
        ));
    }

    let params = transformer.params;
    params.validate()?;

    for name in &params.features_to_drop {
        if !data.has_column(name) {
            return Err(PipelineError::config(format!(
                "column '{}' listed in features_to_drop not found in dataset",
                name
            )));
        }
    }

    let projected = data.select_columns(&params.feature_columns())?;

    let categorical = params
        .categorical_features
        .iter()
        .map(|name| CategoricalEncoder::fit(name, projected.column(name)?))
        .collect::<Result<Vec<_>>>()?;

    let numerical = params
        .numerical_features
        .iter()
        .map(|name| NumericalScaler::fit(name, projected.column(name)?, params.normalize_numerical))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        categorical = categorical.len(),
        numerical = numerical.len(),
        "fitted feature transformer"
    );

    let fitted = FeatureTransformer {
        params,
        state: TransformerState::Fitted(FittedColumns {
            categorical,
            numerical,
        }),
    };
    Ok((fitted, projected))
}

/// Apply a fitted transformer to any table with the training schema
pub fn make_features(transformer: &FeatureTransformer, data: &Dataset) -> Result<FeatureMatrix> {
    let fitted = transformer.fitted()?;
    let feature_names = transformer.feature_names()?;

    let categorical: Vec<&[Cell]> = fitted
        .categorical
        .iter()
        .map(|enc| data.column(&enc.column))
        .collect::<Result<_>>()?;

    let numerical: Vec<Vec<Option<f64>>> = fitted
        .numerical
        .iter()
        .map(|scaler| numeric_values(&scaler.column, data.column(&scaler.column)?))
        .collect::<Result<_>>()?;

    let mut rows = Vec::with_capacity(data.len());
    for row in 0..data.len() {
        let mut values = Vec::with_capacity(feature_names.len());
        for (encoder, cells) in fitted.categorical.iter().zip(&categorical) {
            encoder.encode(&cells[row], &mut values);
        }
        for (scaler, column) in fitted.numerical.iter().zip(&numerical) {
            values.push(scaler.apply(column[row]));
        }
        rows.push(values);
    }

    FeatureMatrix::new(feature_names, rows)
}

/// Pull the binary label column out of a table
pub fn extract_target(data: &Dataset, params: &FeatureParams) -> Result<Labels> {
    data.column(&params.target_col)?
        .iter()
        .enumerate()
        .map(|(row, cell)| match cell.as_number() {
            Some(v) if v == 0.0 => Ok(0),
            Some(v) if v == 1.0 => Ok(1),
            _ => Err(PipelineError::format(format!(
                "target column '{}' row {}: expected 0 or 1, got {:?}",
                params.target_col, row, cell
            ))),
        })
        .collect()
}

/// New table without the label column
pub fn drop_target(data: &Dataset, params: &FeatureParams) -> Result<Dataset> {
    data.drop_column(&params.target_col)
}
