//! Train/validation splitting

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::deterministic::LcgRng;
use crate::errors::{PipelineError, Result};

/// Parameters for the train/validation split
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitParams {
    /// Fraction of rows assigned to validation, in (0, 1)
    #[serde(default = "default_val_size")]
    pub val_size: f64,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
}

fn default_val_size() -> f64 {
    0.2
}

fn default_random_state() -> u64 {
    42
}

fn default_shuffle() -> bool {
    true
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            val_size: default_val_size(),
            random_state: default_random_state(),
            shuffle: default_shuffle(),
        }
    }
}

impl SplitParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.val_size > 0.0 && self.val_size < 1.0) {
            return Err(PipelineError::config(format!(
                "splitting_params.val_size must be in (0, 1), got {}",
                self.val_size
            )));
        }
        Ok(())
    }

    /// Row counts (train, val) for a table of `n` rows
    pub fn sizes(&self, n: usize) -> Result<(usize, usize)> {
        self.validate()?;
        let n_val = (n as f64 * self.val_size).ceil() as usize;
        let n_train = n.saturating_sub(n_val);
        if n_val == 0 || n_train == 0 {
            return Err(PipelineError::config(format!(
                "val_size {} on {} rows leaves an empty train or validation set",
                self.val_size, n
            )));
        }
        Ok((n_train, n_val))
    }
}

/// Split a dataset into disjoint train and validation tables
///
/// Every row lands in exactly one side. With `shuffle` the row order is a
/// seeded permutation, so the same seed always yields the same split.
pub fn split_train_val(data: &Dataset, params: &SplitParams) -> Result<(Dataset, Dataset)> {
    let (n_train, n_val) = params.sizes(data.len())?;

    let mut order: Vec<usize> = (0..data.len()).collect();
    if params.shuffle {
        LcgRng::new(params.random_state).shuffle(&mut order);
    }

    let (train_idx, val_idx) = order.split_at(n_train);
    debug_assert_eq!(val_idx.len(), n_val);

    let train = data.select_rows(train_idx)?;
    let val = data.select_rows(val_idx)?;

    tracing::debug!(
        train_rows = train.len(),
        val_rows = val.len(),
        seed = params.random_state,
        "split dataset"
    );
    Ok((train, val))
}
