//! Seeded shuffle split into training and held-out evaluation indices.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ModelError;

/// Row indices of the two subsets. Together they cover `0..n` exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl TrainTestSplit {
    /// `mask[i]` is true when row `i` is held out. Built in one pass.
    pub fn test_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.train.len() + self.test.len()];
        for &i in &self.test {
            mask[i] = true;
        }
        mask
    }
}

/// Shuffle `0..n` and carve off `ceil(test_fraction · n)` rows for evaluation.
///
/// The first `n_test` indices of the permutation form the test subset and the
/// remainder the training subset. Both must be non-empty.
pub fn train_test_split<R: Rng + ?Sized>(
    n: usize,
    test_fraction: f64,
    rng: &mut R,
) -> Result<TrainTestSplit, ModelError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ModelError::InvalidParameter(format!(
            "test fraction must lie in (0, 1), got {test_fraction}"
        )));
    }
    let n_test = (test_fraction * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(ModelError::NotEnoughSamples { needed: 2, got: n });
    }

    let mut permutation: Vec<usize> = (0..n).collect();
    permutation.shuffle(rng);
    let train = permutation.split_off(n_test);

    Ok(TrainTestSplit {
        train,
        test: permutation,
    })
}
