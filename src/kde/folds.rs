use crate::cno_errors::CnoError;

/// Contiguous, unshuffled k-fold partition of `0..n`.
///
/// The first `n mod k` folds hold `n / k + 1` indices, the others `n / k`.
/// Each fold is used once as the held-out set, the remaining indices forming
/// the training set. No randomness is involved, so a given `(n, k)` always
/// yields the same split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    n_splits: usize,
}

/// One `(train, test)` split of sample indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl KFold {
    pub fn new(n_splits: usize) -> Result<Self, CnoError> {
        if n_splits < 2 {
            return Err(CnoError::InvalidConfig(format!(
                "k-fold cross-validation needs at least 2 splits, got {n_splits}"
            )));
        }
        Ok(KFold { n_splits })
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<FoldSplit>, CnoError> {
        if self.n_splits > n_samples {
            return Err(CnoError::DegenerateDensity(format!(
                "cannot split {n_samples} samples into {} folds",
                self.n_splits
            )));
        }

        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;

        let mut start = 0;
        let splits = (0..self.n_splits)
            .map(|fold| {
                let size = base + usize::from(fold < extra);
                let end = start + size;
                let split = FoldSplit {
                    train: (0..start).chain(end..n_samples).collect(),
                    test: (start..end).collect(),
                };
                start = end;
                split
            })
            .collect();
        Ok(splits)
    }
}

#[cfg(test)]
mod folds_test {
    use super::*;

    #[test]
    fn test_fold_sizes() {
        let splits = KFold::new(7).unwrap().split(20).unwrap();
        let sizes: Vec<usize> = splits.iter().map(|s| s.test.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 3, 3, 3, 2]);
        assert_eq!(splits[1].test, vec![3, 4, 5]);
        assert_eq!(splits[1].train.len(), 17);
        assert!(!splits[1].train.contains(&4));
    }

    #[test]
    fn test_leave_one_out() {
        let splits = KFold::new(5).unwrap().split(5).unwrap();
        for (i, split) in splits.iter().enumerate() {
            assert_eq!(split.test, vec![i]);
            assert_eq!(split.train.len(), 4);
        }
    }

    #[test]
    fn test_invalid_splits() {
        assert!(KFold::new(1).is_err());
        assert!(KFold::new(7).unwrap().split(6).is_err());
    }
}
