//! Training examples and query boundaries.

use std::ops::Range;

use ndarray::{Array2, ArrayView2};

use super::ConfigError;
use crate::error::{Error, Result};

// =============================================================================
// QueryBoundaries
// =============================================================================

/// Contiguous, disjoint document ranges sharing a query id.
///
/// Query `q` covers `bounds[q]..bounds[q + 1]`. The first bound is 0, the last
/// is the document count and bounds never decrease, so ranges cannot overlap.
/// Equal adjacent bounds describe an empty query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBoundaries {
    bounds: Vec<usize>,
}

impl QueryBoundaries {
    /// Validate `bounds` against `n_docs`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] when fewer than two bounds are given, the first
    /// is not 0, the last is not `n_docs`, or any bound decreases.
    pub fn new(bounds: Vec<usize>, n_docs: usize) -> Result<Self> {
        if bounds.len() < 2 {
            return Err(Error::invalid_input(format!(
                "query boundaries need at least 2 entries, got {}",
                bounds.len()
            )));
        }
        if bounds[0] != 0 {
            return Err(Error::invalid_input(format!(
                "first query boundary must be 0, got {}",
                bounds[0]
            )));
        }
        if let Some(q) = bounds.windows(2).position(|w| w[1] < w[0]) {
            return Err(Error::invalid_input(format!(
                "query boundaries decrease at query {q}: {} > {}",
                bounds[q],
                bounds[q + 1]
            )));
        }
        let last = bounds[bounds.len() - 1];
        if last != n_docs {
            return Err(Error::invalid_input(format!(
                "last query boundary must equal the document count {n_docs}, got {last}"
            )));
        }
        Ok(Self { bounds })
    }

    /// One query holding all `n_docs` documents.
    pub fn single(n_docs: usize) -> Self {
        Self {
            bounds: vec![0, n_docs],
        }
    }

    #[inline]
    pub fn n_queries(&self) -> usize {
        self.bounds.len() - 1
    }

    #[inline]
    pub fn n_docs(&self) -> usize {
        self.bounds[self.bounds.len() - 1]
    }

    #[inline]
    pub fn range(&self, query: usize) -> Range<usize> {
        self.bounds[query]..self.bounds[query + 1]
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.bounds.windows(2).map(|w| w[0]..w[1])
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.bounds
    }
}

// =============================================================================
// TrainingSet
// =============================================================================

/// Feature matrix (rows = documents), ratings, optional weights and query
/// boundaries for one training session.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    features: Array2<f32>,
    ratings: Vec<f32>,
    weights: Option<Vec<f32>>,
    queries: QueryBoundaries,
}

impl TrainingSet {
    /// Create a training set with all documents in one query.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when there are no ratings, no feature columns, the
    /// row counts disagree, or a rating is negative or not finite.
    pub fn new(features: Array2<f32>, ratings: Vec<f32>) -> Result<Self> {
        if ratings.is_empty() {
            return Err(ConfigError::EmptyLabels.into());
        }
        if features.ncols() == 0 {
            return Err(ConfigError::NoFeatures.into());
        }
        if features.nrows() != ratings.len() {
            return Err(ConfigError::ShapeMismatch {
                what: "feature matrix",
                expected: ratings.len(),
                found: features.nrows(),
            }
            .into());
        }
        if let Some((row, &value)) = ratings
            .iter()
            .enumerate()
            .find(|(_, r)| !(r.is_finite() && **r >= 0.0))
        {
            return Err(ConfigError::InvalidRating { row, value }.into());
        }
        let queries = QueryBoundaries::single(ratings.len());
        Ok(Self {
            features,
            ratings,
            weights: None,
            queries,
        })
    }

    /// Attach per-document weights. At least one must be positive.
    pub fn with_weights(mut self, weights: Vec<f32>) -> Result<Self> {
        if weights.len() != self.n_docs() {
            return Err(ConfigError::ShapeMismatch {
                what: "weights",
                expected: self.n_docs(),
                found: weights.len(),
            }
            .into());
        }
        if let Some((row, &value)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            return Err(ConfigError::InvalidWeight { row, value }.into());
        }
        if !weights.iter().any(|&w| w > 0.0) {
            return Err(ConfigError::ZeroTotalWeight { what: "weights" }.into());
        }
        self.weights = Some(weights);
        Ok(self)
    }

    /// Split documents into queries. See [`QueryBoundaries::new`].
    pub fn with_query_boundaries(mut self, bounds: Vec<usize>) -> Result<Self> {
        self.queries = QueryBoundaries::new(bounds, self.n_docs())?;
        Ok(self)
    }

    #[inline]
    pub fn n_docs(&self) -> usize {
        self.ratings.len()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> ArrayView2<'_, f32> {
        self.features.view()
    }

    pub fn ratings(&self) -> &[f32] {
        &self.ratings
    }

    pub fn weights(&self) -> Option<&[f32]> {
        self.weights.as_deref()
    }

    pub fn queries(&self) -> &QueryBoundaries {
        &self.queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn boundaries_accept_empty_queries() {
        let b = QueryBoundaries::new(vec![0, 3, 3, 5], 5).unwrap();
        assert_eq!(b.n_queries(), 3);
        assert_eq!(b.range(1), 3..3);
        assert_eq!(b.ranges().collect::<Vec<_>>(), vec![0..3, 3..3, 3..5]);
    }

    #[test]
    fn boundaries_reject_malformed_input() {
        for (bounds, n) in [
            (vec![0], 0),
            (vec![1, 5], 5),
            (vec![0, 4, 2, 5], 5),
            (vec![0, 3, 4], 5),
            (vec![0, 3, 6], 5),
        ] {
            let err = QueryBoundaries::new(bounds.clone(), n).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{bounds:?}: {err:?}");
        }
    }

    #[test]
    fn training_set_checks_shapes() {
        let features = array![[0.0f32, 1.0], [1.0, 0.0]];
        assert!(TrainingSet::new(features.clone(), vec![0.0, 1.0]).is_ok());

        let err = TrainingSet::new(features.clone(), vec![0.0]).unwrap_err();
        assert!(matches!(err, Error::Configuration(ConfigError::ShapeMismatch { .. })));

        let err = TrainingSet::new(Array2::zeros((0, 2)), vec![]).unwrap_err();
        assert!(matches!(err, Error::Configuration(ConfigError::EmptyLabels)));

        let err = TrainingSet::new(Array2::zeros((2, 0)), vec![0.0, 1.0]).unwrap_err();
        assert!(matches!(err, Error::Configuration(ConfigError::NoFeatures)));

        let err = TrainingSet::new(features.clone(), vec![0.0, -1.0]).unwrap_err();
        assert!(matches!(err, Error::Configuration(ConfigError::InvalidRating { row: 1, .. })));

        let err = TrainingSet::new(features, vec![0.0, 1.0])
            .unwrap()
            .with_weights(vec![1.0])
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(ConfigError::ShapeMismatch { what: "weights", .. })));
    }

    #[test]
    fn weights_need_positive_mass() {
        let set = || TrainingSet::new(Array2::zeros((3, 1)), vec![0.0, 1.0, 1.0]).unwrap();
        let err = set().with_weights(vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, Error::Configuration(ConfigError::ZeroTotalWeight { .. })), "{err:?}");
        assert!(set().with_weights(vec![0.0, 0.0, 0.5]).is_ok());
    }

    #[test]
    fn training_set_query_boundaries() {
        let set = TrainingSet::new(Array2::zeros((4, 1)), vec![0.0; 4])
            .unwrap()
            .with_query_boundaries(vec![0, 1, 4])
            .unwrap();
        assert_eq!(set.queries().n_queries(), 2);
        assert_eq!(set.queries().n_docs(), 4);
    }
}
