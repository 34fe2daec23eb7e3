//! Fixed-target random-forest objective.
//!
//! Every tree is grown against the original `±1` target rather than a running
//! residual, so a gradient pass does not depend on earlier trees. Gradients
//! are computed per query; queries cover disjoint document ranges, so each
//! worker writes its own slice of the buffer without synchronization.

use super::dataset::QueryBoundaries;
use crate::error::{Error, Result};
use crate::utils::Parallelism;

/// Per-document gradient target for the random-forest objective.
#[derive(Debug, Clone)]
pub struct RandomForestObjective {
    labels: Vec<bool>,
    queries: QueryBoundaries,
    max_tree_output: f32,
    /// One gradient per document, rewritten by every pass.
    gradients: Vec<f32>,
}

impl RandomForestObjective {
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if the boundaries do not cover exactly the
    /// labelled documents, or `max_tree_output` is not positive and finite.
    pub fn new(labels: Vec<bool>, queries: QueryBoundaries, max_tree_output: f32) -> Result<Self> {
        if queries.n_docs() != labels.len() {
            return Err(Error::invalid_input(format!(
                "query boundaries cover {} documents but {} labels were given",
                queries.n_docs(),
                labels.len()
            )));
        }
        if !(max_tree_output.is_finite() && max_tree_output > 0.0) {
            return Err(Error::invalid_input(format!(
                "max_tree_output must be positive and finite, got {max_tree_output}"
            )));
        }
        let gradients = vec![0.0; labels.len()];
        Ok(Self {
            labels,
            queries,
            max_tree_output,
            gradients,
        })
    }

    #[inline]
    pub fn n_docs(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn n_queries(&self) -> usize {
        self.queries.n_queries()
    }

    /// Leaf output bound handed to the tree grower. Not applied here.
    #[inline]
    pub fn max_tree_output(&self) -> f32 {
        self.max_tree_output
    }

    pub fn labels(&self) -> &[bool] {
        &self.labels
    }

    /// Gradients from the most recent pass (zeros before the first one).
    pub fn gradients(&self) -> &[f32] {
        &self.gradients
    }

    /// Write the gradients of query `query` into `out`, which must have the
    /// query's length. Empty queries are no-ops.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if `query` is out of range or `out` does not
    /// match the query's document count. `out` is untouched on error.
    pub fn gradient_for_query(&self, query: usize, out: &mut [f32]) -> Result<()> {
        if query >= self.n_queries() {
            return Err(Error::invalid_input(format!(
                "query {query} out of range, objective has {} queries",
                self.n_queries()
            )));
        }
        let range = self.queries.range(query);
        if out.len() != range.len() {
            return Err(Error::invalid_input(format!(
                "gradient buffer for query {query} holds {} values, query has {} documents",
                out.len(),
                range.len()
            )));
        }
        fill_targets(&self.labels[range], out);
        Ok(())
    }

    /// Run one full gradient pass and return the buffer.
    ///
    /// The buffer is split into one disjoint slice per query; with
    /// [`Parallelism::Parallel`] the slices are filled on the rayon pool.
    pub fn compute_gradients(&mut self, parallelism: Parallelism) -> &[f32] {
        let Self {
            labels,
            queries,
            gradients,
            ..
        } = &mut *self;
        let labels = labels.as_slice();

        let mut tasks = Vec::with_capacity(queries.n_queries());
        let mut rest = gradients.as_mut_slice();
        for range in queries.ranges() {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
            tasks.push((&labels[range], head));
            rest = tail;
        }
        debug_assert!(rest.is_empty());

        parallelism.maybe_par_for_each(tasks, |(query_labels, out)| fill_targets(query_labels, out));
        &self.gradients
    }
}

#[inline]
fn fill_targets(labels: &[bool], out: &mut [f32]) {
    debug_assert_eq!(labels.len(), out.len());
    for (g, &label) in out.iter_mut().zip(labels) {
        *g = if label { 1.0 } else { -1.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objective(labels: &[bool], bounds: &[usize]) -> RandomForestObjective {
        let queries = QueryBoundaries::new(bounds.to_vec(), labels.len()).unwrap();
        RandomForestObjective::new(labels.to_vec(), queries, 100.0).unwrap()
    }

    #[test]
    fn gradients_follow_labels() {
        let mut obj = objective(&[true, false, true, false, true], &[0, 3, 5]);
        for parallelism in [Parallelism::Sequential, Parallelism::Parallel] {
            assert_eq!(obj.compute_gradients(parallelism), &[1.0, -1.0, 1.0, -1.0, 1.0]);
        }
        assert_eq!(obj.n_queries(), 2);
    }

    #[test]
    fn gradients_are_fixed_across_passes() {
        let mut obj = objective(&[true, true, false], &[0, 1, 3]);
        let first = obj.compute_gradients(Parallelism::Sequential).to_vec();
        let second = obj.compute_gradients(Parallelism::Parallel).to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn single_query_fill() {
        let obj = objective(&[false, true, true, false], &[0, 2, 2, 4]);
        let mut out = [0.0f32; 2];
        obj.gradient_for_query(2, &mut out).unwrap();
        assert_eq!(out, [1.0, -1.0]);

        // empty query
        let mut empty: [f32; 0] = [];
        obj.gradient_for_query(1, &mut empty).unwrap();
    }

    #[test]
    fn single_query_rejects_bad_arguments() {
        let obj = objective(&[true, false, true, false, true], &[0, 3, 5]);

        let mut out = [9.0f32; 2];
        let err = obj.gradient_for_query(2, &mut out).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");

        let mut short = [9.0f32; 1];
        let err = obj.gradient_for_query(0, &mut short).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
        assert_eq!(short, [9.0]);

        let mut long = [9.0f32; 4];
        assert!(obj.gradient_for_query(1, &mut long).is_err());
        assert_eq!(long, [9.0; 4]);
    }

    #[test]
    fn many_queries_in_parallel() {
        let n = 10_000;
        let labels: Vec<bool> = (0..n).map(|i| i % 3 == 0).collect();
        let bounds: Vec<usize> = (0..=n).step_by(7).chain(std::iter::once(n)).collect();
        let mut obj = objective(&labels, &bounds);
        let grads = obj.compute_gradients(Parallelism::Parallel);
        assert!(grads
            .iter()
            .zip(&labels)
            .all(|(&g, &l)| g == if l { 1.0 } else { -1.0 }));
    }

    #[test]
    fn rejects_mismatched_documents() {
        let queries = QueryBoundaries::single(3);
        let err = RandomForestObjective::new(vec![true; 4], queries, 1.0).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = RandomForestObjective::new(vec![true; 3], QueryBoundaries::single(3), 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
