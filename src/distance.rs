use ndarray::{Array2, Axis};
use num_traits::Float;

/// Determine the N x N pairwise distance matrix for a collection of data.
/// Feature-space distances drive nearest-neighbor imputation; cluster labels
/// are never used here.
pub trait Distance<F>
where
    F: Float + Send + Sync,
{
    /// Generate an N x N matrix in which each (i,j) index represents the
    /// distance between row i and row j of `x`
    fn distances(&self, x: &Array2<F>) -> Array2<F>;
}

/// Perform distance calculation as `sum((row_i - row_j)**2)`
///
///     use ndarray::{arr2, Zip};
///     use consensuscluster::{Euclidean, Distance};
///
///     let x = arr2(&[[1., 1., 1.], [2., 2., 2.], [3., 3., 3.]]);
///     let d = Euclidean::default().distances(&x);
///     let actual = arr2(&[[0., 3.0, 12.0], [3.0, 0., 3.0], [12.0, 3.0, 0.]]);
///     Zip::from(&d)
///         .and(&actual)
///         .for_each(|a: &f64, b: &f64| assert!((a - b).abs() < 1e-8));
#[derive(Debug, Default, Clone)]
pub struct Euclidean;

impl<F> Distance<F> for Euclidean
where
    F: Float + Send + Sync,
{
    fn distances(&self, x: &Array2<F>) -> Array2<F> {
        let x_dim = x.dim();
        let mut out = Array2::<F>::zeros((x_dim.0, x_dim.0));
        x.axis_iter(Axis(0)).enumerate().for_each(|(idx1, row1)| {
            x.axis_iter(Axis(0)).enumerate().for_each(|(idx2, row2)| {
                // Calculate values for half of matrix, copy over for remaining
                if idx2 > idx1 {
                    let mut row_diff = &row1 - &row2;
                    row_diff.map_inplace(|a| *a = (*a).powi(2));
                    out[[idx1, idx2]] = row_diff.sum();
                } else {
                    out[[idx1, idx2]] = out[[idx2, idx1]];
                }
            });
        });
        out
    }
}
