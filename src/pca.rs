//! PCA over a 3-D stack of raster bands.

use ndarray::{Array1, Array2, Array3, ArrayView1, Axis};
use ndarray_linalg::{Eigh, UPLO};

use log::{debug, info};

use crate::error::{Error, Result};

/// Standard deviations within this threshold of zero are replaced by 1.0
/// before dividing, so a constant stack standardizes to zeros.
const SCALE_SANITIZATION_THRESHOLD: f64 = 1e-9;

/// Principal component analysis over a stack of raster bands.
///
/// The struct owns the input stack of shape (N layers, H rows, W columns)
/// and a component count fixed at construction. All derived state (mean,
/// components, scores, variance statistics) is populated by
/// [`fit_transform`](Pca::fit_transform); calling it again re-derives the
/// model from the same stored stack and overwrites the previous state.
///
/// Standardization uses *global scalar* statistics computed over every
/// element of the stack, not per-column statistics. The covariance matrix is
/// computed over the standardized stack flattened along its leading axis, so
/// the feature count equals the stack width W.
pub struct Pca {
    n_components: usize,
    stack: Array3<f64>,
    mean: Option<f64>,
    std_dev: Option<f64>,
    components: Option<Array2<f64>>,
    principal_components: Option<Array2<f64>>,
    explained_variance: Option<f64>,
    explained_variance_ratio: Option<Array1<f64>>,
}

impl Pca {
    /// Creates an unfitted model for the given stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyStack`] if any dimension of the stack is zero,
    /// and [`Error::InvalidComponentCount`] unless
    /// `1 <= n_components <= W` where W is the stack width.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use raster_pca::Pca;
    ///
    /// let stack = array![[[1.0, 2.0], [3.0, 4.0]]];
    /// let pca = Pca::new(1, stack).unwrap();
    /// assert_eq!(pca.n_components(), 1);
    /// ```
    pub fn new(n_components: usize, stack: Array3<f64>) -> Result<Self> {
        let (layers, rows, cols) = stack.dim();
        if layers == 0 || rows == 0 || cols == 0 {
            return Err(Error::EmptyStack);
        }
        if n_components == 0 || n_components > cols {
            return Err(Error::InvalidComponentCount {
                requested: n_components,
                max: cols,
            });
        }
        Ok(Self {
            n_components,
            stack,
            mean: None,
            std_dev: None,
            components: None,
            principal_components: None,
            explained_variance: None,
            explained_variance_ratio: None,
        })
    }

    /// Returns the component count fixed at construction.
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Global mean of the input stack, recorded by standardization.
    pub fn mean(&self) -> Option<f64> {
        self.mean
    }

    /// Sanitized global standard deviation of the input stack.
    pub fn std_dev(&self) -> Option<f64> {
        self.std_dev
    }

    /// Top-k eigenvectors of the covariance matrix, shape (W, n_components).
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    /// Projected data, shape (N * H, n_components).
    pub fn principal_components(&self) -> Option<&Array2<f64>> {
        self.principal_components.as_ref()
    }

    /// Variance of the values of the `components` matrix.
    pub fn explained_variance(&self) -> Option<f64> {
        self.explained_variance
    }

    /// Per-eigenvalue ratio over all W eigenvalues, descending order.
    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.explained_variance_ratio.as_ref()
    }

    /// Standardizes an array with the global scalar statistics of that array.
    ///
    /// Returns `(x - mean(x)) / std(x)` where both statistics are computed
    /// over every element of `x`, and records them on the model. A standard
    /// deviation within `1e-9` of zero is replaced by 1.0 before dividing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyStack`] if `x` has no elements.
    pub fn standardize(&mut self, x: &Array3<f64>) -> Result<Array3<f64>> {
        let (mean, std_dev) = global_stats(x)?;
        self.mean = Some(mean);
        self.std_dev = Some(std_dev);
        Ok(x.mapv(|v| (v - mean) / std_dev))
    }

    /// Fits the model to the stored stack and returns the projected data.
    ///
    /// The stack is standardized with global scalar statistics, flattened
    /// along its leading axis to an (N * H) x W matrix, and the covariance
    /// matrix of that matrix (columns as variables, normalized by n - 1) is
    /// eigendecomposed. Eigenpairs are sorted by eigenvalue descending and
    /// the top `n_components` eigenvectors become the model's components.
    /// The flattened standardized matrix is projected onto them to produce
    /// the principal component scores.
    ///
    /// The explained variance (variance of the components matrix's values)
    /// and the explained variance ratio (every eigenvalue divided by the
    /// explained variance, so its length equals W rather than
    /// `n_components`) are computed and stored as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooFewRows`] if the flattened stack has fewer than 2
    /// rows, and [`Error::Covariance`] if the eigendecomposition of the
    /// covariance matrix fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use raster_pca::Pca;
    ///
    /// let stack = array![
    ///     [[1.0, 2.0], [3.0, 4.0]],
    ///     [[2.0, 1.0], [4.0, 3.0]],
    /// ];
    /// let mut pca = Pca::new(1, stack).unwrap();
    /// let scores = pca.fit_transform().unwrap();
    /// assert_eq!(scores.dim(), (4, 1));
    /// ```
    pub fn fit_transform(&mut self) -> Result<Array2<f64>> {
        let (layers, rows, cols) = self.stack.dim();
        let flat_rows = layers * rows;
        if flat_rows < 2 {
            return Err(Error::TooFewRows(flat_rows));
        }

        info!(
            "fitting PCA with {} components on a {}x{}x{} stack",
            self.n_components, layers, rows, cols
        );

        let (mean, std_dev) = global_stats(&self.stack)?;
        self.mean = Some(mean);
        self.std_dev = Some(std_dev);
        let standardized = self.stack.mapv(|v| (v - mean) / std_dev);

        // (N, H, W) -> (N * H, W)
        let flattened = standardized.into_shape_with_order((flat_rows, cols))?;

        // Covariance with columns as variables, normalized by n - 1.
        let column_means = flattened
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::Covariance("failed to compute column means".into()))?;
        let centered = &flattened - &column_means;
        let mut cov_matrix = centered.t().dot(&centered);
        cov_matrix /= (flat_rows - 1) as f64;
        debug!(
            "covariance matrix is {}x{}",
            cov_matrix.nrows(),
            cov_matrix.ncols()
        );

        let (vals, vecs) = cov_matrix.eigh(UPLO::Upper).map_err(|e| {
            Error::Covariance(format!(
                "eigendecomposition of covariance matrix failed: {}",
                e
            ))
        })?;

        let mut eig_pairs: Vec<(f64, Array1<f64>)> = vals
            .into_iter()
            .zip(vecs.columns().into_iter().map(|col| col.to_owned()))
            .collect();
        eig_pairs
            .sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let views: Vec<ArrayView1<f64>> = eig_pairs[..self.n_components]
            .iter()
            .map(|(_, vec)| vec.view())
            .collect();
        let components = ndarray::stack(Axis(1), &views)?;

        // The projection uses the standardized matrix as-is, without the
        // column centering applied for the covariance.
        let principal_components = flattened.dot(&components);

        let eigenvalues =
            Array1::from(eig_pairs.iter().map(|(val, _)| *val).collect::<Vec<_>>());
        let explained_variance = components.var(0.0);
        debug!(
            "top eigenvalue {:.6e}, explained variance {:.6e}",
            eigenvalues[0], explained_variance
        );

        self.explained_variance_ratio = Some(eigenvalues.mapv(|val| val / explained_variance));
        self.explained_variance = Some(explained_variance);
        self.components = Some(components);
        self.principal_components = Some(principal_components.clone());

        Ok(principal_components)
    }

    /// Reconstructs an approximation of the standardized input from scores.
    ///
    /// Computes `scores . components^T + mean`. Pure with respect to the
    /// model: no state is mutated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFitted`] before [`fit_transform`](Pca::fit_transform)
    /// has run, and [`Error::Reconstruction`] if the score column count does
    /// not match the model's component count.
    pub fn inverse_transform(&self, principal_components: &Array2<f64>) -> Result<Array2<f64>> {
        let components = self.components.as_ref().ok_or(Error::NotFitted)?;
        let mean = self.mean.ok_or(Error::NotFitted)?;
        if principal_components.ncols() != components.ncols() {
            return Err(Error::Reconstruction(format!(
                "scores have {} columns but the model keeps {} components",
                principal_components.ncols(),
                components.ncols()
            )));
        }
        Ok(principal_components.dot(&components.t()) + mean)
    }

    /// Mean squared error between the standardized stack and its
    /// reconstruction from the stored principal components.
    ///
    /// The reconstruction is reshaped to the stack's own (N, H, W) and the
    /// squared differences are summed and divided by the stack's element
    /// count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFitted`] before [`fit_transform`](Pca::fit_transform)
    /// has run, and [`Error::Reconstruction`] if the reconstruction cannot
    /// be reshaped to the stack's dimensions.
    pub fn calculate_error(&self) -> Result<f64> {
        let scores = self.principal_components.as_ref().ok_or(Error::NotFitted)?;
        let mean = self.mean.ok_or(Error::NotFitted)?;
        let std_dev = self.std_dev.ok_or(Error::NotFitted)?;

        let (layers, rows, cols) = self.stack.dim();
        let reconstructed = self
            .inverse_transform(scores)?
            .into_shape_with_order((layers, rows, cols))
            .map_err(|e| {
                Error::Reconstruction(format!(
                    "cannot reshape reconstruction to {}x{}x{}: {}",
                    layers, rows, cols, e
                ))
            })?;

        let standardized = self.stack.mapv(|v| (v - mean) / std_dev);
        let total = (layers * rows * cols) as f64;
        let mse = (&standardized - &reconstructed).mapv(|d| d * d).sum() / total;
        debug!(
            "reconstruction MSE with {} components: {:.6e}",
            self.n_components, mse
        );
        Ok(mse)
    }

    /// Variance of the values of the components matrix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFitted`] before [`fit_transform`](Pca::fit_transform)
    /// has run.
    pub fn calculate_explained_variance(&self) -> Result<f64> {
        let components = self.components.as_ref().ok_or(Error::NotFitted)?;
        Ok(components.var(0.0))
    }

    /// Divides each of the given eigenvalues by the explained variance.
    ///
    /// Callable independently with eigenvalues from an earlier fit; the
    /// returned array has the same length as the input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFitted`] before [`fit_transform`](Pca::fit_transform)
    /// has run.
    pub fn calculate_explained_variance_ratio(
        &self,
        eigenvalues: &Array1<f64>,
    ) -> Result<Array1<f64>> {
        let explained_variance = self.calculate_explained_variance()?;
        Ok(eigenvalues.mapv(|val| val / explained_variance))
    }
}

fn global_stats(x: &Array3<f64>) -> Result<(f64, f64)> {
    let mean = x.mean().ok_or(Error::EmptyStack)?;
    let std_dev = x.std(0.0);
    let std_dev = if std_dev.abs() < SCALE_SANITIZATION_THRESHOLD {
        1.0
    } else {
        std_dev
    };
    Ok((mean, std_dev))
}
