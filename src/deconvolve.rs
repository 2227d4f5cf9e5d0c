//! The deconvolution core: QP state, convergence tracking, and the
//! reference-matrix completion update.
//!
//! One [`Deconvolver`] owns the optimization state across iterations. The
//! iterative driver [`run`] alternates QP solves with reconstruction of the
//! unknown reference columns from the residual bulk signal, stopping on
//! convergence, iteration cap, or a recoverable numerical breakdown.

use crate::error::{DimensionError, NumericalError};
use crate::qp::{self, SolverStatus};
use ndarray::{Array1, Array2, s};

/// Ridge added to the Gram matrix. The reference panel has far more rows
/// (CpG sites) than columns (cell types), so near-collinear columns are a
/// realistic input; the ridge keeps the Hessian positive definite.
const GRAM_EPSILON: f64 = 1e-8;

/// Floor on the squared norm of the unknown-proportion vector below which
/// its pseudo-inverse is numerically meaningless.
const MIN_STABLE_SQUARED_NORM: f64 = 1e-10;

/// Computes `M' M + epsilon * I`, the regularized Gram matrix used as the
/// QP Hessian.
pub fn gram_matrix(matrix: &Array2<f64>) -> Array2<f64> {
    let mut gram = matrix.t().dot(matrix);
    for i in 0..gram.nrows() {
        gram[[i, i]] += GRAM_EPSILON;
    }
    gram
}

/// Computes the QP linear term `-(bulk' M)`, checking that the CpG row
/// counts agree.
pub fn coefficient_vector(
    reference: &Array2<f64>,
    bulk: &Array1<f64>,
) -> Result<Array1<f64>, DimensionError> {
    if reference.nrows() != bulk.len() {
        return Err(DimensionError {
            what: "reference rows vs bulk rows",
            expected: bulk.len(),
            found: reference.nrows(),
        });
    }
    Ok(-bulk.dot(reference))
}

/// Pseudo-inverse of a column vector: `v' / (v'v)`, the least-squares
/// solution operator. Fails when the squared norm is below the stability
/// floor.
pub fn pseudo_inverse(vector: &Array1<f64>) -> Result<Array1<f64>, NumericalError> {
    let squared_norm = vector.dot(vector);
    if squared_norm < MIN_STABLE_SQUARED_NORM {
        return Err(NumericalError::UnstablePseudoInverse { squared_norm });
    }
    Ok(vector / squared_norm)
}

/// Squared Euclidean distance between two proportion vectors.
pub fn squared_distance(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

/// Rewrites the rightmost `num_unknown` reference columns from the residual
/// bulk signal: `(bulk - r_k p_k) * pinv(p_l)` where `r_k`/`p_k` are the
/// known columns and their proportions and `p_l` the unknown proportions.
pub fn update_reference_matrix(
    reference: &mut Array2<f64>,
    proportions: &Array1<f64>,
    bulk: &Array1<f64>,
    num_unknown: usize,
) -> Result<(), NumericalError> {
    debug_assert!(num_unknown > 0, "nothing to update without unknown columns");
    let num_known = reference.ncols() - num_unknown;

    let known = reference.slice(s![.., ..num_known]);
    let known_proportions = proportions.slice(s![..num_known]);
    let unknown_proportions = proportions.slice(s![num_known..]).to_owned();

    let residual = bulk - &known.dot(&known_proportions);
    let pinv = pseudo_inverse(&unknown_proportions)?;

    // Outer product: each unknown column is the residual scaled by the
    // matching pseudo-inverse entry.
    for (offset, &weight) in pinv.iter().enumerate() {
        let mut column = reference.slice_mut(s![.., num_known + offset]);
        column.assign(&(&residual * weight));
    }
    Ok(())
}

/// Optimization state carried across iterations.
pub struct Deconvolver {
    bulk: Array1<f64>,
    proportions: Array1<f64>,
    previous: Option<Array1<f64>>,
}

impl Deconvolver {
    pub fn new(num_cell_types: usize, bulk: Array1<f64>) -> Self {
        Self {
            bulk,
            proportions: Array1::zeros(num_cell_types),
            previous: None,
        }
    }

    /// One QP solve against the current reference matrix. Rotates the
    /// previous solution for convergence testing and stores the new one.
    pub fn solve(&mut self, reference: &Array2<f64>) -> Result<SolverStatus, DimensionError> {
        let hessian = gram_matrix(reference);
        let linear = coefficient_vector(reference, &self.bulk)?;
        let (status, solution) = qp::solve_qp(&hessian, &linear)?;
        self.previous = Some(std::mem::replace(&mut self.proportions, solution));
        Ok(status)
    }

    pub fn proportions(&self) -> &Array1<f64> {
        &self.proportions
    }

    pub fn bulk(&self) -> &Array1<f64> {
        &self.bulk
    }

    /// Squared distance between the current and previous solutions; `None`
    /// until two solves have happened.
    pub fn change_in_proportions(&self) -> Option<f64> {
        self.previous
            .as_ref()
            .map(|previous| squared_distance(&self.proportions, previous))
    }
}

/// Why the iterative refinement stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Mode A: no unknown cell types, a single solve is the whole job.
    SingleSolve,
    /// Consecutive solutions moved less than the tolerance.
    Converged,
    /// The iteration cap was reached without convergence.
    IterationLimit,
    /// The reference update broke down; the last good state is kept.
    NumericalDegradation,
}

/// Drives the deconvolution to completion.
///
/// With `num_unknown == 0` this is a single solve. Otherwise it iterates
/// solve / convergence-check / reference-update up to `max_iterations`
/// times. A numerical failure in the update is recoverable: the loop stops
/// and the last successfully computed reference matrix and proportions are
/// kept.
pub fn run(
    deconvolver: &mut Deconvolver,
    reference: &mut Array2<f64>,
    num_unknown: usize,
    max_iterations: usize,
    convergence_threshold: f64,
) -> Result<(SolverStatus, StopReason), DimensionError> {
    if num_unknown == 0 {
        let status = deconvolver.solve(reference)?;
        return Ok((status, StopReason::SingleSolve));
    }

    let mut status = SolverStatus::Converged;
    for iteration in 1..=max_iterations {
        status = deconvolver.solve(reference)?;
        log::debug!(
            "deconvolution iteration {iteration}: solver status {status:?}, proportions {}",
            deconvolver.proportions()
        );

        // The distance needs two solutions; it is never evaluated on the
        // first iteration.
        if iteration > 1 {
            if let Some(change) = deconvolver.change_in_proportions() {
                if change < convergence_threshold {
                    log::debug!(
                        "converged after {iteration} iteration(s) (change {change:.3e})"
                    );
                    return Ok((status, StopReason::Converged));
                }
            }
        }

        if iteration < max_iterations {
            if let Err(error) = update_reference_matrix(
                reference,
                &deconvolver.proportions,
                &deconvolver.bulk,
                num_unknown,
            ) {
                log::warn!(
                    "stopping refinement at iteration {iteration}: {error}; keeping last good state"
                );
                return Ok((status, StopReason::NumericalDegradation));
            }
        }
    }

    Ok((status, StopReason::IterationLimit))
}
