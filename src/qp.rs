//! Constrained quadratic-program solver for proportion estimation.
//!
//! Solves the single fixed formulation used by the deconvolver:
//!
//! ```text
//! minimize   0.5 * x' H x + c' x
//! subject to sum(x) = 1,  0 <= x_i <= 1
//! ```
//!
//! with H symmetric positive definite (the caller adds a ridge to the Gram
//! matrix). The implementation is a primal active-set method over the bound
//! constraints: the equality-constrained subproblem on the free variables
//! is solved through a dense Cholesky factorization, with the sum
//! constraint folded in via its Schur complement. Expected outcomes are
//! reported as a [`SolverStatus`] value; only malformed dimensions are an
//! error.

use crate::error::DimensionError;
use ndarray::{Array1, Array2};

/// Outcome of a QP solve. Infeasibility and numerical breakdown are
/// cooperative results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Converged,
    Infeasible,
    NumericalFailure,
}

/// Feasibility/optimality tolerance on bounds and multipliers.
const TOL: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Free,
    Lower,
    Upper,
}

/// Solves the QP described in the module docs.
///
/// Returns the status and the final iterate; on [`SolverStatus::Converged`]
/// the iterate is feasible and optimal to within tolerance. Mismatched
/// `hessian`/`linear` dimensions are a caller contract violation.
pub fn solve_qp(
    hessian: &Array2<f64>,
    linear: &Array1<f64>,
) -> Result<(SolverStatus, Array1<f64>), DimensionError> {
    let n = linear.len();
    if hessian.nrows() != hessian.ncols() || hessian.nrows() != n {
        return Err(DimensionError {
            what: "QP Hessian",
            expected: n,
            found: hessian.nrows(),
        });
    }
    if n == 0 {
        return Err(DimensionError {
            what: "QP dimension",
            expected: 1,
            found: 0,
        });
    }

    // The uniform point is always feasible for the simplex/box set.
    let mut x = Array1::from_elem(n, 1.0 / n as f64);
    let mut bounds = vec![Bound::Free; n];

    let max_iterations = 50 + 10 * n;
    for _ in 0..max_iterations {
        let free: Vec<usize> = (0..n)
            .filter(|&i| bounds[i] == Bound::Free)
            .collect();

        let lambda = if free.is_empty() {
            // Every variable sits at a bound; the equality multiplier is
            // any value separating the lower-active and upper-active
            // gradients. Take the midpoint of the admissible interval.
            let gradient = hessian.dot(&x) + linear;
            let mut lambda_min = f64::NEG_INFINITY;
            let mut lambda_max = f64::INFINITY;
            for i in 0..n {
                match bounds[i] {
                    Bound::Lower => lambda_min = lambda_min.max(-gradient[i]),
                    Bound::Upper => lambda_max = lambda_max.min(-gradient[i]),
                    Bound::Free => unreachable!(),
                }
            }
            match (lambda_min.is_finite(), lambda_max.is_finite()) {
                (true, true) => 0.5 * (lambda_min + lambda_max),
                (true, false) => lambda_min,
                (false, true) => lambda_max,
                // n >= 1 and every variable is at some bound, so at least
                // one side is finite.
                (false, false) => unreachable!(),
            }
        } else {
            // Equality-constrained subproblem on the free variables:
            //   H_ff x_f = -c_f - H_fb x_b - lambda * e,  e' x_f = s
            let mut rhs = Array1::zeros(free.len());
            for (fi, &i) in free.iter().enumerate() {
                let mut value = -linear[i];
                for j in 0..n {
                    if bounds[j] == Bound::Upper {
                        value -= hessian[[i, j]];
                    }
                }
                rhs[fi] = value;
            }
            let fixed_sum: f64 = bounds
                .iter()
                .filter(|&&b| b == Bound::Upper)
                .count() as f64;
            let target_sum = 1.0 - fixed_sum;

            let h_ff = Array2::from_shape_fn((free.len(), free.len()), |(a, b)| {
                hessian[[free[a], free[b]]]
            });
            let factor = match cholesky(&h_ff) {
                Some(l) => l,
                None => return Ok((SolverStatus::NumericalFailure, x)),
            };
            let u = cholesky_solve(&factor, &rhs);
            let v = cholesky_solve(&factor, &Array1::ones(free.len()));
            let denom = v.sum();
            if !denom.is_finite() || denom.abs() < f64::MIN_POSITIVE {
                return Ok((SolverStatus::NumericalFailure, x));
            }
            let lambda = (u.sum() - target_sum) / denom;
            let candidate = &u - &(&v * lambda);
            if candidate.iter().any(|value| !value.is_finite()) {
                return Ok((SolverStatus::NumericalFailure, x));
            }

            // Longest step along (candidate - x_f) that stays in the box.
            let mut alpha = 1.0f64;
            let mut blocking: Option<(usize, Bound)> = None;
            for (fi, &i) in free.iter().enumerate() {
                let step = candidate[fi] - x[i];
                if step < -TOL && candidate[fi] < -TOL {
                    let limit = x[i] / -step;
                    if limit < alpha {
                        alpha = limit;
                        blocking = Some((i, Bound::Lower));
                    }
                } else if step > TOL && candidate[fi] > 1.0 + TOL {
                    let limit = (1.0 - x[i]) / step;
                    if limit < alpha {
                        alpha = limit;
                        blocking = Some((i, Bound::Upper));
                    }
                }
            }

            if let Some((blocked, bound)) = blocking {
                for (fi, &i) in free.iter().enumerate() {
                    x[i] += alpha * (candidate[fi] - x[i]);
                }
                x[blocked] = match bound {
                    Bound::Lower => 0.0,
                    Bound::Upper => 1.0,
                    Bound::Free => unreachable!(),
                };
                bounds[blocked] = bound;
                continue;
            }

            for (fi, &i) in free.iter().enumerate() {
                x[i] = candidate[fi].clamp(0.0, 1.0);
            }
            lambda
        };

        // Optimality test on the working set: bound multipliers must be
        // non-negative. Release the worst violator and resolve.
        let gradient = hessian.dot(&x) + linear;
        let mut worst: Option<(usize, f64)> = None;
        for i in 0..n {
            let multiplier = match bounds[i] {
                Bound::Lower => gradient[i] + lambda,
                Bound::Upper => -(gradient[i] + lambda),
                Bound::Free => continue,
            };
            if multiplier < -TOL && worst.map_or(true, |(_, m)| multiplier < m) {
                worst = Some((i, multiplier));
            }
        }
        match worst {
            Some((release, _)) => bounds[release] = Bound::Free,
            None => return Ok((SolverStatus::Converged, x)),
        }
    }

    Ok((SolverStatus::Infeasible, x))
}

/// Dense lower-triangular Cholesky factorization; `None` when the matrix is
/// not positive definite.
fn cholesky(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    let mut lower = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[[i, j]];
            for k in 0..j {
                sum -= lower[[i, k]] * lower[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                lower[[i, j]] = sum.sqrt();
            } else {
                lower[[i, j]] = sum / lower[[j, j]];
            }
        }
    }
    Some(lower)
}

/// Solves `L L' x = b` by forward then backward substitution.
fn cholesky_solve(lower: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= lower[[i, k]] * y[k];
        }
        y[i] = sum / lower[[i, i]];
    }
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= lower[[k, i]] * x[k];
        }
        x[i] = sum / lower[[i, i]];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn interior_solution_is_found_exactly() {
        // H = I, c = -[0.8, 0.2]: the unconstrained optimum already sums
        // to one, so the equality constraint is inactive.
        let hessian = Array2::eye(2);
        let linear = array![-0.8, -0.2];
        let (status, x) = solve_qp(&hessian, &linear).unwrap();
        assert_eq!(status, SolverStatus::Converged);
        assert_abs_diff_eq!(x[0], 0.8, epsilon = 1e-8);
        assert_abs_diff_eq!(x[1], 0.2, epsilon = 1e-8);
    }

    #[test]
    fn bound_constraints_activate() {
        // Unconstrained optimum after the sum constraint is [1.5, -0.5];
        // the box clips it to the vertex [1, 0].
        let hessian = Array2::eye(2);
        let linear = array![-2.0, 0.0];
        let (status, x) = solve_qp(&hessian, &linear).unwrap();
        assert_eq!(status, SolverStatus::Converged);
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(x[1], 0.0, epsilon = 1e-8);
    }

    #[test]
    fn solution_always_sums_to_one() {
        let hessian = array![[2.0, 0.5, 0.1], [0.5, 1.5, 0.2], [0.1, 0.2, 3.0]];
        let linear = array![-1.0, -0.3, -0.7];
        let (status, x) = solve_qp(&hessian, &linear).unwrap();
        assert_eq!(status, SolverStatus::Converged);
        assert_abs_diff_eq!(x.sum(), 1.0, epsilon = 1e-8);
        for &value in x.iter() {
            assert!((-1e-9..=1.0 + 1e-9).contains(&value));
        }
    }

    #[test]
    fn single_cell_type_degenerates_to_one() {
        let hessian = array![[1.0]];
        let linear = array![-0.4];
        let (status, x) = solve_qp(&hessian, &linear).unwrap();
        assert_eq!(status, SolverStatus::Converged);
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn dimension_mismatch_is_a_contract_error() {
        let hessian = Array2::eye(3);
        let linear = array![-1.0, 0.0];
        assert!(solve_qp(&hessian, &linear).is_err());
    }

    #[test]
    fn indefinite_hessian_reports_numerical_failure() {
        let hessian = array![[1.0, 0.0], [0.0, -1.0]];
        let linear = array![0.0, 0.0];
        let (status, _) = solve_qp(&hessian, &linear).unwrap();
        assert_eq!(status, SolverStatus::NumericalFailure);
    }
}
