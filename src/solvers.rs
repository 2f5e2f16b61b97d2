// omnipool_rs/src/solvers.rs

use crate::types::{OmnipoolError, Result};

// argmin related imports
use argmin::core::{CostFunction, Error, Executor};
use argmin::solver::brent::BrentOpt;

/// A scalar function of one trade size, to be maximized over a closed interval.
pub trait ScalarObjective: Send + Sync {
    fn evaluate(&self, x: f64) -> Result<f64>;
}

// argmin minimizes, so the objective is flipped.
struct NegatedObjective<'a> {
    inner: &'a dyn ScalarObjective,
}

impl<'a> CostFunction for NegatedObjective<'a> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, Error> {
        match self.inner.evaluate(*x) {
            Ok(value) => Ok(-value),
            Err(e) => {
                tracing::debug!(x = *x, error = %e, "objective evaluation failed");
                Err(Error::from(e))
            }
        }
    }
}

/// Maximizes `problem` on `[lower, upper]` with Brent's method.
///
/// Returns the maximizing argument and the value there. The objective is assumed
/// unimodal on the interval, which holds for the concave profit curves of a single swap.
pub fn maximize_on_interval(
    problem: &dyn ScalarObjective,
    lower: f64,
    upper: f64,
    max_iterations: u64,
) -> Result<(f64, f64)> {
    if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
        return Err(OmnipoolError::Optimization(format!(
            "empty search interval [{}, {}]",
            lower, upper
        )));
    }

    let solver = BrentOpt::new(lower, upper);
    let res = Executor::new(NegatedObjective { inner: problem }, solver)
        .configure(|state| state.max_iters(max_iterations))
        .run()
        .map_err(|e| OmnipoolError::Optimization(format!("argmin Brent optimization failed: {}", e)))?;

    let state = res.state();
    match state.best_param {
        Some(best_x) => Ok((best_x, -state.best_cost)),
        None => Err(OmnipoolError::Optimization(
            "argmin Brent finished but no best parameter found.".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    struct Parabola {
        peak: f64,
        height: f64,
    }

    impl ScalarObjective for Parabola {
        fn evaluate(&self, x: f64) -> Result<f64> {
            Ok(self.height - (x - self.peak).powi(2))
        }
    }

    struct Failing;

    impl ScalarObjective for Failing {
        fn evaluate(&self, x: f64) -> Result<f64> {
            Err(OmnipoolError::invalid_amount(x, "always fails"))
        }
    }

    #[test]
    fn finds_interior_maximum() {
        let problem = Parabola { peak: 3.0, height: 7.0 };
        let (x, value) = maximize_on_interval(&problem, 0.0, 10.0, 100).unwrap();
        assert_abs_diff_eq!(x, 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(value, 7.0, epsilon = 1e-6);
    }

    #[test]
    fn maximum_beyond_interval_lands_on_edge() {
        let problem = Parabola { peak: -5.0, height: 0.0 };
        let (x, value) = maximize_on_interval(&problem, 0.0, 2.0, 100).unwrap();
        assert!(x < 1e-3, "x is {}, expected ~0", x);
        assert_abs_diff_eq!(value, -25.0, epsilon = 1e-2);
    }

    #[test]
    fn rejects_empty_interval() {
        let problem = Parabola { peak: 0.0, height: 0.0 };
        assert!(matches!(
            maximize_on_interval(&problem, 1.0, 1.0, 10),
            Err(OmnipoolError::Optimization(_))
        ));
        assert!(maximize_on_interval(&problem, 0.0, f64::NAN, 10).is_err());
    }

    #[test]
    fn objective_errors_surface() {
        assert!(matches!(
            maximize_on_interval(&Failing, 0.0, 1.0, 10),
            Err(OmnipoolError::Optimization(_))
        ));
    }
}
