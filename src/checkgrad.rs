//! Finite difference check of an objective's gradient.
//!
//! When the minimizer stops after only a few line searches, the function
//! value and the gradient returned by the objective are often inconsistent.
//! `check_grad` compares the analytic gradient with central differences.

use num_traits::Float;

use crate::error::FmincgError;
use crate::lin::Lin;

/// Outcome of a gradient check at one point.
#[derive(Debug, Clone)]
pub struct GradCheck<V, S> {
    /// Gradient returned by the objective.
    pub analytic: V,
    /// Central difference approximation.
    pub numeric: V,
    /// `|numeric - analytic| / |numeric + analytic|`; small (around `eps²`
    /// relative to the curvature) when the gradient is right.
    pub relative_error: S,
}

/// Compare the gradient of `f` at `x` with central differences of step `eps`.
///
/// ```rust
/// use fmincg::{check_grad, Rn};
///
/// let f = |x: &Rn<f64>| (x[0] * x[1], Rn::new(vec![x[1], x[0]]));
/// let c = check_grad(f, &Rn::new(vec![1.5, -2.]), 1e-5).unwrap();
/// assert!(c.relative_error < 1e-8);
/// ```
pub fn check_grad<Func, V, S>(mut f: Func, x: &V, eps: S) -> Result<GradCheck<V, S>, FmincgError>
where
    Func: FnMut(&V) -> (S, V),
    V: Lin<F = S> + Clone,
    S: Float,
{
    if !(eps > S::zero()) {
        return Err(FmincgError::InvalidArgument(
            "finite difference step must be positive".to_string(),
        ));
    }
    let dim = x.dimension();
    let (_, analytic) = f(x);
    if analytic.dimension() != dim {
        return Err(FmincgError::InvalidArgument(format!(
            "gradient has dimension {} but the point has dimension {}",
            analytic.dimension(),
            dim
        )));
    }

    let mut numeric = x.origin();
    let mut xp = x.clone();
    for j in 0..dim {
        let xj = *xp.component_mut(j);
        *xp.component_mut(j) = xj + eps;
        let (y_plus, _) = f(&xp);
        *xp.component_mut(j) = xj - eps;
        let (y_minus, _) = f(&xp);
        *xp.component_mut(j) = xj;
        *numeric.component_mut(j) = (y_plus - y_minus) / (eps + eps);
    }

    let mut sum = numeric.clone();
    sum.ray_to(&analytic, S::one());
    let denom = sum.norm();
    let relative_error = if denom > S::zero() {
        numeric.dist(&analytic) / denom
    } else {
        numeric.dist(&analytic)
    };

    Ok(GradCheck {
        analytic,
        numeric,
        relative_error,
    })
}
