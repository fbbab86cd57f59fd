//! Implementation of Rasmussen's `fmincg` conjugate gradient minimizer.
//!
//! Search directions are computed with the Polack-Ribiere formula. Each line
//! search brackets a step with quadratic and cubic interpolation, extrapolates
//! cubically (at most `ext` times the current bracket) and stops once the
//! Wolfe-Powell conditions hold. The first step along a new direction is
//! guessed with the slope ratio method.

use std::error::Error;

use log::{debug, trace, warn};
use num_traits::{Float, NumCast, ToPrimitive};

use crate::error::FmincgError;
use crate::lin::Lin;
use crate::options::{Fmincg, FmincgOptions, RunLength};

/// Why the outer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The run length was used up.
    BudgetExhausted,
    /// Two line searches in a row failed away from a stationary point.
    LineSearchFailedTwice,
    /// Two line searches in a row failed at a point with a vanishing gradient.
    Converged,
}

/// Result of a minimization run.
#[derive(Debug, Clone)]
pub struct FmincgResult<V, S> {
    /// Best point found.
    pub x: V,
    /// Function value after every successful line search.
    pub trace: Vec<S>,
    /// Run counter: line searches or function evaluations, whichever the
    /// run length bounds.
    pub iterations: usize,
    /// Number of calls to the objective.
    pub evaluations: usize,
    /// Why the run stopped.
    pub termination: Termination,
}

impl<V, S: Copy> FmincgResult<V, S> {
    /// Value at the last successful line search, if any succeeded.
    pub fn value(&self) -> Option<S> {
        self.trace.last().copied()
    }
}

/// Information about a successful line search
#[derive(Debug, Clone)]
pub struct FmincgIteration<S> {
    /// Index of the successful line search (from 0)
    pub k: usize,
    /// Run counter after the line search
    pub counter: usize,
    /// Function value at the new point
    pub value: S,
    /// Accepted step along the search direction
    pub step: S,
    /// Function evaluations spent in the line search
    pub line_eval_count: usize,
}

// Counts calls to the objective and checks what comes back.
struct Evaluator<Func> {
    f: Func,
    dim: usize,
    count: usize,
}

impl<Func> Evaluator<Func> {
    fn eval<V, S, E>(&mut self, x: &V) -> Result<(S, V), FmincgError>
    where
        Func: FnMut(&V) -> Result<(S, V), E>,
        V: Lin<F = S>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let (value, grad) = (self.f)(x).map_err(|e| FmincgError::Objective(e.into()))?;
        self.count += 1;
        if grad.dimension() != self.dim {
            return Err(FmincgError::InvalidArgument(format!(
                "gradient has dimension {} but the point has dimension {}",
                grad.dimension(),
                self.dim
            )));
        }
        Ok((value, grad))
    }
}

fn to_f64<S: ToPrimitive>(v: S) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

impl<S: Float> Fmincg<S> {
    /// Minimize a differentiable function starting from `x0`.
    ///
    /// `f` returns the function value together with its gradient.
    pub fn minimize<Func, V>(
        &self,
        x0: &V,
        mut f: Func,
        options: &FmincgOptions,
    ) -> Result<FmincgResult<V, S>, FmincgError>
    where
        Func: FnMut(&V) -> (S, V),
        V: Lin<F = S> + Clone,
    {
        self.try_minimize_with_trace(
            x0,
            |x: &V| Ok::<_, std::convert::Infallible>(f(x)),
            options,
            |_, _| {},
        )
    }

    /// The same as `minimize`, but calls `callback` after every successful
    /// line search with the new point and information about the line search.
    pub fn minimize_with_trace<Func, V, Callback>(
        &self,
        x0: &V,
        mut f: Func,
        options: &FmincgOptions,
        callback: Callback,
    ) -> Result<FmincgResult<V, S>, FmincgError>
    where
        Func: FnMut(&V) -> (S, V),
        V: Lin<F = S> + Clone,
        Callback: FnMut(&V, FmincgIteration<S>),
    {
        self.try_minimize_with_trace(
            x0,
            |x: &V| Ok::<_, std::convert::Infallible>(f(x)),
            options,
            callback,
        )
    }

    /// The same as `minimize` for an objective that can fail. Its error is
    /// returned as `FmincgError::Objective`.
    pub fn try_minimize<Func, V, E>(
        &self,
        x0: &V,
        f: Func,
        options: &FmincgOptions,
    ) -> Result<FmincgResult<V, S>, FmincgError>
    where
        Func: FnMut(&V) -> Result<(S, V), E>,
        V: Lin<F = S> + Clone,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.try_minimize_with_trace(x0, f, options, |_, _| {})
    }

    /// Fallible objective and a per line search callback.
    pub fn try_minimize_with_trace<Func, V, E, Callback>(
        &self,
        x0: &V,
        f: Func,
        options: &FmincgOptions,
        mut callback: Callback,
    ) -> Result<FmincgResult<V, S>, FmincgError>
    where
        Func: FnMut(&V) -> Result<(S, V), E>,
        V: Lin<F = S> + Clone,
        E: Into<Box<dyn Error + Send + Sync>>,
        Callback: FnMut(&V, FmincgIteration<S>),
    {
        let dim = x0.dimension();
        if dim == 0 {
            return Err(FmincgError::InvalidArgument(
                "starting point is empty".to_string(),
            ));
        }
        if !x0.all_finite() {
            return Err(FmincgError::InvalidArgument(
                "starting point is not finite".to_string(),
            ));
        }

        let budget = options.run_length();
        let length = budget.limit();
        let red = <S as NumCast>::from(options.reduction()).unwrap_or_else(S::one);

        let zero = S::zero();
        let one = S::one();
        let two = one + one;
        let half = one / two;
        let three = two + one;
        let six = three + three;

        let mut ev = Evaluator { f, dim, count: 0 };

        let mut x = x0.clone();
        let (mut f1, mut df1) = ev.eval(&x)?;
        // search direction is steepest
        let mut s = x0.origin();
        s.negate_from(&df1);
        let mut d1 = -s.norm_squared();
        let mut z1 = red / (one - d1);

        let mut trace_values = Vec::new();
        let mut line_searches = 0;
        let mut ls_failed = false;
        let mut df2;

        let termination = loop {
            if budget.counter(line_searches, ev.count) >= length {
                break Termination::BudgetExhausted;
            }
            line_searches += 1;
            let evals_before = ev.count;

            let x0 = x.clone();
            let f0 = f1;
            let df0 = df1.clone();

            x.ray_to(&s, z1);
            let (mut f2, g) = ev.eval(&x)?;
            df2 = g;
            let mut d2 = df2.dot(&s);
            // point 3 starts at point 1
            let mut f3 = f1;
            let mut d3 = d1;
            let mut z3 = -z1;
            let mut m = match budget {
                RunLength::LineSearches(_) => self.max_evals,
                RunLength::Evaluations(n) => self.max_evals.min(n.saturating_sub(ev.count)),
            };
            let mut limit: Option<S> = None;

            // A NaN value or slope counts as a violated condition.
            let wolfe_violated = |f1: S, d1: S, z1: S, f2: S, d2: S| {
                !(f2 <= f1 + z1 * self.rho * d1) || !(d2 <= -self.sig * d1)
            };

            let success = loop {
                while wolfe_violated(f1, d1, z1, f2, d2) && m > 0 {
                    // tighten the bracket
                    limit = Some(z1);
                    let mut z2 = if f2 > f1 {
                        // quadratic fit
                        z3 - (half * d3 * z3 * z3) / (d3 * z3 + f2 - f3)
                    } else {
                        // cubic fit
                        let a = six * (f2 - f3) / z3 + three * (d2 + d3);
                        let b = three * (f3 - f2) - z3 * (d3 + two * d2);
                        ((b * b - a * d2 * z3 * z3).sqrt() - b) / a
                    };
                    if !z2.is_finite() {
                        z2 = z3 / two;
                    }
                    // not too close to either end of the bracket
                    z2 = z2.min(self.int * z3).max((one - self.int) * z3);
                    z1 = z1 + z2;
                    x.ray_to(&s, z2);
                    let (v, g) = ev.eval(&x)?;
                    f2 = v;
                    df2 = g;
                    m -= 1;
                    d2 = df2.dot(&s);
                    // z3 is now relative to the location of z2
                    z3 = z3 - z2;
                    trace!("fmincg: interpolated to step {:e}", to_f64(z1));
                }

                if wolfe_violated(f1, d1, z1, f2, d2) {
                    break false;
                } else if d2 > self.sig * d1 {
                    break true;
                } else if m == 0 {
                    break false;
                }

                // cubic extrapolation
                let a = six * (f2 - f3) / z3 + three * (d2 + d3);
                let b = three * (f3 - f2) - z3 * (d3 + two * d2);
                let mut z2 = -d2 * z3 * z3 / (b + (b * b - a * d2 * z3 * z3).sqrt());
                z2 = match limit {
                    _ if !z2.is_finite() || z2 < zero => match limit {
                        None => z1 * (self.ext - one),
                        Some(l) => (l - z1) / two,
                    },
                    Some(l) if z2 + z1 > l => (l - z1) / two,
                    None if z2 + z1 > z1 * self.ext => z1 * (self.ext - one),
                    _ if z2 < -z3 * self.int => -z3 * self.int,
                    Some(l) if z2 < (l - z1) * (one - self.int) => (l - z1) * (one - self.int),
                    _ => z2,
                };
                trace!("fmincg: extrapolated by {:e}", to_f64(z2));

                // point 3 becomes point 2
                f3 = f2;
                d3 = d2;
                z3 = -z2;
                z1 = z1 + z2;
                x.ray_to(&s, z2);
                let (v, g) = ev.eval(&x)?;
                f2 = v;
                df2 = g;
                m -= 1;
                d2 = df2.dot(&s);
            };

            if success {
                f1 = f2;
                trace_values.push(f1);
                let counter = budget.counter(line_searches, ev.count);
                debug!("fmincg: iteration {} | cost {:e}", counter, to_f64(f1));
                callback(
                    &x,
                    FmincgIteration {
                        k: trace_values.len() - 1,
                        counter,
                        value: f1,
                        step: z1,
                        line_eval_count: ev.count - evals_before,
                    },
                );

                // Polack-Ribiere direction
                let beta = (df2.norm_squared() - df1.dot(&df2)) / df1.norm_squared();
                s.combine(beta, &df2, -one);
                std::mem::swap(&mut df1, &mut df2);
                let mut d2 = df1.dot(&s);
                // new slope must be negative, otherwise use steepest descent
                if !(d2 <= zero) {
                    s.negate_from(&df1);
                    d2 = -s.norm_squared();
                }
                // slope ratio, but at most `ratio`
                z1 = z1 * self.ratio.min(d1 / (d2 - S::min_positive_value()));
                d1 = d2;
                ls_failed = false;
            } else {
                // restore the point from before the failed line search
                x = x0;
                f1 = f0;
                df1 = df0;
                if ls_failed {
                    break if self.stationary(f1, &df1) {
                        Termination::Converged
                    } else {
                        Termination::LineSearchFailedTwice
                    };
                }
                if budget.counter(line_searches, ev.count) >= length {
                    break Termination::BudgetExhausted;
                }
                warn!(
                    "fmincg: line search failed at cost {:e}, retrying along steepest descent",
                    to_f64(f1)
                );
                // the last gradient from the failed search, when usable
                if df2.all_finite() {
                    std::mem::swap(&mut df1, &mut df2);
                }
                s.negate_from(&df1);
                d1 = -s.norm_squared();
                z1 = one / (one - d1);
                ls_failed = true;
            }
        };

        debug!(
            "fmincg: stopped ({:?}) after {} line searches and {} evaluations",
            termination, line_searches, ev.count
        );

        Ok(FmincgResult {
            x,
            trace: trace_values,
            iterations: budget.counter(line_searches, ev.count),
            evaluations: ev.count,
            termination,
        })
    }

    // No further progress can be expected: the gradient is at rounding level.
    fn stationary<V: Lin<F = S>>(&self, f1: S, df1: &V) -> bool {
        df1.norm() <= S::epsilon().sqrt() * f1.abs().max(S::one())
    }
}

/// Minimize `f` from `x0` with the default line search parameters.
///
/// ```rust
/// use fmincg::{minimize, FmincgOptions, Rn};
///
/// let f = |x: &Rn<f64>| ((x[0] - 3.).powi(2), Rn::new(vec![2. * (x[0] - 3.)]));
/// let r = minimize(f, &Rn::new(vec![0.]), &FmincgOptions::new().with_max_iterations(20)).unwrap();
/// assert!((r.x[0] - 3.).abs() < 1e-4);
/// ```
pub fn minimize<Func, V>(
    f: Func,
    x0: &V,
    options: &FmincgOptions,
) -> Result<FmincgResult<V, f64>, FmincgError>
where
    Func: FnMut(&V) -> (f64, V),
    V: Lin<F = f64> + Clone,
{
    Fmincg::<f64>::new().minimize(x0, f, options)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lin::Rn;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1, Array2};
    use quickcheck::{quickcheck, TestResult};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::Cell;

    fn shifted_square(x: &Rn<f64>) -> (f64, Rn<f64>) {
        ((x[0] - 3.).powi(2), Rn::new(vec![2. * (x[0] - 3.)]))
    }

    fn rosenbrock(x: &Array1<f64>) -> (f64, Array1<f64>) {
        let f = (1. - x[0]).powi(2) + 100. * (x[1] - x[0].powi(2)).powi(2);
        let g = array![
            -2. * (1. - x[0]) - 400. * (x[1] - x[0].powi(2)) * x[0],
            200. * (x[1] - x[0].powi(2))
        ];
        (f, g)
    }

    fn non_increasing(trace: &[f64]) -> bool {
        trace.windows(2).all(|w| w[1] <= w[0] + 1e-12 * w[0].abs())
    }

    #[test]
    fn shifted_square_converges() {
        let r = minimize(
            shifted_square,
            &Rn::new(vec![0.]),
            &FmincgOptions::new().with_max_iterations(20),
        )
        .unwrap();

        assert_abs_diff_eq!(r.x[0], 3., epsilon = 1e-4);
        assert!(non_increasing(&r.trace));
        assert!(r.trace.len() <= 20);
        assert!(r.iterations <= 20);
    }

    #[test]
    fn scalar_search_space() {
        let m = Fmincg::<f64>::new();
        let r = m
            .minimize(&-2f64, |x: &f64| ((x - 0.5).powi(4), 4. * (x - 0.5).powi(3)), &FmincgOptions::new())
            .unwrap();

        assert_abs_diff_eq!(r.x, 0.5, epsilon = 1e-2);
        assert!(non_increasing(&r.trace));
    }

    #[test]
    fn random_positive_definite_quadratics() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 1..8 {
            for _ in 0..4 {
                let b = Array2::from_shape_fn((n, n), |_| rng.gen_range(-1.0..1.0));
                let a = b.t().dot(&b) + Array2::<f64>::eye(n) * 0.5;
                let x0 = Array1::from_shape_fn(n, |_| rng.gen_range(-5.0..5.0));

                let f = |x: &Array1<f64>| {
                    let ax = a.dot(x);
                    (x.dot(&ax), ax * 2.)
                };
                let r = minimize(f, &x0, &FmincgOptions::new().with_max_iterations(50)).unwrap();

                assert!(
                    Lin::norm(&r.x) < 1e-5,
                    "n = {}: |x| = {:e}",
                    n,
                    Lin::norm(&r.x)
                );
                assert!(non_increasing(&r.trace));
            }
        }
    }

    #[test]
    fn rosenbrock_trace_is_monotone() {
        let r = minimize(rosenbrock, &array![-1.2, 1.], &FmincgOptions::new().with_max_iterations(200))
            .unwrap();

        assert!(non_increasing(&r.trace));
        assert_abs_diff_eq!(r.x[0], 1., epsilon = 1e-4);
        assert_abs_diff_eq!(r.x[1], 1., epsilon = 1e-4);
        assert_eq!(r.value(), r.trace.last().copied());
    }

    #[test]
    fn restart_from_result_is_no_worse() {
        let options = FmincgOptions::new().with_max_iterations(15);
        let first = minimize(rosenbrock, &array![-1.2, 1.], &options).unwrap();
        let second = minimize(rosenbrock, &first.x, &options).unwrap();

        let before = rosenbrock(&first.x).0;
        let after = rosenbrock(&second.x).0;
        assert!(after <= before, "{} > {}", after, before);
    }

    #[test]
    fn line_search_budget() {
        for n in 1..10 {
            let r = minimize(
                rosenbrock,
                &array![-1.2, 1.],
                &FmincgOptions::new().with_run_length(RunLength::LineSearches(n)),
            )
            .unwrap();
            assert!(r.iterations <= n);
            assert!(r.trace.len() <= n);
        }
    }

    #[test]
    fn evaluation_budget() {
        for n in [1, 2, 5, 17, 40, 80] {
            let calls = Cell::new(0);
            let f = |x: &Array1<f64>| {
                calls.set(calls.get() + 1);
                rosenbrock(x)
            };
            let r = minimize(f, &array![-1.2, 1.], &FmincgOptions::new().with_max_iterations(-(n as i64)))
                .unwrap();

            assert!(calls.get() <= n, "{} evaluations for a budget of {}", calls.get(), n);
            assert_eq!(r.evaluations, calls.get());
            assert_eq!(r.iterations, calls.get());
        }
    }

    #[test]
    fn gradient_dimension_mismatch() {
        let calls = Cell::new(0);
        let f = |_: &Rn<f64>| {
            calls.set(calls.get() + 1);
            (1., Rn::new(vec![0., 0.]))
        };
        let r = minimize(f, &Rn::new(vec![1., 2., 3.]), &FmincgOptions::new());

        assert!(matches!(r, Err(FmincgError::InvalidArgument(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn non_finite_start_is_rejected() {
        let calls = Cell::new(0);
        let f = |x: &Rn<f64>| {
            calls.set(calls.get() + 1);
            (0., x.clone())
        };
        let r = minimize(f, &Rn::new(vec![1., f64::NAN]), &FmincgOptions::new());
        assert!(matches!(r, Err(FmincgError::InvalidArgument(_))));

        let r = minimize(f, &Rn::new(vec![]), &FmincgOptions::new());
        assert!(matches!(r, Err(FmincgError::InvalidArgument(_))));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn nan_gradient_at_one_point_is_bisected_away() {
        let calls = Cell::new(0);
        let f = |x: &Rn<f64>| {
            calls.set(calls.get() + 1);
            let (v, mut g) = shifted_square(x);
            // first trial point of the first line search
            if calls.get() == 2 {
                g[0] = f64::NAN;
            }
            (v, g)
        };
        let r = minimize(f, &Rn::new(vec![0.]), &FmincgOptions::new().with_max_iterations(20)).unwrap();

        assert!(r.x.all_finite());
        assert!(r.trace.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(r.x[0], 3., epsilon = 1e-4);
    }

    #[test]
    fn objective_error_is_propagated() {
        let m = Fmincg::<f64>::new();
        let calls = Cell::new(0);
        let f = |x: &Rn<f64>| {
            calls.set(calls.get() + 1);
            if calls.get() > 3 {
                Err("singular model".to_string())
            } else {
                Ok(shifted_square(x))
            }
        };
        match m.try_minimize(&Rn::new(vec![0.]), f, &FmincgOptions::new()) {
            Err(FmincgError::Objective(e)) => assert_eq!(e.to_string(), "singular model"),
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[test]
    fn already_at_minimum() {
        let f = |x: &Rn<f64>| (x[0] * x[0], Rn::new(vec![2. * x[0]]));
        let r = minimize(f, &Rn::new(vec![0.]), &FmincgOptions::new()).unwrap();

        assert_eq!(r.termination, Termination::Converged);
        assert_eq!(r.x[0], 0.);
        assert!(r.trace.is_empty());
        assert_eq!(r.iterations, 2);
    }

    #[test]
    fn inconsistent_gradient_fails_twice() {
        // gradient has wrong sign
        let f = |x: &Rn<f64>| (x[0] * x[0], Rn::new(vec![-2. * x[0]]));
        let r = minimize(f, &Rn::new(vec![1.]), &FmincgOptions::new()).unwrap();

        match r.termination {
            Termination::LineSearchFailedTwice => (),
            _ => panic!("unexpected result: {:?}", r),
        }
        assert_eq!(r.x[0], 1.);
        assert!(r.trace.is_empty());
    }

    #[test]
    fn callback_sees_every_success() {
        let m = Fmincg::<f64>::new();
        let mut seen = vec![];
        let r = m
            .minimize_with_trace(
                &array![-1.2, 1.],
                rosenbrock,
                &FmincgOptions::new().with_max_iterations(30),
                |x, info| {
                    assert_eq!(info.k, seen.len());
                    assert!(info.line_eval_count >= 1);
                    assert_eq!(rosenbrock(x).0, info.value);
                    seen.push(info.value);
                },
            )
            .unwrap();

        assert_eq!(seen, r.trace);
    }

    #[test]
    fn single_precision() {
        let m = Fmincg::<f32>::new();
        let f = |x: &Rn<f32>| {
            let v = (x[0] - 1.).powi(2) + 4. * (x[1] + 2.).powi(2);
            (v, Rn::new(vec![2. * (x[0] - 1.), 8. * (x[1] + 2.)]))
        };
        let r = m.minimize(&Rn::new(vec![0f32, 0.]), f, &FmincgOptions::new()).unwrap();

        assert_abs_diff_eq!(r.x[0], 1., epsilon = 1e-3);
        assert_abs_diff_eq!(r.x[1], -2., epsilon = 1e-3);
    }

    #[test]
    fn smaller_first_reduction_still_converges() {
        let r = minimize(
            shifted_square,
            &Rn::new(vec![0.]),
            &FmincgOptions::new().with_max_iterations(20).with_reduction(1e-3),
        )
        .unwrap();
        assert_abs_diff_eq!(r.x[0], 3., epsilon = 1e-4);
    }

    #[test]
    fn shifted_square_anywhere() {
        fn prop(c: f64, x0: f64) -> TestResult {
            if !c.is_finite() || !x0.is_finite() || c.abs() > 1e3 || x0.abs() > 1e3 {
                return TestResult::discard();
            }
            let f = |x: &f64| ((x - c).powi(2), 2. * (x - c));
            let r = minimize(f, &x0, &FmincgOptions::new().with_max_iterations(50)).unwrap();
            TestResult::from_bool((r.x - c).abs() <= 1e-4 * (1. + c.abs()) && non_increasing(&r.trace))
        }
        quickcheck(prop as fn(f64, f64) -> TestResult);
    }
}
