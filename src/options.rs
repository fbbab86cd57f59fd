//! Run-length options and line search parameters.

use serde::Deserialize;

/// Number of line searches used when no run length is given.
pub const DEFAULT_RUN_LENGTH: usize = 100;

/// Length of a minimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLength {
    /// Maximum number of line searches.
    LineSearches(usize),
    /// Maximum number of function evaluations (the initial one included).
    Evaluations(usize),
}

impl Default for RunLength {
    fn default() -> Self {
        RunLength::LineSearches(DEFAULT_RUN_LENGTH)
    }
}

impl RunLength {
    /// Signed convention: positive counts line searches, negative counts
    /// function evaluations, zero means the default.
    pub fn from_signed(length: i64) -> Self {
        let n = usize::try_from(length.unsigned_abs()).unwrap_or(usize::MAX);
        if length > 0 {
            RunLength::LineSearches(n)
        } else if length < 0 {
            RunLength::Evaluations(n)
        } else {
            RunLength::default()
        }
    }

    /// Inverse of `from_signed`, saturating at `i64::MAX` in magnitude so
    /// that a huge run length never changes what it counts.
    pub fn signed(&self) -> i64 {
        match *self {
            RunLength::LineSearches(n) => i64::try_from(n).unwrap_or(i64::MAX),
            RunLength::Evaluations(n) => -i64::try_from(n).unwrap_or(i64::MAX),
        }
    }

    /// The bound on the run counter.
    pub fn limit(&self) -> usize {
        match *self {
            RunLength::LineSearches(n) | RunLength::Evaluations(n) => n,
        }
    }

    /// Value of the run counter, which tracks whichever quantity this run
    /// length bounds.
    pub fn counter(&self, line_searches: usize, evaluations: usize) -> usize {
        match *self {
            RunLength::LineSearches(_) => line_searches,
            RunLength::Evaluations(_) => evaluations,
        }
    }
}

/// User facing options of a run.
///
/// Deserializes from a map; `maxiter` is accepted for `max_iterations` and
/// any other key is ignored.
///
/// ```rust
/// use fmincg::{FmincgOptions, RunLength};
///
/// let o: FmincgOptions = serde_json::from_str(r#"{"maxiter": -50, "verbose": true}"#).unwrap();
/// assert_eq!(o.run_length(), RunLength::Evaluations(50));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FmincgOptions {
    /// Signed run length, see `RunLength::from_signed`. `None` or `0` means
    /// 100 line searches.
    #[serde(alias = "maxiter")]
    pub max_iterations: Option<i64>,
    /// Reduction in function value expected in the first line search.
    /// Defaults to `1.0`.
    pub reduction: Option<f64>,
}

impl FmincgOptions {
    /// Defaults: 100 line searches, expected first reduction `1.0`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Signed run length, see `RunLength::from_signed`.
    pub fn with_max_iterations(mut self, length: i64) -> Self {
        self.max_iterations = Some(length);
        self
    }

    /// Run length given as a `RunLength`.
    pub fn with_run_length(mut self, length: RunLength) -> Self {
        self.max_iterations = Some(length.signed());
        self
    }

    /// Reduction in function value expected in the first line search.
    pub fn with_reduction(mut self, reduction: f64) -> Self {
        self.reduction = Some(reduction);
        self
    }

    /// The run length, 100 line searches unless set to something nonzero.
    pub fn run_length(&self) -> RunLength {
        self.max_iterations
            .map(RunLength::from_signed)
            .unwrap_or_default()
    }

    /// The expected first reduction, `1.0` unless set.
    pub fn reduction(&self) -> f64 {
        self.reduction.unwrap_or(1.)
    }
}

/// Line search parameters of the minimizer.
#[derive(Debug, Clone)]
pub struct Fmincg<S> {
    /// `rho` for the sufficient decrease (Wolfe-Powell) condition
    pub rho: S,
    /// `sigma` for the curvature (Wolfe-Powell) condition
    pub sig: S,
    /// Do not re-evaluate within this fraction of the current bracket limit
    pub int: S,
    /// Extrapolate at most this many times the current bracket
    pub ext: S,
    /// Maximum number of function evaluations per line search
    pub max_evals: usize,
    /// Maximum allowed slope ratio when guessing the next step
    pub ratio: S,
}

impl Default for Fmincg<f32> {
    fn default() -> Self {
        Fmincg {
            rho: 0.01,
            sig: 0.5,
            int: 0.1,
            ext: 3.,
            max_evals: 20,
            ratio: 100.,
        }
    }
}

impl Default for Fmincg<f64> {
    fn default() -> Self {
        Fmincg {
            rho: 0.01,
            sig: 0.5,
            int: 0.1,
            ext: 3.,
            max_evals: 20,
            ratio: 100.,
        }
    }
}

impl Fmincg<f32> {
    /// Defaults for `f32` type: the constants of Rasmussen's `fmincg`
    pub fn new() -> Self {
        Default::default()
    }
}

impl Fmincg<f64> {
    /// Defaults for `f64` type: the constants of Rasmussen's `fmincg`
    pub fn new() -> Self {
        Default::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signed_run_length() {
        assert_eq!(RunLength::from_signed(20), RunLength::LineSearches(20));
        assert_eq!(RunLength::from_signed(-7), RunLength::Evaluations(7));
        assert_eq!(RunLength::from_signed(0), RunLength::LineSearches(100));
        assert_eq!(RunLength::Evaluations(7).signed(), -7);
        assert_eq!(RunLength::Evaluations(7).counter(2, 5), 5);
        assert_eq!(RunLength::LineSearches(7).counter(2, 5), 2);
    }

    #[test]
    fn options_from_json() {
        let o: FmincgOptions = serde_json::from_str(r#"{"max_iterations": 20}"#).unwrap();
        assert_eq!(o.run_length(), RunLength::LineSearches(20));

        let o: FmincgOptions = serde_json::from_str(r#"{"maxiter": -30}"#).unwrap();
        assert_eq!(o.run_length(), RunLength::Evaluations(30));

        let o: FmincgOptions =
            serde_json::from_str(r#"{"display": "iter", "tol": 1e-6, "reduction": 0.5}"#)
                .unwrap();
        assert_eq!(o.run_length(), RunLength::default());
        assert_eq!(o.reduction(), 0.5);
    }

    #[test]
    fn falsy_run_length_means_default() {
        let o: FmincgOptions = serde_json::from_str(r#"{"maxiter": 0}"#).unwrap();
        assert_eq!(o.run_length(), RunLength::LineSearches(DEFAULT_RUN_LENGTH));

        let o: FmincgOptions = serde_json::from_str(r#"{"maxiter": null}"#).unwrap();
        assert_eq!(o.run_length(), RunLength::LineSearches(DEFAULT_RUN_LENGTH));
        assert_eq!(FmincgOptions::new().reduction(), 1.);
    }

    #[test]
    fn builder() {
        let o = FmincgOptions::new()
            .with_run_length(RunLength::Evaluations(12))
            .with_reduction(2.);
        assert_eq!(o.max_iterations, Some(-12));
        assert_eq!(o.run_length(), RunLength::Evaluations(12));
        assert_eq!(o.reduction(), 2.);
    }

    #[test]
    fn huge_run_length_keeps_its_kind() {
        let o = FmincgOptions::new().with_run_length(RunLength::LineSearches(usize::MAX));
        assert!(o.max_iterations.unwrap() > 0);
        assert!(matches!(o.run_length(), RunLength::LineSearches(n) if n as u64 >= u32::MAX as u64));

        let o = FmincgOptions::new().with_run_length(RunLength::Evaluations(usize::MAX));
        assert!(o.max_iterations.unwrap() < 0);
        assert!(matches!(o.run_length(), RunLength::Evaluations(n) if n as u64 >= u32::MAX as u64));

        assert!(matches!(RunLength::from_signed(i64::MIN), RunLength::Evaluations(n) if n > 0));
        assert!(matches!(RunLength::from_signed(i64::MAX), RunLength::LineSearches(n) if n > 0));
    }
}
