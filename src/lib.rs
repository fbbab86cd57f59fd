//! Minimization of differentiable multivariate functions with Rasmussen's
//! `fmincg`: Polack-Ribiere conjugate gradients, a line search built from
//! quadratic and cubic interpolation under the Wolfe-Powell conditions, and
//! the slope ratio method for guessing initial step sizes.
//!
//! ```rust
//! use fmincg::{Fmincg, FmincgOptions, Rn};
//!
//! // f(x) = x1^2 + 10 x2^2
//! let f = |x: &Rn<f64>| {
//!     (x[0].powi(2) + 10. * x[1].powi(2), Rn::new(vec![2. * x[0], 20. * x[1]]))
//! };
//! let options = FmincgOptions::new().with_max_iterations(50);
//! let r = Fmincg::<f64>::new().minimize(&Rn::new(vec![1., 1.]), f, &options).unwrap();
//! assert!(r.x[0].abs() < 1e-6 && r.x[1].abs() < 1e-6);
//! ```

pub mod cg;
pub mod checkgrad;
mod error;
pub mod lin;
pub mod options;

pub use cg::{minimize, FmincgIteration, FmincgResult, Termination};
pub use checkgrad::{check_grad, GradCheck};
pub use error::FmincgError;
pub use lin::{Lin, Rn};
pub use options::{Fmincg, FmincgOptions, RunLength};
