use std::error::Error;

/// Errors surfaced by the minimizer and the gradient checker.
///
/// Numerical trouble during the line search is not an error: it is handled
/// by bisection or by giving up and returning the best point found.
#[derive(Debug, thiserror::Error)]
pub enum FmincgError {
    /// Malformed input: empty or non-finite starting point, or a gradient
    /// whose dimension does not match the point.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The objective function itself reported an error.
    #[error("objective function failed: {0}")]
    Objective(#[source] Box<dyn Error + Send + Sync>),
}
