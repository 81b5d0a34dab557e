use thiserror::Error;

/// Error type for the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    /// A bucket or registry was configured with a value outside of its valid
    /// range.
    ///
    /// Capacity and refill rate must be finite and strictly positive, the
    /// initial balance must be finite and non-negative.
    #[error("Invalid configuration: `{field}` cannot be {value}")]
    InvalidConfiguration {
        /// The name of the offending setting.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },
    /// Tried to acquire a negative or NaN amount of tokens.
    #[error("Invalid amount of tokens requested: {amount}")]
    InvalidAmount {
        /// The rejected amount.
        amount: f64,
    },
}
