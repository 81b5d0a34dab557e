#![deny(missing_docs)]
//! A token-based rate limiter based on the [token bucket] algorithm.
//!
//! A [`TokenBucket`] holds up to a fixed `capacity` of tokens and regains them
//! continuously at a fixed `refill_rate` per second. Requests ask for some
//! amount of tokens through [`TokenBucket::try_acquire`] and are either
//! admitted immediately, in which case the tokens are deducted, or denied,
//! in which case nothing changes. Denial is a normal outcome and never an
//! error.
//!
//! There is no background task refilling the bucket. Instead the time elapsed
//! since the last admission check is accounted for at the start of the next
//! one, under the same lock that guards the check itself. This makes every
//! admission check atomic with respect to concurrent callers.
//!
//! A [`Registry`] hands out one bucket per identifier, such as a client
//! address, creating it on first use.
//!
//! ## Usage
//!
//! Add the following to your `Cargo.toml`:
//!
//! ```toml
//! token-bucket = "0.1.0"
//! ```
//!
//! ## Features
//!
//! * `tracing` - Emit [`tracing`] events for admission decisions and bucket
//!   creation.
//!
//! ## Examples
//!
//! Global, per-service and per-client budgets can all be used through the
//! [`RateLimiter`] trait:
//!
//! ```
//! use std::sync::Arc;
//! use token_bucket::{RateLimiter, Registry, TokenBucket};
//!
//! let global = TokenBucket::new(500.0, 1.0)?;
//! let service_a = Arc::new(TokenBucket::new(50.0, 10.0)?);
//! let clients = Registry::new(20.0, 1.0)?;
//!
//! let client = clients.get_or_create("192.168.1.1");
//! let limiters: [&dyn RateLimiter; 3] = [&global, &service_a, &client];
//!
//! for limiter in limiters {
//!     assert!(limiter.try_acquire_one());
//! }
//! # Ok::<_, token_bucket::Error>(())
//! ```
//!
//! Tokens are continuous, so fractional requests are fine:
//!
//! ```
//! use token_bucket::TokenBucket;
//!
//! let bucket = TokenBucket::new(1.0, 1.0)?;
//!
//! assert!(bucket.try_acquire(0.25));
//! assert!(bucket.try_acquire(0.75));
//! assert!(!bucket.try_acquire(0.5));
//! # Ok::<_, token_bucket::Error>(())
//! ```
//!
//! [token bucket]: https://en.wikipedia.org/wiki/Token_bucket
//! [`tracing`]: https://docs.rs/tracing

use std::sync::Arc;

macro_rules! trace {
    ($($tt:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            ::tracing::trace!($($tt)*);
        }
    };
}

macro_rules! debug {
    ($($tt:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            ::tracing::debug!($($tt)*);
        }
    };
}

mod bucket;
mod error;
mod registry;

pub use self::bucket::{Builder, TokenBucket};
pub use self::error::Error;
pub use self::registry::Registry;

/// Something which can admit or deny requests for tokens without waiting.
///
/// This allows global, per-service and per-identifier limiters to be used
/// interchangeably by the code performing the admission checks.
pub trait RateLimiter {
    /// Try to acquire `amount` tokens, returning `true` if they were granted.
    fn try_acquire(&self, amount: f64) -> bool;

    /// Try to acquire a single token.
    #[inline]
    fn try_acquire_one(&self) -> bool {
        self.try_acquire(1.0)
    }
}

impl RateLimiter for TokenBucket {
    #[inline]
    fn try_acquire(&self, amount: f64) -> bool {
        TokenBucket::try_acquire(self, amount)
    }
}

impl<T> RateLimiter for &T
where
    T: ?Sized + RateLimiter,
{
    #[inline]
    fn try_acquire(&self, amount: f64) -> bool {
        (**self).try_acquire(amount)
    }
}

impl<T> RateLimiter for Box<T>
where
    T: ?Sized + RateLimiter,
{
    #[inline]
    fn try_acquire(&self, amount: f64) -> bool {
        (**self).try_acquire(amount)
    }
}

impl<T> RateLimiter for Arc<T>
where
    T: ?Sized + RateLimiter,
{
    #[inline]
    fn try_acquire(&self, amount: f64) -> bool {
        (**self).try_acquire(amount)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{RateLimiter, TokenBucket};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_send_sync() {
        assert_send_sync::<TokenBucket>();
        assert_send_sync::<super::Registry>();
    }

    #[test]
    fn test_trait_objects() {
        let limiters: Vec<Box<dyn RateLimiter>> = vec![
            Box::new(TokenBucket::new(1.0, 0.001).expect("build bucket")),
            Box::new(Arc::new(TokenBucket::new(2.0, 0.001).expect("build bucket"))),
        ];

        let admitted = limiters
            .iter()
            .map(|limiter| (0..3).filter(|_| limiter.try_acquire_one()).count())
            .collect::<Vec<_>>();

        assert_eq!(admitted, [1, 2]);
    }
}
