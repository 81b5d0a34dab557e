use std::fmt;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Error;
use crate::registry::Registry;

/// Validated configuration shared by every bucket built from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Config {
    pub(crate) capacity: f64,
    pub(crate) refill_rate: f64,
    pub(crate) initial: f64,
}

impl Config {
    fn new(capacity: f64, refill_rate: f64, initial: Option<f64>) -> Result<Self, Error> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(Error::InvalidConfiguration {
                field: "capacity",
                value: capacity,
            });
        }

        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(Error::InvalidConfiguration {
                field: "refill_rate",
                value: refill_rate,
            });
        }

        let initial = match initial {
            Some(initial) if !initial.is_finite() || initial < 0.0 => {
                return Err(Error::InvalidConfiguration {
                    field: "initial",
                    value: initial,
                });
            }
            // Saturate to capacity.
            Some(initial) => initial.min(capacity),
            None => capacity,
        };

        Ok(Self {
            capacity,
            refill_rate,
            initial,
        })
    }

    /// The balance after `elapsed` seconds, clamped to capacity.
    ///
    /// An overflowing product becomes infinity, which also clamps.
    #[inline]
    fn projected(&self, available: f64, elapsed: f64) -> f64 {
        (available + elapsed * self.refill_rate).min(self.capacity)
    }
}

/// Builder for a [`TokenBucket`] or a [`Registry`] of them.
///
/// Constructed through [`TokenBucket::builder`].
///
/// # Examples
///
/// ```
/// use token_bucket::TokenBucket;
///
/// let bucket = TokenBucket::builder()
///     .capacity(100.0)
///     .refill_rate(5.0)
///     .initial(10.0)
///     .build()?;
///
/// assert!(bucket.try_acquire(10.0));
/// assert!(!bucket.try_acquire(1.0));
/// # Ok::<_, token_bucket::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    capacity: Option<f64>,
    refill_rate: Option<f64>,
    initial: Option<f64>,
}

impl Builder {
    /// Set the maximum number of tokens the bucket can hold.
    ///
    /// Defaults to `10`.
    #[inline]
    pub fn capacity(&mut self, capacity: f64) -> &mut Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the number of tokens added per second of elapsed time.
    ///
    /// Defaults to `1`.
    #[inline]
    pub fn refill_rate(&mut self, refill_rate: f64) -> &mut Self {
        self.refill_rate = Some(refill_rate);
        self
    }

    /// The number of tokens the bucket should start with.
    ///
    /// If set to larger than `capacity` at build time, will only saturate to
    /// `capacity`. Defaults to a full bucket.
    #[inline]
    pub fn initial(&mut self, initial: f64) -> &mut Self {
        self.initial = Some(initial);
        self
    }

    fn config(&self) -> Result<Config, Error> {
        const DEFAULT_CAPACITY: f64 = 10.0;
        const DEFAULT_REFILL_RATE: f64 = 1.0;

        Config::new(
            self.capacity.unwrap_or(DEFAULT_CAPACITY),
            self.refill_rate.unwrap_or(DEFAULT_REFILL_RATE),
            self.initial,
        )
    }

    /// Construct a new token bucket.
    ///
    /// # Errors
    ///
    /// Errors with [`Error::InvalidConfiguration`] if the capacity or refill
    /// rate is not finite and positive, or if the initial balance is negative.
    pub fn build(&self) -> Result<TokenBucket, Error> {
        Ok(TokenBucket::from_config(self.config()?))
    }

    /// Construct a new registry which hands out one bucket with this
    /// configuration per identifier.
    ///
    /// # Errors
    ///
    /// See [`Builder::build`].
    pub fn registry<K>(&self) -> Result<Registry<K>, Error> {
        Ok(Registry::from_config(self.config()?))
    }
}

/// Mutable state of a bucket, only ever touched under its lock.
struct State {
    /// Current balance, always in `[0, capacity]`.
    available: f64,
    /// When the balance was last brought up to date.
    last_refill: Instant,
}

impl State {
    /// Bring the balance up to date with the time elapsed since the last
    /// refill.
    fn refill(&mut self, config: &Config, now: Instant) {
        // NB: last_refill must never move backwards.
        if now <= self.last_refill {
            return;
        }

        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.available = config.projected(self.available, elapsed);
        self.last_refill = now;
    }
}

/// A token bucket with lazy, continuous refill.
///
/// The bucket holds up to `capacity` tokens and regains `refill_rate` tokens
/// per second of elapsed time. There is no background task, instead the
/// elapsed time is accounted for at the start of every admission check.
///
/// Admission checks are atomic: the refill, the comparison and the decrement
/// all happen under a lock private to the bucket, so concurrent callers can
/// never over-admit.
///
/// # Examples
///
/// ```
/// use token_bucket::TokenBucket;
///
/// let bucket = TokenBucket::new(50.0, 10.0)?;
///
/// assert!(bucket.try_acquire(1.0));
/// assert!(!bucket.try_acquire(100.0));
/// # Ok::<_, token_bucket::Error>(())
/// ```
pub struct TokenBucket {
    config: Config,
    state: Mutex<State>,
}

impl TokenBucket {
    /// Construct a full bucket.
    ///
    /// # Errors
    ///
    /// Errors with [`Error::InvalidConfiguration`] unless both `capacity` and
    /// `refill_rate` are finite and positive.
    ///
    /// ```
    /// use token_bucket::{Error, TokenBucket};
    ///
    /// assert!(matches!(
    ///     TokenBucket::new(0.0, 1.0),
    ///     Err(Error::InvalidConfiguration { field: "capacity", .. })
    /// ));
    /// ```
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, Error> {
        Ok(Self::from_config(Config::new(capacity, refill_rate, None)?))
    }

    /// Construct a new bucket through a builder.
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub(crate) fn from_config(config: Config) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                available: config.initial,
                last_refill: Instant::now(),
            }),
        }
    }

    /// The maximum number of tokens this bucket can hold.
    #[inline]
    pub fn capacity(&self) -> f64 {
        self.config.capacity
    }

    /// The number of tokens regained per second.
    #[inline]
    pub fn refill_rate(&self) -> f64 {
        self.config.refill_rate
    }

    /// Query how many tokens are available right now.
    ///
    /// This accounts for time elapsed since the last admission check but does
    /// not store the refill, so it never changes the outcome of later checks.
    /// It is only an estimate under contention, a following
    /// [`try_acquire`](TokenBucket::try_acquire) can still be denied.
    pub fn available(&self) -> f64 {
        let state = self.state.lock();
        let elapsed = Instant::now()
            .saturating_duration_since(state.last_refill)
            .as_secs_f64();
        self.config.projected(state.available, elapsed)
    }

    /// Try to acquire `amount` tokens without waiting.
    ///
    /// Returns `true` and deducts the tokens if at least `amount` are
    /// available after refilling. Otherwise the balance is left untouched and
    /// `false` is returned. Negative or NaN amounts are always denied, see
    /// [`checked_try_acquire`] to tell them apart from an exhausted bucket.
    ///
    /// [`checked_try_acquire`]: TokenBucket::checked_try_acquire
    ///
    /// # Examples
    ///
    /// ```
    /// use token_bucket::TokenBucket;
    ///
    /// let bucket = TokenBucket::new(20.0, 1.0)?;
    ///
    /// assert!(!bucket.try_acquire(25.0));
    /// assert!(bucket.try_acquire(20.0));
    /// # Ok::<_, token_bucket::Error>(())
    /// ```
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), level = "trace"))]
    pub fn try_acquire(&self, amount: f64) -> bool {
        if amount.is_nan() || amount < 0.0 {
            trace!(amount, "denied invalid amount");
            return false;
        }

        let mut state = self.state.lock();
        state.refill(&self.config, Instant::now());

        if amount <= state.available {
            state.available -= amount;
            trace!(available = state.available, "granted");
            true
        } else {
            trace!(available = state.available, "denied");
            false
        }
    }

    /// Try to acquire a single token.
    ///
    /// This is identical to [`try_acquire`] with an argument of `1`.
    ///
    /// [`try_acquire`]: TokenBucket::try_acquire
    #[inline]
    pub fn try_acquire_one(&self) -> bool {
        self.try_acquire(1.0)
    }

    /// Like [`try_acquire`], but reports a malformed request as an error
    /// instead of a denial.
    ///
    /// [`try_acquire`]: TokenBucket::try_acquire
    ///
    /// # Errors
    ///
    /// Errors with [`Error::InvalidAmount`] if `amount` is negative or NaN.
    ///
    /// ```
    /// use token_bucket::{Error, TokenBucket};
    ///
    /// let bucket = TokenBucket::new(5.0, 1.0)?;
    ///
    /// assert_eq!(bucket.checked_try_acquire(5.0), Ok(true));
    /// assert_eq!(bucket.checked_try_acquire(1.0), Ok(false));
    /// assert_eq!(
    ///     bucket.checked_try_acquire(-1.0),
    ///     Err(Error::InvalidAmount { amount: -1.0 })
    /// );
    /// # Ok::<_, Error>(())
    /// ```
    pub fn checked_try_acquire(&self, amount: f64) -> Result<bool, Error> {
        if amount.is_nan() || amount < 0.0 {
            return Err(Error::InvalidAmount { amount });
        }

        Ok(self.try_acquire(amount))
    }
}

impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.config.capacity)
            .field("refill_rate", &self.config.refill_rate)
            .field("available", &self.state.lock().available)
            .finish()
    }
}
