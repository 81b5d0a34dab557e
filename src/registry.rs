use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bucket::{Config, TokenBucket};
use crate::error::Error;

/// A collection of token buckets, one per identifier.
///
/// Buckets are created lazily on first use with the configuration of the
/// registry, so every identifier gets its own independent budget. A registry
/// is meant to live as long as the budgets it tracks, typically for the whole
/// process, and to be shared between callers.
///
/// The map is guarded by a lock which is only held while looking up or
/// inserting a bucket. Admission checks happen under the lock of the
/// individual bucket, so requests for unrelated identifiers never contend.
///
/// # Examples
///
/// ```
/// use token_bucket::Registry;
///
/// let registry = Registry::new(2.0, 1.0)?;
///
/// assert!(registry.request_for("192.168.1.1", 1.0));
/// assert!(registry.request_for("192.168.1.1", 1.0));
/// assert!(!registry.request_for("192.168.1.1", 1.0));
///
/// // Other clients have their own budget.
/// assert!(registry.request_for("192.168.1.2", 1.0));
/// # Ok::<_, token_bucket::Error>(())
/// ```
pub struct Registry<K = String> {
    config: Config,
    buckets: Mutex<HashMap<K, Arc<TokenBucket>>>,
}

impl Registry<String> {
    /// Construct an empty registry keyed by strings whose buckets start full.
    ///
    /// To use another key type or a different initial balance, see
    /// [`Builder::registry`].
    ///
    /// [`Builder::registry`]: crate::Builder::registry
    ///
    /// # Errors
    ///
    /// Errors with [`Error::InvalidConfiguration`] unless both `capacity` and
    /// `refill_rate` are finite and positive.
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, Error> {
        TokenBucket::builder()
            .capacity(capacity)
            .refill_rate(refill_rate)
            .registry()
    }
}

impl<K> Registry<K> {
    pub(crate) fn from_config(config: Config) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The capacity given to every bucket in this registry.
    #[inline]
    pub fn capacity(&self) -> f64 {
        self.config.capacity
    }

    /// The refill rate given to every bucket in this registry.
    #[inline]
    pub fn refill_rate(&self) -> f64 {
        self.config.refill_rate
    }

    /// The number of identifiers with a bucket.
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Test if no bucket has been created yet.
    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }
}

impl<K> Registry<K>
where
    K: Hash + Eq,
{
    /// Get the bucket for `id`, creating it if this is the first time the
    /// identifier is seen.
    ///
    /// Concurrent first-time lookups of the same identifier all receive the
    /// same bucket.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use token_bucket::Registry;
    ///
    /// let registry = Registry::new(20.0, 1.0)?;
    ///
    /// let a = registry.get_or_create("10.0.0.1");
    /// let b = registry.get_or_create("10.0.0.1");
    /// assert!(Arc::ptr_eq(&a, &b));
    /// assert_eq!(registry.len(), 1);
    /// # Ok::<_, token_bucket::Error>(())
    /// ```
    pub fn get_or_create<Q>(&self, id: &Q) -> Arc<TokenBucket>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + ToOwned<Owned = K>,
    {
        let mut buckets = self.buckets.lock();

        if let Some(bucket) = buckets.get(id) {
            return bucket.clone();
        }

        let bucket = Arc::new(TokenBucket::from_config(self.config));
        buckets.insert(id.to_owned(), bucket.clone());
        debug!(buckets = buckets.len(), "created bucket");
        bucket
    }

    /// Get the bucket for `id` if one exists, without creating it.
    pub fn get<Q>(&self, id: &Q) -> Option<Arc<TokenBucket>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.buckets.lock().get(id).cloned()
    }

    /// Forget the bucket for `id`.
    ///
    /// Callers still holding the returned bucket can keep using it, but the
    /// next lookup of `id` starts over with a fresh bucket.
    pub fn remove<Q>(&self, id: &Q) -> Option<Arc<TokenBucket>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.buckets.lock().remove(id)
    }

    /// Try to acquire `amount` tokens from the bucket for `id`.
    ///
    /// This is [`get_or_create`] followed by [`TokenBucket::try_acquire`].
    /// The registry lock is released before the bucket is checked.
    ///
    /// [`get_or_create`]: Registry::get_or_create
    pub fn request_for<Q>(&self, id: &Q, amount: f64) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + ToOwned<Owned = K>,
    {
        let bucket = self.get_or_create(id);
        bucket.try_acquire(amount)
    }
}

impl<K> fmt::Debug for Registry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("capacity", &self.config.capacity)
            .field("refill_rate", &self.config.refill_rate)
            .field("buckets", &self.buckets.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Registry;
    use crate::TokenBucket;

    #[test]
    fn test_debug() {
        let registry = Registry::new(20.0, 1.0).expect("build registry");
        registry.get_or_create("a");
        registry.get_or_create("b");

        assert_eq!(
            "Registry { capacity: 20.0, refill_rate: 1.0, buckets: 2 }",
            format!("{:?}", registry)
        );
    }

    #[test]
    fn test_remove_starts_over() {
        let registry = Registry::new(1.0, 0.001).expect("build registry");

        assert!(registry.request_for("a", 1.0));
        assert!(!registry.request_for("a", 1.0));

        let removed = registry.remove("a").expect("bucket for a");
        assert!(registry.get("a").is_none());
        assert!(registry.is_empty());

        let fresh = registry.get_or_create("a");
        assert!(!Arc::ptr_eq(&removed, &fresh));
        assert!(registry.request_for("a", 1.0));
    }

    #[test]
    fn test_other_keys() {
        let registry = TokenBucket::builder()
            .capacity(3.0)
            .refill_rate(1.0)
            .initial(1.0)
            .registry::<u32>()
            .expect("build registry");

        assert!(registry.request_for(&7u32, 1.0));
        assert!(!registry.request_for(&7u32, 1.0));
        assert!(registry.request_for(&8u32, 1.0));
        assert_eq!(registry.len(), 2);
    }
}
