use token_bucket::TokenBucket;
use tokio::time::{self, Duration};

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_idle_refill_is_bounded() -> anyhow::Result<()> {
    let bucket = TokenBucket::new(10.0, 2.0)?;

    assert!(bucket.try_acquire(10.0));

    time::advance(Duration::from_secs(2)).await;
    // 2 seconds at 2 tokens per second.
    assert_eq!(bucket.available(), 4.0);
    assert!(bucket.try_acquire(4.0));
    assert!(!bucket.try_acquire(1.0));

    time::advance(Duration::from_secs(100)).await;
    assert_eq!(bucket.available(), 10.0);
    assert!(!bucket.try_acquire(10.5));
    assert!(bucket.try_acquire(10.0));
    Ok(())
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_idle_counts_from_last_check() -> anyhow::Result<()> {
    let bucket = TokenBucket::new(10.0, 1.0)?;

    time::advance(Duration::from_secs(30)).await;

    // The bucket was already full, so the idle time before this check is not
    // banked.
    assert!(bucket.try_acquire(10.0));

    time::advance(Duration::from_secs(5)).await;
    assert!(bucket.try_acquire(5.0));
    assert!(!bucket.try_acquire(1.0));
    Ok(())
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_available_does_not_refill() -> anyhow::Result<()> {
    let bucket = TokenBucket::new(10.0, 1.0)?;
    assert!(bucket.try_acquire(10.0));

    // Interleaving queries must not lose or double count elapsed time.
    for expected in [1.0, 2.0, 3.0] {
        time::advance(Duration::from_secs(1)).await;
        assert_eq!(bucket.available(), expected);
    }

    assert!(bucket.try_acquire(3.0));
    assert_eq!(bucket.available(), 0.0);
    Ok(())
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_balance_stays_within_bounds() -> anyhow::Result<()> {
    let bucket = TokenBucket::new(7.0, 3.0)?;

    // Deterministic xorshift sequence of amounts and pauses.
    let mut seed = 0x2545_f491_u32;

    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        seed
    };

    for _ in 0..1000 {
        let amount = f64::from(next() % 900) / 100.0;
        let pause = Duration::from_millis(u64::from(next() % 1500));

        let before = bucket.available();
        let granted = bucket.try_acquire(amount);
        let after = bucket.available();

        assert!((0.0..=7.0).contains(&after), "balance out of bounds: {after}");

        if !granted {
            assert!(amount > before);
            assert_eq!(before, after);
        }

        time::advance(pause).await;
    }

    Ok(())
}
