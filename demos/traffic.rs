//! Simulates bursts of requests against a global budget, two per-service
//! budgets and one budget per client.
//!
//! Run with `RUST_LOG=trace cargo run --example traffic --features tracing` to
//! see every admission decision.

use std::env;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use token_bucket::{RateLimiter, Registry, TokenBucket};
use tokio::task::JoinSet;
use tokio::time::{self, Duration};

fn init_logging() {
    use tracing_subscriber::prelude::*;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .compact(),
        )
        .init();
}

fn report(
    name: &'static str,
    limiter: Arc<dyn RateLimiter + Send + Sync>,
    tasks: &mut JoinSet<()>,
) {
    tasks.spawn(async move {
        if limiter.try_acquire_one() {
            println!("{name} request accepted");
        } else {
            println!("{name} request denied");
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let bursts = match env::args().nth(1) {
        Some(bursts) => bursts.parse::<usize>().context("parsing number of bursts")?,
        None => 20,
    };

    let global = Arc::new(TokenBucket::new(500.0, 1.0)?);
    let service_a = Arc::new(TokenBucket::new(50.0, 10.0)?);
    let service_b = Arc::new(TokenBucket::new(100.0, 5.0)?);
    let clients = Arc::new(Registry::new(20.0, 1.0)?);

    let mut tasks = JoinSet::new();

    for _ in 0..bursts {
        report("Global", global.clone(), &mut tasks);
        report("Service A", service_a.clone(), &mut tasks);
        report("Service B", service_b.clone(), &mut tasks);
        report("User", clients.get_or_create("192.168.1.1"), &mut tasks);

        time::sleep(Duration::from_millis(100)).await;
    }

    while let Some(result) = tasks.join_next().await {
        result?;
    }

    println!("{:?}", global);
    println!("{:?}", clients);
    Ok(())
}
