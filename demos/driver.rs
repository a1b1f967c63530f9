//! Fires 100 calls at a stub RPC over about two seconds, through a limiter admitting 10 per
//! second. Admitted results are printed by a separate task; denials are logged.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example driver
//! ```

use std::{sync::Arc, time::Duration};

use rand::Rng;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use rate_gate::{wrap, FixedWindowLimiter, LimiterConfig, RateLimitExceeded};

const CALLS: usize = 100;

async fn rpc_call() -> Result<u64, std::io::Error> {
    Ok(rand::thread_rng().gen())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let limiter = Arc::new(FixedWindowLimiter::new(LimiterConfig::new(
        10,
        Duration::from_secs(1),
    )?));
    let rpc = Arc::new(wrap(rpc_call, limiter.clone()));

    let (results, mut printed) = mpsc::channel(CALLS);
    let printer = tokio::spawn(async move {
        while let Some(value) = printed.recv().await {
            tracing::info!(value, "rpc result");
        }
    });

    let callers: Vec<_> = (0..CALLS)
        .map(|caller| {
            let rpc = rpc.clone();
            let results = results.clone();
            let delay = Duration::from_millis(rand::thread_rng().gen_range(0..2000));
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                match rpc.call().await {
                    Ok(Ok(value)) => {
                        // The printer only stops once every caller is done.
                        let _ = results.send(value).await;
                    }
                    Ok(Err(e)) => tracing::warn!(caller, error = %e, "rpc failed"),
                    Err(e @ RateLimitExceeded) => tracing::info!(caller, error = %e, "rejected"),
                }
            })
        })
        .collect();
    drop(results);

    for caller in callers {
        caller.await?;
    }
    printer.await?;

    limiter.shutdown().await;

    Ok(())
}
