//! Local fixed-window quota demo.
//!
//! Run with:
//! ```
//! cargo run --example local_quota --features memory
//! ```
//!
//! Settings are read from `FIXED_QUOTA_CONFIG` (a YAML file path) and the
//! `FIXED_QUOTA__*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use fixed_quota::{telemetry, Driver, Limiter, RateLimiter, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::var_os("FIXED_QUOTA_CONFIG").map(PathBuf::from);
    let mut settings = Settings::load(path.as_deref())?;
    telemetry::init(&settings.logger)?;

    // Keep the demo short regardless of the configured window.
    settings.ratelimit.driver = Driver::Local;
    settings.ratelimit.limit = 3;
    settings.ratelimit.frequency_ms = 1_000;

    let limiter = Limiter::from_settings(&settings.ratelimit).await?;

    println!("=== Fixed-window quota demo ===\n");
    println!("Quota: {} requests per {:?}\n", limiter.quota().limit(), limiter.quota().frequency());

    for i in 1..=5 {
        match limiter.acquire("192.168.0.10").await {
            Ok(token) => println!(
                "Request {}: allowed as #{} (window ends in {:?})",
                i,
                token.number(),
                token.time_until_expiry()
            ),
            Err(err) if err.is_quota_exhausted() => println!("Request {}: denied ({})", i, err),
            Err(err) => return Err(err.into()),
        }
    }

    println!("\n--- Another client has its own window ---\n");
    let token = limiter.acquire("192.168.0.11").await?;
    println!("192.168.0.11: allowed as #{}", token.number());

    println!("\n--- Waiting for the window to roll over ---\n");
    tokio::time::sleep(Duration::from_millis(1_050)).await;

    let tokens = limiter.acquire_n("192.168.0.10", 2).await?;
    let numbers: Vec<u64> = tokens.iter().map(|t| t.number()).collect();
    println!("192.168.0.10: bulk grant {:?}", numbers);

    Ok(())
}
