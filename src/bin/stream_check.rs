//! Connect to the equities feed and print trades for a couple of symbols
//! for ten seconds, for manual inspection of live behavior.
//!
//! # Usage
//!
//! ```sh
//! export DATA_PROXY_KEY="your-key"
//! export DATA_PROXY_SECRET="your-secret"
//! cargo run --bin stream_check --features cli
//! ```

use std::time::Duration;

use streamfeed::config::EquitiesClientBuilder;

#[tokio::main]
async fn main() -> streamfeed::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = EquitiesClientBuilder::default()
        .feed("iex")
        .on_trade(|trade| println!("{trade:?}"))
        .on_status(|status| println!("{status:?}"))
        .build()?;

    let mut client = streamfeed::EquitiesClient::new(config);
    println!("Connecting…");
    client.connect().await?;

    println!("Subscribing to AAPL, MSFT trades and statuses…");
    client.subscribe_trades(["AAPL", "MSFT"]).await?;
    client.subscribe_statuses(["AAPL", "MSFT"]).await?;

    println!("Listening for 10 seconds…");
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(10)) => {
            println!("10 seconds elapsed, shutting down…");
        }
        cause = client.terminated() => {
            println!("Stream terminated: {cause:?}");
            return Ok(());
        }
    }

    client.shutdown();
    client.terminated().await;
    println!("Done.");
    Ok(())
}
