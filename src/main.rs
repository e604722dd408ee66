use binance_link::core::kernel::{RequestOptions, StreamHandlers};
use binance_link::{build_client, ExchangeConfig, Market};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Credentials are optional; public endpoints and streams work without them
    let config = ExchangeConfig::from_env("BINANCE")
        .unwrap_or_else(|_| ExchangeConfig::read_only())
        .testnet(true); // Use testnet for safety

    let client = build_client(&config, Market::UsdMFutures)?;
    let options = RequestOptions::new().with_recv_window(5000);

    let offset = client.rest().sync_time(&options).await?;
    info!(offset_ms = offset, "Clock synchronised");

    let depth = client.rest().depth("BTCUSDT", Some(5), &options).await?;
    for level in depth.bids.iter().take(5) {
        info!(price = %level.price, quantity = %level.quantity, "bid");
    }

    if config.has_credentials() {
        match client.rest().balance(&options).await {
            Ok(balances) => {
                for balance in balances {
                    info!(asset = %balance.asset, available = %balance.available_balance, "balance");
                }
            }
            Err(e) => error!(error = %e, "Failed to fetch balances"),
        }
    }

    let handlers = StreamHandlers::new(
        |event: binance_link::exchanges::binance::TickerEvent| {
            info!(symbol = %event.symbol, last = %event.last_price, "ticker");
        },
        |e| error!(error = %e, "stream error"),
    )
    .on_close(|code, reason| info!(code, reason = %reason, "stream closed"));

    let handle = client
        .streams()
        .combined_ticker(&["BTCUSDT", "ETHUSDT"], handlers)?
        .start();

    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.shutdown().await?;

    Ok(())
}
