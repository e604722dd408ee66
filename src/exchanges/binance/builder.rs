use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    HmacSigner, HttpExecutor, RestClientBuilder, RestClientConfig, ServerClock,
};
use crate::exchanges::binance::{market::Market, rest::BinanceRestClient, streams::BinanceStreams};
use std::sync::Arc;
use tracing::debug;

/// REST endpoints and stream constructors for one market, sharing one
/// configuration and one clock offset
#[derive(Debug, Clone)]
pub struct BinanceClient {
    rest: BinanceRestClient,
    streams: BinanceStreams,
}

impl BinanceClient {
    pub fn rest(&self) -> &BinanceRestClient {
        &self.rest
    }

    pub fn streams(&self) -> &BinanceStreams {
        &self.streams
    }

    pub fn market(&self) -> Market {
        self.rest.market()
    }
}

/// Explicit `base_url` wins over the environment's default host
fn rest_base_url(config: &ExchangeConfig, market: Market) -> String {
    config
        .base_url
        .clone()
        .unwrap_or_else(|| market.rest_url(config.testnet).to_string())
}

fn build(
    config: &ExchangeConfig,
    market: Market,
    executor: Option<Arc<dyn HttpExecutor>>,
) -> Result<BinanceClient, ExchangeError> {
    let base_url = rest_base_url(config, market);
    debug!(base_url = %base_url, ?market, testnet = config.testnet, "Building Binance client");

    let clock = ServerClock::new();
    let mut rest_builder =
        RestClientBuilder::new(RestClientConfig::new(base_url, "binance".to_string()));

    // Add authentication if credentials are provided
    if config.has_credentials() {
        let signer = Arc::new(HmacSigner::new(
            config.api_key().to_string(),
            config.secret_key().to_string(),
            clock.clone(),
        ));
        rest_builder = rest_builder.with_signer(signer);
    }
    if let Some(executor) = executor {
        rest_builder = rest_builder.with_executor(executor);
    }

    let rest = BinanceRestClient::new(rest_builder.build()?, clock, market);
    let streams = BinanceStreams::new(market.stream_endpoints(config.testnet), config.stream);

    Ok(BinanceClient { rest, streams })
}

/// Create a client backed by reqwest
pub fn build_client(config: &ExchangeConfig, market: Market) -> Result<BinanceClient, ExchangeError> {
    build(config, market, None)
}

/// Create a client whose HTTP calls go through `executor`
pub fn build_client_with_executor(
    config: &ExchangeConfig,
    market: Market,
    executor: Arc<dyn HttpExecutor>,
) -> Result<BinanceClient, ExchangeError> {
    build(config, market, Some(executor))
}
