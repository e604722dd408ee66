use crate::core::kernel::StreamEndpoints;
use serde::{Deserialize, Serialize};

/// Binance product line; selects REST paths and stream hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Spot,
    /// USDⓈ-margined futures
    #[default]
    UsdMFutures,
    /// Coin-margined futures
    CoinMFutures,
}

impl Market {
    pub fn rest_url(self, testnet: bool) -> &'static str {
        match (self, testnet) {
            (Self::Spot, false) => "https://api.binance.com",
            (Self::Spot, true) => "https://testnet.binance.vision",
            (Self::UsdMFutures, false) => "https://fapi.binance.com",
            (Self::CoinMFutures, false) => "https://dapi.binance.com",
            (Self::UsdMFutures | Self::CoinMFutures, true) => "https://testnet.binancefuture.com",
        }
    }

    fn ws_host(self, testnet: bool) -> &'static str {
        match (self, testnet) {
            (Self::Spot, false) => "wss://stream.binance.com:9443",
            (Self::Spot, true) => "wss://testnet.binance.vision",
            (Self::UsdMFutures, false) => "wss://fstream.binance.com",
            (Self::UsdMFutures, true) => "wss://stream.binancefuture.com",
            (Self::CoinMFutures, false) => "wss://dstream.binance.com",
            (Self::CoinMFutures, true) => "wss://dstream.binancefuture.com",
        }
    }

    /// Raw (`/ws`) and combined (`/stream?streams=`) stream bases
    pub fn stream_endpoints(self, testnet: bool) -> StreamEndpoints {
        let host = self.ws_host(testnet);
        StreamEndpoints::new(
            format!("{}/ws", host),
            format!("{}/stream?streams=", host),
        )
    }

    /// Versioned prefix shared by most REST paths
    pub fn api_prefix(self) -> &'static str {
        match self {
            Self::Spot => "/api/v3",
            Self::UsdMFutures => "/fapi/v1",
            Self::CoinMFutures => "/dapi/v1",
        }
    }

    pub fn listen_key_path(self) -> &'static str {
        match self {
            Self::Spot => "/api/v3/userDataStream",
            Self::UsdMFutures => "/fapi/v1/listenKey",
            Self::CoinMFutures => "/dapi/v1/listenKey",
        }
    }
}
