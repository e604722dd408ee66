pub mod core;
pub mod exchanges;

pub use core::{
    config::{ExchangeConfig, StreamSettings},
    errors::{ApiError, ExchangeError},
};
pub use exchanges::binance::{build_client, BinanceClient, Market};
