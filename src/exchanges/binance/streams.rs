use crate::core::config::StreamSettings;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    CombinedDecoder, DepthLevels, DepthUpdateSpeed, FrameDecoder, JsonDecoder, KlineInterval,
    MarkPriceRate, StreamConfig, StreamEndpoints, StreamHandlers, StreamName, StreamSession,
};
use crate::exchanges::binance::types::{
    AggTradeEvent, BookTickerEvent, DepthEvent, KlineEvent, MarkPriceEvent, MiniTickerEvent,
    TickerEvent, UserDataEvent,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::trace;

const TRADE_LITE_EVENT: &str = "TRADE_LITE";

pub type SingleStream<T> = StreamSession<JsonDecoder<T>>;
pub type CombinedStream<T> = StreamSession<CombinedDecoder<T>>;

/// Typed stream constructors for one market and environment
///
/// Every constructor returns a session that has not been started yet, so the
/// caller can attach a cancellation token before calling
/// [`StreamSession::start`].
#[derive(Debug, Clone)]
pub struct BinanceStreams {
    endpoints: StreamEndpoints,
    settings: StreamSettings,
}

impl BinanceStreams {
    pub fn new(endpoints: StreamEndpoints, settings: StreamSettings) -> Self {
        Self {
            endpoints,
            settings,
        }
    }

    pub fn endpoints(&self) -> &StreamEndpoints {
        &self.endpoints
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    fn config(&self, url: String) -> StreamConfig {
        trace!(url = %url, "Stream endpoint resolved");
        StreamConfig::from_settings(url, &self.settings)
    }

    fn single<T>(&self, name: &StreamName, handlers: StreamHandlers<T>) -> SingleStream<T>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let config = self.config(self.endpoints.single(name));
        StreamSession::new(config, JsonDecoder::new(), handlers)
    }

    fn combined<T>(
        &self,
        names: &[StreamName],
        handlers: StreamHandlers<T>,
    ) -> Result<CombinedStream<T>, ExchangeError>
    where
        T: serde::de::DeserializeOwned + crate::core::kernel::SymbolEvent + Send + 'static,
    {
        let config = self.config(self.endpoints.combined(names)?);
        Ok(StreamSession::new(config, CombinedDecoder::new(), handlers))
    }

    fn names(symbols: &[&str], stream: &str, qualifier: &str) -> Vec<StreamName> {
        symbols
            .iter()
            .map(|symbol| StreamName::new(symbol, stream, qualifier))
            .collect()
    }

    pub fn agg_trade(
        &self,
        symbol: &str,
        handlers: StreamHandlers<AggTradeEvent>,
    ) -> SingleStream<AggTradeEvent> {
        self.single(&StreamName::new(symbol, "aggTrade", ""), handlers)
    }

    pub fn combined_agg_trade(
        &self,
        symbols: &[&str],
        handlers: StreamHandlers<AggTradeEvent>,
    ) -> Result<CombinedStream<AggTradeEvent>, ExchangeError> {
        self.combined(&Self::names(symbols, "aggTrade", ""), handlers)
    }

    /// 24h rolling window ticker
    pub fn ticker(
        &self,
        symbol: &str,
        handlers: StreamHandlers<TickerEvent>,
    ) -> SingleStream<TickerEvent> {
        self.single(&StreamName::new(symbol, "ticker", ""), handlers)
    }

    pub fn combined_ticker(
        &self,
        symbols: &[&str],
        handlers: StreamHandlers<TickerEvent>,
    ) -> Result<CombinedStream<TickerEvent>, ExchangeError> {
        self.combined(&Self::names(symbols, "ticker", ""), handlers)
    }

    pub fn all_tickers(
        &self,
        handlers: StreamHandlers<Vec<TickerEvent>>,
    ) -> SingleStream<Vec<TickerEvent>> {
        self.single(&StreamName::raw("!ticker@arr"), handlers)
    }

    pub fn mini_ticker(
        &self,
        symbol: &str,
        handlers: StreamHandlers<MiniTickerEvent>,
    ) -> SingleStream<MiniTickerEvent> {
        self.single(&StreamName::new(symbol, "miniTicker", ""), handlers)
    }

    pub fn all_mini_tickers(
        &self,
        handlers: StreamHandlers<Vec<MiniTickerEvent>>,
    ) -> SingleStream<Vec<MiniTickerEvent>> {
        self.single(&StreamName::raw("!miniTicker@arr"), handlers)
    }

    pub fn book_ticker(
        &self,
        symbol: &str,
        handlers: StreamHandlers<BookTickerEvent>,
    ) -> SingleStream<BookTickerEvent> {
        self.single(&StreamName::new(symbol, "bookTicker", ""), handlers)
    }

    /// Mark price and funding rate; `rate` is 3s or 1s
    pub fn mark_price(
        &self,
        symbol: &str,
        rate: Duration,
        handlers: StreamHandlers<MarkPriceEvent>,
    ) -> Result<SingleStream<MarkPriceEvent>, ExchangeError> {
        let rate = MarkPriceRate::try_from(rate)?;
        Ok(self.single(
            &StreamName::new(symbol, "markPrice", rate.as_qualifier()),
            handlers,
        ))
    }

    pub fn all_mark_prices(
        &self,
        rate: Duration,
        handlers: StreamHandlers<Vec<MarkPriceEvent>>,
    ) -> Result<SingleStream<Vec<MarkPriceEvent>>, ExchangeError> {
        let rate = MarkPriceRate::try_from(rate)?;
        let name = StreamName::raw(format!("!markPrice@arr{}", rate.as_qualifier()));
        Ok(self.single(&name, handlers))
    }

    pub fn kline(
        &self,
        symbol: &str,
        interval: KlineInterval,
        handlers: StreamHandlers<KlineEvent>,
    ) -> SingleStream<KlineEvent> {
        self.single(&StreamName::new(symbol, "kline_", interval.as_str()), handlers)
    }

    /// Klines for several `(symbol, interval)` pairs on one connection
    pub fn combined_klines(
        &self,
        pairs: &[(&str, KlineInterval)],
        handlers: StreamHandlers<KlineEvent>,
    ) -> Result<CombinedStream<KlineEvent>, ExchangeError> {
        let names: Vec<StreamName> = pairs
            .iter()
            .map(|(symbol, interval)| StreamName::new(symbol, "kline_", interval.as_str()))
            .collect();
        self.combined(&names, handlers)
    }

    /// Top `levels` (5, 10 or 20) of the book, pushed every `rate` (default 250ms)
    pub fn partial_depth(
        &self,
        symbol: &str,
        levels: u32,
        rate: Option<Duration>,
        handlers: StreamHandlers<DepthEvent>,
    ) -> Result<SingleStream<DepthEvent>, ExchangeError> {
        let levels = DepthLevels::try_from(levels)?;
        let speed = depth_speed(rate)?;
        let qualifier = format!("{}{}", levels.as_qualifier(), speed.as_qualifier());
        Ok(self.single(&StreamName::new(symbol, "depth", &qualifier), handlers))
    }

    pub fn diff_depth(
        &self,
        symbol: &str,
        rate: Option<Duration>,
        handlers: StreamHandlers<DepthEvent>,
    ) -> Result<SingleStream<DepthEvent>, ExchangeError> {
        let speed = depth_speed(rate)?;
        Ok(self.single(
            &StreamName::new(symbol, "depth", speed.as_qualifier()),
            handlers,
        ))
    }

    pub fn combined_diff_depth(
        &self,
        symbols: &[&str],
        rate: Option<Duration>,
        handlers: StreamHandlers<DepthEvent>,
    ) -> Result<CombinedStream<DepthEvent>, ExchangeError> {
        let speed = depth_speed(rate)?;
        self.combined(&Self::names(symbols, "depth", speed.as_qualifier()), handlers)
    }

    /// Account and order updates for a listen key
    pub fn user_data(
        &self,
        listen_key: &str,
        handlers: StreamHandlers<UserDataEvent>,
    ) -> StreamSession<UserDataDecoder> {
        let config = self.config(self.endpoints.single(&StreamName::raw(listen_key)));
        StreamSession::new(config, UserDataDecoder, handlers)
    }
}

fn depth_speed(rate: Option<Duration>) -> Result<DepthUpdateSpeed, ExchangeError> {
    rate.map_or(Ok(DepthUpdateSpeed::default()), DepthUpdateSpeed::try_from)
}

#[derive(Deserialize)]
struct EventTag {
    #[serde(rename = "e", default)]
    event_type: String,
}

/// User data decoder; the `"e"` tag picks the spot or futures shape and
/// `TRADE_LITE` frames are skipped
#[derive(Debug, Clone, Copy, Default)]
pub struct UserDataDecoder;

impl FrameDecoder for UserDataDecoder {
    type Event = UserDataEvent;

    fn decode(&self, payload: &[u8]) -> Result<Option<UserDataEvent>, ExchangeError> {
        let tag: EventTag = serde_json::from_slice(payload).map_err(|e| {
            ExchangeError::DeserializationError(format!("Failed to parse user data event: {}", e))
        })?;
        if tag.event_type == TRADE_LITE_EVENT {
            return Ok(None);
        }

        UserDataEvent::from_tagged(&tag.event_type, payload)
            .map(Some)
            .map_err(|e| {
                ExchangeError::DeserializationError(format!(
                    "Failed to parse {} event: {}",
                    tag.event_type, e
                ))
            })
    }
}
