use crate::core::kernel::{ParamBag, SymbolEvent};
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// REST types

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ServerTime {
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenKey {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

/// One `[price, quantity]` order book entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl TryFrom<(String, String)> for PriceLevel {
    type Error = rust_decimal::Error;

    fn try_from((price, quantity): (String, String)) -> Result<Self, Self::Error> {
        Ok(Self {
            price: Decimal::from_str(&price)?,
            quantity: Decimal::from_str(&quantity)?,
        })
    }
}

impl From<PriceLevel> for (String, String) {
    fn from(level: PriceLevel) -> Self {
        (level.price.to_string(), level.quantity.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepthSnapshot {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: i64,
    #[serde(rename = "E", default)]
    pub event_time: i64,
    #[serde(rename = "T", default)]
    pub transaction_time: i64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    #[serde(rename = "accountAlias", default)]
    pub account_alias: String,
    pub asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(rename = "crossWalletBalance", with = "rust_decimal::serde::str")]
    pub cross_wallet_balance: Decimal,
    #[serde(rename = "crossUnPnl", with = "rust_decimal::serde::str")]
    pub cross_unrealized_pnl: Decimal,
    #[serde(rename = "availableBalance", with = "rust_decimal::serde::str")]
    pub available_balance: Decimal,
    #[serde(rename = "maxWithdrawAmount", default, with = "rust_decimal::serde::str")]
    pub max_withdraw_amount: Decimal,
}

/// Futures account asset
#[derive(Debug, Clone, Deserialize)]
pub struct AccountAsset {
    pub asset: String,
    #[serde(rename = "walletBalance", with = "rust_decimal::serde::str")]
    pub wallet_balance: Decimal,
    #[serde(rename = "unrealizedProfit", with = "rust_decimal::serde::str")]
    pub unrealized_profit: Decimal,
    #[serde(rename = "marginBalance", with = "rust_decimal::serde::str")]
    pub margin_balance: Decimal,
    #[serde(rename = "availableBalance", default, with = "rust_decimal::serde::str")]
    pub available_balance: Decimal,
}

/// Spot account balance
#[derive(Debug, Clone, Deserialize)]
pub struct SpotBalance {
    pub asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub free: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub locked: Decimal,
}

/// Account information; spot fills `balances`, futures fill `assets`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountInfo {
    #[serde(rename = "feeTier")]
    pub fee_tier: i64,
    #[serde(rename = "canTrade")]
    pub can_trade: bool,
    #[serde(rename = "canDeposit")]
    pub can_deposit: bool,
    #[serde(rename = "canWithdraw")]
    pub can_withdraw: bool,
    #[serde(rename = "updateTime")]
    pub update_time: i64,
    #[serde(rename = "totalWalletBalance")]
    pub total_wallet_balance: Option<String>,
    #[serde(rename = "totalUnrealizedProfit")]
    pub total_unrealized_profit: Option<String>,
    #[serde(rename = "availableBalance")]
    pub available_balance: Option<String>,
    pub assets: Vec<AccountAsset>,
    pub balances: Vec<SpotBalance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    /// Spot only
    LimitMaker,
    /// Spot only
    StopLoss,
    /// Spot only
    StopLossLimit,
    /// Spot only
    TakeProfitLimit,
    Stop,
    StopMarket,
    TakeProfit,
    TakeProfitMarket,
    TrailingStopMarket,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Limit => "LIMIT",
            Self::Market => "MARKET",
            Self::LimitMaker => "LIMIT_MAKER",
            Self::StopLoss => "STOP_LOSS",
            Self::StopLossLimit => "STOP_LOSS_LIMIT",
            Self::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
            Self::Stop => "STOP",
            Self::StopMarket => "STOP_MARKET",
            Self::TakeProfit => "TAKE_PROFIT",
            Self::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            Self::TrailingStopMarket => "TRAILING_STOP_MARKET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
    Gtx,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
            Self::Gtx => "GTX",
        }
    }
}

/// Parameters of a new order
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
    pub reduce_only: Option<bool>,
    pub new_client_order_id: Option<String>,
}

impl NewOrderRequest {
    pub fn new(symbol: impl Into<String>, side: OrderSide, order_type: OrderType) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type,
            quantity: None,
            price: None,
            stop_price: None,
            time_in_force: None,
            reduce_only: None,
            new_client_order_id: None,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self::new(symbol, side, OrderType::Limit)
            .quantity(quantity)
            .price(price)
            .time_in_force(TimeInForce::Gtc)
    }

    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self::new(symbol, side, OrderType::Market).quantity(quantity)
    }

    pub fn quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn stop_price(mut self, stop_price: Decimal) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = Some(time_in_force);
        self
    }

    pub fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = Some(reduce_only);
        self
    }

    pub fn client_order_id(mut self, id: impl Into<String>) -> Self {
        self.new_client_order_id = Some(id.into());
        self
    }

    /// Form parameters in the order the exchange documents them
    pub fn to_params(&self) -> ParamBag {
        let mut params = ParamBag::new();
        params
            .set("symbol", self.symbol.as_str())
            .set("side", self.side.as_str())
            .set("type", self.order_type.as_str())
            .set_opt("timeInForce", self.time_in_force.map(TimeInForce::as_str))
            .set_opt("quantity", self.quantity)
            .set_opt("price", self.price)
            .set_opt("stopPrice", self.stop_price)
            .set_opt("reduceOnly", self.reduce_only)
            .set_opt("newClientOrderId", self.new_client_order_id.as_deref());
        params
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: i64,
    #[serde(rename = "clientOrderId", default)]
    pub client_order_id: String,
    #[serde(default)]
    pub price: String,
    #[serde(rename = "origQty", default)]
    pub orig_qty: String,
    #[serde(rename = "executedQty", default)]
    pub executed_qty: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "timeInForce", default)]
    pub time_in_force: String,
    #[serde(rename = "type", default)]
    pub order_type: String,
    #[serde(default)]
    pub side: String,
    #[serde(rename = "updateTime", alias = "transactTime", default)]
    pub update_time: i64,
    /// Filled from response headers, not the body
    #[serde(skip)]
    pub rate_limit: RateLimitUsage,
}

/// Usage counters the exchange reports in `X-MBX-USED-WEIGHT-*` and
/// `X-MBX-ORDER-COUNT-*` headers, keyed by interval (`1m`, `10s`, `1d`...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitUsage {
    pub used_weight: Vec<(String, u64)>,
    pub order_count: Vec<(String, u64)>,
}

const USED_WEIGHT_PREFIX: &str = "x-mbx-used-weight-";
const ORDER_COUNT_PREFIX: &str = "x-mbx-order-count-";

impl RateLimitUsage {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut usage = Self::default();
        for (name, value) in headers {
            let Some(count) = value.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok())
            else {
                continue;
            };
            // header names are stored lowercase
            let name = name.as_str();
            if let Some(interval) = name.strip_prefix(USED_WEIGHT_PREFIX) {
                usage.used_weight.push((interval.to_string(), count));
            } else if let Some(interval) = name.strip_prefix(ORDER_COUNT_PREFIX) {
                usage.order_count.push((interval.to_string(), count));
            }
        }
        usage
    }

    pub fn used_weight(&self, interval: &str) -> Option<u64> {
        lookup(&self.used_weight, interval)
    }

    pub fn order_count(&self, interval: &str) -> Option<u64> {
        lookup(&self.order_count, interval)
    }

    pub fn is_empty(&self) -> bool {
        self.used_weight.is_empty() && self.order_count.is_empty()
    }
}

fn lookup(counters: &[(String, u64)], interval: &str) -> Option<u64> {
    counters
        .iter()
        .find(|(i, _)| i.eq_ignore_ascii_case(interval))
        .map(|(_, count)| *count)
}

// WebSocket types

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AggTradeEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "a")]
    pub aggregate_trade_id: i64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "f")]
    pub first_trade_id: i64,
    #[serde(rename = "l")]
    pub last_trade_id: i64,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

/// 24h rolling window ticker
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TickerEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price_change: String,
    #[serde(rename = "P")]
    pub price_change_percent: String,
    #[serde(rename = "w")]
    pub weighted_avg_price: String,
    #[serde(rename = "c")]
    pub last_price: String,
    #[serde(rename = "Q")]
    pub last_quantity: String,
    #[serde(rename = "o")]
    pub open_price: String,
    #[serde(rename = "h")]
    pub high_price: String,
    #[serde(rename = "l")]
    pub low_price: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "q")]
    pub quote_volume: String,
    #[serde(rename = "O")]
    pub open_time: i64,
    #[serde(rename = "C")]
    pub close_time: i64,
    #[serde(rename = "F")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "n")]
    pub trade_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MiniTickerEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub close_price: String,
    #[serde(rename = "o")]
    pub open_price: String,
    #[serde(rename = "h")]
    pub high_price: String,
    #[serde(rename = "l")]
    pub low_price: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "q")]
    pub quote_volume: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookTickerEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "u")]
    pub update_id: i64,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub best_bid_price: String,
    #[serde(rename = "B")]
    pub best_bid_qty: String,
    #[serde(rename = "a")]
    pub best_ask_price: String,
    #[serde(rename = "A")]
    pub best_ask_qty: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarkPriceEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub mark_price: String,
    #[serde(rename = "P")]
    pub estimated_settle_price: String,
    #[serde(rename = "i")]
    pub index_price: String,
    #[serde(rename = "r")]
    pub funding_rate: String,
    #[serde(rename = "T")]
    pub next_funding_time: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Kline {
    #[serde(rename = "t")]
    pub start_time: i64,
    #[serde(rename = "T")]
    pub end_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "f")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "n")]
    pub trade_count: i64,
    #[serde(rename = "x")]
    pub is_final: bool,
    #[serde(rename = "q")]
    pub quote_volume: String,
    #[serde(rename = "V")]
    pub taker_buy_volume: String,
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KlineEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: Kline,
}

/// Depth update; also covers partial book snapshots, which use the
/// `lastUpdateId`/`bids`/`asks` spelling on spot
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DepthEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: i64,
    #[serde(rename = "u", alias = "lastUpdateId")]
    pub last_update_id: i64,
    #[serde(rename = "pu")]
    pub prev_last_update_id: i64,
    #[serde(rename = "b", alias = "bids")]
    pub bids: Vec<PriceLevel>,
    #[serde(rename = "a", alias = "asks")]
    pub asks: Vec<PriceLevel>,
}

impl SymbolEvent for AggTradeEvent {
    fn set_symbol(&mut self, symbol: String) {
        self.symbol = symbol;
    }
}

impl SymbolEvent for TickerEvent {
    fn set_symbol(&mut self, symbol: String) {
        self.symbol = symbol;
    }
}

impl SymbolEvent for MiniTickerEvent {
    fn set_symbol(&mut self, symbol: String) {
        self.symbol = symbol;
    }
}

impl SymbolEvent for BookTickerEvent {
    fn set_symbol(&mut self, symbol: String) {
        self.symbol = symbol;
    }
}

impl SymbolEvent for MarkPriceEvent {
    fn set_symbol(&mut self, symbol: String) {
        self.symbol = symbol;
    }
}

impl SymbolEvent for KlineEvent {
    fn set_symbol(&mut self, symbol: String) {
        self.kline.symbol.clone_from(&symbol);
        self.symbol = symbol;
    }
}

impl SymbolEvent for DepthEvent {
    fn set_symbol(&mut self, symbol: String) {
        self.symbol = symbol;
    }
}

// User data stream

/// One user data stream event
///
/// Spot and futures reuse one-letter keys with different shapes (`"o"` is an
/// order object on futures and the order type on spot), so the event is
/// selected from its `"e"` tag before the payload is decoded.
#[derive(Debug, Clone)]
pub enum UserDataEvent {
    /// Spot `executionReport`
    ExecutionReport(ExecutionReport),
    /// Spot `outboundAccountPosition`
    AccountPosition(OutboundAccountPosition),
    /// Spot `balanceUpdate`
    BalanceUpdate(SpotBalanceUpdate),
    /// Futures events (`ACCOUNT_UPDATE`, `ORDER_TRADE_UPDATE`, ...) and any
    /// other tag, e.g. `listenKeyExpired`
    Futures(FuturesUserDataEvent),
}

pub const EXECUTION_REPORT_EVENT: &str = "executionReport";
pub const ACCOUNT_POSITION_EVENT: &str = "outboundAccountPosition";
pub const BALANCE_UPDATE_EVENT: &str = "balanceUpdate";

impl UserDataEvent {
    /// Decode a payload whose `"e"` tag is already known
    pub fn from_tagged(event_type: &str, payload: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match event_type {
            EXECUTION_REPORT_EVENT => Self::ExecutionReport(serde_json::from_slice(payload)?),
            ACCOUNT_POSITION_EVENT => Self::AccountPosition(serde_json::from_slice(payload)?),
            BALANCE_UPDATE_EVENT => Self::BalanceUpdate(serde_json::from_slice(payload)?),
            _ => Self::Futures(serde_json::from_slice(payload)?),
        })
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::ExecutionReport(_) => EXECUTION_REPORT_EVENT,
            Self::AccountPosition(_) => ACCOUNT_POSITION_EVENT,
            Self::BalanceUpdate(_) => BALANCE_UPDATE_EVENT,
            Self::Futures(event) => &event.event_type,
        }
    }

    pub fn event_time(&self) -> i64 {
        match self {
            Self::ExecutionReport(event) => event.event_time,
            Self::AccountPosition(event) => event.event_time,
            Self::BalanceUpdate(event) => event.event_time,
            Self::Futures(event) => event.event_time,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecutionReport {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "P")]
    pub stop_price: String,
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "r")]
    pub reject_reason: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "l")]
    pub last_executed_qty: String,
    #[serde(rename = "z")]
    pub cumulative_filled_qty: String,
    #[serde(rename = "L")]
    pub last_executed_price: String,
    #[serde(rename = "n")]
    pub commission: String,
    /// `null` until the order trades
    #[serde(rename = "N")]
    pub commission_asset: Option<String>,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "t")]
    pub trade_id: i64,
    #[serde(rename = "m")]
    pub is_maker: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutboundAccountPosition {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "u")]
    pub last_update_time: i64,
    #[serde(rename = "B")]
    pub balances: Vec<SpotPositionBalance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpotPositionBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f")]
    pub free: String,
    #[serde(rename = "l")]
    pub locked: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpotBalanceUpdate {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "d")]
    pub delta: String,
    #[serde(rename = "T")]
    pub clear_time: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FuturesUserDataEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "a")]
    pub account_update: Option<AccountUpdate>,
    #[serde(rename = "o")]
    pub order_update: Option<OrderTradeUpdate>,
    #[serde(rename = "ac")]
    pub account_config_update: Option<AccountConfigUpdate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountUpdate {
    #[serde(rename = "m")]
    pub reason: String,
    #[serde(rename = "B")]
    pub balances: Vec<BalanceUpdate>,
    #[serde(rename = "P")]
    pub positions: Vec<PositionUpdate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BalanceUpdate {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "wb")]
    pub wallet_balance: String,
    #[serde(rename = "cw")]
    pub cross_wallet_balance: String,
    #[serde(rename = "bc")]
    pub balance_change: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PositionUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa")]
    pub position_amount: String,
    #[serde(rename = "ep")]
    pub entry_price: String,
    #[serde(rename = "up")]
    pub unrealized_pnl: String,
    #[serde(rename = "mt")]
    pub margin_type: String,
    #[serde(rename = "ps")]
    pub position_side: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderTradeUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub original_qty: String,
    #[serde(rename = "p")]
    pub original_price: String,
    #[serde(rename = "ap")]
    pub average_price: String,
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "l")]
    pub last_filled_qty: String,
    #[serde(rename = "z")]
    pub accumulated_filled_qty: String,
    #[serde(rename = "L")]
    pub last_filled_price: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "t")]
    pub trade_id: i64,
    #[serde(rename = "m")]
    pub is_maker: bool,
    #[serde(rename = "R")]
    pub reduce_only: bool,
    #[serde(rename = "rp")]
    pub realized_pnl: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountConfigUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "l")]
    pub leverage: i64,
}
