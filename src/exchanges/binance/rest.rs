use crate::core::errors::ExchangeError;
use crate::core::kernel::{RequestOptions, RequestSpec, RestClient, ServerClock};
use crate::exchanges::binance::market::Market;
use crate::exchanges::binance::types::{
    AccountInfo, Balance, DepthSnapshot, ListenKey, NewOrderRequest, OrderResponse,
    RateLimitUsage, ServerTime,
};
use tracing::{debug, instrument};

/// Typed endpoint builders on top of the kernel [`RestClient`]
///
/// Each method builds a [`RequestSpec`], applies the caller's
/// [`RequestOptions`] and decodes the response.
#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    rest: RestClient,
    clock: ServerClock,
    market: Market,
}

impl BinanceRestClient {
    /// `clock` must be the clock the client's signer reads
    pub fn new(rest: RestClient, clock: ServerClock, market: Market) -> Self {
        Self {
            rest,
            clock,
            market,
        }
    }

    pub fn market(&self) -> Market {
        self.market
    }

    pub fn clock(&self) -> &ServerClock {
        &self.clock
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    fn path(&self, endpoint: &str) -> String {
        format!("{}{}", self.market.api_prefix(), endpoint)
    }

    /// Test connectivity
    #[instrument(skip(self, options), fields(exchange = "binance", market = ?self.market))]
    pub async fn ping(&self, options: &RequestOptions) -> Result<(), ExchangeError> {
        let request = RequestSpec::get(self.path("/ping")).apply(options)?;
        self.rest.call(request).await?;
        Ok(())
    }

    /// Exchange time in epoch milliseconds
    #[instrument(skip(self, options), fields(exchange = "binance", market = ?self.market))]
    pub async fn server_time(&self, options: &RequestOptions) -> Result<i64, ExchangeError> {
        let request = RequestSpec::get(self.path("/time")).apply(options)?;
        let time: ServerTime = self.rest.call_json(request).await?;
        Ok(time.server_time)
    }

    /// Fetch the server time and store `local - server` as the signing offset
    pub async fn sync_time(&self, options: &RequestOptions) -> Result<i64, ExchangeError> {
        let server_time = self.server_time(options).await?;
        let offset = self.clock.sync_with_server_time(server_time);
        debug!(offset_ms = offset, "Clock offset synchronised");
        Ok(offset)
    }

    /// Order book snapshot
    #[instrument(skip(self, options), fields(exchange = "binance", symbol = %symbol))]
    pub async fn depth(
        &self,
        symbol: &str,
        limit: Option<u32>,
        options: &RequestOptions,
    ) -> Result<DepthSnapshot, ExchangeError> {
        let request = RequestSpec::get(self.path("/depth"))
            .param("symbol", symbol)
            .param_opt("limit", limit)
            .apply(options)?;
        self.rest.call_json(request).await
    }

    pub fn balance_request(&self) -> Result<RequestSpec, ExchangeError> {
        let path = match self.market {
            Market::UsdMFutures => "/fapi/v2/balance",
            Market::CoinMFutures => "/dapi/v1/balance",
            Market::Spot => {
                return Err(ExchangeError::InvalidParameters(
                    "Spot has no balance endpoint; use account()".to_string(),
                ))
            }
        };
        Ok(RequestSpec::get(path).signed())
    }

    /// Futures wallet balances
    #[instrument(skip(self, options), fields(exchange = "binance", market = ?self.market))]
    pub async fn balance(&self, options: &RequestOptions) -> Result<Vec<Balance>, ExchangeError> {
        let request = self.balance_request()?.apply(options)?;
        self.rest.call_json(request).await
    }

    /// Account information, including balances
    #[instrument(skip(self, options), fields(exchange = "binance", market = ?self.market))]
    pub async fn account(&self, options: &RequestOptions) -> Result<AccountInfo, ExchangeError> {
        let path = match self.market {
            Market::UsdMFutures => "/fapi/v2/account".to_string(),
            Market::Spot | Market::CoinMFutures => self.path("/account"),
        };
        let request = RequestSpec::get(path).signed().apply(options)?;
        self.rest.call_json(request).await
    }

    pub fn new_order_request(&self, order: &NewOrderRequest) -> RequestSpec {
        RequestSpec::post(self.path("/order"))
            .signed()
            .form_params(&order.to_params())
    }

    /// Place an order; the response carries the order-count headers
    #[instrument(skip(self, order, options), fields(exchange = "binance", symbol = %order.symbol, side = ?order.side))]
    pub async fn new_order(
        &self,
        order: &NewOrderRequest,
        options: &RequestOptions,
    ) -> Result<OrderResponse, ExchangeError> {
        let request = self.new_order_request(order).apply(options)?;
        let response = self.rest.call(request).await?;
        let mut order: OrderResponse = response.json()?;
        order.rate_limit = RateLimitUsage::from_headers(&response.headers);
        Ok(order)
    }

    /// Cancel an order by exchange id or client id
    #[instrument(skip(self, options), fields(exchange = "binance", symbol = %symbol))]
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: Option<i64>,
        orig_client_order_id: Option<&str>,
        options: &RequestOptions,
    ) -> Result<OrderResponse, ExchangeError> {
        if order_id.is_none() && orig_client_order_id.is_none() {
            return Err(ExchangeError::InvalidParameters(
                "Either orderId or origClientOrderId must be sent".to_string(),
            ));
        }

        let request = RequestSpec::delete(self.path("/order"))
            .signed()
            .form_param("symbol", symbol)
            .form_param_opt("orderId", order_id)
            .form_param_opt("origClientOrderId", orig_client_order_id)
            .apply(options)?;
        let response = self.rest.call(request).await?;
        let mut order: OrderResponse = response.json()?;
        order.rate_limit = RateLimitUsage::from_headers(&response.headers);
        Ok(order)
    }

    /// Create a listen key for the user data stream
    #[instrument(skip(self, options), fields(exchange = "binance", market = ?self.market))]
    pub async fn start_user_stream(&self, options: &RequestOptions) -> Result<String, ExchangeError> {
        let request = RequestSpec::post(self.market.listen_key_path())
            .api_key()
            .apply(options)?;
        let key: ListenKey = self.rest.call_json(request).await?;
        Ok(key.listen_key)
    }

    /// Extend the validity of a listen key
    #[instrument(skip(self, listen_key, options), fields(exchange = "binance", market = ?self.market))]
    pub async fn keepalive_user_stream(
        &self,
        listen_key: &str,
        options: &RequestOptions,
    ) -> Result<(), ExchangeError> {
        let request = RequestSpec::put(self.market.listen_key_path())
            .api_key()
            .form_param("listenKey", listen_key)
            .apply(options)?;
        self.rest.call(request).await?;
        Ok(())
    }

    #[instrument(skip(self, listen_key, options), fields(exchange = "binance", market = ?self.market))]
    pub async fn close_user_stream(
        &self,
        listen_key: &str,
        options: &RequestOptions,
    ) -> Result<(), ExchangeError> {
        let request = RequestSpec::delete(self.market.listen_key_path())
            .api_key()
            .form_param("listenKey", listen_key)
            .apply(options)?;
        self.rest.call(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::{
        HmacSigner, HttpExecutor, HttpRequest, HttpResponse, RestClientBuilder, RestClientConfig,
        API_KEY_HEADER,
    };
    use crate::exchanges::binance::types::OrderSide;
    use async_trait::async_trait;
    use reqwest::header::{HeaderMap, HeaderValue};
    use reqwest::StatusCode;
    use rust_decimal::Decimal;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        body: &'static str,
        headers: HeaderMap,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Recorder {
        fn new(body: &'static str) -> Arc<Self> {
            Self::with_headers(body, HeaderMap::new())
        }

        fn with_headers(body: &'static str, headers: HeaderMap) -> Arc<Self> {
            Arc::new(Self {
                body,
                headers,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> HttpRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl HttpExecutor for Recorder {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ExchangeError> {
            self.seen.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: StatusCode::OK,
                headers: self.headers.clone(),
                body: self.body.as_bytes().to_vec(),
            })
        }
    }

    fn fixed_now() -> i64 {
        1_700_000_000_000
    }

    fn client(market: Market, executor: Arc<dyn HttpExecutor>) -> BinanceRestClient {
        let clock = ServerClock::with_time_source(fixed_now);
        let signer = Arc::new(HmacSigner::new(
            "K".to_string(),
            "S".to_string(),
            clock.clone(),
        ));
        let rest = RestClientBuilder::new(RestClientConfig::new(
            market.rest_url(false).to_string(),
            "binance".to_string(),
        ))
        .with_signer(signer)
        .with_executor(executor)
        .build()
        .unwrap();
        BinanceRestClient::new(rest, clock, market)
    }

    #[tokio::test]
    async fn test_sync_time_sets_offset() {
        let executor = Recorder::new(r#"{"serverTime":1699999999000}"#);
        let client = client(Market::UsdMFutures, executor.clone());

        let offset = client.sync_time(&RequestOptions::new()).await.unwrap();
        assert_eq!(offset, 1_000);
        assert_eq!(client.clock().timestamp(), 1_699_999_999_000);
        assert_eq!(executor.last().url, "https://fapi.binance.com/fapi/v1/time");
    }

    #[tokio::test]
    async fn test_depth_is_public() {
        let executor = Recorder::new(r#"{"lastUpdateId":1,"bids":[],"asks":[["1.5","2"]]}"#);
        let client = client(Market::Spot, executor.clone());

        let depth = client
            .depth("BTCUSDT", Some(5), &RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(depth.asks[0].price, Decimal::new(15, 1));

        let request = executor.last();
        assert_eq!(
            request.url,
            "https://api.binance.com/api/v3/depth?symbol=BTCUSDT&limit=5"
        );
        assert!(request.headers.get(API_KEY_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_new_order_sends_form_and_reads_order_count() {
        let mut headers = HeaderMap::new();
        headers.insert("x-mbx-order-count-10s", HeaderValue::from_static("1"));
        headers.insert("x-mbx-order-count-1m", HeaderValue::from_static("4"));
        let executor = Recorder::with_headers(
            r#"{"symbol":"BTCUSDT","orderId":42,"clientOrderId":"abc","status":"NEW","side":"BUY","type":"MARKET"}"#,
            headers,
        );
        let client = client(Market::UsdMFutures, executor.clone());

        let order = NewOrderRequest::market("BTCUSDT", OrderSide::Buy, Decimal::from(1));
        let response = client
            .new_order(&order, &RequestOptions::new().with_recv_window(5000))
            .await
            .unwrap();

        assert_eq!(response.order_id, 42);
        assert_eq!(response.rate_limit.order_count("10s"), Some(1));
        assert_eq!(response.rate_limit.order_count("1m"), Some(4));

        let request = executor.last();
        assert_eq!(
            request.body.as_deref(),
            Some(&b"symbol=BTCUSDT&side=BUY&type=MARKET&quantity=1"[..])
        );
        assert!(request.url.starts_with(
            "https://fapi.binance.com/fapi/v1/order?recvWindow=5000&timestamp=1700000000000&signature="
        ));
    }

    #[tokio::test]
    async fn test_cancel_order_requires_an_id() {
        let client = client(Market::UsdMFutures, Recorder::new("{}"));
        let result = client
            .cancel_order("BTCUSDT", None, None, &RequestOptions::new())
            .await;
        assert!(matches!(result, Err(ExchangeError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_cancel_order_uses_delete_with_form() {
        let executor = Recorder::new(r#"{"symbol":"BTCUSDT","orderId":7}"#);
        let client = client(Market::CoinMFutures, executor.clone());

        client
            .cancel_order("BTCUSD_PERP", Some(7), None, &RequestOptions::new())
            .await
            .unwrap();

        let request = executor.last();
        assert_eq!(request.method, reqwest::Method::DELETE);
        assert!(request.url.starts_with("https://dapi.binance.com/dapi/v1/order?timestamp="));
        assert_eq!(
            request.body.as_deref(),
            Some(&b"symbol=BTCUSD_PERP&orderId=7"[..])
        );
    }

    #[tokio::test]
    async fn test_listen_key_lifecycle_uses_api_key_only() {
        let executor = Recorder::new(r#"{"listenKey":"pqia91ma19a5s61cv6a81va65sdf19v8a65a1"}"#);
        let client = client(Market::UsdMFutures, executor.clone());
        let options = RequestOptions::new();

        let key = client.start_user_stream(&options).await.unwrap();
        assert_eq!(key, "pqia91ma19a5s61cv6a81va65sdf19v8a65a1");
        let start = executor.last();
        assert_eq!(start.url, "https://fapi.binance.com/fapi/v1/listenKey");
        assert_eq!(start.headers.get(API_KEY_HEADER).unwrap(), "K");

        client.keepalive_user_stream(&key, &options).await.unwrap();
        let keepalive = executor.last();
        assert_eq!(keepalive.method, reqwest::Method::PUT);
        assert!(!keepalive.url.contains("signature"));
        assert_eq!(
            keepalive.body.as_deref(),
            Some(&b"listenKey=pqia91ma19a5s61cv6a81va65sdf19v8a65a1"[..])
        );

        client.close_user_stream(&key, &options).await.unwrap();
        assert_eq!(executor.last().method, reqwest::Method::DELETE);
    }

    #[test]
    fn test_spot_has_no_balance_endpoint() {
        let client = client(Market::Spot, Recorder::new("[]"));
        assert!(client.balance_request().is_err());
    }
}
