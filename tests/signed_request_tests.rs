use async_trait::async_trait;
use binance_link::core::kernel::{
    HmacSigner, HttpExecutor, HttpRequest, HttpResponse, RequestOptions, RequestSpec,
    RestClientBuilder, RestClientConfig, ServerClock, API_KEY_HEADER,
};
use binance_link::exchanges::binance::{build_client_with_executor, Market};
use binance_link::{ExchangeConfig, ExchangeError};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};

const FIXED_NOW: i64 = 1_700_000_000_000;

fn fixed_now() -> i64 {
    FIXED_NOW
}

/// Records every request and answers with a canned status and body
struct MockExchange {
    status: u16,
    body: &'static str,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockExchange {
    fn new(status: u16, body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpExecutor for MockExchange {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ExchangeError> {
        self.requests.lock().unwrap().push(request);
        Ok(HttpResponse {
            status: StatusCode::from_u16(self.status).unwrap(),
            headers: HeaderMap::new(),
            body: self.body.as_bytes().to_vec(),
        })
    }
}

fn signed_client(executor: Arc<MockExchange>, clock: ServerClock) -> binance_link::core::kernel::RestClient {
    let signer = Arc::new(HmacSigner::new("K".to_string(), "S".to_string(), clock));
    RestClientBuilder::new(RestClientConfig::new(
        "https://fapi.binance.com".to_string(),
        "binance".to_string(),
    ))
    .with_signer(signer)
    .with_executor(executor)
    .build()
    .unwrap()
}

#[cfg(test)]
mod signed_request_tests {
    use super::*;

    #[tokio::test]
    async fn test_signed_balance_call_end_to_end() {
        let executor = MockExchange::new(200, "[]");
        let client = signed_client(executor.clone(), ServerClock::with_time_source(fixed_now));

        let request = RequestSpec::get("/fapi/v2/balance")
            .signed()
            .param("symbol", "BTCUSDT")
            .apply(&RequestOptions::new().with_recv_window(5000))
            .unwrap();
        let response = client.call(request).await.unwrap();
        assert_eq!(response.body, b"[]");

        let sent = executor.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].url,
            "https://fapi.binance.com/fapi/v2/balance?symbol=BTCUSDT&recvWindow=5000&timestamp=1700000000000&signature=e29fddb0cf2a91a1f3738bfc821ccc40706de180aeb233ff6d8782dc5ebdba9a"
        );
        assert_eq!(sent[0].headers.get(API_KEY_HEADER).unwrap(), "K");
        assert!(sent[0].body.is_none());
    }

    #[tokio::test]
    async fn test_clock_offset_moves_timestamp_and_signature() {
        let executor = MockExchange::new(200, "[]");
        let clock = ServerClock::with_time_source(fixed_now);
        let client = signed_client(executor.clone(), clock.clone());

        // server is 1.5s ahead of the local clock
        clock.sync_with_server_time(FIXED_NOW + 1_500);
        assert_eq!(clock.offset(), -1_500);

        clock.set_offset(1_500);
        let request = RequestSpec::get("/fapi/v2/balance")
            .signed()
            .param("symbol", "BTCUSDT")
            .recv_window(5000);
        client.call(request).await.unwrap();

        assert!(executor.requests()[0].url.ends_with(
            "timestamp=1699999998500&signature=eb24cb2f68115b10618672c0643fdcd5fc779cc6627aa607e55f86a8686a0d94"
        ));
    }

    #[tokio::test]
    async fn test_error_status_is_structured() {
        let executor = MockExchange::new(401, r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#);
        let client = signed_client(executor, ServerClock::with_time_source(fixed_now));

        let error = client
            .call(RequestSpec::get("/fapi/v2/balance").signed())
            .await
            .unwrap_err();

        assert!(error.is_api_error());
        assert!(!error.is_transport_error());
        let api_error = error.api_error().unwrap();
        assert_eq!(api_error.code, -2015);
        assert_eq!(
            api_error.to_string(),
            "<APIError> code=-2015, msg=Invalid API-key, IP, or permissions for action."
        );
    }

    #[tokio::test]
    async fn test_header_overrides_apply_before_signing() {
        let executor = MockExchange::new(200, "{}");
        let client = signed_client(executor.clone(), ServerClock::with_time_source(fixed_now));

        let options = RequestOptions::new().with_header("X-Trace", "abc", true);
        let request = RequestSpec::get("/fapi/v1/time").apply(&options).unwrap();
        client.call(request).await.unwrap();

        let sent = &executor.requests()[0];
        assert_eq!(sent.headers.get("x-trace").unwrap(), "abc");
        assert_eq!(sent.url, "https://fapi.binance.com/fapi/v1/time");
    }

    #[tokio::test]
    async fn test_client_builder_wires_shared_clock() {
        let executor = MockExchange::new(200, r#"{"serverTime":1499827319559}"#);
        let config = ExchangeConfig::new("K".to_string(), "S".to_string());
        let client =
            build_client_with_executor(&config, Market::UsdMFutures, executor.clone()).unwrap();

        let offset = client
            .rest()
            .sync_time(&RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(client.rest().clock().offset(), offset);

        // the signer reads the same clock the sync wrote
        let before = client.rest().clock().timestamp();
        let prepared = client
            .rest()
            .rest()
            .prepare(client.rest().balance_request().unwrap())
            .unwrap();
        let timestamp: i64 = prepared
            .url
            .split("timestamp=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .and_then(|t| t.parse().ok())
            .unwrap();
        assert!((timestamp - before).abs() < 5_000);
        assert!(timestamp < 1_499_827_319_559 + 60_000);
    }
}
