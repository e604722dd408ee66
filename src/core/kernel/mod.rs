/// Kernel - transport layer shared by every market
///
/// The kernel knows how to build, sign, send and classify REST requests and
/// how to drive one WebSocket connection. It contains no endpoint catalogue:
/// the exchange module on top describes requests and streams, the kernel
/// executes them.
///
/// # Architecture
///
/// ## Request pipeline
/// - `ParamBag`: ordered key/value parameters with canonical encoding
/// - `RequestSpec`: everything needed to issue one call
/// - `RequestOptions`: per-call overrides (`recvWindow`, headers)
/// - `Signer` / `HmacSigner`: API key header, timestamp and HMAC-SHA256 signature
/// - `ServerClock`: local-to-server clock offset shared by a client
/// - `RestClient` / `HttpExecutor`: transport and status classification
///
/// ## Streaming
/// - `StreamName` / `StreamEndpoints`: single and combined stream URLs
/// - `FrameDecoder`: payload to typed event, with `CombinedDecoder` for envelopes
/// - `StreamSession` / `StreamHandle`: connection state machine, keepalive and shutdown
///
/// # Key Principles
///
/// 1. **Transport Only**: endpoint paths and payload schemas live in `exchanges`
/// 2. **One attempt per call**: no retries or rate limiting are applied here
/// 3. **Injectable**: the HTTP executor, time source and decoders are swappable for tests
///
/// # Usage
///
/// ## Signed REST call
/// ```rust,no_run
/// use binance_link::core::kernel::*;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let clock = ServerClock::new();
/// let signer = Arc::new(HmacSigner::new(
///     "api_key".to_string(),
///     "secret_key".to_string(),
///     clock.clone(),
/// ));
/// let rest = RestClientBuilder::new(RestClientConfig::new(
///     "https://fapi.binance.com".to_string(),
///     "binance".to_string(),
/// ))
/// .with_signer(signer)
/// .build()?;
///
/// let request = RequestSpec::get("/fapi/v2/balance").signed();
/// let options = RequestOptions::new().with_recv_window(5000);
/// let balances: serde_json::Value = rest.call_json(request.apply(&options)?).await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Streaming session
/// ```rust,no_run
/// use binance_link::core::kernel::*;
///
/// # async fn stream_example() -> Result<(), Box<dyn std::error::Error>> {
/// let endpoints = StreamEndpoints::new(
///     "wss://fstream.binance.com/ws",
///     "wss://fstream.binance.com/stream?streams=",
/// );
/// let url = endpoints.single(&StreamName::new("BTCUSDT", "aggTrade", ""));
///
/// let handlers = StreamHandlers::new(
///     |event: serde_json::Value| println!("{}", event),
///     |error| eprintln!("stream error: {}", error),
/// );
/// let handle = StreamSession::new(StreamConfig::new(url), JsonDecoder::new(), handlers).start();
///
/// // later
/// handle.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub mod clock;
pub mod codec;
pub mod endpoint;
pub mod params;
pub mod request;
pub mod rest;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use clock::{system_time_millis, ServerClock, TimeSource};
pub use codec::{CombinedDecoder, FrameDecoder, JsonDecoder, SymbolEvent};
pub use endpoint::{
    symbol_from_stream, DepthLevels, DepthUpdateSpeed, KlineInterval, MarkPriceRate,
    StreamEndpoints, StreamName,
};
pub use params::ParamBag;
pub use request::{RequestOptions, RequestSpec, SecurityLevel};
pub use rest::{
    HttpExecutor, HttpRequest, HttpResponse, ReqwestExecutor, RestClient, RestClientBuilder,
    RestClientConfig, RestResponse,
};
pub use signer::{HmacSigner, Signer, API_KEY_HEADER};
pub use ws::{SessionState, StreamConfig, StreamHandle, StreamHandlers, StreamSession};
