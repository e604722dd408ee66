use crate::core::errors::ExchangeError;
use crate::core::kernel::clock::ServerClock;
use crate::core::kernel::request::{RequestSpec, SecurityLevel};
use hmac::{Hmac, Mac};
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const SIGNATURE_KEY: &str = "signature";
pub const RECV_WINDOW_KEY: &str = "recvWindow";

/// Signer trait for request authentication
///
/// Implementations populate the security-sensitive parts of a request
/// (credentials header, timestamp, signature) according to its
/// [`SecurityLevel`] and leave everything else untouched.
pub trait Signer: Send + Sync {
    fn sign(&self, request: &mut RequestSpec) -> Result<(), ExchangeError>;
}

/// HMAC-SHA256 signer using the exchange's query-string scheme
pub struct HmacSigner {
    api_key: Secret<String>,
    secret_key: Secret<String>,
    clock: ServerClock,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("api_key", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .field("clock_offset_ms", &self.clock.offset())
            .finish()
    }
}

impl HmacSigner {
    pub fn new(api_key: String, secret_key: String, clock: ServerClock) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            clock,
        }
    }

    pub fn clock(&self) -> &ServerClock {
        &self.clock
    }

    /// Lowercase hex HMAC-SHA256 of `payload` under the secret key
    pub fn signature(&self, payload: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.expose_secret().as_bytes())
            .map_err(|e| ExchangeError::AuthError(format!("Failed to create HMAC: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn attach_api_key(&self, request: &mut RequestSpec) -> Result<(), ExchangeError> {
        let mut value = HeaderValue::from_str(self.api_key.expose_secret()).map_err(|_| {
            ExchangeError::AuthError("API key contains invalid header characters".to_string())
        })?;
        value.set_sensitive(true);
        request.headers.insert(API_KEY_HEADER, value);
        Ok(())
    }
}

impl Signer for HmacSigner {
    fn sign(&self, request: &mut RequestSpec) -> Result<(), ExchangeError> {
        match request.security {
            SecurityLevel::None => Ok(()),
            SecurityLevel::ApiKey => self.attach_api_key(request),
            SecurityLevel::Signed => {
                self.attach_api_key(request)?;

                if let Some(recv_window) = request.recv_window.filter(|w| *w > 0) {
                    request.query.set(RECV_WINDOW_KEY, recv_window.to_string());
                }
                request
                    .query
                    .set(TIMESTAMP_KEY, self.clock.timestamp().to_string());

                let payload = format!("{}{}", request.query.encode(), request.form.encode());
                let signature = self.signature(&payload)?;
                request.query.set(SIGNATURE_KEY, signature);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXED_NOW: i64 = 1_499_827_319_559;

    fn fixed_now() -> i64 {
        FIXED_NOW
    }

    fn signer(secret: &str) -> HmacSigner {
        HmacSigner::new(
            "api-key".to_string(),
            secret.to_string(),
            ServerClock::with_time_source(fixed_now),
        )
    }

    #[test]
    fn test_public_request_untouched() {
        let mut request = RequestSpec::get("/fapi/v1/depth").param("symbol", "BTCUSDT");
        signer("secret").sign(&mut request).unwrap();
        assert!(request.headers.is_empty());
        assert_eq!(request.query.encode(), "symbol=BTCUSDT");
    }

    #[test]
    fn test_api_key_only() {
        let mut request = RequestSpec::post("/fapi/v1/listenKey").api_key();
        signer("secret").sign(&mut request).unwrap();
        assert_eq!(request.headers.get(API_KEY_HEADER).unwrap(), "api-key");
        assert!(request.query.is_empty());
    }

    #[test]
    fn test_signature_matches_exchange_example() {
        // Example request documented for the signed endpoint security scheme
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let mut request = RequestSpec::post("/api/v3/order")
            .signed()
            .param("symbol", "LTCBTC")
            .param("side", "BUY")
            .param("type", "LIMIT")
            .param("timeInForce", "GTC")
            .param("quantity", "1")
            .param("price", "0.1")
            .recv_window(5000);

        signer(secret).sign(&mut request).unwrap();

        assert_eq!(
            request.query.get(SIGNATURE_KEY),
            Some("c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71")
        );
    }

    #[test]
    fn test_signing_is_deterministic() {
        let build = || {
            RequestSpec::get("/fapi/v2/balance")
                .signed()
                .param("symbol", "BTCUSDT")
                .form_param("quantity", "1")
        };
        let signer = signer("secret");
        let mut first = build();
        let mut second = build();
        signer.sign(&mut first).unwrap();
        signer.sign(&mut second).unwrap();
        assert_eq!(first.query.get(SIGNATURE_KEY), second.query.get(SIGNATURE_KEY));
    }

    #[test]
    fn test_any_parameter_change_changes_signature() {
        let signer = signer("secret");
        let sign = |request: RequestSpec| {
            let mut request = request;
            signer.sign(&mut request).unwrap();
            request.query.get(SIGNATURE_KEY).unwrap().to_string()
        };

        let base = sign(
            RequestSpec::post("/fapi/v1/order")
                .signed()
                .param("symbol", "BTCUSDT")
                .form_param("quantity", "1"),
        );
        let query_changed = sign(
            RequestSpec::post("/fapi/v1/order")
                .signed()
                .param("symbol", "ETHUSDT")
                .form_param("quantity", "1"),
        );
        let form_changed = sign(
            RequestSpec::post("/fapi/v1/order")
                .signed()
                .param("symbol", "BTCUSDT")
                .form_param("quantity", "2"),
        );

        assert_ne!(base, query_changed);
        assert_ne!(base, form_changed);
        assert_ne!(query_changed, form_changed);
    }

    #[test]
    fn test_recv_window_only_when_positive() {
        let signer = signer("secret");

        let mut unset = RequestSpec::get("/x").signed();
        signer.sign(&mut unset).unwrap();
        assert!(!unset.query.contains(RECV_WINDOW_KEY));

        let mut zero = RequestSpec::get("/x").signed().recv_window(0);
        signer.sign(&mut zero).unwrap();
        assert!(!zero.query.contains(RECV_WINDOW_KEY));

        let mut negative = RequestSpec::get("/x").signed().recv_window(-1);
        signer.sign(&mut negative).unwrap();
        assert!(!negative.query.contains(RECV_WINDOW_KEY));

        let mut set = RequestSpec::get("/x").signed().recv_window(5000);
        signer.sign(&mut set).unwrap();
        assert_eq!(set.query.get(RECV_WINDOW_KEY), Some("5000"));
    }

    #[test]
    fn test_timestamp_uses_clock_offset() {
        let signer = signer("secret");
        signer.clock().set_offset(1_000);
        let mut request = RequestSpec::get("/x").signed();
        signer.sign(&mut request).unwrap();
        let expected = (FIXED_NOW - 1_000).to_string();
        assert_eq!(request.query.get(TIMESTAMP_KEY), Some(expected.as_str()));
    }

    #[test]
    fn test_signature_covers_query_then_form() {
        let signer = signer("secret");
        let mut request = RequestSpec::post("/fapi/v1/order")
            .signed()
            .form_param("symbol", "BTCUSDT")
            .form_param("side", "SELL");
        signer.sign(&mut request).unwrap();

        let payload = format!("timestamp={}symbol=BTCUSDT&side=SELL", FIXED_NOW);
        assert_eq!(
            request.query.get(SIGNATURE_KEY),
            Some(signer.signature(&payload).unwrap().as_str())
        );
        assert!(!request.form.contains(SIGNATURE_KEY));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", signer("super-secret"));
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("api-key"));
    }
}
