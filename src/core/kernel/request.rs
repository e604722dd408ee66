use crate::core::errors::ExchangeError;
use crate::core::kernel::params::ParamBag;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

/// Authentication required by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityLevel {
    /// Public endpoint, no credentials attached
    #[default]
    None,
    /// API key header only
    ApiKey,
    /// API key header plus timestamp and HMAC signature
    Signed,
}

impl SecurityLevel {
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// A single REST call, built by an endpoint builder and consumed once by the transport
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: ParamBag,
    pub form: ParamBag,
    pub security: SecurityLevel,
    pub recv_window: Option<i64>,
    pub headers: HeaderMap,
    pub raw_body: Option<Vec<u8>>,
    /// Filled in by the transport once the request has been signed
    pub full_url: String,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: ParamBag::new(),
            form: ParamBag::new(),
            security: SecurityLevel::None,
            recv_window: None,
            headers: HeaderMap::new(),
            raw_body: None,
            full_url: String::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn security(mut self, security: SecurityLevel) -> Self {
        self.security = security;
        self
    }

    pub fn signed(self) -> Self {
        self.security(SecurityLevel::Signed)
    }

    pub fn api_key(self) -> Self {
        self.security(SecurityLevel::ApiKey)
    }

    /// Add a query string parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.set(key, value);
        self
    }

    pub fn param_opt<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        self.query.set_opt(key, value);
        self
    }

    /// Add a form body parameter
    pub fn form_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.set(key, value);
        self
    }

    pub fn form_param_opt<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        self.form.set_opt(key, value);
        self
    }

    pub fn form_params(mut self, params: &ParamBag) -> Self {
        self.form.merge(params);
        self
    }

    pub fn recv_window(mut self, recv_window: i64) -> Self {
        self.recv_window = Some(recv_window);
        self
    }

    pub fn raw_body(mut self, body: Vec<u8>) -> Self {
        self.raw_body = Some(body);
        self
    }

    /// Apply caller overrides; must happen before `validate` and signing
    pub fn apply(mut self, options: &RequestOptions) -> Result<Self, ExchangeError> {
        if let Some(recv_window) = options.recv_window {
            self.recv_window = Some(recv_window);
        }
        if let Some(headers) = &options.replace_headers {
            self.headers = headers.clone();
        }
        for (name, value, replace) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ExchangeError::InvalidParameters(format!("Invalid header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ExchangeError::InvalidParameters(format!("Invalid header value for '{}': {}", name, e))
            })?;
            if *replace {
                self.headers.insert(name, value);
            } else {
                self.headers.append(name, value);
            }
        }
        Ok(self)
    }

    /// Check the request is well formed before it is signed
    pub fn validate(&self) -> Result<(), ExchangeError> {
        if !self.path.starts_with('/') {
            return Err(ExchangeError::InvalidParameters(format!(
                "Request path must start with '/': {}",
                self.path
            )));
        }
        if !self.form.is_empty() && self.raw_body.is_some() {
            return Err(ExchangeError::InvalidParameters(
                "A request cannot carry both form parameters and a raw body".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-call overrides applied once, before validation and signing
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub recv_window: Option<i64>,
    /// (name, value, replace) triples; `replace = false` appends
    pub headers: Vec<(String, String, bool)>,
    /// Replaces the whole header map before `headers` are applied
    pub replace_headers: Option<HeaderMap>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recv_window(mut self, recv_window: i64) -> Self {
        self.recv_window = Some(recv_window);
        self
    }

    pub fn with_header(mut self, key: &str, value: &str, replace: bool) -> Self {
        self.headers
            .push((key.to_string(), value.to_string(), replace));
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.replace_headers = Some(headers);
        self
    }
}
