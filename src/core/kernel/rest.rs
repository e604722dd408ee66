use crate::core::errors::{ApiError, ExchangeError};
use crate::core::kernel::request::RequestSpec;
use crate::core::kernel::signer::Signer;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Fully resolved HTTP request handed to an [`HttpExecutor`]
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Raw HTTP response as read off the wire
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Executes one HTTP request
///
/// This is the seam that lets the whole signing pipeline run against a test
/// double instead of the network. Implementations must make exactly one
/// attempt and return transport failures as-is.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ExchangeError>;
}

/// Production executor backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: Client,
}

impl ReqwestExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &RestClientConfig) -> Result<Self, ExchangeError> {
        let mut builder = Client::builder().user_agent(&config.user_agent);
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(std::time::Duration::from_secs(timeout));
        }
        let client = builder.build().map_err(|e| {
            ExchangeError::Other(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ExchangeError> {
        let mut builder = self
            .client
            .request(request.method, request.url.as_str())
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Successful response: untouched body plus headers for metadata such as rate limits
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RestResponse {
    /// Decode the body into a typed result
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ExchangeError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ExchangeError::DeserializationError(format!("Failed to deserialize JSON: {}", e))
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Optional client-wide timeout; callers normally bound calls themselves
    pub timeout_seconds: Option<u64>,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl RestClientConfig {
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout_seconds: None,
            user_agent: "BinanceLink/0.1".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
    executor: Option<Arc<dyn HttpExecutor>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
            executor: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Replace the network executor, e.g. with a test double
    pub fn with_executor(mut self, executor: Arc<dyn HttpExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> Result<RestClient, ExchangeError> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(ReqwestExecutor::from_config(&self.config)?),
        };

        Ok(RestClient {
            config: self.config,
            signer: self.signer,
            executor,
        })
    }
}

/// Signs, sends and classifies REST requests
#[derive(Clone)]
pub struct RestClient {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
    executor: Arc<dyn HttpExecutor>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    /// Validate, sign and serialize a request without sending it
    pub fn prepare(&self, mut request: RequestSpec) -> Result<HttpRequest, ExchangeError> {
        request.validate()?;

        if request.security.requires_api_key() {
            let signer = self.signer.as_ref().ok_or_else(|| {
                ExchangeError::AuthError(
                    "Authentication required but no signer provided".to_string(),
                )
            })?;
            signer.sign(&mut request)?;
        }

        let query_string = request.query.encode();
        request.full_url = if query_string.is_empty() {
            format!("{}{}", self.config.base_url, request.path)
        } else {
            format!("{}{}?{}", self.config.base_url, request.path, query_string)
        };

        let mut headers = request.headers;
        let body = if request.form.is_empty() {
            request.raw_body
        } else {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
            Some(request.form.encode().into_bytes())
        };

        trace!(url = %request.full_url, has_body = body.is_some(), "Prepared request");

        Ok(HttpRequest {
            method: request.method,
            url: request.full_url,
            headers,
            body,
        })
    }

    /// Send one request and return the raw body and headers
    #[instrument(skip(self, request), fields(exchange = %self.config.exchange_name, method = %request.method, endpoint = %request.path))]
    pub async fn call(&self, request: RequestSpec) -> Result<RestResponse, ExchangeError> {
        let http_request = self.prepare(request)?;
        let response = self.executor.execute(http_request).await?;
        Self::classify(response)
    }

    /// Like [`call`](Self::call) but gives up as soon as `cancel` fires
    pub async fn call_with_cancel(
        &self,
        request: RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<RestResponse, ExchangeError> {
        tokio::select! {
            () = cancel.cancelled() => Err(ExchangeError::Cancelled),
            result = self.call(request) => result,
        }
    }

    /// Send one request and decode a successful body into `T`
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        request: RequestSpec,
    ) -> Result<T, ExchangeError> {
        self.call(request).await?.json()
    }

    fn classify(response: HttpResponse) -> Result<RestResponse, ExchangeError> {
        let status = response.status;
        trace!(
            "Response body: {}",
            String::from_utf8_lossy(&response.body)
        );

        if status.as_u16() >= 400 {
            let error = ApiError::from_body(&response.body);
            debug!(status = status.as_u16(), code = error.code, "Exchange rejected request");
            return Err(ExchangeError::ApiError {
                status: status.as_u16(),
                error,
            });
        }

        Ok(RestResponse {
            status,
            headers: response.headers,
            body: response.body,
        })
    }
}
