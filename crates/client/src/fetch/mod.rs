//! Network access for the worker.
//!
//! ### Network trait
//! - The worker engine only talks to the network through [`Network`], so hosts
//!   and tests can inject their own transport.
//! - [`send_with_timeout`] bounds any implementation with an explicit
//!   deadline; a request that never resolves becomes [`Error::FetchTimeout`].
//!
//! ### FetchClient
//! - reqwest over rustls, relative URLs resolved against the worker origin.
//! - Any HTTP status is a response; only transport failures are errors.
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::{Duration, Instant};

pub use url::{UrlError, cache_key, is_same_origin, parse_origin, resolve};

use astral_core::{AppConfig, Error, Headers, Request, Response, ResponseSource};

/// Transport used by the worker to reach the network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Issue a request. `Err` means no response was received.
    async fn send(&self, request: &Request) -> Result<Response, Error>;
}

/// Send through `network`, giving up after `timeout`.
pub async fn send_with_timeout(network: &dyn Network, request: &Request, timeout: Duration) -> Result<Response, Error> {
    match tokio::time::timeout(timeout, network.send(request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::FetchTimeout(format!(
            "{} {} exceeded {}ms",
            request.method,
            request.url,
            timeout.as_millis()
        ))),
    }
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Origin relative URLs resolve against (default: "http://localhost:8888")
    pub origin: String,

    /// User agent string (default: "astral-worker/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 10s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8888".to_string(),
            user_agent: "astral-worker/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(10_000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            origin: config.origin.clone(),
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// reqwest-backed [`Network`].
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
    origin: ::url::Url,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let origin = parse_origin(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config, origin })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn transport_error(&self, url: &::url::Url, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::FetchTimeout(format!("{} exceeded {}ms", url, self.config.timeout.as_millis()))
        } else {
            Error::Network(format!("network error: {}", err))
        }
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn send(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let url = resolve(&self.origin, &request.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid method: {}", request.method)))?;

        let mut builder = self.http.request(method, url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| self.transport_error(&url, e))?;
        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let bytes = response.bytes().await.map_err(|e| self.transport_error(&url, e))?;
        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        tracing::debug!(
            "{} {} -> {} in {}ms ({} bytes)",
            request.method,
            url,
            status.as_u16(),
            start.elapsed().as_millis(),
            bytes.len()
        );

        Ok(Response { status: status.as_u16(), headers, body: bytes.to_vec(), source: ResponseSource::Network })
    }
}
