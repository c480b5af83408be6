//! HTTP client with bounded retries and rate limiting for SoundCloud.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Retries of timed out requests, up to [`Client::MAX_ATTEMPTS`] in total
//! * Request rate limiting so the upstream is never flooded
//! * Persistent, pooled connections with a fixed `User-Agent`
//! * Transparent decompression of gzip, deflate, brotli and zstd bodies
//!
//! # Retries
//!
//! Only timeouts are retried. Any other transport failure (DNS, TLS,
//! connection refused or reset) is returned after the first attempt, and HTTP
//! status codes are never retried: callers turn unexpected statuses into a
//! [`StatusError`] instead.
//!
//! # Example
//!
//! ```rust
//! use soundgate::{config::Config, http::Client};
//!
//! let client = Client::new(&Config::default())?;
//! let stream: Stream = client.get_json(&url, "stream").await?;
//! ```

use std::{fmt, future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use http::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::{
    config::Config,
    error::{Error, ErrorKind, Result},
};

/// An upstream response with an unexpected status code.
///
/// Wrapped in an [`Error`](crate::error::Error) whose kind follows the status
/// code, see [`ErrorKind::from_status`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("{context}: got status code {}", .status.as_u16())]
pub struct StatusError {
    /// The operation that made the request, e.g. `"resolve"`.
    pub context: &'static str,
    pub status: StatusCode,
}

impl From<StatusError> for Error {
    fn from(e: StatusError) -> Self {
        Self::new(ErrorKind::from_status(e.status.as_u16()), e)
    }
}

/// HTTP client with built-in retries and rate limiting.
pub struct Client {
    /// Unlimited request client for special cases.
    ///
    /// Direct access to underlying client without rate limiting or retries.
    pub unlimited: reqwest::Client,

    /// Rate limiter to be a good citizen towards the upstream.
    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Maximum number of attempts for a request that keeps timing out.
    pub const MAX_ATTEMPTS: usize = 5;

    /// Rolling window for the rate limiter.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Maximum allowed calls per interval. Bursts up to this amount are
    /// allowed; requests beyond it are delayed.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    /// Duration to keep idle connections alive.
    ///
    /// Nearly all traffic goes to a single API host, so keep the pool warm.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for a connection to be established.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Duration to wait for individual network reads.
    ///
    /// Reads that take longer time out, which makes the request eligible for
    /// a retry.
    const READ_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * The user agent is not a valid header value
    /// * HTTP client creation fails
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_read_timeout(config, Self::READ_TIMEOUT)
    }

    /// Creates a new client that gives up on a stalled read after
    /// `read_timeout`.
    ///
    /// # Errors
    ///
    /// See [`Client::new`].
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn with_read_timeout(config: &Config, read_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, */*"));

        // Checked up front so a bad configuration fails here, and not with a
        // builder error on the first request.
        let user_agent = HeaderValue::from_str(&config.user_agent)?;

        // `Accept-Encoding` is set by `reqwest` for every compression feature
        // that is enabled. Setting it manually would disable decompression.
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .pool_idle_timeout(Self::KEEPALIVE_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .default_headers(headers)
            .user_agent(user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with specified method and URL.
    ///
    /// Creates a raw request that can be executed with `execute()`.
    #[must_use]
    pub fn request(&self, method: Method, url: Url) -> reqwest::Request {
        reqwest::Request::new(method, url)
    }

    /// Executes a single request with rate limiting, without retries.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails at the transport level. HTTP error
    /// statuses are not errors at this level.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }

    /// Sends a GET request and reads the whole body, retrying the exchange
    /// when it times out.
    ///
    /// Timeouts while reading the body are retried like any other timeout.
    /// The status code is returned as-is. The URL is never logged in full,
    /// as it usually carries the client id.
    ///
    /// # Errors
    ///
    /// Returns the last error if all attempts timed out, or the first error
    /// that is not a timeout.
    pub async fn get(&self, url: &Url) -> Result<(StatusCode, Vec<u8>)> {
        debug!("GET {}", url.path());
        retry(Self::MAX_ATTEMPTS, || self.fetch(url)).await
    }

    /// A single attempt of [`Client::get`].
    async fn fetch(&self, url: &Url) -> Result<(StatusCode, Vec<u8>)> {
        let response = self.execute(self.request(Method::GET, url.clone())).await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.into()))
    }

    /// Sends a GET request and reads the body as text.
    ///
    /// The status code is returned as-is, because some pages (like the
    /// front-end 404 page) are useful regardless of it.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body cannot be read.
    pub async fn get_text(&self, url: &Url) -> Result<(StatusCode, String)> {
        let (status, body) = self.get(url).await?;
        Ok((status, String::from_utf8_lossy(&body).into_owned()))
    }

    /// Sends a GET request that must answer `200 OK`, and decodes the JSON
    /// body.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * The request fails
    /// * The status is not `200 OK` (a [`StatusError`] tagged with `context`)
    /// * The body is not valid JSON for `T`
    pub async fn get_json<T>(&self, url: &Url, context: &'static str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let (status, body) = self.get(url).await?;
        if status != StatusCode::OK {
            return Err(StatusError { context, status }.into());
        }

        trace!("{context}: {} bytes", body.len());
        serde_json::from_slice(&body).map_err(Into::into)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("unlimited", &self.unlimited)
            .finish_non_exhaustive()
    }
}

/// Runs `operation` until it succeeds, fails with anything but a timeout, or
/// `attempts` attempts have been made.
///
/// `attempts` of zero is treated as one.
///
/// # Errors
///
/// Returns the error of the last attempt.
pub async fn retry<T, F, Fut>(attempts: usize, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!("attempt {attempt}/{attempts} timed out: {e}");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    #[tokio::test]
    async fn timeouts_are_retried_up_to_the_bound() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry(Client::MAX_ATTEMPTS, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::deadline_exceeded("read timed out")) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::DeadlineExceeded);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry(Client::MAX_ATTEMPTS, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::unavailable("connection refused")) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::Unavailable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_after_timeouts_stops_retrying() {
        let calls = AtomicUsize::new(0);
        let result = retry(Client::MAX_ATTEMPTS, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(Error::deadline_exceeded("read timed out"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stalled_bodies_are_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));

        let accepted = Arc::clone(&connections);
        tokio::spawn(async move {
            // Keep sockets open so the body stalls instead of ending early.
            let mut stalled = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let mut request = [0; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{")
                    .await;
                stalled.push(socket);
            }
        });

        let client =
            Client::with_read_timeout(&Config::default(), Duration::from_millis(100)).unwrap();
        let url = Url::parse(&format!("http://{addr}/tracks")).unwrap();
        let err = client
            .get_json::<serde_json::Value>(&url, "tracks")
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
        assert_eq!(connections.load(Ordering::SeqCst), Client::MAX_ATTEMPTS);
    }

    #[test]
    fn status_error_embeds_code_and_kind() {
        let err = Error::from(StatusError {
            context: "resolve",
            status: StatusCode::NOT_FOUND,
        });
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.to_string(), "not found: resolve: got status code 404");
        assert_eq!(
            err.downcast::<StatusError>().map(|e| e.status),
            Some(StatusCode::NOT_FOUND)
        );
    }

    #[test]
    fn invalid_user_agent_is_rejected() {
        let config = Config {
            user_agent: "bad\nagent".to_owned(),
            ..Config::default()
        };
        assert_eq!(
            Client::new(&config).unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
    }
}
