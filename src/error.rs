//! Error handling for soundgate.
//!
//! Every fallible operation returns one [`struct@Error`] type that pairs a
//! category ([`ErrorKind`], modelled on gRPC status codes) with the boxed
//! underlying error. Domain specific failures are small `thiserror` types
//! living next to the code that raises them, and can be recovered with
//! [`Error::downcast`]:
//!
//! * [`StatusError`](crate::http::StatusError) for non-200 upstream responses
//! * [`ScrapeError`](crate::token::ScrapeError) for client id discovery
//! * [`KindMismatch`](crate::protocol::KindMismatch) for resolved entities
//! * [`StreamError`](crate::protocol::StreamError) for stream resolution
//!
//! # Error Categories
//!
//! The categories that soundgate raises itself:
//! * Timeouts (`DeadlineExceeded`): the only category that is retried
//! * Transport failures (`Unavailable`, `Aborted`, `Unknown`)
//! * Upstream status codes (`NotFound`, `Unauthenticated`, `PermissionDenied`,
//!   `ResourceExhausted`, `Unavailable`, `FailedPrecondition`)
//! * Malformed responses (`InvalidArgument`, `DataLoss`)
//! * Semantic failures (`NotFound`, `InvalidArgument`, `Unimplemented`)
//!
//! # Example
//!
//! ```rust
//! use soundgate::{error::ErrorKind, protocol::KindMismatch};
//!
//! match gateway.user("some/playlist").await {
//!     Err(e) if e.downcast::<KindMismatch>().is_some() => println!("not a user"),
//!     Err(e) if e.kind == ErrorKind::NotFound => println!("no such permalink"),
//!     Err(e) => return Err(e),
//!     Ok(user) => println!("{}", user.username),
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    ///
    /// # Example
    ///
    /// ```rust
    /// use soundgate::token::ScrapeError;
    ///
    /// if let Some(ScrapeError::VersionNotFound) = error.downcast::<ScrapeError>() {
    ///     warn!("front-end layout changed");
    /// }
    /// ```
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only timeouts qualify: everything else either failed deterministically
    /// or was reported by the upstream.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::DeadlineExceeded
    }
}

/// Standard result type for soundgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// HTTP Mapping: 499 Client Closed Request
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unknown error")]
    Unknown = 2,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// Local transport timeouts only; upstream timeouts are `Unavailable`.
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// HTTP Mapping: 404 Not Found
    #[error("not found")]
    NotFound = 5,

    /// HTTP Mapping: 409 Conflict
    #[error("attempt to create what already exists")]
    AlreadyExists = 6,

    /// HTTP Mapping: 403 Forbidden
    #[error("permission denied")]
    PermissionDenied = 7,

    /// HTTP Mapping: 401 Unauthorized
    #[error("no valid authentication credentials")]
    Unauthenticated = 16,

    /// HTTP Mapping: 429 Too Many Requests
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// HTTP Mapping: 409 Conflict
    #[error("operation aborted")]
    Aborted = 10,

    /// HTTP Mapping: 400 Bad Request
    #[error("out of range")]
    OutOfRange = 11,

    /// HTTP Mapping: 501 Not Implemented
    #[error("not implemented")]
    Unimplemented = 12,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("internal error")]
    Internal = 13,

    /// HTTP Mapping: 503 Service Unavailable
    #[error("service unavailable")]
    Unavailable = 14,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

impl ErrorKind {
    /// Maps an HTTP status code to its closest error kind.
    ///
    /// Success codes map to `Unknown`: callers only ask after deciding that
    /// the status was unexpected. Timeouts reported by the upstream (408,
    /// 504) map to `Unavailable`, never to `DeadlineExceeded`, so that they
    /// are not retried.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 | 410 => Self::NotFound,
            409 => Self::Aborted,
            429 => Self::ResourceExhausted,
            499 => Self::Cancelled,
            501 => Self::Unimplemented,
            408 | 500..=599 => Self::Unavailable,
            300..=499 => Self::FailedPrecondition,
            _ => Self::Unknown,
        }
    }
}

impl Error {
    /// Creates a new error with specified kind and details.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::new(ErrorKind::NotFound, "no such permalink");
    /// assert_eq!(err.kind, ErrorKind::NotFound);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error for operations that were interrupted mid-execution.
    ///
    /// Maps to HTTP 409 Conflict, e.g. a connection reset by the upstream.
    pub fn aborted<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Aborted, error)
    }

    /// Creates an error for duplicate resource creation attempts.
    ///
    /// Maps to HTTP 409 Conflict.
    pub fn already_exists<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::AlreadyExists, error)
    }

    /// Creates an error for cancelled operations.
    ///
    /// Maps to HTTP 499 Client Closed Request.
    pub fn cancelled<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Cancelled, error)
    }

    /// Creates an error for data corruption or loss.
    ///
    /// Maps to HTTP 500 Internal Server Error. Use when a response body was
    /// cut short or could not be read.
    pub fn data_loss<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataLoss, error)
    }

    /// Creates an error for operations that exceeded their deadline.
    ///
    /// This is the only kind that the retrying transport tries again.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::deadline_exceeded("read timed out");
    /// assert!(err.is_transient());
    /// ```
    pub fn deadline_exceeded<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DeadlineExceeded, error)
    }

    /// Creates an error for operations that failed due to current state.
    ///
    /// Maps to HTTP 400 Bad Request.
    pub fn failed_precondition<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::FailedPrecondition, error)
    }

    /// Creates an error for internal errors.
    ///
    /// Maps to HTTP 500 Internal Server Error. Use for unexpected internal
    /// errors that shouldn't occur during normal operation, like building an
    /// invalid URL out of configured hosts.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    /// Creates an error for invalid arguments.
    ///
    /// Maps to HTTP 400 Bad Request.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::invalid_argument("user agent contains a newline");
    /// assert_eq!(err.kind, ErrorKind::InvalidArgument);
    /// ```
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for missing resources.
    ///
    /// Maps to HTTP 404 Not Found.
    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotFound, error)
    }

    /// Creates an error for values outside valid range.
    ///
    /// Maps to HTTP 400 Bad Request, e.g. paging past the last page.
    pub fn out_of_range<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::OutOfRange, error)
    }

    /// Creates an error for permission denied conditions.
    ///
    /// Maps to HTTP 403 Forbidden.
    pub fn permission_denied<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::PermissionDenied, error)
    }

    /// Creates an error for exhausted resources.
    ///
    /// Maps to HTTP 429 Too Many Requests.
    pub fn resource_exhausted<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ResourceExhausted, error)
    }

    /// Creates an error for authentication failures.
    ///
    /// Maps to HTTP 401 Unauthorized. The upstream answers this way when a
    /// client id has been rotated out.
    pub fn unauthenticated<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unauthenticated, error)
    }

    /// Creates an error for unavailable services.
    ///
    /// Maps to HTTP 503 Service Unavailable. Use for connection failures and
    /// upstream server errors.
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unavailable, error)
    }

    /// Creates an error for unimplemented functionality.
    ///
    /// Maps to HTTP 501 Not Implemented, e.g. a track without any media
    /// format that can be streamed.
    pub fn unimplemented<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unimplemented, error)
    }

    /// Creates an error for unknown conditions.
    ///
    /// Maps to HTTP 500 Internal Server Error.
    pub fn unknown<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unknown, error)
    }
}

/// Returns the underlying error source.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error for display, showing both kind and details.
///
/// Format: "{kind}: {details}"
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Converts IO errors into appropriate error kinds.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            AddrInUse | AlreadyExists => Self::already_exists(err),
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            BrokenPipe | ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            WriteZero => Self::resource_exhausted(err),
            _ => Self::unknown(err),
        }
    }
}

/// Converts HTTP client errors into appropriate error kinds.
///
/// Timeouts are checked first: a connect timeout is both a connect and a
/// timeout error, and must stay retryable.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::deadline_exceeded(err);
        }

        if err.is_body() {
            return Self::data_loss(err);
        }

        if err.is_decode() {
            return Self::invalid_argument(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        if err.is_connect() {
            return Self::unavailable(err);
        }

        if err.is_redirect() {
            return Self::resource_exhausted(err);
        }

        if err.is_status() {
            return Self::failed_precondition(err);
        }

        Self::unknown(err)
    }
}

/// Converts JSON errors through IO error mapping.
///
/// Syntax and data errors end up as `InvalidArgument`, truncated bodies as
/// `DataLoss`.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        std::io::Error::from(err).into()
    }
}

/// Converts configuration file errors to `InvalidArgument`.
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_argument(err)
    }
}

/// Converts invalid header errors to `InvalidArgument`.
impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts URL parsing errors to `Internal`.
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("marker")]
    struct Marker;

    #[test]
    fn downcast_recovers_domain_error() {
        let err = Error::not_found(Marker);
        assert!(err.downcast::<Marker>().is_some());
        assert!(err.downcast::<std::io::Error>().is_none());
    }

    #[test]
    fn display_prefixes_kind() {
        let err = Error::not_found("no such permalink");
        assert_eq!(err.to_string(), "not found: no such permalink");
    }

    #[test]
    fn only_timeouts_are_transient() {
        assert!(Error::deadline_exceeded("slow").is_transient());
        assert!(!Error::unavailable("refused").is_transient());
        assert!(
            !Error::from(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).is_transient()
        );
        assert!(Error::from(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_transient());
    }

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Unauthenticated);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::PermissionDenied);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::ResourceExhausted);
        assert_eq!(ErrorKind::from_status(502), ErrorKind::Unavailable);
        assert_eq!(ErrorKind::from_status(302), ErrorKind::FailedPrecondition);
        assert_eq!(ErrorKind::from_status(418), ErrorKind::FailedPrecondition);
    }

    #[test]
    fn upstream_timeouts_are_not_transient() {
        for status in [408, 504] {
            let kind = ErrorKind::from_status(status);
            assert_eq!(kind, ErrorKind::Unavailable);
            assert!(!Error::new(kind, "gateway timeout").is_transient());
        }
    }

    #[test]
    fn malformed_json_is_invalid_argument() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .map_err(Error::from)
            .unwrap_err();
        // An unterminated document is reported as end of file.
        assert_eq!(err.kind, ErrorKind::DataLoss);

        let err: Error = serde_json::from_str::<u32>("\"x\"")
            .map_err(Error::from)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
