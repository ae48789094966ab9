//! Error types for the request pipeline.
//!
//! This module provides [`Error`], the closed error taxonomy for every
//! operation in the crate, and [`StatusClass`], the classification of the
//! numeric HTTP status domain.

use std::path::PathBuf;

/// Classification of a numeric HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 1xx.
    Informational,
    /// 2xx.
    Success,
    /// 3xx.
    Redirection,
    /// 4xx.
    ClientError,
    /// 5xx.
    ServerError,
    /// Anything outside 100..=599, including the synthetic "no status" 0.
    Invalid,
}

impl StatusClass {
    /// Classify a raw status code.
    pub fn of(code: u16) -> Self {
        match code {
            100..=199 => StatusClass::Informational,
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirection,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Invalid,
        }
    }

    /// Whether the code signals an error condition (4xx or 5xx).
    pub fn is_error(self) -> bool {
        matches!(self, StatusClass::ClientError | StatusClass::ServerError)
    }
}

/// The synthetic status code representing "no HTTP status" (transport
/// failure before any response arrived). Including this value in
/// `retriable_status_codes` makes transport failures retriable.
pub const NO_STATUS: u16 = 0;

/// Error taxonomy for the request pipeline.
///
/// Construction-phase errors (`InvalidUrl`, the encoding variants) abort a
/// fetch before any transport call. Transport-phase errors are attached to
/// the delivered [`Response`](crate::Response) so partial data stays
/// reachable; only terminal conditions (cancellation, stub-not-found,
/// construction failures) surface as `Err` from
/// [`Client::fetch`](crate::Client::fetch).
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The request URL could not be formed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The wire-form request could not be assembled.
    #[error("failed building URL request: {0}")]
    BuildRequest(String),

    /// Form-url-encoding of the body failed.
    #[error("URL encoding failed: {0}")]
    UrlEncoding(String),

    /// The JSON body producer failed.
    #[error("JSON encoding failed: {0}")]
    JsonEncoding(String),

    /// A multipart file part refers to an unreadable path.
    #[error("multipart part refers to an invalid file: {}", .0.display())]
    MultipartInvalidFile(PathBuf),

    /// A multipart string part could not be encoded.
    #[error("multipart string encoding failed: {0}")]
    MultipartStringEncoding(String),

    /// Reading a multipart stream part failed.
    #[error("multipart stream read failed: {0}")]
    MultipartStreamRead(String),

    /// Transport-level failure, or an error HTTP status surfaced by the
    /// default validator. `status` is `None` when no response arrived.
    #[error("network error{}: {message}", fmt_status(.status))]
    Network {
        /// HTTP status, if a response arrived.
        status: Option<u16>,
        /// Human-readable cause.
        message: String,
    },

    /// No usable network connection.
    #[error("missing connection")]
    MissingConnection,

    /// The per-attempt wall-clock timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// The transport produced a response the pipeline cannot interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Zero-length body rejected by the default validator.
    #[error("empty response body")]
    EmptyResponse,

    /// Typed decoding of a response body failed.
    #[error("response decoding failed: {0}")]
    Decode(String),

    /// A retry strategy fired after the retry budget was exhausted.
    #[error("retry attempts reached")]
    RetryAttemptsReached,

    /// The caller cancelled the request.
    #[error("cancelled")]
    Cancelled,

    /// A custom validator rejected the response.
    #[error("validator failure: {0}")]
    Validator(String),

    /// The stub registry was enabled in opt-out mode and no rule matched.
    #[error("no stub matched the request: {0}")]
    StubNotFound(String),

    /// An alternate (nested) request failed.
    #[error("session error: {0}")]
    Session(String),

    /// Invariant violation inside the pipeline.
    #[error("internal error: {0}")]
    Internal(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {code})"),
        None => String::new(),
    }
}

impl Error {
    /// Transport failure with no response.
    pub fn network<S: Into<String>>(message: S) -> Self {
        Error::Network {
            status: None,
            message: message.into(),
        }
    }

    /// Error carrying the status code of a delivered response.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Error::Network {
            status: Some(status),
            message: message.into(),
        }
    }

    /// The HTTP status attached to this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Network { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether this error is terminal: never converted into a retry by the
    /// default validator.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::Cancelled | Error::RetryAttemptsReached | Error::StubNotFound(_)
        )
    }
}
