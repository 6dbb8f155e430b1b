use std::fmt::{self, Debug, Display, Formatter};

use http::StatusCode;

/// A set of errors that can occur while decoding a multipart stream or while
/// installing a firmware update from it.
#[derive(thiserror::Error, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The `Content-Type` header is not `multipart/*`.
    #[error("Content-Type is not multipart")]
    NoMultipart,

    /// The `Content-Type` is multipart, but not `multipart/form-data`.
    #[error("unsupported multipart subtype: {subtype}")]
    UnsupportedSubtype { subtype: String },

    /// Failed to parse the `Content-Type` header as a mime type.
    #[error("failed to parse Content-Type as a mime type: {0}")]
    DecodeContentType(String),

    /// No (or an empty) boundary parameter in the `Content-Type` header.
    #[error("multipart boundary not found in Content-Type")]
    NoBoundary,

    /// A delimiter line was followed by something other than `--`, linear
    /// whitespace or a line break.
    #[error("unexpected byte {byte:#04x} after multipart delimiter")]
    MalformedDelimiter { byte: u8 },

    /// A delimiter showed up before the part headers were terminated.
    #[error("multipart delimiter inside part headers")]
    DelimiterInHeaders,

    /// A delimiter showed up after the closing delimiter.
    #[error("multipart delimiter after the closing delimiter")]
    DelimiterAfterClose,

    /// A part header line was not terminated by `CRLF`.
    #[error("part header line not terminated by CRLF (found {byte:#04x})")]
    MalformedHeaderLine { byte: u8 },

    /// A line break occurred inside a header name.
    #[error("line break inside part header name")]
    HeaderNameLineBreak,

    /// A header line started with a colon.
    #[error("empty part header name")]
    EmptyHeaderName,

    /// Failed to decode the part's raw header name to
    /// [`HeaderName`](http::header::HeaderName) type.
    #[error("failed to decode part's raw header name: {name:?} {cause}")]
    DecodeHeaderName { name: String, cause: String },

    /// Failed to decode the part's raw header value to
    /// [`HeaderValue`](http::header::HeaderValue) type.
    #[error("failed to decode part's raw header value: {cause}")]
    DecodeHeaderValue { value: Vec<u8>, cause: String },

    /// The header block of a part exceeded the maximum limit.
    #[error("part headers exceeded the maximum size limit: {limit} bytes")]
    HeaderSizeExceeded { limit: usize },

    /// A form field collected in memory exceeded the maximum limit.
    #[error("field '{}' exceeded the maximum size limit: {limit} bytes", .field_name.as_deref().unwrap_or("<unknown>"))]
    FieldSizeExceeded { limit: usize, field_name: Option<String> },

    /// A part handler refused the content.
    #[error("rejected with status {status}: {reason}")]
    Rejected { status: StatusCode, reason: String },

    /// The message ended before the closing delimiter.
    #[error("incomplete multipart stream")]
    IncompleteStream,

    /// Reading from the source stream failed.
    #[error("stream read failed: {0}")]
    StreamReadFailed(String),

    /// The update package does not start with the expected magic number.
    #[error("invalid/unrecognized update image format (magic {magic:#010x})")]
    UnrecognizedFormat { magic: u32 },

    /// Writing an image to flash failed.
    #[error("error while writing flash memory at {address:#010x}: {cause}")]
    FlashWrite { address: u32, cause: String },

    /// The verified image could not be made the active boot slot.
    #[error("could not activate updated slot {slot}: {cause}")]
    ActivationFailed { slot: usize, cause: String },

    /// None of the images in the package fits any writable slot.
    #[error("no suitable slot found")]
    NoSuitableSlot,

    /// The signature trailer does not match the package contents.
    #[error("signature verification failed")]
    SignatureMismatch,

    /// The package ended before its signature trailer was complete.
    #[error("incomplete update package")]
    IncompleteUpdate,

    /// A public key could not be decoded.
    #[error("invalid verification key: {0}")]
    InvalidKey(String),

    /// Signing an update package failed.
    #[error("failed to sign update package: {0}")]
    Signing(String),

    /// Failed to decode the field data as `JSON` in
    /// [`field.json()`](crate::FormField::json) method.
    #[cfg(feature = "json")]
    #[error("failed to decode field data as JSON: {0}")]
    DecodeJson(String),
}

impl Error {
    /// The HTTP status a response should carry when the request failed with
    /// this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Rejected { status, .. } => *status,
            Error::UnsupportedSubtype { .. } => StatusCode::NOT_ACCEPTABLE,
            Error::HeaderSizeExceeded { .. } | Error::FieldSizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::FlashWrite { .. } | Error::ActivationFailed { .. } | Error::StreamReadFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::InvalidKey(_) | Error::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}

/// Returned by part and form handlers to stop decoding.
///
/// The status is preserved verbatim and becomes the status of the decode
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    status: StatusCode,
    reason: String,
}

impl Rejection {
    pub fn new(status: StatusCode) -> Rejection {
        Rejection {
            status,
            reason: status.canonical_reason().unwrap_or("rejected").to_owned(),
        }
    }

    pub fn with_reason<R: Into<String>>(mut self, reason: R) -> Rejection {
        self.reason = reason.into();
        self
    }

    pub fn bad_request<R: Into<String>>(reason: R) -> Rejection {
        Rejection::new(StatusCode::BAD_REQUEST).with_reason(reason)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Error::Rejected {
            status: rejection.status,
            reason: rejection.reason,
        }
    }
}

impl From<Error> for Rejection {
    fn from(err: Error) -> Self {
        match err {
            Error::Rejected { status, reason } => Rejection { status, reason },
            err => Rejection {
                status: err.status(),
                reason: err.to_string(),
            },
        }
    }
}
