//! Error types for SPIFFE identity parsing and trust bundle loading

use thiserror::Error;

/// Main error type for SPIFFE identity operations
#[derive(Error, Debug)]
pub enum Error {
    /// A required argument was not supplied
    #[error("required argument '{0}' was not supplied")]
    MissingInput(&'static str),

    /// A supplied argument violates a structural precondition
    #[error("{0}")]
    InvalidArgument(String),

    /// SPIFFE ID validation failed
    #[error("Invalid SPIFFE ID: {0}")]
    InvalidSpiffeId(String),

    /// DER or SAN decoding failed in the certificate layer
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    /// The requested trust bundle file does not exist
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Network or I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Trust bundle document has an unexpected shape
    #[error("invalid trust bundle format: {0}")]
    InvalidFormat(String),

    /// Trust bundle document lacks a mandatory field
    #[error("{0}")]
    MissingField(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an InvalidSpiffeId error with detailed message
    pub fn invalid_spiffe_id(msg: impl Into<String>) -> Self {
        Self::InvalidSpiffeId(msg.into())
    }

    /// Create a MalformedCertificate error with detailed message
    pub fn malformed_certificate(msg: impl Into<String>) -> Self {
        Self::MalformedCertificate(msg.into())
    }

    /// Create an InvalidFormat error with detailed message
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }
}

/// Unwrap an optional input, failing with [`Error::MissingInput`] naming the
/// argument.
///
/// Rust's type system makes absent arguments unrepresentable at the parsing
/// and extraction entry points, so callers holding optional configuration
/// (a URI from a config file, a bundle path that may be unset) use this to
/// surface the *missing input* error kind before calling in.
///
/// # Examples
/// ```
/// use spiffe_identity::error::required;
///
/// let path: Option<&str> = None;
/// assert!(required(path, "trustBundleFile").is_err());
/// ```
pub fn required<T>(value: Option<T>, name: &'static str) -> Result<T> {
    value.ok_or(Error::MissingInput(name))
}
