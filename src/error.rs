//! Error types for cpix-packager.

use thiserror::Error;

/// Main error type for cpix-packager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A flag value did not name a member of the enumeration.
    #[error("Invalid {name}: {value}")]
    InvalidEnumValue { name: &'static str, value: String },

    /// A required flag was empty or missing.
    #[error("Missing value for {0}")]
    MissingValue(String),

    /// The KMS answered with a non-success status.
    #[error("Key service returned {status}: {body}")]
    KeyService { status: u16, body: String },

    /// The CPIX response document is missing required data.
    #[error("Invalid CPIX response: {0}")]
    InvalidCpixResponse(String),

    /// The PSSH box is malformed.
    #[error("Invalid PSSH: {0}")]
    InvalidPssh(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The KMS base path is not a valid URL.
    #[error("Invalid URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// Malformed XML.
    #[error("XML parse error: {0}")]
    XmlError(#[from] roxmltree::Error),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    /// Key id is not a UUID.
    #[error("Invalid key id: {0}")]
    UuidError(#[from] uuid::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short, stable name of the error variant.
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidEnumValue { .. } => "InvalidEnumValue",
            Error::MissingValue(_) => "MissingValue",
            Error::KeyService { .. } => "KeyServiceError",
            Error::InvalidCpixResponse(_) => "InvalidCpixResponse",
            Error::InvalidPssh(_) => "InvalidPssh",
            Error::HttpError(_) => "HttpError",
            Error::UrlParseError(_) => "UrlError",
            Error::XmlError(_) => "XmlError",
            Error::Base64DecodeError(_) => "Base64DecodeError",
            Error::UuidError(_) => "UuidError",
            Error::IoError(_) => "IoError",
            Error::Other(_) => "Other",
        }
    }
}

/// Result type alias for cpix-packager operations.
pub type Result<T> = std::result::Result<T, Error>;
