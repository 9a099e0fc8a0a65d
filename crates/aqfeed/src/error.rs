//! Error types for aqfeed.
//!
//! Every failure the feed can run into is described here, grouped by the
//! stage of the request → parse → render flow it belongs to.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for aqfeed operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Network Errors ===
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("network request to {url} failed: {source}")]
    Network {
        /// The URL that was requested.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("sensor API returned HTTP {status} for {url}")]
    HttpStatus {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    // === Payload Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload parsed as JSON but does not have the expected shape.
    #[error("malformed sensor payload: {message}")]
    MalformedPayload {
        /// Description of what was wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A credential needed to reach the sensor API is not set.
    #[error("missing {name}; set the {env_var} environment variable")]
    MissingCredential {
        /// Name of the missing setting.
        name: &'static str,
        /// Environment variable that supplies it.
        env_var: &'static str,
    },

    // === Archive Errors ===
    /// Reading or writing the CSV archive failed.
    #[error("CSV archive error: {0}")]
    Csv(#[from] csv::Error),

    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Page Errors ===
    /// The page has no usable widget markers.
    #[error("page {path} has no widget region: {message}")]
    PageMarkers {
        /// Path of the page.
        path: PathBuf,
        /// Description of what was wrong.
        message: String,
    },
}

/// A specialized Result type for aqfeed operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new malformed payload error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    /// Create a page marker error.
    #[must_use]
    pub fn page_markers(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PageMarkers {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error came from fetching or decoding the sensor feed.
    ///
    /// These are the failures the widget absorbs into its fallback message.
    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::HttpStatus { .. }
                | Self::Json(_)
                | Self::MalformedPayload { .. }
                | Self::MissingCredential { .. }
                | Self::Io(_)
        )
    }

    /// The HTTP status, if the server answered with one.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let err = Error::HttpStatus {
            url: "https://api.example/x".to_string(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "sensor API returned HTTP 503 for https://api.example/x"
        );
        assert_eq!(err.http_status(), Some(503));
    }

    #[test]
    fn test_missing_credential_display() {
        let err = Error::MissingCredential {
            name: "API token",
            env_var: "AIRQO_TOKEN",
        };
        let msg = err.to_string();
        assert!(msg.contains("API token"));
        assert!(msg.contains("AIRQO_TOKEN"));
    }

    #[test]
    fn test_malformed_display() {
        let err = Error::malformed("expected an object");
        assert_eq!(
            err.to_string(),
            "malformed sensor payload: expected an object"
        );
    }

    #[test]
    fn test_fetch_failure_classification() {
        assert!(Error::malformed("x").is_fetch_failure());
        assert!(Error::HttpStatus {
            url: String::new(),
            status: 404
        }
        .is_fetch_failure());
        assert!(!Error::ConfigValidation {
            message: "bad".to_string()
        }
        .is_fetch_failure());
        assert!(!Error::page_markers("/tmp/index.html", "missing").is_fetch_failure());
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
            assert!(err.is_fetch_failure());
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_page_markers_display() {
        let err = Error::page_markers("/srv/site/index.html", "end marker before start");
        let msg = err.to_string();
        assert!(msg.contains("/srv/site/index.html"));
        assert!(msg.contains("end marker before start"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
