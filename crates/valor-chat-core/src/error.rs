//! Error types for talking to the inference backend.
//!
//! Every variant's `Display` is the human-readable detail shown to the user
//! after an `"Error: "` prefix, so status errors render the raw response body.

use thiserror::Error;

/// A result type using `TransportError`.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised while opening or consuming a chat request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established or no response arrived.
    #[error("{0}")]
    Connect(String),

    /// The backend answered with a non-success status.
    #[error("{body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body, consumed wholesale.
        body: String,
    },

    /// Reading the response body failed mid-stream.
    #[error("{0}")]
    Read(String),

    /// A staged attachment could not be loaded for upload.
    #[error("failed to read attachment {name}: {source}")]
    Attachment {
        /// Display name of the attachment.
        name: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The request could not be assembled.
    #[error("invalid request: {0}")]
    Request(String),

    /// A non-streaming response body could not be parsed.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl TransportError {
    /// HTTP status code carried by the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_displays_raw_body() {
        let err = TransportError::Status {
            status: 500,
            body: "{\"error\":\"CUDA out of memory\"}".to_string(),
        };
        assert_eq!(err.to_string(), "{\"error\":\"CUDA out of memory\"}");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn attachment_error_names_the_file() {
        let err = TransportError::Attachment {
            name: "scan.pdf".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.to_string(), "failed to read attachment scan.pdf: gone");
    }
}
