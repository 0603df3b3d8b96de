//! Client errors

use serde::Deserialize;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures talking to a fleetmaster daemon
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport failure before a response arrived
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The daemon answered with an error status
    #[error("daemon rejected request ({status} {code}): {message}")]
    Rejected {
        status: u16,
        /// Machine-readable code such as `NO_CAPACITY`
        code: String,
        message: String,
    },

    #[error("invalid daemon URL: {0}")]
    Url(#[from] url::ParseError),

    /// Event stream handshake or frame failure
    #[error("event stream failed: {0}")]
    EventStream(Box<tungstenite::Error>),

    /// The daemon ended the event stream
    #[error("event stream closed: {0}")]
    StreamClosed(&'static str),

    /// An event frame did not decode
    #[error("undecodable event: {0}")]
    BadEvent(#[from] serde_json::Error),
}

impl ClientError {
    /// Build a `Rejected` error from a status and the response body
    ///
    /// Bodies that are not the daemon's `{code, message}` shape are kept
    /// verbatim as the message.
    pub(crate) fn rejected(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Body {
            code: String,
            message: String,
        }

        match serde_json::from_str::<Body>(body) {
            Ok(Body { code, message }) => Self::Rejected {
                status,
                code,
                message,
            },
            Err(_) => Self::Rejected {
                status,
                code: "UNKNOWN".to_string(),
                message: body.to_string(),
            },
        }
    }

    /// Error code from the daemon, if it answered at all
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<tungstenite::Error> for ClientError {
    fn from(e: tungstenite::Error) -> Self {
        Self::EventStream(Box::new(e))
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_reads_daemon_body() {
        let err = ClientError::rejected(
            503,
            r#"{"code":"NO_CAPACITY","message":"no server can take the party"}"#,
        );
        assert_eq!(err.code(), Some("NO_CAPACITY"));
        assert_eq!(
            err.to_string(),
            "daemon rejected request (503 NO_CAPACITY): no server can take the party"
        );
    }

    #[test]
    fn test_rejected_keeps_foreign_body() {
        let err = ClientError::rejected(502, "Bad Gateway");
        assert!(matches!(
            &err,
            ClientError::Rejected { status: 502, code, message }
                if code == "UNKNOWN" && message == "Bad Gateway"
        ));
    }

    #[test]
    fn test_stream_errors_have_no_code() {
        let err = ClientError::from(tungstenite::Error::ConnectionClosed);
        assert!(matches!(err, ClientError::EventStream(_)));
        assert_eq!(err.code(), None);
        assert_eq!(ClientError::StreamClosed("stream ended").code(), None);
    }
}
