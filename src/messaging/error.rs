//! Error taxonomy for messaging operations
//!
//! Every failure the controller can observe maps to one [`MessagingError`]
//! variant, and every variant maps to exactly one way of telling the user
//! about it ([`Notice`]). Errors are `Clone` so they can travel through the
//! controller's event channel.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    /// Network failure, undecodable response or server-side (5xx) error.
    #[error("network error: {0}")]
    Transport(String),

    /// The session token is missing, expired or was rejected (401).
    #[error("session is no longer valid -- run 'jobboard-chat login'")]
    Unauthorized,

    /// Messaging is disabled for this identity (403).
    #[error("messaging is disabled for this account: {0}")]
    PermissionDenied(String),

    /// Conversation or job does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Message text was empty after trimming. Never reaches the network.
    #[error("message is empty")]
    EmptyMessage,

    /// Any other client error the server reported.
    #[error("request rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for MessagingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            MessagingError::Transport(format!("invalid response body: {}", err))
        } else {
            MessagingError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::Transport(format!("invalid response body: {}", err))
    }
}

/// How a notice should be presented. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Dismissible; existing state is kept so the user can retry.
    Transient,
    /// Stays until the user changes a setting.
    Persistent,
    /// The session has to be re-established.
    Reauthenticate,
}

/// User-facing message derived from an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub text: String,
}

impl MessagingError {
    pub fn severity(&self) -> Severity {
        match self {
            MessagingError::Unauthorized => Severity::Reauthenticate,
            MessagingError::PermissionDenied(_) => Severity::Persistent,
            MessagingError::Transport(_)
            | MessagingError::NotFound(_)
            | MessagingError::EmptyMessage
            | MessagingError::Rejected { .. } => Severity::Transient,
        }
    }

    pub fn notice(&self) -> Notice {
        let text = match self {
            MessagingError::Unauthorized => {
                "Your session has expired. Log in again to keep messaging.".to_string()
            }
            MessagingError::PermissionDenied(detail) => format!(
                "Messaging is turned off for your account ({}). Enable it in your settings.",
                detail
            ),
            other => other.to_string(),
        };
        Notice {
            severity: self.severity(),
            text,
        }
    }
}
