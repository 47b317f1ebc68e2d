use std::fmt;

use paddock_types::models::ConnectionStatus;
use thiserror::Error;

/// Why the access gate denied a pair. Granular on purpose: the client must
/// be able to tell the user *what to do next*, not just "forbidden".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    RoleMismatch,
    NoConnection,
    PendingApproval,
    Rejected,
    Blocked,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::RoleMismatch => "RoleMismatch",
            DenialReason::NoConnection => "NoConnection",
            DenialReason::PendingApproval => "PendingApproval",
            DenialReason::Rejected => "Rejected",
            DenialReason::Blocked => "Blocked",
        }
    }

    /// Actionable guidance rendered verbatim to the client.
    pub fn detail(&self) -> &'static str {
        match self {
            DenialReason::RoleMismatch => "Messaging requires a driver-owner pair",
            DenialReason::NoConnection => {
                "No connection exists. Send a connection request first."
            }
            DenialReason::PendingApproval => {
                "Connection request is pending. Wait for acceptance."
            }
            DenialReason::Rejected => "Connection request was rejected.",
            DenialReason::Blocked => "One user has blocked the other.",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,

    #[error("connection not found")]
    ConnectionNotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("cannot connect with yourself")]
    SelfConnection,

    #[error("connection already exists with status {status}")]
    AlreadyExists { status: ConnectionStatus },

    #[error("restricted to driver-owner pairs")]
    RoleMismatch,

    #[error("messaging not allowed: {0}")]
    MessagingNotAllowed(DenialReason),

    #[error("caller is not a party to this record")]
    Unauthorized,

    #[error("caller is neither sender nor receiver")]
    Forbidden,

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Db(e.into())
    }
}
