use thiserror::Error;

use crate::domain::SessionStatus;
use crate::ports::PortError;

/// Outcome taxonomy of session operations.
///
/// When an operation returns one of these, its state transition and
/// notification have already been applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no wallet provider available")]
    ProviderAbsent,
    #[error("request rejected by user: {0}")]
    UserRejected(String),
    #[error("chain {0} is not registered with the wallet")]
    UnrecognizedChain(u64),
    #[error("network query failed: {0}")]
    NetworkQueryFailed(#[source] PortError),
    #[error("unexpected wallet error: {0}")]
    Unknown(#[source] PortError),
}

impl SessionError {
    /// Classifies a failed user-facing request (authorization, chain switch).
    pub fn from_request(err: PortError) -> Self {
        if err.is_user_rejected() {
            let message = match err {
                PortError::Rpc { message, .. } => message,
                other => other.to_string(),
            };
            return SessionError::UserRejected(message);
        }
        SessionError::Unknown(err)
    }

    /// Classifies a failed read (balance, network).
    pub fn from_query(err: PortError) -> Self {
        match err {
            PortError::Transport(_) | PortError::Rpc { .. } | PortError::Validation(_) => {
                SessionError::NetworkQueryFailed(err)
            }
            other => SessionError::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("illegal session transition: {input} while {from:?}")]
    Illegal {
        from: SessionStatus,
        input: &'static str,
    },
    #[error("stale balance result: session address no longer matches")]
    StaleBalance,
}
