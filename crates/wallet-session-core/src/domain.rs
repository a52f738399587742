use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Balance shown when nothing has been fetched for the current address.
pub const ZERO_BALANCE: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    NotInstalled,
    Disconnected,
    Connecting,
    Connected,
}

/// Local mirror of the wallet connection.
///
/// `address` is `Some` iff `status` is [`SessionStatus::Connected`]; `balance`
/// always belongs to the current `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub status: SessionStatus,
    pub address: Option<Address>,
    pub balance: String,
    pub chain_id: Option<u64>,
}

impl Session {
    pub fn not_installed() -> Self {
        Self::with_status(SessionStatus::NotInstalled)
    }

    pub fn disconnected() -> Self {
        Self::with_status(SessionStatus::Disconnected)
    }

    fn with_status(status: SessionStatus) -> Self {
        Self {
            status,
            address: None,
            balance: ZERO_BALANCE.to_owned(),
            chain_id: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    pub fn is_on_chain(&self, chain_id: u64) -> bool {
        self.chain_id == Some(chain_id)
    }
}

/// Events pushed by the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    /// The provider (re)gained a connection; the manager re-probes accounts.
    Connect,
    Disconnect,
}

impl ProviderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderEvent::AccountsChanged(_) => "accountsChanged",
            ProviderEvent::ChainChanged(_) => "chainChanged",
            ProviderEvent::Connect => "connect",
            ProviderEvent::Disconnect => "disconnect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotifyLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Info,
            message: message.into(),
        }
    }
}
