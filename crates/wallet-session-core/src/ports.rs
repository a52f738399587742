use alloy::primitives::{Address, U256};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::domain::{Notification, ProviderEvent};

/// EIP-1193 code for a request the user declined.
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// Code returned by `wallet_switchEthereumChain` for a chain the wallet has not added.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("provider error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl PortError {
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            PortError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_user_rejected(&self) -> bool {
        self.rpc_code() == Some(USER_REJECTED_REQUEST)
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.rpc_code() == Some(UNRECOGNIZED_CHAIN)
    }
}

/// Contract the session manager consumes from an injected wallet.
///
/// Request methods are async and may complete in any order. Event delivery is
/// push based: `subscribe` registers listeners that forward into the given
/// sender until `remove_all_listeners` is called.
#[allow(async_fn_in_trait)]
pub trait CapabilityProvider {
    /// Accounts the site is already authorized for. Never prompts.
    async fn list_authorized_accounts(&self) -> Result<Vec<Address>, PortError>;
    /// Prompts the user for authorization.
    async fn request_accounts(&self) -> Result<Vec<Address>, PortError>;
    async fn chain_id(&self) -> Result<u64, PortError>;
    /// Native balance in the smallest unit.
    async fn get_balance(&self, address: Address) -> Result<U256, PortError>;
    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError>;
    fn subscribe(&self, events: UnboundedSender<ProviderEvent>) -> Result<(), PortError>;
    fn remove_all_listeners(&self) -> Result<(), PortError>;
}

pub trait NotificationSink {
    fn notify(&self, notification: Notification);
}

impl<T: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<T> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

impl<T: CapabilityProvider> CapabilityProvider for std::sync::Arc<T> {
    async fn list_authorized_accounts(&self) -> Result<Vec<Address>, PortError> {
        (**self).list_authorized_accounts().await
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, PortError> {
        (**self).request_accounts().await
    }

    async fn chain_id(&self) -> Result<u64, PortError> {
        (**self).chain_id().await
    }

    async fn get_balance(&self, address: Address) -> Result<U256, PortError> {
        (**self).get_balance(address).await
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError> {
        (**self).request(method, params).await
    }

    fn subscribe(&self, events: UnboundedSender<ProviderEvent>) -> Result<(), PortError> {
        (**self).subscribe(events)
    }

    fn remove_all_listeners(&self) -> Result<(), PortError> {
        (**self).remove_all_listeners()
    }
}
