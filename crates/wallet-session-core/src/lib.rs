pub mod chain;
pub mod domain;
pub mod error;
pub mod manager;
pub mod ports;
pub mod state_machine;

pub use chain::{
    format_chain_id, json_chain_id, parse_chain_id, ChainDescriptor, NativeCurrency,
    BASE_MAINNET_CHAIN_ID, BASE_SEPOLIA_CHAIN_ID, KNOWN_CHAINS,
};
pub use domain::{
    Notification, NotifyLevel, ProviderEvent, Session, SessionStatus, ZERO_BALANCE,
};
pub use error::{SessionError, TransitionError};
pub use manager::{
    BalanceRefresh, ChainSwitchOutcome, ConnectOutcome, ProviderEvents, SessionManager,
    ADD_CHAIN_METHOD, SWITCH_CHAIN_METHOD,
};
pub use ports::{
    CapabilityProvider, NotificationSink, PortError, UNRECOGNIZED_CHAIN, USER_REJECTED_REQUEST,
};
pub use state_machine::{session_transition, Effect, SessionInput, Transition};
