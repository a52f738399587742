use alloy::primitives::Address;

use crate::domain::{Session, SessionStatus, ZERO_BALANCE};
use crate::error::TransitionError;

/// Everything that can move the session, whether user driven or pushed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    ProbeCompleted(Vec<Address>),
    ConnectRequested,
    AuthorizationGranted(Vec<Address>),
    AuthorizationFailed,
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    NetworkResolved(u64),
    BalanceResolved { address: Address, balance: String },
    ProviderDisconnected,
    DisconnectRequested,
}

impl SessionInput {
    pub fn name(&self) -> &'static str {
        match self {
            SessionInput::ProbeCompleted(_) => "probe_completed",
            SessionInput::ConnectRequested => "connect_requested",
            SessionInput::AuthorizationGranted(_) => "authorization_granted",
            SessionInput::AuthorizationFailed => "authorization_failed",
            SessionInput::AccountsChanged(_) => "accounts_changed",
            SessionInput::ChainChanged(_) => "chain_changed",
            SessionInput::NetworkResolved(_) => "network_resolved",
            SessionInput::BalanceResolved { .. } => "balance_resolved",
            SessionInput::ProviderDisconnected => "provider_disconnected",
            SessionInput::DisconnectRequested => "disconnect_requested",
        }
    }
}

/// Follow-up work the manager performs after applying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    FetchNetwork,
    RefreshBalance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub session: Session,
    pub effects: Vec<Effect>,
    pub reason: &'static str,
}

impl Transition {
    fn new(from: &Session, session: Session, reason: &'static str) -> Self {
        Self {
            from: from.status,
            to: session.status,
            session,
            effects: Vec::new(),
            reason,
        }
    }

    fn with_effects(mut self, effects: &[Effect]) -> Self {
        self.effects.extend_from_slice(effects);
        self
    }

    /// Whether the transition changed anything observable.
    pub fn is_change_from(&self, previous: &Session) -> bool {
        self.session != *previous
    }
}

/// Pure transition function: old session + input -> new session and effects.
pub fn session_transition(
    session: &Session,
    input: SessionInput,
) -> Result<Transition, TransitionError> {
    use SessionStatus::*;

    let illegal = TransitionError::Illegal {
        from: session.status,
        input: input.name(),
    };

    match (session.status, input) {
        (NotInstalled, _) => Err(illegal),

        (Disconnected | Connected, SessionInput::ProbeCompleted(accounts)) => {
            Ok(match accounts.first() {
                Some(account) => Transition::new(
                    session,
                    connected_as(session, *account),
                    "probe found authorized account",
                )
                .with_effects(&[Effect::FetchNetwork, Effect::RefreshBalance]),
                None => Transition::new(session, cleared(), "probe found no authorized account"),
            })
        }

        (Disconnected, SessionInput::ConnectRequested) => {
            let mut next = session.clone();
            next.status = Connecting;
            Ok(Transition::new(session, next, "authorization requested"))
        }

        (Connecting, SessionInput::AuthorizationGranted(accounts)) => {
            Ok(match accounts.first() {
                Some(account) => Transition::new(
                    session,
                    connected_as(session, *account),
                    "authorization granted",
                )
                .with_effects(&[Effect::FetchNetwork, Effect::RefreshBalance]),
                None => Transition::new(session, cleared(), "authorization returned no account"),
            })
        }

        (Connecting, SessionInput::AuthorizationFailed) => {
            Ok(Transition::new(session, cleared(), "authorization failed"))
        }

        (Connected, SessionInput::AccountsChanged(accounts)) => Ok(match accounts.first() {
            Some(account) => Transition::new(
                session,
                connected_as(session, *account),
                "active account changed",
            )
            .with_effects(&[Effect::RefreshBalance]),
            None => Transition::new(session, cleared(), "all accounts revoked"),
        }),

        (Disconnected | Connecting, SessionInput::AccountsChanged(accounts)) => {
            Ok(match accounts.first() {
                Some(account) => Transition::new(
                    session,
                    connected_as(session, *account),
                    "provider reported active account",
                )
                .with_effects(&[Effect::FetchNetwork, Effect::RefreshBalance]),
                None => Transition::new(session, cleared(), "provider reported no account"),
            })
        }

        (Connected, SessionInput::ChainChanged(chain_id) | SessionInput::NetworkResolved(chain_id)) => {
            let mut next = session.clone();
            next.chain_id = Some(chain_id);
            Ok(Transition::new(session, next, "chain updated"))
        }
        // Chain id is only tracked while connected; the connect path fetches it.
        (_, SessionInput::ChainChanged(_) | SessionInput::NetworkResolved(_)) => Ok(
            Transition::new(session, session.clone(), "chain ignored while not connected"),
        ),

        (_, SessionInput::BalanceResolved { address, balance }) => {
            if session.status != Connected || session.address != Some(address) {
                return Err(TransitionError::StaleBalance);
            }
            let mut next = session.clone();
            next.balance = balance;
            Ok(Transition::new(session, next, "balance refreshed"))
        }

        (Connected | Connecting, SessionInput::ProviderDisconnected) => {
            Ok(Transition::new(session, cleared(), "provider disconnected"))
        }
        (Connected | Connecting, SessionInput::DisconnectRequested) => {
            Ok(Transition::new(session, cleared(), "disconnected locally"))
        }
        (Disconnected, SessionInput::ProviderDisconnected | SessionInput::DisconnectRequested) => {
            Ok(Transition::new(session, session.clone(), "already disconnected"))
        }

        _ => Err(illegal),
    }
}

fn cleared() -> Session {
    Session::disconnected()
}

/// Connected on `account`; balance and chain survive only if the address is unchanged.
fn connected_as(session: &Session, account: Address) -> Session {
    if session.status == SessionStatus::Connected && session.address == Some(account) {
        return session.clone();
    }
    let chain_id = if session.status == SessionStatus::Connected {
        session.chain_id
    } else {
        None
    };
    Session {
        status: SessionStatus::Connected,
        address: Some(account),
        balance: ZERO_BALANCE.to_owned(),
        chain_id,
    }
}
