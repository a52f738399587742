//! Session manager: the only writer of the wallet [`Session`].
//!
//! User operations (`connect`, `disconnect`, `switch_to_target_chain`,
//! `refresh_balance`) and provider events both funnel into
//! [`session_transition`]. Provider calls are awaited without holding any
//! lock, so results can land in any order; every continuation re-checks the
//! session before applying and drops results that were overtaken.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use alloy::primitives::utils::format_ether;
use alloy::primitives::Address;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::chain::ChainDescriptor;
use crate::domain::{Notification, ProviderEvent, Session, SessionStatus};
use crate::error::SessionError;
use crate::ports::{CapabilityProvider, NotificationSink};
use crate::state_machine::{session_transition, Effect, SessionInput, Transition};

pub const SWITCH_CHAIN_METHOD: &str = "wallet_switchEthereumChain";
pub const ADD_CHAIN_METHOD: &str = "wallet_addEthereumChain";

const NOT_INSTALLED_MESSAGE: &str =
    "No wallet provider detected. Install a browser wallet to continue.";
const CONNECTED_MESSAGE: &str = "Wallet connected successfully!";
const CONNECT_FAILED_MESSAGE: &str = "Failed to connect wallet. Please try again.";
const DISCONNECTED_MESSAGE: &str =
    "Wallet disconnected locally. You may need to disconnect in your wallet as well.";

pub type ProviderEvents = mpsc::UnboundedReceiver<ProviderEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(Address),
    AlreadyConnected,
    /// Another `connect` holds the authorization request.
    InFlight,
    /// A pushed event or `disconnect` settled the session before the response arrived.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSwitchOutcome {
    /// Switch issued; the `chainChanged` event carries the result.
    SwitchRequested,
    /// Wallet did not know the chain and was asked to add it.
    ChainRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceRefresh {
    Applied(String),
    Skipped,
    Discarded,
}

pub struct SessionManager<P, N>
where
    P: CapabilityProvider,
    N: NotificationSink,
{
    provider: Option<P>,
    notifier: N,
    target: ChainDescriptor,
    state: watch::Sender<Session>,
    authorizing: AtomicBool,
    mounted: AtomicBool,
    address_epoch: AtomicU64,
}

impl<P, N> SessionManager<P, N>
where
    P: CapabilityProvider,
    N: NotificationSink,
{
    /// `provider` is the result of the synchronous capability probe; `None`
    /// pins the session to [`SessionStatus::NotInstalled`].
    pub fn new(provider: Option<P>, notifier: N, target: ChainDescriptor) -> Self {
        let initial = if provider.is_some() {
            Session::disconnected()
        } else {
            Session::not_installed()
        };
        let (state, _) = watch::channel(initial);
        Self {
            provider,
            notifier,
            target,
            state,
            authorizing: AtomicBool::new(false),
            mounted: AtomicBool::new(false),
            address_epoch: AtomicU64::new(0),
        }
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn target(&self) -> &ChainDescriptor {
        &self.target
    }

    pub fn is_on_target_chain(&self) -> bool {
        self.state.borrow().is_on_chain(self.target.chain_id)
    }

    pub fn is_authorizing(&self) -> bool {
        self.authorizing.load(Ordering::Acquire)
    }

    /// Registers provider listeners and probes for an existing authorization.
    ///
    /// Listeners left over from a previous mount are removed first.
    pub async fn mount(&self) -> Result<ProviderEvents, SessionError> {
        let provider = self.provider.as_ref().ok_or(SessionError::ProviderAbsent)?;
        if self.mounted.swap(true, Ordering::AcqRel) {
            debug!("remounting: removing previous provider listeners");
            if let Err(err) = provider.remove_all_listeners() {
                warn!(%err, "failed to remove previous provider listeners");
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(err) = provider.subscribe(tx) {
            self.mounted.store(false, Ordering::Release);
            warn!(%err, "failed to register provider listeners");
            return Err(SessionError::Unknown(err));
        }
        debug!("provider listeners registered");

        if let Err(err) = self.probe().await {
            debug!(%err, "initial probe did not complete");
        }
        Ok(rx)
    }

    pub fn unmount(&self) {
        if !self.mounted.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(provider) = &self.provider {
            match provider.remove_all_listeners() {
                Ok(()) => debug!("provider listeners removed"),
                Err(err) => warn!(%err, "failed to remove provider listeners"),
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// Pumps provider events until the listener side is dropped.
    ///
    /// Events already queued are applied together before their balance and
    /// network fetches start, so a burst costs one round of queries.
    pub async fn run(&self, mut events: ProviderEvents) {
        while let Some(first) = events.recv().await {
            let mut effects: Vec<Effect> = Vec::new();
            let mut next = Some(first);
            while let Some(event) = next {
                match event {
                    ProviderEvent::AccountsChanged(accounts) => {
                        debug!(event = "accountsChanged", "provider event");
                        let input = SessionInput::AccountsChanged(accounts);
                        if let Some(transition) = self.apply(input) {
                            for effect in transition.effects {
                                if !effects.contains(&effect) {
                                    effects.push(effect);
                                }
                            }
                        }
                    }
                    other => self.handle_event(other).await,
                }
                next = events.try_recv().ok();
            }
            self.run_effects(&effects).await;
        }
        debug!("provider event stream closed");
    }

    pub async fn handle_event(&self, event: ProviderEvent) {
        debug!(event = event.name(), "provider event");
        match event {
            ProviderEvent::AccountsChanged(accounts) => self.on_accounts_changed(accounts).await,
            ProviderEvent::ChainChanged(chain_id) => self.on_chain_changed(chain_id),
            ProviderEvent::Connect => self.on_connect().await,
            ProviderEvent::Disconnect => self.on_disconnect(),
        }
    }

    pub async fn on_accounts_changed(&self, accounts: Vec<Address>) {
        if let Some(transition) = self.apply(SessionInput::AccountsChanged(accounts)) {
            self.run_effects(&transition.effects).await;
        }
    }

    pub fn on_chain_changed(&self, chain_id: u64) {
        self.apply(SessionInput::ChainChanged(chain_id));
    }

    pub async fn on_connect(&self) {
        if let Err(err) = self.probe().await {
            debug!(%err, "probe after provider connect failed");
        }
    }

    pub fn on_disconnect(&self) {
        self.apply(SessionInput::ProviderDisconnected);
    }

    /// Reads already-authorized accounts without prompting the user.
    ///
    /// Skipped while an authorization is pending; a result that arrives after
    /// the address changed is dropped.
    pub async fn probe(&self) -> Result<SessionStatus, SessionError> {
        let provider = self.provider.as_ref().ok_or(SessionError::ProviderAbsent)?;
        if self.session().status == SessionStatus::Connecting {
            debug!("probe skipped: authorization in flight");
            return Ok(SessionStatus::Connecting);
        }

        let epoch = self.address_epoch.load(Ordering::Acquire);
        let accounts = provider.list_authorized_accounts().await.map_err(|err| {
            warn!(%err, "authorized account probe failed");
            SessionError::from_query(err)
        })?;
        if self.address_epoch.load(Ordering::Acquire) != epoch {
            debug!("probe result superseded by a newer account change");
            return Ok(self.session().status);
        }

        if let Some(transition) = self.apply(SessionInput::ProbeCompleted(accounts)) {
            self.run_effects(&transition.effects).await;
        }
        Ok(self.session().status)
    }

    pub async fn connect(&self) -> Result<ConnectOutcome, SessionError> {
        let Some(provider) = self.provider.as_ref() else {
            self.notifier.notify(Notification::error(NOT_INSTALLED_MESSAGE));
            return Err(SessionError::ProviderAbsent);
        };
        if self.session().is_connected() {
            return Ok(ConnectOutcome::AlreadyConnected);
        }
        let Some(mut guard) = AuthorizationGuard::acquire(self) else {
            debug!("connect ignored: authorization already in flight");
            return Ok(ConnectOutcome::InFlight);
        };

        self.apply(SessionInput::ConnectRequested);
        if self.session().status != SessionStatus::Connecting {
            guard.disarm();
            return Ok(ConnectOutcome::Superseded);
        }

        let result = provider.request_accounts().await;
        guard.disarm();
        drop(guard);

        if self.session().status != SessionStatus::Connecting {
            let granted = result.ok().and_then(|accounts| accounts.first().copied());
            return Ok(self.settle(granted));
        }

        match result {
            Ok(accounts) => {
                let Some(address) = accounts.first().copied() else {
                    self.apply(SessionInput::AuthorizationFailed);
                    warn!("wallet authorization returned no accounts");
                    self.notifier.notify(Notification::error(CONNECT_FAILED_MESSAGE));
                    return Err(SessionError::UserRejected("no accounts authorized".to_owned()));
                };
                if let Some(transition) = self.apply(SessionInput::AuthorizationGranted(accounts)) {
                    self.run_effects(&transition.effects).await;
                }
                // Events may have replaced the account while the effects ran.
                Ok(self.settle(Some(address)))
            }
            Err(err) => {
                self.apply(SessionInput::AuthorizationFailed);
                warn!(%err, "wallet authorization failed");
                self.notifier.notify(Notification::error(CONNECT_FAILED_MESSAGE));
                Err(SessionError::from_request(err))
            }
        }
    }

    /// Reports success only if the session ended up connected on `granted`.
    fn settle(&self, granted: Option<Address>) -> ConnectOutcome {
        let session = self.session();
        match (granted, session.address) {
            (Some(granted), Some(current)) if granted == current => {
                info!(address = %current, "wallet connected");
                self.notifier.notify(Notification::success(CONNECTED_MESSAGE));
                ConnectOutcome::Connected(current)
            }
            _ => {
                debug!(status = ?session.status, "authorization result superseded");
                ConnectOutcome::Superseded
            }
        }
    }

    /// Clears the local session. The wallet's own authorization is untouched,
    /// so a later [`probe`](Self::probe) can observe the account again.
    pub fn disconnect(&self) {
        if let Some(transition) = self.apply(SessionInput::DisconnectRequested) {
            if transition.from != transition.to {
                self.notifier.notify(Notification::info(DISCONNECTED_MESSAGE));
            }
        }
    }

    pub async fn switch_to_target_chain(&self) -> Result<ChainSwitchOutcome, SessionError> {
        let Some(provider) = self.provider.as_ref() else {
            self.notifier.notify(Notification::error(NOT_INSTALLED_MESSAGE));
            return Err(SessionError::ProviderAbsent);
        };
        let target = self.target;

        let err = match provider
            .request(SWITCH_CHAIN_METHOD, target.switch_chain_params())
            .await
        {
            Ok(_) => {
                debug!(chain_id = target.chain_id, "chain switch requested");
                return Ok(ChainSwitchOutcome::SwitchRequested);
            }
            Err(err) => err,
        };

        if !err.is_unrecognized_chain() {
            warn!(%err, chain = target.display_name, "chain switch failed");
            self.notifier.notify(Notification::error(format!(
                "Failed to switch to {}. Please try again.",
                target.display_name
            )));
            return Err(SessionError::from_request(err));
        }

        info!(
            chain_id = target.chain_id,
            "wallet does not know target chain; registering it"
        );
        match provider
            .request(ADD_CHAIN_METHOD, target.add_chain_params())
            .await
        {
            Ok(_) => Ok(ChainSwitchOutcome::ChainRegistered),
            Err(add_err) => {
                warn!(%add_err, chain = target.display_name, "chain registration failed");
                self.notifier.notify(Notification::error(format!(
                    "Failed to add {} to your wallet. Please try again.",
                    target.display_name
                )));
                if add_err.is_user_rejected() {
                    Err(SessionError::from_request(add_err))
                } else {
                    Err(SessionError::UnrecognizedChain(target.chain_id))
                }
            }
        }
    }

    /// Fetches the balance of the current address. A response for an
    /// address that is no longer current is discarded.
    pub async fn refresh_balance(&self) -> Result<BalanceRefresh, SessionError> {
        let Some(provider) = self.provider.as_ref() else {
            return Ok(BalanceRefresh::Skipped);
        };
        let Some(address) = self.session().address else {
            return Ok(BalanceRefresh::Skipped);
        };

        let wei = provider.get_balance(address).await.map_err(|err| {
            warn!(%address, %err, "balance query failed; keeping previous balance");
            SessionError::from_query(err)
        })?;
        let balance = format_ether(wei);
        match self.apply(SessionInput::BalanceResolved {
            address,
            balance: balance.clone(),
        }) {
            Some(_) => Ok(BalanceRefresh::Applied(balance)),
            None => Ok(BalanceRefresh::Discarded),
        }
    }

    pub async fn refresh_network(&self) -> Result<Option<u64>, SessionError> {
        let provider = self.provider.as_ref().ok_or(SessionError::ProviderAbsent)?;
        let chain_id = provider.chain_id().await.map_err(|err| {
            warn!(%err, "network query failed");
            SessionError::from_query(err)
        })?;
        self.apply(SessionInput::NetworkResolved(chain_id));
        Ok(self.session().chain_id)
    }

    async fn run_effects(&self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::FetchNetwork => {
                    let _ = self.refresh_network().await;
                }
                Effect::RefreshBalance => {
                    let _ = self.refresh_balance().await;
                }
            }
        }
    }

    /// Applies `input` and broadcasts the session if it changed. Illegal or
    /// stale inputs are logged and dropped.
    fn apply(&self, input: SessionInput) -> Option<Transition> {
        let mut applied = None;
        self.state.send_if_modified(|session| {
            match session_transition(session, input) {
                Ok(transition) => {
                    let changed = transition.is_change_from(session);
                    if changed {
                        debug!(
                            from = ?transition.from,
                            to = ?transition.to,
                            reason = transition.reason,
                            "session transition"
                        );
                        if transition.session.address != session.address {
                            self.address_epoch.fetch_add(1, Ordering::AcqRel);
                        }
                        *session = transition.session.clone();
                    }
                    applied = Some(transition);
                    changed
                }
                Err(err) => {
                    debug!(%err, "session input dropped");
                    false
                }
            }
        });
        applied
    }
}

impl<P, N> Drop for SessionManager<P, N>
where
    P: CapabilityProvider,
    N: NotificationSink,
{
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Holds the single authorization slot.
///
/// Dropped while still armed (the `connect` future was cancelled before the
/// wallet answered), it also moves the session out of `Connecting`.
struct AuthorizationGuard<'a, P, N>
where
    P: CapabilityProvider,
    N: NotificationSink,
{
    manager: &'a SessionManager<P, N>,
    armed: bool,
}

impl<'a, P, N> AuthorizationGuard<'a, P, N>
where
    P: CapabilityProvider,
    N: NotificationSink,
{
    fn acquire(manager: &'a SessionManager<P, N>) -> Option<Self> {
        manager
            .authorizing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                manager,
                armed: true,
            })
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<P, N> Drop for AuthorizationGuard<'_, P, N>
where
    P: CapabilityProvider,
    N: NotificationSink,
{
    fn drop(&mut self) {
        self.manager.authorizing.store(false, Ordering::Release);
        if self.armed {
            debug!("authorization abandoned before the wallet answered");
            self.manager.apply(SessionInput::AuthorizationFailed);
        }
    }
}
