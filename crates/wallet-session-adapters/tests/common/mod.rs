#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{Address, U256};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

use wallet_session_adapters::MemoryNotifier;
use wallet_session_core::{
    CapabilityProvider, ChainDescriptor, PortError, ProviderEvent, SessionManager,
    BASE_MAINNET_CHAIN_ID,
};

type Reply<T> = oneshot::Receiver<Result<T, PortError>>;

/// Provider double whose responses can be held back and released by the test.
#[derive(Debug)]
pub struct ScriptedProvider {
    authorized: Mutex<Vec<Address>>,
    grant: Mutex<Result<Vec<Address>, PortError>>,
    chain_id: Mutex<u64>,
    balances: Mutex<HashMap<Address, U256>>,
    balance_error: Mutex<Option<PortError>>,
    request_errors: Mutex<HashMap<String, PortError>>,
    gated_accounts: Mutex<VecDeque<Reply<Vec<Address>>>>,
    gated_balances: Mutex<VecDeque<Reply<U256>>>,
    calls: Mutex<Vec<String>>,
    listeners: Mutex<Vec<UnboundedSender<ProviderEvent>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().expect("scripted provider lock")
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            authorized: Mutex::new(vec![]),
            grant: Mutex::new(Ok(vec![])),
            chain_id: Mutex::new(1),
            balances: Mutex::new(HashMap::new()),
            balance_error: Mutex::new(None),
            request_errors: Mutex::new(HashMap::new()),
            gated_accounts: Mutex::new(VecDeque::new()),
            gated_balances: Mutex::new(VecDeque::new()),
            calls: Mutex::new(vec![]),
            listeners: Mutex::new(vec![]),
        }
    }

    pub fn set_authorized(&self, accounts: Vec<Address>) {
        *lock(&self.authorized) = accounts;
    }

    /// Immediate answer to `eth_requestAccounts` when no gated reply is queued.
    pub fn set_grant(&self, grant: Result<Vec<Address>, PortError>) {
        *lock(&self.grant) = grant;
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        *lock(&self.chain_id) = chain_id;
    }

    pub fn set_balance(&self, address: Address, wei: U256) {
        lock(&self.balances).insert(address, wei);
    }

    pub fn fail_balance(&self, err: Option<PortError>) {
        *lock(&self.balance_error) = err;
    }

    pub fn fail_request(&self, method: &str, err: PortError) {
        lock(&self.request_errors).insert(method.to_owned(), err);
    }

    /// The next `eth_requestAccounts` waits for the returned sender.
    pub fn gate_request_accounts(&self) -> oneshot::Sender<Result<Vec<Address>, PortError>> {
        let (tx, rx) = oneshot::channel();
        lock(&self.gated_accounts).push_back(rx);
        tx
    }

    /// The next `eth_getBalance` waits for the returned sender.
    pub fn gate_balance(&self) -> oneshot::Sender<Result<U256, PortError>> {
        let (tx, rx) = oneshot::channel();
        lock(&self.gated_balances).push_back(rx);
        tx
    }

    pub fn emit(&self, event: ProviderEvent) {
        lock(&self.listeners).retain(|l| l.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|c| *c == method).count()
    }

    fn record(&self, method: &str) {
        lock(&self.calls).push(method.to_owned());
    }
}

async fn settle<T>(reply: Reply<T>) -> Result<T, PortError> {
    reply
        .await
        .unwrap_or_else(|_| Err(PortError::Transport("scripted reply dropped".to_owned())))
}

impl CapabilityProvider for ScriptedProvider {
    async fn list_authorized_accounts(&self) -> Result<Vec<Address>, PortError> {
        self.record("eth_accounts");
        Ok(lock(&self.authorized).clone())
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, PortError> {
        self.record("eth_requestAccounts");
        let gated = lock(&self.gated_accounts).pop_front();
        let result = match gated {
            Some(reply) => settle(reply).await,
            None => lock(&self.grant).clone(),
        };
        if let Ok(accounts) = &result {
            *lock(&self.authorized) = accounts.clone();
        }
        result
    }

    async fn chain_id(&self) -> Result<u64, PortError> {
        self.record("eth_chainId");
        Ok(*lock(&self.chain_id))
    }

    async fn get_balance(&self, address: Address) -> Result<U256, PortError> {
        self.record("eth_getBalance");
        if let Some(err) = lock(&self.balance_error).clone() {
            return Err(err);
        }
        let gated = lock(&self.gated_balances).pop_front();
        match gated {
            Some(reply) => settle(reply).await,
            None => Ok(lock(&self.balances).get(&address).copied().unwrap_or_default()),
        }
    }

    async fn request(&self, method: &str, _params: Value) -> Result<Value, PortError> {
        self.record(method);
        match lock(&self.request_errors).get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(Value::Null),
        }
    }

    fn subscribe(&self, events: UnboundedSender<ProviderEvent>) -> Result<(), PortError> {
        lock(&self.listeners).push(events);
        Ok(())
    }

    fn remove_all_listeners(&self) -> Result<(), PortError> {
        lock(&self.listeners).clear();
        Ok(())
    }
}

pub type TestManager = SessionManager<Arc<ScriptedProvider>, MemoryNotifier>;

pub fn target() -> ChainDescriptor {
    *ChainDescriptor::lookup(BASE_MAINNET_CHAIN_ID).expect("base mainnet descriptor")
}

pub fn new_manager() -> (Arc<ScriptedProvider>, MemoryNotifier, TestManager) {
    let provider = Arc::new(ScriptedProvider::new());
    let notifier = MemoryNotifier::default();
    let manager = SessionManager::new(Some(Arc::clone(&provider)), notifier.clone(), target());
    (provider, notifier, manager)
}

pub fn account_a() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn account(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn ether(whole: u64) -> U256 {
    U256::from(whole) * U256::from(1_000_000_000_000_000_000u64)
}

/// Yields until `condition` holds; lets a sibling future in `tokio::join!`
/// reach its await point first.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
