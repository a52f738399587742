use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{address, Address, U256};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use wallet_session_core::{
    format_chain_id, json_chain_id, CapabilityProvider, PortError, ProviderEvent,
    ADD_CHAIN_METHOD, SWITCH_CHAIN_METHOD, UNRECOGNIZED_CHAIN, USER_REJECTED_REQUEST,
};

use crate::SessionAdapterConfig;

/// EIP-1193 "method not supported".
const UNSUPPORTED_METHOD: i64 = 4200;
const ONE_ETHER_WEI: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone)]
pub struct Eip1193Adapter {
    mode: ProviderMode,
    state: Arc<Mutex<ProviderState>>,
    #[cfg(target_arch = "wasm32")]
    hooks: Arc<Mutex<BrowserHooks>>,
}

#[derive(Debug, Clone)]
enum ProviderMode {
    Deterministic,
    #[cfg(not(target_arch = "wasm32"))]
    Proxy(ProxyRuntime),
    #[cfg(target_arch = "wasm32")]
    Browser,
}

#[derive(Debug, Clone)]
#[cfg(not(target_arch = "wasm32"))]
struct ProxyRuntime {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug)]
struct ProviderState {
    accounts: Vec<Address>,
    authorized: bool,
    reject_authorization: bool,
    chain_id: u64,
    known_chains: BTreeSet<u64>,
    balances: HashMap<Address, U256>,
    listeners: Vec<UnboundedSender<ProviderEvent>>,
    observed_accounts: Option<Vec<Address>>,
    observed_chain_id: Option<u64>,
}

impl Default for ProviderState {
    fn default() -> Self {
        let account = address!("1000000000000000000000000000000000000001");
        Self {
            accounts: vec![account],
            authorized: false,
            reject_authorization: false,
            chain_id: 1,
            known_chains: BTreeSet::from([1]),
            balances: HashMap::from([(account, U256::from(ONE_ETHER_WEI))]),
            listeners: Vec::new(),
            observed_accounts: None,
            observed_chain_id: None,
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default)]
struct BrowserHooks {
    registered: Vec<(
        &'static str,
        wasm_bindgen::closure::Closure<dyn FnMut(wasm_bindgen::JsValue)>,
    )>,
}

#[cfg(target_arch = "wasm32")]
const BROWSER_EVENTS: [&str; 4] = ["accountsChanged", "chainChanged", "connect", "disconnect"];

impl Eip1193Adapter {
    /// Synchronous capability probe. `None` means no usable provider.
    #[cfg(target_arch = "wasm32")]
    pub fn detect(_config: &SessionAdapterConfig) -> Option<Self> {
        if browser_provider().is_err() {
            tracing::debug!("window.ethereum not found");
            return None;
        }
        Some(Self::with_mode(ProviderMode::Browser))
    }

    /// Synchronous capability probe. `None` means no usable provider.
    ///
    /// Without a proxy URL the in-memory wallet stands in, except in the
    /// production profile.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn detect(config: &SessionAdapterConfig) -> Option<Self> {
        if let Some(base_url) = &config.eip1193_proxy_url {
            return match Self::proxy(base_url, config.request_timeout_ms) {
                Ok(adapter) => Some(adapter),
                Err(err) => {
                    tracing::warn!(%err, "failed to initialize EIP-1193 proxy client");
                    None
                }
            };
        }
        if config.strict_runtime_required() {
            tracing::warn!("EIP-1193 proxy URL not configured in production runtime profile");
            return None;
        }
        Some(Self::deterministic())
    }

    /// In-memory wallet with one seeded account holding 1 ETH on chain 1.
    pub fn deterministic() -> Self {
        Self::with_mode(ProviderMode::Deterministic)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn proxy(base_url: &str, timeout_ms: u64) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| PortError::Transport(format!("eip1193 proxy client: {e}")))?;
        Ok(Self::with_mode(ProviderMode::Proxy(ProxyRuntime {
            base_url: base_url.to_owned(),
            client,
        })))
    }

    fn with_mode(mode: ProviderMode) -> Self {
        Self {
            mode,
            state: Arc::new(Mutex::new(ProviderState::default())),
            #[cfg(target_arch = "wasm32")]
            hooks: Arc::new(Mutex::new(BrowserHooks::default())),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            ProviderMode::Deterministic => "deterministic",
            #[cfg(not(target_arch = "wasm32"))]
            ProviderMode::Proxy(_) => "proxy",
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser => "browser",
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ProviderState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))
    }

    pub fn listener_count(&self) -> Result<usize, PortError> {
        Ok(self.lock_state()?.listeners.len())
    }

    /// Replaces the wallet's accounts and pushes `accountsChanged`.
    pub fn debug_inject_accounts_changed(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        let mut g = self.lock_state()?;
        g.authorized = !accounts.is_empty();
        if !accounts.is_empty() {
            g.accounts = accounts.clone();
        }
        broadcast(&mut g, ProviderEvent::AccountsChanged(accounts));
        Ok(())
    }

    pub fn debug_inject_chain_changed(&self, chain_id: u64) -> Result<(), PortError> {
        let mut g = self.lock_state()?;
        g.chain_id = chain_id;
        g.known_chains.insert(chain_id);
        broadcast(&mut g, ProviderEvent::ChainChanged(chain_id));
        Ok(())
    }

    pub fn debug_inject_connect(&self) -> Result<(), PortError> {
        let mut g = self.lock_state()?;
        broadcast(&mut g, ProviderEvent::Connect);
        Ok(())
    }

    pub fn debug_inject_disconnect(&self) -> Result<(), PortError> {
        let mut g = self.lock_state()?;
        broadcast(&mut g, ProviderEvent::Disconnect);
        Ok(())
    }

    pub fn debug_set_balance(&self, address: Address, wei: U256) -> Result<(), PortError> {
        self.lock_state()?.balances.insert(address, wei);
        Ok(())
    }

    pub fn debug_reject_authorization(&self, reject: bool) -> Result<(), PortError> {
        self.lock_state()?.reject_authorization = reject;
        Ok(())
    }

    /// Marks the seeded accounts as already authorized, as if a previous
    /// visit had connected.
    pub fn debug_authorize(&self) -> Result<(), PortError> {
        self.lock_state()?.authorized = true;
        Ok(())
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        tracing::trace!(method, mode = self.mode_name(), "eip1193 request");
        match &self.mode {
            ProviderMode::Deterministic => self.deterministic_call(method, &params),
            #[cfg(not(target_arch = "wasm32"))]
            ProviderMode::Proxy(proxy) => proxy_call(proxy, method, params).await,
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser => wasm_request(method, params).await,
        }
    }

    fn deterministic_call(&self, method: &str, params: &Value) -> Result<Value, PortError> {
        let mut g = self.lock_state()?;
        match method {
            "eth_accounts" => {
                let accounts = if g.authorized { g.accounts.clone() } else { vec![] };
                Ok(accounts_json(&accounts))
            }
            "eth_requestAccounts" => {
                if g.reject_authorization {
                    return Err(PortError::Rpc {
                        code: USER_REJECTED_REQUEST,
                        message: "User rejected the request.".to_owned(),
                    });
                }
                g.authorized = true;
                Ok(accounts_json(&g.accounts))
            }
            "eth_chainId" => Ok(Value::String(format_chain_id(g.chain_id))),
            "eth_getBalance" => {
                let address: Address = params
                    .get(0)
                    .and_then(Value::as_str)
                    .ok_or_else(|| PortError::Validation("eth_getBalance: address expected".to_owned()))?
                    .parse()
                    .map_err(|e| PortError::Validation(format!("invalid balance address: {e}")))?;
                let wei = g.balances.get(&address).copied().unwrap_or_default();
                Ok(Value::String(format!("0x{wei:x}")))
            }
            SWITCH_CHAIN_METHOD => {
                let chain_id = chain_id_param(params)?;
                if !g.known_chains.contains(&chain_id) {
                    return Err(PortError::Rpc {
                        code: UNRECOGNIZED_CHAIN,
                        message: format!(
                            "Unrecognized chain ID \"{}\". Try adding the chain using {ADD_CHAIN_METHOD} first.",
                            format_chain_id(chain_id)
                        ),
                    });
                }
                switch_chain(&mut g, chain_id);
                Ok(Value::Null)
            }
            ADD_CHAIN_METHOD => {
                let chain_id = chain_id_param(params)?;
                g.known_chains.insert(chain_id);
                switch_chain(&mut g, chain_id);
                Ok(Value::Null)
            }
            _ => Err(PortError::Rpc {
                code: UNSUPPORTED_METHOD,
                message: format!("method not supported: {method}"),
            }),
        }
    }

    fn observes_snapshots(&self) -> bool {
        #[cfg(not(target_arch = "wasm32"))]
        if matches!(self.mode, ProviderMode::Proxy(_)) {
            return true;
        }
        false
    }

    /// The proxy cannot push events, so changes seen across calls are
    /// replayed to listeners instead.
    fn observe_accounts(&self, accounts: &[Address]) -> Result<(), PortError> {
        if !self.observes_snapshots() {
            return Ok(());
        }
        let mut g = self.lock_state()?;
        let changed = g
            .observed_accounts
            .as_deref()
            .is_some_and(|previous| previous != accounts);
        g.observed_accounts = Some(accounts.to_vec());
        if changed {
            broadcast(&mut g, ProviderEvent::AccountsChanged(accounts.to_vec()));
        }
        Ok(())
    }

    fn observe_chain_id(&self, chain_id: u64) -> Result<(), PortError> {
        if !self.observes_snapshots() {
            return Ok(());
        }
        let mut g = self.lock_state()?;
        let changed = g.observed_chain_id.is_some_and(|previous| previous != chain_id);
        g.observed_chain_id = Some(chain_id);
        if changed {
            broadcast(&mut g, ProviderEvent::ChainChanged(chain_id));
        }
        Ok(())
    }

    #[cfg(target_arch = "wasm32")]
    fn register_browser_hooks(&self) -> Result<(), PortError> {
        use wasm_bindgen::{closure::Closure, JsCast, JsValue};

        let provider = browser_provider()?;
        let on_fn = provider_fn(&provider, &["on", "addListener"])?;
        let mut hooks = self
            .hooks
            .lock()
            .map_err(|e| PortError::Transport(format!("provider hooks lock poisoned: {e}")))?;
        if !hooks.registered.is_empty() {
            return Ok(());
        }

        for name in BROWSER_EVENTS {
            let state = Arc::clone(&self.state);
            let callback = Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| {
                match js_event(name, &value) {
                    Ok(event) => {
                        if let Ok(mut g) = state.lock() {
                            broadcast(&mut g, event);
                        }
                    }
                    Err(err) => tracing::warn!(%err, event = name, "ignoring malformed provider event"),
                }
            });
            on_fn
                .call2(
                    &provider,
                    &JsValue::from_str(name),
                    callback.as_ref().unchecked_ref(),
                )
                .map_err(|e| PortError::Transport(format!("register {name} failed: {e:?}")))?;
            hooks.registered.push((name, callback));
        }
        Ok(())
    }

    #[cfg(target_arch = "wasm32")]
    fn unregister_browser_hooks(&self) -> Result<(), PortError> {
        use wasm_bindgen::{JsCast, JsValue};

        let registered = {
            let mut hooks = self
                .hooks
                .lock()
                .map_err(|e| PortError::Transport(format!("provider hooks lock poisoned: {e}")))?;
            std::mem::take(&mut hooks.registered)
        };
        if registered.is_empty() {
            return Ok(());
        }

        let provider = browser_provider()?;
        if let Ok(remove_fn) = provider_fn(&provider, &["removeListener", "off"]) {
            for (name, callback) in &registered {
                remove_fn
                    .call2(
                        &provider,
                        &JsValue::from_str(name),
                        callback.as_ref().unchecked_ref(),
                    )
                    .map_err(|e| PortError::Transport(format!("remove {name} failed: {e:?}")))?;
            }
        } else {
            let remove_all = provider_fn(&provider, &["removeAllListeners"])?;
            for (name, _) in &registered {
                remove_all
                    .call1(&provider, &JsValue::from_str(name))
                    .map_err(|e| PortError::Transport(format!("remove {name} failed: {e:?}")))?;
            }
        }
        Ok(())
    }
}

impl CapabilityProvider for Eip1193Adapter {
    async fn list_authorized_accounts(&self) -> Result<Vec<Address>, PortError> {
        let result = self.call("eth_accounts", serde_json::json!([])).await?;
        let accounts = parse_accounts(&result)?;
        self.observe_accounts(&accounts)?;
        Ok(accounts)
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, PortError> {
        let result = self.call("eth_requestAccounts", serde_json::json!([])).await?;
        let accounts = parse_accounts(&result)?;
        self.observe_accounts(&accounts)?;
        Ok(accounts)
    }

    async fn chain_id(&self) -> Result<u64, PortError> {
        let result = self.call("eth_chainId", serde_json::json!([])).await?;
        let chain_id = json_chain_id(&result)?;
        self.observe_chain_id(chain_id)?;
        Ok(chain_id)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, PortError> {
        let result = self
            .call(
                "eth_getBalance",
                serde_json::json!([address.to_string(), "latest"]),
            )
            .await?;
        parse_quantity(&result)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError> {
        self.call(method, params).await
    }

    fn subscribe(&self, events: UnboundedSender<ProviderEvent>) -> Result<(), PortError> {
        #[cfg(target_arch = "wasm32")]
        if matches!(self.mode, ProviderMode::Browser) {
            self.register_browser_hooks()?;
        }
        self.lock_state()?.listeners.push(events);
        Ok(())
    }

    fn remove_all_listeners(&self) -> Result<(), PortError> {
        #[cfg(target_arch = "wasm32")]
        if matches!(self.mode, ProviderMode::Browser) {
            self.unregister_browser_hooks()?;
        }
        self.lock_state()?.listeners.clear();
        Ok(())
    }
}

/// Delivers `event` to every live listener and forgets closed ones.
fn broadcast(state: &mut ProviderState, event: ProviderEvent) {
    state
        .listeners
        .retain(|listener| listener.send(event.clone()).is_ok());
}

fn switch_chain(state: &mut ProviderState, chain_id: u64) {
    if state.chain_id != chain_id {
        state.chain_id = chain_id;
        broadcast(state, ProviderEvent::ChainChanged(chain_id));
    }
}

fn accounts_json(accounts: &[Address]) -> Value {
    Value::Array(
        accounts
            .iter()
            .map(|a| Value::String(a.to_string()))
            .collect(),
    )
}

fn parse_accounts(value: &Value) -> Result<Vec<Address>, PortError> {
    let arr = value
        .as_array()
        .ok_or_else(|| PortError::Transport("accounts result must be array".to_owned()))?;
    arr.iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| PortError::Transport("account must be string".to_owned()))?
                .parse()
                .map_err(|e| PortError::Validation(format!("invalid account address: {e}")))
        })
        .collect()
}

fn parse_quantity(value: &Value) -> Result<U256, PortError> {
    if let Some(n) = value.as_u64() {
        return Ok(U256::from(n));
    }
    let raw = value
        .as_str()
        .ok_or_else(|| PortError::Validation("quantity must be hex string".to_owned()))?;
    let hex = raw
        .strip_prefix("0x")
        .ok_or_else(|| PortError::Validation(format!("quantity missing 0x prefix: {raw}")))?;
    U256::from_str_radix(hex, 16)
        .map_err(|e| PortError::Validation(format!("invalid quantity {raw}: {e}")))
}

fn chain_id_param(params: &Value) -> Result<u64, PortError> {
    let raw = params
        .get(0)
        .and_then(|p| p.get("chainId"))
        .ok_or_else(|| PortError::Validation("chainId parameter missing".to_owned()))?;
    json_chain_id(raw)
}

#[cfg(not(target_arch = "wasm32"))]
async fn proxy_call(proxy: &ProxyRuntime, method: &str, params: Value) -> Result<Value, PortError> {
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let response = proxy
        .client
        .post(&proxy.base_url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| PortError::Transport(format!("eip1193 proxy request failed: {e}")))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| PortError::Transport(format!("eip1193 proxy json decode failed: {e}")))?;
    if let Some(err) = body.get("error") {
        return Err(rpc_error(err));
    }
    if !status.is_success() {
        return Err(PortError::Transport(format!(
            "eip1193 proxy status {status}: {body}"
        )));
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| PortError::Transport("eip1193 proxy missing result".to_owned()))
}

#[cfg(not(target_arch = "wasm32"))]
fn rpc_error(err: &Value) -> PortError {
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown provider error")
        .to_owned();
    match err.get("code").and_then(Value::as_i64) {
        Some(code) => PortError::Rpc { code, message },
        None => PortError::Transport(format!("eip1193 proxy returned error: {err}")),
    }
}

#[cfg(target_arch = "wasm32")]
async fn wasm_request(method: &str, params: Value) -> Result<Value, PortError> {
    use serde::Serialize;
    use wasm_bindgen::JsCast;

    let provider = browser_provider()?;
    let request_fn = provider_fn(&provider, &["request"])?;

    let request = serde_json::json!({
        "method": method,
        "params": params,
    });
    let request_js = request
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| PortError::Transport(format!("failed to encode wasm request: {e}")))?;
    let promise_js = request_fn
        .call1(&provider, &request_js)
        .map_err(|e| PortError::Transport(format!("provider request dispatch failed: {e:?}")))?;
    let promise = promise_js.dyn_into::<js_sys::Promise>().map_err(|_| {
        PortError::Transport("provider request did not return Promise".to_owned())
    })?;
    let result_js = wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(js_error)?;
    if result_js.is_null() || result_js.is_undefined() {
        return Ok(Value::Null);
    }
    serde_wasm_bindgen::from_value(result_js)
        .map_err(|e| PortError::Transport(format!("failed to decode wasm response: {e}")))
}

#[cfg(target_arch = "wasm32")]
fn browser_provider() -> Result<wasm_bindgen::JsValue, PortError> {
    let window =
        web_sys::window().ok_or_else(|| PortError::Transport("missing window".to_owned()))?;
    let provider = get_prop(&window.into(), "ethereum")?;
    if provider.is_null() || provider.is_undefined() {
        return Err(PortError::NotFound("window.ethereum missing".to_owned()));
    }
    Ok(provider)
}

#[cfg(target_arch = "wasm32")]
fn get_prop(target: &wasm_bindgen::JsValue, key: &str) -> Result<wasm_bindgen::JsValue, PortError> {
    js_sys::Reflect::get(target, &wasm_bindgen::JsValue::from_str(key))
        .map_err(|e| PortError::Transport(format!("read provider property {key} failed: {e:?}")))
}

/// First of `names` that the provider exposes as a function.
#[cfg(target_arch = "wasm32")]
fn provider_fn(
    provider: &wasm_bindgen::JsValue,
    names: &[&'static str],
) -> Result<js_sys::Function, PortError> {
    use wasm_bindgen::JsCast;

    names
        .iter()
        .find_map(|name| {
            get_prop(provider, name)
                .ok()
                .and_then(|v| v.dyn_into::<js_sys::Function>().ok())
        })
        .ok_or(PortError::NotImplemented("provider method unavailable"))
}

#[cfg(target_arch = "wasm32")]
fn js_error(err: wasm_bindgen::JsValue) -> PortError {
    let code = get_prop(&err, "code").ok().and_then(|v| v.as_f64());
    let message = get_prop(&err, "message")
        .ok()
        .and_then(|v| v.as_string())
        .unwrap_or_else(|| format!("{err:?}"));
    match code {
        Some(code) => PortError::Rpc {
            code: code as i64,
            message,
        },
        None => PortError::Transport(format!("provider request rejected: {message}")),
    }
}

#[cfg(target_arch = "wasm32")]
fn js_chain_id(value: &wasm_bindgen::JsValue) -> Result<u64, PortError> {
    if let Some(s) = value.as_string() {
        return wallet_session_core::parse_chain_id(&s);
    }
    if let Some(num) = value.as_f64() {
        return Ok(num as u64);
    }
    Err(PortError::Validation("invalid JS chain id".to_owned()))
}

#[cfg(target_arch = "wasm32")]
fn js_event(name: &str, value: &wasm_bindgen::JsValue) -> Result<ProviderEvent, PortError> {
    match name {
        "accountsChanged" => {
            let payload: Value = serde_wasm_bindgen::from_value(value.clone())
                .map_err(|e| PortError::Validation(format!("accountsChanged payload: {e}")))?;
            Ok(ProviderEvent::AccountsChanged(parse_accounts(&payload)?))
        }
        "chainChanged" => Ok(ProviderEvent::ChainChanged(js_chain_id(value)?)),
        "connect" => Ok(ProviderEvent::Connect),
        "disconnect" => Ok(ProviderEvent::Disconnect),
        other => Err(PortError::Validation(format!("unexpected provider event {other}"))),
    }
}
