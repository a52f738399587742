use wallet_session_core::{ChainDescriptor, PortError, BASE_MAINNET_CHAIN_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeProfile {
    Development,
    Production,
}

impl RuntimeProfile {
    fn from_raw(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Self::Development),
            "prod" | "production" => Some(Self::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionAdapterConfig {
    pub runtime_profile: RuntimeProfile,
    pub eip1193_proxy_url: Option<String>,
    pub request_timeout_ms: u64,
    pub target_chain_id: u64,
}

impl Default for SessionAdapterConfig {
    fn default() -> Self {
        Self {
            runtime_profile: RuntimeProfile::Development,
            eip1193_proxy_url: None,
            request_timeout_ms: 15_000,
            target_chain_id: BASE_MAINNET_CHAIN_ID,
        }
    }
}

impl SessionAdapterConfig {
    /// Overlays `WALLET_*` environment variables on the defaults. Unparseable
    /// values keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(profile) = env_var("WALLET_RUNTIME_PROFILE")
            .as_deref()
            .and_then(RuntimeProfile::from_raw)
        {
            config.runtime_profile = profile;
        }
        config.eip1193_proxy_url = env_var("WALLET_EIP1193_PROXY_URL");
        if let Some(ms) = env_var("WALLET_REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.request_timeout_ms = ms;
        }
        if let Some(id) = env_var("WALLET_TARGET_CHAIN_ID")
            .and_then(|v| wallet_session_core::parse_chain_id(&v).ok())
        {
            config.target_chain_id = id;
        }
        config
    }

    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }

    pub fn target_chain(&self) -> Result<ChainDescriptor, PortError> {
        ChainDescriptor::lookup(self.target_chain_id)
            .copied()
            .ok_or_else(|| {
                PortError::Validation(format!(
                    "target chain {} is not in the known chain table",
                    self.target_chain_id
                ))
            })
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
