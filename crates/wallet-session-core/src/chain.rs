use serde::Serialize;
use serde_json::Value;

use crate::ports::PortError;

pub const BASE_MAINNET_CHAIN_ID: u64 = 8453;
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

const ETHER: NativeCurrency = NativeCurrency {
    name: "Ethereum",
    symbol: "ETH",
    decimals: 18,
};

/// Network metadata handed to the wallet when it does not know the chain yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub display_name: &'static str,
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
    pub native_currency: NativeCurrency,
}

pub const KNOWN_CHAINS: &[ChainDescriptor] = &[
    ChainDescriptor {
        chain_id: BASE_MAINNET_CHAIN_ID,
        display_name: "Base Mainnet",
        rpc_url: "https://mainnet.base.org",
        explorer_url: "https://basescan.org",
        native_currency: ETHER,
    },
    ChainDescriptor {
        chain_id: BASE_SEPOLIA_CHAIN_ID,
        display_name: "Base Sepolia Testnet",
        rpc_url: "https://sepolia.base.org",
        explorer_url: "https://sepolia.basescan.org",
        native_currency: ETHER,
    },
];

/// `wallet_addEthereumChain` parameter object (EIP-3085).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddEthereumChainParameter<'a> {
    chain_id: String,
    chain_name: &'a str,
    native_currency: &'a NativeCurrency,
    rpc_urls: [&'a str; 1],
    block_explorer_urls: [&'a str; 1],
}

impl ChainDescriptor {
    pub fn lookup(chain_id: u64) -> Option<&'static ChainDescriptor> {
        KNOWN_CHAINS.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn hex_chain_id(&self) -> String {
        format_chain_id(self.chain_id)
    }

    pub fn switch_chain_params(&self) -> Value {
        serde_json::json!([{ "chainId": self.hex_chain_id() }])
    }

    pub fn add_chain_params(&self) -> Value {
        let param = AddEthereumChainParameter {
            chain_id: self.hex_chain_id(),
            chain_name: self.display_name,
            native_currency: &self.native_currency,
            rpc_urls: [self.rpc_url],
            block_explorer_urls: [self.explorer_url],
        };
        serde_json::json!([param])
    }
}

pub fn format_chain_id(chain_id: u64) -> String {
    format!("{chain_id:#x}")
}

/// Accepts `0x`-prefixed hex (as pushed by `chainChanged`) or decimal.
pub fn parse_chain_id(raw: &str) -> Result<u64, PortError> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| PortError::Validation(format!("invalid hex chain id {raw}: {e}")))
    } else {
        raw.parse()
            .map_err(|e| PortError::Validation(format!("invalid chain id {raw}: {e}")))
    }
}

/// Chain id from a JSON-RPC result, which wallets return as a hex string or number.
pub fn json_chain_id(value: &Value) -> Result<u64, PortError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let s = value
        .as_str()
        .ok_or_else(|| PortError::Validation("chain id must be string or number".to_owned()))?;
    parse_chain_id(s)
}
