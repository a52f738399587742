pub mod config;
pub mod eip1193;
pub mod notify;

pub use config::{RuntimeProfile, SessionAdapterConfig};
pub use eip1193::Eip1193Adapter;
pub use notify::{MemoryNotifier, TracingNotifier};

use wallet_session_core::{PortError, SessionManager};

pub type WalletSessionManager<N = TracingNotifier> = SessionManager<Eip1193Adapter, N>;

/// Probes for a provider and builds a manager targeting the configured chain.
pub fn session_manager_from_config<N>(
    config: &SessionAdapterConfig,
    notifier: N,
) -> Result<WalletSessionManager<N>, PortError>
where
    N: wallet_session_core::NotificationSink,
{
    let target = config.target_chain()?;
    let provider = Eip1193Adapter::detect(config);
    match &provider {
        Some(adapter) => tracing::info!(mode = adapter.mode_name(), "wallet provider detected"),
        None => tracing::info!("no wallet provider detected"),
    }
    Ok(SessionManager::new(provider, notifier, target))
}
