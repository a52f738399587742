//! wallet-session: drives one wallet session from the command line.
//!
//! Usage: `wallet-session [status|connect|disconnect|switch-chain|balance|watch]`

use eyre::{bail, WrapErr};
use wallet_session_adapters::{
    session_manager_from_config, SessionAdapterConfig, TracingNotifier, WalletSessionManager,
};
use wallet_session_core::{ProviderEvents, SessionStatus};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "status".to_owned());
    let config = SessionAdapterConfig::from_env();
    tracing::info!(
        command = %command,
        profile = ?config.runtime_profile,
        target_chain_id = config.target_chain_id,
        "starting wallet session"
    );

    let manager = session_manager_from_config(&config, TracingNotifier)
        .wrap_err("failed to build session manager")?;
    if manager.session().status == SessionStatus::NotInstalled {
        print_session(&manager)?;
        bail!("no wallet provider available");
    }
    let mut events = manager.mount().await?;

    match command.as_str() {
        "status" => {}
        "connect" => {
            let outcome = manager.connect().await?;
            tracing::info!(?outcome, "connect finished");
        }
        "disconnect" => manager.disconnect(),
        "switch-chain" => {
            let outcome = manager.switch_to_target_chain().await?;
            tracing::info!(?outcome, "chain switch finished");
            drain(&manager, &mut events).await;
            if manager.session().is_connected() {
                manager.refresh_network().await?;
            }
        }
        "balance" => {
            let refresh = manager.refresh_balance().await?;
            tracing::info!(?refresh, "balance refresh finished");
        }
        "watch" => {
            watch(&manager, events).await?;
            return Ok(());
        }
        other => bail!(
            "unknown command {other:?}; expected status, connect, disconnect, switch-chain, balance or watch"
        ),
    }

    drain(&manager, &mut events).await;
    print_session(&manager)
}

/// Applies events the provider already delivered.
async fn drain(manager: &WalletSessionManager, events: &mut ProviderEvents) {
    while let Ok(event) = events.try_recv() {
        manager.handle_event(event).await;
    }
}

/// Prints every session change until the provider stream ends.
async fn watch(manager: &WalletSessionManager, events: ProviderEvents) -> eyre::Result<()> {
    let mut updates = manager.subscribe();
    print_session(manager)?;
    tokio::select! {
        () = manager.run(events) => Ok(()),
        result = async {
            while updates.changed().await.is_ok() {
                let session = updates.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&session)?);
            }
            Ok::<_, eyre::Report>(())
        } => result,
    }
}

fn print_session(manager: &WalletSessionManager) -> eyre::Result<()> {
    let session = manager.session();
    let view = serde_json::json!({
        "session": session,
        "targetChain": manager.target().display_name,
        "onTargetChain": manager.is_on_target_chain(),
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
