//! functest -- mechanism status and command backend for hardware
//! functional-test panels.
//!
//! The core is a [`panel::Panel`]: a mechanism state registry driven by a
//! command dispatcher, plus a test history log that admits one run in
//! progress at a time. Front ends read it for display and forward operator
//! commands into it; the hardware/automation interface receives actuation
//! requests through an [`dispatch::Actuator`] and reports outcomes back.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod history;
pub mod mechanism;
pub mod panel;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::state::AppState;
use crate::config::PanelConfig;
use crate::dispatch::Actuator;
use crate::panel::Panel;

/// Build the panel and its HTTP state from configuration.
///
/// With a storage path configured, history is restored from (or seeded into)
/// the database; otherwise the configured seed history is used directly.
pub fn build_state(config: &PanelConfig, actuator: Arc<dyn Actuator>) -> Result<AppState> {
    let seed = config.seed_log()?;
    let (log, store) = match &config.storage.db_path {
        Some(path) => {
            tracing::info!(db_path = %path.display(), "Initializing history store");
            let pool = storage::open_pool(path)?;
            let log = storage::restore_log(&pool, &seed)?;
            (log, Some(pool))
        }
        None => (seed, None),
    };

    let panel = Panel::new(config.initial_registry(), actuator, log);
    Ok(AppState::new(panel, store, config.display.clone()))
}

/// Build a read-only view of the panel for one-shot inspection.
///
/// A running daemon may own the configured store, so nothing is written to
/// it: in-progress runs are shown as stored, and a missing or empty store
/// shows the configured seed history instead.
pub fn inspect_state(config: &PanelConfig) -> Result<AppState> {
    let seed = config.seed_log()?;
    let log = match &config.storage.db_path {
        Some(path) if path.exists() => {
            let pool = storage::open_pool(path)?;
            let stored = storage::read_log(&pool)?;
            if stored.is_empty() {
                seed
            } else {
                stored
            }
        }
        _ => seed,
    };

    let panel = Panel::new(
        config.initial_registry(),
        Arc::new(dispatch::LoggingActuator),
        log,
    );
    Ok(AppState::new(panel, None, config.display.clone()))
}

/// Start the panel daemon: HTTP API over a fresh panel.
pub async fn serve(config: PanelConfig, bind: Option<&str>) -> Result<()> {
    let state = build_state(&config, Arc::new(dispatch::LoggingActuator))?;
    let app = api::router(state);

    let bind = bind.unwrap_or(&config.api.bind);
    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;

    tracing::info!(%addr, title = %config.display.title, "functest panel listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
