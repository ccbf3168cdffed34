//! Server startup and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

use super::{AppState, build_router};
use crate::config::Config;
use crate::db::Database;
use crate::realtime::{Broadcaster, Notifier, NullNotifier};

/// Bind the HTTP server and serve it in the background.
///
/// Returns a oneshot sender that stops the server gracefully, the bound
/// address, and the task driving the server.
pub async fn start_server(
    db: Database,
    config: &Config,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr, tokio::task::JoinHandle<()>)> {
    let notifier: Arc<dyn Notifier> = if config.realtime.enabled {
        Arc::new(Broadcaster::new(config.realtime.capacity))
    } else {
        info!("Realtime notifications disabled");
        Arc::new(NullNotifier)
    };
    let state = AppState::new(db, notifier, config.admin.clone())
        .with_allowed_origins(config.server.allowed_origins.clone());
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Garage ledger listening on http://{}", bound_addr);
    if config.admin.password.is_none() {
        info!("No admin password configured; admin actions are disabled");
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Server shutting down");
            })
            .await
        {
            error!("Server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr, handle))
}
