//! `pollcast serve`: wire the delivery gateway to the HTTP and WebSocket
//! listeners and run until a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use pollcast_core::DeliveryGateway;
use tokio_util::sync::CancellationToken;

use crate::cli::ServeOpts;
use crate::http_server::HttpServer;
use crate::ws_server::WsServer;

/// How long to let in-flight requests and sockets wind down after cancel.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run_server(opts: ServeOpts) -> anyhow::Result<()> {
    let config = opts.core_config();
    tracing::info!(
        recheck_ms = config.recheck_interval.as_millis() as u64,
        default_wait_ms = config.default_wait.as_millis() as u64,
        max_wait_ms = config.max_wait.as_millis() as u64,
        subscriber_buffer = config.subscriber_buffer,
        "delivery gateway configured"
    );

    let gateway = Arc::new(DeliveryGateway::new(config));
    let cancel = CancellationToken::new();

    let http = HttpServer::new(opts.http_addr, Arc::clone(&gateway), cancel.clone());
    let ws = WsServer::new(opts.ws_addr, Arc::clone(&gateway), cancel.clone())
        .with_max_connections(opts.max_connections)
        .with_heartbeat(opts.ping_interval(), opts.ping_timeout());

    // Bind both before serving so an address-in-use error fails startup.
    let (http_listener, http_addr) = http
        .bind()
        .await
        .map_err(|e| anyhow::anyhow!("cannot bind http listener on {}: {e}", opts.http_addr))?;
    let (ws_listener, ws_addr) = ws
        .bind()
        .await
        .map_err(|e| anyhow::anyhow!("cannot bind websocket listener on {}: {e}", opts.ws_addr))?;
    tracing::info!(http = %http_addr, ws = %ws_addr, "pollcast listening");

    let mut http_handle = tokio::spawn(async move {
        if let Err(e) = http.serve(http_listener).await {
            tracing::error!("http server error: {e}");
        }
    });
    let mut ws_handle = tokio::spawn(async move {
        if let Err(e) = ws.serve(ws_listener).await {
            tracing::error!("ws server error: {e}");
        }
    });

    tokio::select! {
        () = shutdown_signal() => {}
        _ = &mut http_handle => {
            tracing::warn!("http server exited unexpectedly");
        }
        _ = &mut ws_handle => {
            tracing::warn!("ws server exited unexpectedly");
        }
    }

    cancel.cancel();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        for handle in [http_handle, ws_handle] {
            // A handle already polled to completion in the select must not be awaited again.
            if !handle.is_finished() {
                let _ = handle.await;
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("servers did not stop within {DRAIN_TIMEOUT:?}");
    }

    let stats = gateway.stats().await;
    tracing::info!(messages = stats.messages, "pollcast stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!("cannot register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}
