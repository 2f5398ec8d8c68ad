//! Debug HTTP status server, compiled with the `debug_http` feature.
//!
//! Exposes sink health and telemetry of one running pipeline over a small
//! token-protected Axum router.

mod routes;

pub use routes::{build_router, run_http_server, DebugHttpState};

use std::net::SocketAddr;

use log::{error, info};

use crate::engine::core::PipelineHandle;

/// Environment variable holding the access token
pub const TOKEN_ENV: &str = "TREMOR_DEBUG_TOKEN";
const DEFAULT_TOKEN: &str = "tremor-debug";

/// Serve `/health` and `/metrics` for `handle` on `runtime`
///
/// The token comes from `TREMOR_DEBUG_TOKEN`, falling back to a fixed
/// development value.
pub fn spawn_status_server(
    handle: &PipelineHandle,
    addr: SocketAddr,
    runtime: &tokio::runtime::Handle,
) -> tokio::task::JoinHandle<()> {
    let token = std::env::var(TOKEN_ENV).unwrap_or_else(|_| DEFAULT_TOKEN.to_string());
    let preview = token.chars().take(4).collect::<String>();
    info!(
        "[Status] Debug HTTP server binding {} (token prefix {}***)",
        addr, preview
    );

    let state = DebugHttpState::from_handle(handle, token);
    runtime.spawn(async move {
        if let Err(err) = run_http_server(state, addr).await {
            error!("[Status] Debug HTTP server stopped: {:#}", err);
        }
    })
}
