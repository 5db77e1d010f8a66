//! # Tunnel Supervisor Module
//!
//! Runs the LocalXpose `loclx` binary as a child process and reports its health
//! over HTTP, so the dashboard can show whether the game server is reachable
//! from the internet and under which address.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐  merged   ┌─────────────────┐        ┌─────────────────┐
//! │  loclx tunnel   │  output   │  Output worker  │ writes │   StatusStore   │
//! │  (child proc)   │──────────►│  (OS thread)    │───────►│  status + logs  │
//! └─────────────────┘           └─────────────────┘        └────────┬────────┘
//!          ▲                                                         │ snapshot
//!          │ SIGTERM / kill                                          ▼
//! ┌─────────────────┐                                       ┌─────────────────┐
//! │   Shutdown      │──────────────────────────────────────►│  GET /status    │
//! │   sequence      │           graceful stop               │  (axum)         │
//! └─────────────────┘                                       └─────────────────┘
//! ```
//!
//! - **[Launcher](launcher)**: builds the `loclx tunnel --raw-mode udp` command
//!   and its environment, starts exactly one process
//! - **[Parser](parser)**: extracts the `udp://` public URL and `Error:` lines
//! - **[Status](status)**: shared status fields and the bounded log tail
//! - **[Supervisor](supervisor)**: worker thread plus termination handling
//!
//! A broken tunnel never takes the status server down: a missing token, a
//! failed spawn or a crashing binary all end up in the `error` field.
//!
//! ## API Endpoints
//!
//! - `GET /status` - status snapshot with `log_tail`
//!
//! Any other path answers `404` with an empty body.
//!
//! ## Example Usage
//!
//! ```bash
//! LOCALXPOSE_ACCESS_TOKEN=... unvdash tunnel --to unvanq-server:27960
//! curl http://localhost:4040/status
//! ```

pub mod launcher;
pub mod parser;
pub mod status;
pub mod supervisor;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

pub use launcher::{LaunchConfig, LaunchError};
pub use status::{StatusSnapshot, StatusStore, TunnelStatus};
pub use supervisor::Supervisor;

/// Grace period between SIGTERM and kill.
pub const PROCESS_STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on draining the HTTP server after shutdown starts.
pub const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on waiting for the output worker thread.
pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "unvdash tunnel supervisor - runs loclx and serves its status"
)]
pub struct Args {
    /// Host to bind the status server to
    #[arg(long, env = "STATUS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the status server
    #[arg(long, env = "STATUS_PORT", default_value_t = 4040)]
    pub port: u16,

    /// LocalXpose binary to run
    #[arg(long, env = "LOCALXPOSE_BIN", default_value = "loclx")]
    pub binary: String,

    /// LocalXpose access token
    ///
    /// Without it the supervisor still serves `/status`, reporting the
    /// missing token as the error.
    #[arg(long, env = "LOCALXPOSE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Address tunneled traffic is forwarded to
    #[arg(long, env = "LOCALXPOSE_TO", default_value = "unvanq-server:27960")]
    pub to: String,

    /// LocalXpose region
    #[arg(long, env = "LOCALXPOSE_REGION")]
    pub region: Option<String>,

    /// Public port to request from LocalXpose
    #[arg(long, env = "LOCALXPOSE_PORT")]
    pub tunnel_port: Option<String>,

    /// Reserved LocalXpose endpoint to bind the tunnel to
    #[arg(long, env = "LOCALXPOSE_RESERVED_ENDPOINT")]
    pub reserved_endpoint: Option<String>,
}

impl Args {
    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig {
            binary: self.binary.clone(),
            access_token: self.access_token.clone(),
            to: self.to.clone(),
            region: self.region.clone(),
            port: self.tunnel_port.clone(),
            reserved_endpoint: self.reserved_endpoint.clone(),
        }
    }
}

/// Starts the tunnel supervisor and runs until SIGINT or SIGTERM.
///
/// # Example
///
/// ```rust,no_run
/// use clap::Parser;
/// use unvdash::tunnel::{Args, run_tunnel_server};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = Args::parse_from(["tunnel", "--access-token", "secret", "--port", "4040"]);
/// run_tunnel_server(args).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_tunnel_server(args: Args) -> Result<()> {
    let shutdown = crate::shutdown::signal()?;
    serve(args, shutdown).await
}

/// Binds the status server, starts the worker and runs until `shutdown`
/// resolves.
pub async fn serve<F>(args: Args, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind status server to {addr}"))?;

    let store = StatusStore::new();
    let supervisor = Supervisor::start(args.launch_config(), store.clone())
        .context("failed to start tunnel worker")?;

    info!("Status server listening on http://{}/status", addr);
    serve_listener(listener, store, supervisor, shutdown).await
}

/// Serves `/status` on `listener` until `shutdown` resolves, then stops the
/// tunnel process, the server and the worker, each with a bounded wait.
pub async fn serve_listener<F>(
    listener: TcpListener,
    store: StatusStore,
    supervisor: Supervisor,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let app = router(store);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown => {
            info!("Shutting down tunnel supervisor");
        }
        result = &mut server => {
            error!("Status server stopped unexpectedly: {:?}", result);
        }
    }

    supervisor.terminate(PROCESS_STOP_TIMEOUT).await;

    let _ = stop_tx.send(());
    if !server.is_finished() {
        match tokio::time::timeout(SERVER_STOP_TIMEOUT, &mut server).await {
            Ok(Ok(Ok(()))) => info!("Status server stopped"),
            Ok(Ok(Err(e))) => error!("Status server error: {:?}", e),
            Ok(Err(e)) => error!("Status server task failed: {:?}", e),
            Err(_) => {
                warn!(
                    "Status server did not stop within {:?}, aborting",
                    SERVER_STOP_TIMEOUT
                );
                server.abort();
            }
        }
    }

    if !supervisor.join(WORKER_JOIN_TIMEOUT).await {
        warn!(
            "Tunnel worker did not finish within {:?}",
            WORKER_JOIN_TIMEOUT
        );
    }

    Ok(())
}

/// Routes for the status server. Request traffic is not logged.
pub fn router(store: StatusStore) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/status/", get(get_status))
        .fallback(not_found)
        .with_state(store)
}

async fn get_status(State(store): State<StatusStore>) -> Json<StatusSnapshot> {
    Json(store.snapshot())
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
