//! # Web Dashboard Module
//!
//! Serves the browser dashboard and the JSON endpoints it polls every five
//! seconds. The dashboard itself holds no state besides the panel order; the
//! game server and the tunnel supervisor are queried on every request.
//!
//! ## API Endpoints
//!
//! - `GET /` - dashboard page
//! - `GET /api/status` - game server `getstatus` query over UDP
//! - `GET /api/localxpose_status` - tunnel status fetched from the supervisor
//! - `GET /api/panel_order` - saved panel order
//! - `POST /api/panel_order` - normalise and save a new panel order
//!
//! ## Example Usage
//!
//! ```bash
//! unvdash web --port 8080 --server-host unvanq-server --server-port 27960
//! ```

pub mod panels;
pub mod query;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use url::Url;

use panels::{PanelStore, normalize_panel_order};
use query::ServerStatus;

// Embed HTML template at compile time
const INDEX_HTML: &str = include_str!("../../public/index.html");

/// Timeout for fetching the tunnel supervisor's `/status`.
pub const TUNNEL_STATUS_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "unvdash web server - serves the server status dashboard"
)]
pub struct Args {
    /// Host to bind the web server to
    #[arg(long, env = "WEB_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the web server
    #[arg(long, env = "WEB_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Game server host to query
    #[arg(long, env = "UNV_SERVER_HOST", default_value = "unvanq-server")]
    pub server_host: String,

    /// Game server UDP port
    #[arg(long, env = "UNV_SERVER_PORT", default_value_t = 27960)]
    pub server_port: u16,

    /// Status endpoint of the tunnel supervisor
    #[arg(
        long,
        env = "LOCALXPOSE_STATUS_URL",
        default_value = "http://unvanq-localxpose:4040/status"
    )]
    pub tunnel_status_url: Url,

    /// File the panel order is saved to
    #[arg(long, env = "PANEL_ORDER_FILE", default_value = "/data/panel_order.json")]
    pub panel_order_file: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    server_host: String,
    server_port: u16,
    tunnel_status_url: Url,
    http: reqwest::Client,
    panels: Arc<PanelStore>,
}

impl AppState {
    pub fn new(args: &Args) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TUNNEL_STATUS_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            server_host: args.server_host.clone(),
            server_port: args.server_port,
            tunnel_status_url: args.tunnel_status_url.clone(),
            http,
            panels: Arc::new(PanelStore::new(&args.panel_order_file)),
        })
    }
}

/// Tunnel status as shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TunnelView {
    pub online: bool,
    pub public_url: Option<String>,
    pub error: String,
    pub log_tail: Vec<String>,
}

/// Lenient view of the supervisor's reply; missing fields take defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpstreamStatus {
    online: bool,
    public_url: Option<String>,
    error: Option<String>,
    log_tail: Vec<String>,
}

/// Fetches the supervisor's status. Failures are reported in `error`.
///
/// `online` is only true when the supervisor is online and reports a
/// non-empty public URL.
pub async fn fetch_tunnel_status(client: &reqwest::Client, url: &Url) -> TunnelView {
    let upstream = match fetch_upstream(client, url).await {
        Ok(upstream) => upstream,
        Err(e) => {
            return TunnelView {
                error: e.to_string(),
                ..Default::default()
            };
        }
    };

    let has_url = upstream.public_url.as_deref().is_some_and(|u| !u.is_empty());
    TunnelView {
        online: upstream.online && has_url,
        public_url: upstream.public_url,
        error: upstream.error.unwrap_or_default(),
        log_tail: upstream.log_tail,
    }
}

async fn fetch_upstream(client: &reqwest::Client, url: &Url) -> reqwest::Result<UpstreamStatus> {
    client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home_page))
        .route("/api/status", get(server_status))
        .route("/api/localxpose_status", get(tunnel_status))
        .route(
            "/api/panel_order",
            get(get_panel_order).post(set_panel_order),
        )
        .with_state(state)
}

/// Starts the dashboard web server and runs until SIGINT or SIGTERM.
pub async fn run_web_server(args: Args) -> Result<()> {
    let state = AppState::new(&args)?;
    let app = router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind web server to {addr}"))?;

    info!("Web server starting on http://{}", addr);
    info!(
        "Querying game server at {}:{}, tunnel status at {}",
        args.server_host, args.server_port, args.tunnel_status_url
    );

    let shutdown = crate::shutdown::signal()?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Web server stopped");
    Ok(())
}

async fn home_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn server_status(State(state): State<AppState>) -> Json<ServerStatus> {
    Json(query::query_server(&state.server_host, state.server_port).await)
}

async fn tunnel_status(State(state): State<AppState>) -> Json<TunnelView> {
    Json(fetch_tunnel_status(&state.http, &state.tunnel_status_url).await)
}

async fn get_panel_order(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "order": state.panels.load().await }))
}

async fn set_panel_order(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    // Malformed bodies are treated like an empty object.
    let body: Value = serde_json::from_slice(&body).unwrap_or_default();
    let Some(requested) = body.get("order").and_then(Value::as_array) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "order must be a list" })),
        );
    };

    let order = normalize_panel_order(requested.iter().filter_map(Value::as_str));
    if let Err(e) = state.panels.save(&order).await {
        error!(
            "Failed to save panel order to {}: {}",
            state.panels.path().display(),
            e
        );
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        );
    }

    (StatusCode::OK, Json(json!({ "order": order })))
}
