//! # unvdash - Unvanquished Server Dashboard
//!
//! unvdash publishes the state of an Unvanquished game server in a browser.
//! It has two halves, usually run as two containers next to the game server:
//!
//! ```bash
//! # Keep a LocalXpose UDP tunnel to the game server up and report on it
//! LOCALXPOSE_ACCESS_TOKEN=... unvdash tunnel --to unvanq-server:27960
//!
//! # Serve the dashboard
//! unvdash web --server-host unvanq-server \
//!             --tunnel-status-url http://unvanq-localxpose:4040/status
//! ```
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use clap::Parser;
//! use unvdash::tunnel::{Args as TunnelArgs, run_tunnel_server};
//! use unvdash::web::{Args as WebArgs, run_web_server};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let tunnel_args = TunnelArgs::parse_from(["tunnel", "--access-token", "secret"]);
//! tokio::spawn(run_tunnel_server(tunnel_args));
//!
//! let web_args = WebArgs::parse_from(["web", "--port", "8080"]);
//! run_web_server(web_args).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **[Tunnel Supervisor](tunnel)**: owns the `loclx` child process, parses
//!   its output for the public endpoint and errors, serves `GET /status`
//! - **[Web Dashboard](web)**: HTML page plus JSON APIs for the game server
//!   query, the tunnel status and the saved panel order
//!
//! Both servers stop cleanly on SIGINT and SIGTERM; the supervisor never
//! leaves an orphaned tunnel process behind.

pub mod shutdown;
pub mod tunnel;
pub mod web;
