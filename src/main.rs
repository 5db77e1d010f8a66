use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use unvdash::{tunnel, web};

#[derive(Parser, Debug)]
#[command(author, version, about = "Unvanquished server dashboard and tunnel supervisor.")]
struct Args {
    /// Directory to also write log files to
    #[arg(long, env = "UNVDASH_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the LocalXpose tunnel and serve its status.
    Tunnel(tunnel::Args),
    /// Start the dashboard web server.
    Web(web::Args),
}

impl Commands {
    fn role(&self) -> &'static str {
        match self {
            Commands::Tunnel(_) => "tunnel",
            Commands::Web(_) => "web",
        }
    }
}

fn init_logging(log_dir: Option<&PathBuf>, role: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(dir.join(format!("unvdash-{role}.log")))?;

            use tracing_subscriber::fmt::writer::MakeWriterExt;
            let writer = std::io::stdout.and(log_file);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.log_dir.as_ref(), args.command.role())?;

    match args.command {
        Commands::Tunnel(tunnel_args) => {
            info!("Starting unvdash tunnel supervisor");
            tunnel::run_tunnel_server(tunnel_args).await
        }
        Commands::Web(web_args) => {
            info!("Starting unvdash web server");
            web::run_web_server(web_args).await
        }
    }
}
