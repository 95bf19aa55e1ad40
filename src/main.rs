use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pocket_serve::provision::ensure_static_root;
use pocket_serve::{HttpFileServer, RequestLogger, ServeConfig};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pocket-serve", version, about = "Static file server with a live request log")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to serve static files from
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Skip writing the placeholder site into the root directory
    #[arg(long)]
    no_provision: bool,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    let mut config = ServeConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(root) = cli.root {
        config.root_dir = root;
    }
    if cli.no_provision {
        config.provision = false;
    }

    if config.provision {
        // a read-only root still gets served
        if let Err(e) = ensure_static_root(&config.root_dir) {
            warn!(root = %config.root_dir.display(), error = %e, "failed to provision static root");
        }
    }

    let logger = Arc::new(RequestLogger::new(config.max_logs));
    let server = HttpFileServer::new(&config, logger)?;

    info!(
        addr = %server.local_addr()?,
        root = %config.root_dir.display(),
        max_logs = config.max_logs,
        "pocket-serve listening"
    );

    server.run();
    Ok(())
}
