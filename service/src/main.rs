use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dirserve_service::config_io::{Overrides, resolve_config};

#[derive(Debug, Parser)]
#[command(name = "dirserve", about = "Serve a directory over HTTP")]
struct Args {
    /// Directory to serve
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Bind address, e.g. 127.0.0.1:8001
    #[arg(long, default_value = "127.0.0.1:8001")]
    listen: SocketAddr,

    /// URL prefix the tree is mounted under
    #[arg(long, default_value = "/")]
    prefix: String,

    /// Config file path (.toml or .json), parsed as dirserve_core::policy::ServeConfig.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable mkdirp, mv, rm and upload
    #[arg(long)]
    read_only: bool,

    /// List and serve dot-files
    #[arg(long)]
    show_hidden: bool,

    /// Follow symbolic links that stay inside the root
    #[arg(long)]
    symlinks: bool,

    /// Log at debug level when RUST_LOG is unset
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = resolve_config(
        args.config.as_deref(),
        Overrides {
            read_only: args.read_only,
            show_hidden: args.show_hidden,
            show_symlinks: args.symlinks,
        },
    )?;
    let policy = config.policy;

    let app = dirserve_service::server::build_app(args.root.clone(), config, &args.prefix)?;
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!(
        listen = %listener.local_addr()?,
        root = %args.root.display(),
        prefix = %args.prefix,
        read_only = policy.read_only,
        show_hidden = policy.show_hidden,
        show_symlinks = policy.show_symlinks,
        "serving"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(err = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
