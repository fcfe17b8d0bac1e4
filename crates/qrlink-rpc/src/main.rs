//! QrLink RPC Server - JSON-RPC backend for directory negotiation and QR issuing.
//!
//! This binary provides a JSON-RPC 2.0 server that wraps the qrlink-core
//! library so a host process can negotiate the output directory and request
//! QR artifacts over HTTP.

mod handlers;
mod server;

use anyhow::Result;
use clap::Parser;
use qrlink_core::config::AppConfig;
use qrlink_core::{QrLinkApi, QrLinkApiBuilder};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "qrlink-rpc")]
#[command(about = "JSON-RPC server for QrLink")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// QR output directory (command-line precedence input)
    #[arg(long)]
    qr_dir: Option<String>,

    /// Directory holding the persisted qr-config.json
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Do not persist the directory configuration
    #[arg(long)]
    no_persist: bool,

    /// Extra directory output may be written under (repeatable)
    #[arg(long = "allowed-root")]
    allowed_roots: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("Starting QrLink RPC Server");

    let mut builder = QrLinkApi::builder()
        .with_environment_var(AppConfig::QR_DIR_ENV_VAR)
        .with_command_line_dir(args.qr_dir)
        .with_allowed_roots(args.allowed_roots);

    if !args.no_persist {
        let config_dir = args
            .config_dir
            .unwrap_or_else(QrLinkApiBuilder::default_config_dir);
        info!("Config directory: {}", config_dir.display());
        builder = builder.with_config_dir(config_dir);
    }

    let api = builder.build().await?;

    let (addr, server) = server::start_server(api, &args.host, args.port).await?;

    // Print port for the host process to read (intentional stdout for IPC)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    server.shutdown().await;

    Ok(())
}
