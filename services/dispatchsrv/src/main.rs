//! Dispatch Service (`dispatchsrv`)
//!
//! Alarm dispatch with backup fallback, place resolution and responder roster.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use common::service_bootstrap::{
    get_service_port, init_logging, load_development_env, print_startup_banner, ServiceInfo,
};
use dispatchsrv::config::{DispatchConfig, DEFAULT_PORT, SERVICE_NAME};
use dispatchsrv::{api::create_router, DispatchService};

#[derive(Parser, Debug)]
#[command(name = "dispatchsrv", version, about = "Incident alarm dispatch service")]
struct Args {
    /// Configuration file (default: config/dispatchsrv.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the API port
    #[arg(short, long)]
    port: Option<u16>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Skip the startup banner
    #[arg(long)]
    no_banner: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    load_development_env();

    let service_info = ServiceInfo::new(
        SERVICE_NAME,
        "Incident Alarm Dispatch Service",
        DEFAULT_PORT,
    );

    let config = DispatchConfig::load(args.config.as_deref())?;

    init_logging(
        &service_info,
        config.logging.dir.as_deref(),
        config.service.debug,
    )?;
    if !args.no_banner {
        print_startup_banner(&service_info);
    }

    // Validation mode: validate and exit
    if args.validate {
        config.validate()?;
        info!("Configuration is valid");
        return Ok(());
    }

    if config.service.debug {
        info!("Debug mode: every alarm is sent with keyword {}", config.dispatch.backup_keyword);
    }

    let service = Arc::new(DispatchService::from_config(&config)?);
    if config.roster.autostart {
        service.start_polling();
    }

    let port = args
        .port
        .unwrap_or_else(|| get_service_port(config.api.port, &service_info));
    let addr: SocketAddr = format!("{}:{}", config.api.host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.api.host, port))?;

    let app = create_router(Arc::clone(&service));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("API server listening on {}", addr);

    let shutdown = common::shutdown::shutdown_token();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
    {
        error!("Server error: {}", e);
    }

    service.stop_polling();
    info!("Dispatch service stopped");
    Ok(())
}
