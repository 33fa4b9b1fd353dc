use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usenet_streamer::config::AppConfig;
use usenet_streamer::http::{AppState, HttpServer, IptvState};
use usenet_streamer::iptv::{HttpStreamService, StalkerPortalClient};
use usenet_streamer::nntp::NntpClientManager;
use usenet_streamer::nzb::parser::NzbParser;
use usenet_streamer::service::{InMemoryMountStore, NzbCache, NzbStreamService};

#[derive(Parser)]
#[command(name = "usenet-streamer", about = "Byte-range-seekable streaming over NZB manifests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP byte-range service and (if configured) the IPTV proxy.
    Serve,
    /// Parse an NZB file and print its files without starting the server.
    Inspect {
        nzb_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "usenet_streamer=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve => serve().await,
        Command::Inspect { nzb_path } => inspect(&nzb_path).await,
    }
}

async fn serve() -> Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let servers = AppConfig::nntp_servers_from_env();
    if servers.is_empty() {
        warn!("no NNTP_SERVER_* providers configured; byte-range streaming will fail on every request");
    }

    let client_manager = Arc::new(NntpClientManager::new(servers));
    let _idle_sweeper = client_manager.spawn_idle_sweeper();

    let cache = NzbCache::new();
    cache.spawn_sweeper();

    let mounts = Arc::new(InMemoryMountStore::new());
    let stream_service = Arc::new(NzbStreamService::new(mounts, cache, Arc::clone(&client_manager)));

    let iptv = config.iptv.map(|iptv_config| {
        info!(portal = %iptv_config.portal_url, "IPTV proxy enabled");
        let portal = Arc::new(StalkerPortalClient::new(iptv_config.clone()));
        let http_stream = Arc::new(HttpStreamService::new(iptv_config.stb_user_agent.clone()));
        IptvState::new(portal, http_stream)
    });

    let state = AppState { stream_service, iptv };
    info!(bind = %config.bind_addr, "starting usenet-streamer");

    let result = tokio::select! {
        result = HttpServer::new(config.bind_addr, state).run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    info!("shutting down NNTP connection pools");
    client_manager.shutdown().await;
    result
}

async fn inspect(nzb_path: &PathBuf) -> Result<()> {
    let bytes = std::fs::read(nzb_path).with_context(|| format!("failed to read {}", nzb_path.display()))?;
    let parsed = NzbParser::parse(&bytes)?;

    println!("hash: {}", parsed.hash);
    println!("total size: {} bytes", parsed.total_size);
    println!("files: {}", parsed.files.len());
    for &index in &parsed.media_file_indices {
        let file = &parsed.files[index];
        let kind = if file.is_rar { "rar" } else { "media" };
        println!("  [{kind}] {} ({} bytes, {} segments)", file.name, file.size, file.segments.len());
    }

    Ok(())
}
