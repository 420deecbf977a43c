//! report-intake server binary.
//!
//! Parses configuration, prepares the storage directory and ledger, mounts the
//! upload middleware on an Axum router and serves until Ctrl+C or SIGTERM.

use axum::extract::connect_info::ConnectInfo;
use axum::http::Request;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use report_intake::background::spawn_background_tasks;
use report_intake::config::Args;
use report_intake::ledger::SizeLedger;
use report_intake::logging;
use report_intake::router::build_router;
use report_intake::storage::Storage;
use report_intake::upload::UploadConfig;

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::new(PathBuf::from(&args.storage_dir)));
    let ledger = Arc::new(SizeLedger::new(PathBuf::from(&args.ledger_path)));
    let upload = Arc::new(UploadConfig {
        max_file_size: args.max_file_size,
    });
    storage.ensure_root().await?;
    info!(
        storage = ?storage.root_path(),
        ledger = ?ledger.path(),
        total_size = ledger.read().await,
        max_file_size = upload.max_file_size,
        "storage ready"
    );

    let app = build_router(storage.clone(), ledger, upload, &args.cors_origins).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let forwarded_ip = request
                    .headers()
                    .get("x-forwarded-for")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.split(',').next())
                    .map(|s| s.trim().to_string());
                let connect_ip = request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string());
                let client_ip = forwarded_ip
                    .or(connect_ip)
                    .unwrap_or_else(|| "unknown".to_string());

                info_span!(
                    env!("CARGO_CRATE_NAME"),
                    client_ip,
                    method = ?request.method(),
                    path = ?request.uri().path(),
                )
            })
            .on_request(DefaultOnRequest::new().level(Level::DEBUG))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.http_port);
    let listener = TcpListener::bind(addr).await?;
    info!("Starting HTTP server at {}", addr);

    spawn_background_tasks(storage, Duration::from_secs(args.upload_temp_ttl_secs));
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal, shutting down");
}
