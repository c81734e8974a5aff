//! # Console API Stub Server
//!
//! Local stand-in for the console backend's login, logout, and permission
//! endpoints.
//!
//! ## Endpoints
//!
//! - `POST /api/login/` - Issue a token for a username/password pair
//! - `POST /api/logout/` - Revoke the token in `Authorization`
//! - `GET /api/user/permissions` - Merged permissions of the token's user
//!
//! ## Configuration
//!
//! Environment variables:
//! - `PORT` - HTTP server port (default: 8000)
//! - `CONSOLE_STUB_DIRECTORY` - JSON file with users and roles (default: built-in demo)
//! - `RUST_LOG` - Log level (default: info)

use axum::serve;
use console_access::stub::{stub_router, StubDirectory, StubState};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting console API stub v{}", console_access::VERSION);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8000);

    let directory = match std::env::var("CONSOLE_STUB_DIRECTORY") {
        Ok(path) => match StubDirectory::load_json(&path) {
            Ok(directory) => {
                info!("Loaded stub directory from {}", path);
                directory
            }
            Err(e) => {
                error!("Failed to load stub directory {}: {}", path, e);
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Stub directory load failed: {}", e),
                ));
            }
        },
        Err(_) => {
            info!("Using built-in demo directory (admin/admin, dev/dev)");
            StubDirectory::demo()
        }
    };

    info!("Configuration:");
    info!("  Port: {}", port);
    info!("  Users: {}", directory.users.len());
    info!("  Roles: {}", directory.roles.len());

    let app = stub_router(StubState::new(directory));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind stub server: {}", e);
            return Err(e);
        }
    };

    info!("Listening on {}", addr);

    match serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        Ok(()) => {
            info!("Stub server shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Stub server error: {}", e);
            Err(e)
        }
    }
}
