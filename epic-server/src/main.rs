//! Epic Server
//!
//! Sample application:
//! - Theme-rendered pages (`/`, `/page`, `/post`)
//! - Multipart uploads (`/upload`)
//! - HTTP plus optional HTTPS listener, redirect on 80/443

use anyhow::Result;
use clap::Parser;
use epic::prelude::*;
use epic_http::{HttpServer, MiddlewareConfig};
use serde_json::json;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod controllers;
mod routes;

const DEFAULT_LOG_FILTER: &str = "info,epic=debug";

#[derive(Parser, Debug)]
#[command(name = "epic-server")]
#[command(about = "Themed web application server built on Epic")]
struct Args {
    /// Directory holding one folder per theme
    #[arg(long, default_value = "themes")]
    themes_dir: PathBuf,

    /// Environment file loaded under the process environment
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Inject META_* variables as OpenGraph meta tags
    #[arg(long)]
    seo_tags: bool,

    /// Disable CORS
    #[arg(long)]
    no_cors: bool,

    /// Disable compression
    #[arg(long)]
    no_compression: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .compact()
        .init();

    let args = Args::parse();

    // --- 1. Lifecycle events ---

    let events = Arc::new(EventBus::new());
    events
        .on(EventKind::Initialize, |_| info!("Starting The Application..."))
        .on(EventKind::Initialized, |_| {
            info!("Application Has Been Initialized, Loading Routes...")
        })
        .on(EventKind::Ready, |_| info!("Routes Loaded, Start Listening..."))
        .on(EventKind::Listening, |event| {
            if let EpicEvent::Listening(listen) = event {
                info!("Listening Started on {} ({})", listen.bind, listen.scheme);
            }
        });

    // --- 2. Application ---

    let options = EpicOptions::new()
        .themes_folder(args.themes_dir)
        .env_file(args.env_file)
        .seo_tags(args.seo_tags)
        .middleware(
            MiddlewareConfig::new()
                .cors(!args.no_cors)
                .compression(!args.no_compression),
        )
        .route_unit(routes::Pages)
        .route_unit(routes::Uploads);

    let mut epic = Epic::new(options, events.clone())?;
    epic.init()?
        .start_view_engine(None, None)?
        .load_routes(error_renderer(render_error))?;
    let app = epic.app()?;

    // --- 3. Listeners ---

    let server = HttpServer::from_env(epic.env(), app);
    let bound = match server.bind(&events).await {
        Ok(bound) => bound,
        Err(e) => {
            if let (Some(failure), Some(target)) = (e.bind_failure(), e.bind_target()) {
                error!("{}", failure.message(target));
                std::process::exit(failure.exit_code());
            }
            return Err(e.into());
        }
    };

    tokio::select! {
        res = bound.serve() => {
            res?;
        }
        _ = shutdown_signal() => {}
    }

    info!("Server stopped");
    Ok(())
}

/// Error page: the theme's `error` view in the `page` layout.
fn render_error(err: &HttpError, ctx: &ErrorContext) -> Response {
    render_error_view_with(
        err,
        ctx,
        json!({ "title": "Error Occurred!", "layout": "page" }),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
