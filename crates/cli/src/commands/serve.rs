use std::sync::Arc;

use axum::http::{header, HeaderValue};
use rollcall_badge::BadgeRenderer;
use rollcall_core::db::repository::SessionRepository;
use rollcall_core::mail::FileMailer;
use rollcall_core::media::MediaStore;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{load_config, open_repository};

/// Run the `serve` command: start the web console.
pub async fn run(config_path: &str, port: u16) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let repo = open_repository(&config).await?;

    let purged = repo.delete_expired_sessions().await?;
    if purged > 0 {
        info!(count = purged, "purged expired sessions");
    }

    let media_root = config.media_root();
    tokio::fs::create_dir_all(&media_root).await?;
    let outbox = config.outbox_dir();
    tokio::fs::create_dir_all(&outbox).await?;

    let badges = BadgeRenderer::from_config(&config.badge)?;
    if badges.is_none() {
        warn!("no badge template configured; badge downloads are disabled");
    }
    if config.rollcall.public_url.is_none() {
        warn!("rollcall.public_url is not set; activation links will be relative");
    }

    let state = Arc::new(rollcall_console::AppState {
        repo,
        mailer: Arc::new(FileMailer::new(outbox)),
        media: MediaStore::new(media_root),
        badges,
        config,
    });

    let app = rollcall_console::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    println!("Rollcall listening on http://{addr}");
    info!(%addr, "starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
