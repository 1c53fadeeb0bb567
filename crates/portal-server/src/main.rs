mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use portal_api::auth::{self, AppState, AppStateInner};
use portal_api::uploads::UploadSettings;
use portal_db::Database;

use crate::config::{AdminBootstrap, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let db = Database::open(&config.db_path)?;
    if let Some(admin) = &config.admin {
        ensure_admin(&db, admin)?;
    }
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        uploads: UploadSettings {
            root: config.upload_dir.clone(),
            match_rule: config.upload_match,
        },
    });

    let app = portal_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!(
        "Portal server listening on {} (uploads in {}, {:?} type matching)",
        addr,
        config.upload_dir.display(),
        config.upload_match
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Portal server stopped");
    Ok(())
}

fn ensure_admin(db: &Database, admin: &AdminBootstrap) -> anyhow::Result<()> {
    if db.get_user_by_username(&admin.username)?.is_some() {
        return Ok(());
    }
    let hash = auth::hash_password(&admin.password)?;
    let id = db.create_user(&admin.username, "Administrator", "admin", &hash)?;
    info!("Created bootstrap admin {} (id {})", admin.username, id);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
