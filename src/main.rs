mod activity;
mod admin;
mod app;
mod auth;
mod classifier;
mod config;
mod error;
mod imaging;
mod scans;
mod state;
mod storage;

use auth::repo_types::User;
use auth::services::hash_password;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "neuroscan=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    // Run migrations if present
    if let Err(e) = sqlx::migrate!("./migrations").run(&app_state.db).await {
        tracing::warn!(error = %e, "migrations folder not found or migration failed; continuing");
    }

    // Default admin account, original deployment behavior: created once,
    // never overwritten.
    if let Some(admin) = app_state.config.admin.clone() {
        let hash = hash_password(&admin.password)?;
        match User::ensure_admin(&app_state.db, &admin.username, &admin.email, &hash).await {
            Ok(true) => tracing::info!(username = %admin.username, "default admin created"),
            Ok(false) => tracing::debug!("default admin already exists"),
            Err(e) => tracing::warn!(error = %e, "admin bootstrap failed; continuing"),
        }
    }

    let app = app::build_app(app_state);
    app::serve(app).await
}
