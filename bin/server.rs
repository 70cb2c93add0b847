// Cohort Admissions - Web Server
// REST API for cohort memberships with Axum

use anyhow::{Context, Result};
use tracing::info;

use cohort_admissions::api::{router, AppState};
use cohort_admissions::{init_tracing, load_dotenv, open_database, Config, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let config = Config::from_env();
    init_tracing(&config.log_level, false);

    info!(version = VERSION, "🌐 Cohort Admissions - Web Server");

    let conn = open_database(&config.db_path)?;
    let bind_addr = config.bind_addr.clone();
    let app = router(AppState::new(conn, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!(addr = %bind_addr, "🚀 server running");
    info!("   API: http://{}/academy/cohort/user", bind_addr);

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
