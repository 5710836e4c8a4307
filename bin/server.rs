// Flat Ledger - Web Server
// REST API over the payment ledger

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use flat_ledger::api::{router, AppState};
use flat_ledger::{init_tracing, AppConfig, Store};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_json);

    println!("🌐 Flat Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = Store::from_config(&config)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    info!(db = %config.database_path.display(), "database opened");
    println!("✓ Database opened: {}", config.database_path.display());

    let app = router(AppState::new(Arc::new(store), config.expected_fee));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/flats", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler; run until the process is killed
        std::future::pending::<()>().await;
    }
}
