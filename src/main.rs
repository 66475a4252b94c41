mod config;
mod db;
mod error;
mod llm;
mod routes;
mod services;
mod state;

use std::sync::Arc;
use std::time::Duration;

use llm::LlmChat;
use llm::retry::{RetryPolicy, RetryingLlm};
use services::storage::LocalObjectStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::ServerConfig::from_env().expect("server configuration");

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");

    // Initialize LLM client (non-fatal: AI features disabled if config missing).
    let llm: Option<Arc<dyn LlmChat>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            let policy = RetryPolicy::from_env();
            tracing::info!(model = client.model(), max_attempts = policy.max_attempts, "LLM client initialized");
            let retrying: Arc<dyn LlmChat> = Arc::new(RetryingLlm::new(Arc::new(client), policy));
            Some(retrying)
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client not configured; AI features disabled");
            None
        }
    };

    let storage = Arc::new(LocalObjectStore::new(&config.storage_dir));
    tracing::info!(storage_dir = %config.storage_dir, "object storage ready");

    let state = state::AppState::new(
        pool,
        llm,
        storage,
        Duration::from_secs(config.entitlement_cache_ttl_secs),
        config.ai_max_tokens,
    );

    let app = routes::app(state, config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, "course builder listening");
    axum::serve(listener, app).await.expect("server failed");
}
