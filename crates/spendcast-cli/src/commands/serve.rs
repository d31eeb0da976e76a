//! Server command implementation

use std::sync::Arc;

use anyhow::Result;
use spendcast_server::ServerConfig;

use super::Env;

pub async fn cmd_serve(env: &Env, host: &str, port: u16) -> Result<()> {
    let config = ServerConfig::from_env();

    println!("🚀 Starting Spendcast web server...");
    println!("   Model dir: {}", env.model_dir.display());
    println!("   Listening: http://{}:{}", host, port);
    println!("   Minimum transactions per forecast: {}", config.min_transactions);
    if config.allowed_origins.is_empty() {
        println!("   CORS: same-origin only");
    } else {
        println!("   CORS: {}", config.allowed_origins.join(", "));
    }

    let store = Arc::new(env.open_store()?);
    spendcast_server::serve_with_config(store, host, port, config).await
}
