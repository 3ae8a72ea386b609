//! Scribe HTTP server binary

use scribe::persistence::{JsonFileStore, MemoryStore, SessionStore};
use scribe::{server, Catalog, HttpOracle, MockOracle, Orchestrator, ScribeConfig, TextOracle};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    println!("Scribe academic rewriting service");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = ScribeConfig::from_env();
    let use_real = std::env::args().any(|arg| arg == "--use-real");
    let ephemeral = std::env::args().any(|arg| arg == "--ephemeral");

    let oracle: Arc<dyn TextOracle> = if use_real {
        let api_key = config.api_key.clone().ok_or_else(|| {
            anyhow::anyhow!("--use-real needs GEMINI_API_KEY (or API_KEY) to be set")
        })?;
        println!("✓ Mode: REAL oracle ({} at {})", config.model, config.oracle_url);
        Arc::new(HttpOracle::new(config.oracle_url.clone(), config.model.clone(), api_key))
    } else {
        println!("✓ Mode: OFFLINE oracle");
        println!("   (use --use-real to call the hosted model)");
        Arc::new(MockOracle::offline())
    };

    let store: Arc<dyn SessionStore> = if ephemeral {
        println!("✓ Session storage: in memory (--ephemeral)");
        Arc::new(MemoryStore::new())
    } else {
        let path = config.session_path();
        println!("✓ Session storage: {}", path.display());
        Arc::new(JsonFileStore::new(path))
    };

    if config.propose_structure {
        println!("✓ Flow: structure proposal before rewriting");
    }

    let orch = Orchestrator::new(oracle, store, Catalog::academic(), config.propose_structure);
    match orch.resume().await {
        Ok(true) => println!("✓ Previous session restored"),
        Ok(false) => println!("✓ Starting a fresh session"),
        Err(e) => eprintln!("⚠️  Saved session could not be loaded: {}", e),
    }

    println!("✓ Starting HTTP server on port {}...", config.port);
    println!();

    server::run_server(orch, config.port).await?;

    Ok(())
}
