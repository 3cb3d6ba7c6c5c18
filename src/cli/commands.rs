//! CLI commands for the ledger simulator
//!
//! Implements the command handlers behind `main.rs`.

use crate::api::{create_router, ApiState};
use crate::core::{Amount, Block};
use crate::engine::{Engine, EngineConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Cancel any single mine/attack request after this long
    pub mine_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            mine_timeout: None,
        }
    }
}

/// Start the REST API server and run until Ctrl+C
pub async fn cmd_serve(engine_config: EngineConfig, server: ServerConfig) -> CliResult<()> {
    let engine = Arc::new(Engine::new(engine_config)?);
    let mut state = ApiState::new(engine);
    state.mine_timeout = server.mine_timeout;

    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("🚀 REST API server starting on http://{}", addr);
    println!();
    println!("📖 Available endpoints:");
    println!("   GET  /balances                    - Balances");
    println!("   GET  /chain                       - Canonical chain");
    println!("   POST /transaction?sender&recipient&amount - Queue transfer");
    println!("   POST /mine?miner_name             - Mine block");
    println!("   POST /attack?attacker             - 51% attack");
    println!("   GET  /pending                     - Pending transactions");
    println!("   GET  /chain/validate              - Validate chain");
    println!("   GET  /stats                       - Chain statistics");
    println!("   GET  /ws                          - WebSocket updates");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            println!("\n📴 Shutting down API server...");
            // stops any nonce search still running
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// Replay the console walkthrough: transfer, mine, transfer, mine, attack
pub fn cmd_demo(engine_config: EngineConfig, attacker: &str) -> CliResult<()> {
    let engine = Engine::new(engine_config)?;
    let cancel = CancellationToken::new();

    println!("⛓️  Ledger simulator demo");
    println!("   Difficulty: {}", engine.config().difficulty);
    print_chain(&engine.chain());

    println!("\n📤 Alice -> Bob: 10");
    match engine.submit("Alice", "Bob", 10.0) {
        Ok(_) => println!("   ✅ Transaction added to pending pool"),
        Err(e) => println!("   ❌ Failed to add transaction: {}", e),
    }

    println!("\n⛏️  Mining as Miner...");
    let mined = engine.mine("Miner", &cancel)?;
    print_mined(&mined.block, mined.stats.hash_attempts);
    print_balances(&engine.balances());

    println!("\n📤 Miner -> Alice: 20");
    engine.submit("Miner", "Alice", 20.0)?;
    println!("   ✅ Transaction added to pending pool");

    println!("\n⛏️  Mining as Miner...");
    let mined = engine.mine("Miner", &cancel)?;
    print_mined(&mined.block, mined.stats.hash_attempts);
    print_balances(&engine.balances());

    println!("\n🔍 Validating chain...");
    let blocks = engine.validate()?;
    println!("   ✅ {} blocks verified", blocks);

    println!("\n💀 Simulating 51% attack by {}...", attacker);
    match engine.attack(attacker, &cancel) {
        Ok(outcome) => println!("   {}", outcome.message()),
        Err(e) => println!("   Attack failed: {}", e),
    }
    print_chain(&engine.chain());
    print_balances(&engine.balances());

    Ok(())
}

fn print_mined(block: &Block, attempts: u64) {
    println!("   Block {} mined!", block.index);
    println!("   ├─ Hash: {}", block.hash);
    println!("   ├─ Transactions: {}", block.tx_count());
    println!("   └─ Attempts: {}", attempts);
}

fn print_chain(blocks: &[Block]) {
    println!("\n🧱 Chain ({} blocks):", blocks.len());
    for block in blocks {
        println!(
            "   #{} | {}... | {} tx | {}",
            block.index,
            &block.hash[..16],
            block.tx_count(),
            block.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

fn print_balances(balances: &BTreeMap<String, Amount>) {
    println!("\n💰 Balances:");
    if balances.is_empty() {
        println!("   (none)");
    }
    for (address, balance) in balances {
        println!("   {}: {}", address, balance);
    }
}
