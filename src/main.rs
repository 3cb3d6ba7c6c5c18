//! fork51 CLI Application
//!
//! Serves the ledger over HTTP or replays the attack walkthrough on the console.

use clap::{Parser, Subcommand};
use fork51::cli::{self, ServerConfig};
use fork51::core::{BLOCK_REWARD, DEFAULT_DIFFICULTY};
use fork51::engine::EngineConfig;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fork51")]
#[command(version = "0.1.0")]
#[command(about = "Proof-of-work ledger simulator with a 51% attack", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server for the dashboard
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Leading '0' hex characters required in a block hash
        #[arg(short, long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: usize,

        /// Coins paid to the miner of each block
        #[arg(short, long, default_value_t = BLOCK_REWARD)]
        reward: f64,

        /// Cancel a mine or attack request after this many seconds
        #[arg(long)]
        mine_timeout_secs: Option<u64>,
    },

    /// Replay the transfer, mine and attack walkthrough on the console
    Demo {
        /// Leading '0' hex characters required in a block hash
        #[arg(short, long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: usize,

        /// Name of the attacking miner
        #[arg(short, long, default_value = "Mallory")]
        attacker: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            difficulty,
            reward,
            mine_timeout_secs,
        } => {
            let engine_config = EngineConfig {
                difficulty,
                reward,
                ..Default::default()
            };
            let server = ServerConfig {
                host,
                port,
                mine_timeout: mine_timeout_secs.map(Duration::from_secs),
            };

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::cmd_serve(engine_config, server))?;
        }

        Commands::Demo {
            difficulty,
            attacker,
        } => {
            let engine_config = EngineConfig {
                difficulty,
                ..Default::default()
            };
            cli::cmd_demo(engine_config, &attacker)?;
        }
    }

    Ok(())
}
