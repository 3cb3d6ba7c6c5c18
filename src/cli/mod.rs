//! Command-line front end

pub mod commands;

pub use commands::{cmd_demo, cmd_serve, CliResult, ServerConfig};
