//! Command-line interface for the room server.

use crate::config::Environment;
use clap::Parser;
use std::path::PathBuf;

/// Duel - real-time two-player tic-tac-toe rooms over WebSockets
///
/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "duel_server")]
#[command(about = "Real-time two-player tic-tac-toe room server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "DUEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "DUEL_HOST")]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Deployment environment (decides default CORS origins)
    #[arg(long, env = "APP_ENV", value_enum)]
    pub environment: Option<Environment>,

    /// Public URL of the app, allowed as a CORS origin
    #[arg(long, env = "APP_URL")]
    pub app_url: Option<String>,

    /// Front-end URL, allowed as a CORS origin
    #[arg(long, env = "FRONTEND_URL")]
    pub frontend_url: Option<String>,

    /// Length of generated game identifiers
    #[arg(long, env = "DUEL_SESSION_ID_LEN")]
    pub session_id_len: Option<usize>,
}
