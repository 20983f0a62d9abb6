//! Duel - real-time room server for two-player tic-tac-toe.
//!
//! Clients connect over a WebSocket, create or join a game by a short
//! identifier, submit moves, and receive synchronized state updates.
//!
//! # Architecture
//!
//! - **Registry**: concurrent map of live sessions ([`SessionRegistry`])
//! - **Session**: per-game state machine, waiting → playing → finished ([`GameSession`])
//! - **Coordinator**: routes client events and fans out results ([`Coordinator`])
//! - **Server**: axum router with the `/ws` endpoint and a health probe
//!
//! # Example
//!
//! ```no_run
//! use duel_server::{ServerConfig, server};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::default().with_port(0);
//! let handle = server::start(&config).await?;
//! println!("listening on {}", handle.addr());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cli;
mod config;
mod connection;
mod coordinator;
mod error;
mod ids;
mod protocol;
mod registry;
mod session;

pub mod server;

// Crate-level exports - configuration
pub use cli::Cli;
pub use config::{Environment, ServerConfig};

// Crate-level exports - errors
pub use error::{ConfigError, SessionError};

// Crate-level exports - identifiers and wire events
pub use ids::{ConnectionId, SessionId};
pub use protocol::{ClientEvent, ServerEvent};

// Crate-level exports - coordination core
pub use coordinator::{Coordinator, DEFAULT_SEND_QUEUE};
pub use registry::{DEFAULT_ID_LEN, SessionHandle, SessionRegistry};
pub use session::{Departure, GameSession, MoveOutcome, Outcome, Participant, SessionStatus};

// Crate-level exports - board engine
pub use duel_tictactoe::{Board, Mark, Square};
