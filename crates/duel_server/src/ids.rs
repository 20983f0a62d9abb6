//! Identifiers for sessions and connections.

use derive_more::{Display, From};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characters used in session identifiers (lowercase base 36).
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Short opaque token naming a game session.
///
/// Tokens are meant to be read out or pasted between two people, so they
/// stay short: five base-36 characters by default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a random token of `len` base-36 characters.
    pub fn generate(len: usize) -> Self {
        let mut rng = rand::thread_rng();
        let token = (0..len)
            .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
            .collect();
        Self(token)
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Transient handle of one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display("conn_{_0}")]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a fresh, unique handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}
