//! Connection settings, loadable from JSON.

use crate::rcon::{
    reassembly::{CompletionRule, GraceWindow, ProbeSentinel, SingleFragment, Trailer},
    SQUAD_CHAT,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default RCON port of the Squad server.
pub const DEFAULT_PORT: u16 = 21114;

/// Default time to wait for a response packet.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Largest value of the size field accepted from the server by default:
/// a 4096 byte body plus the fixed fields.
pub const DEFAULT_MAX_PACKET_SIZE: usize = crate::rcon::MAX_LEN_CLIENTBOUND + 10;

/// The flavour of RCON spoken by the server.
///
/// # Examples
/// ```
/// use squad_rcon::config::Dialect;
///
/// let dialect: Dialect = serde_json::from_str(r#"{"kind": "grace_window", "window_ms": 250}"#).unwrap();
/// assert_eq!(dialect, Dialect::GraceWindow { window_ms: 250, chat_type: None });
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dialect {
    /// Valve's Source RCON: responses end with the echo of an empty probe,
    /// which SRCDS follows with one more packet. No chat.
    Source,

    /// Squad: probe echo, one trailing packet and a raw end marker.
    /// Chat arrives as packets of type [`SQUAD_CHAT`].
    #[default]
    Squad,

    /// One packet per response, probes unsupported (e.g. Factorio). No chat.
    SinglePacket,

    /// Responses end when the server stays silent for `window_ms`.
    GraceWindow {
        /// Length of the silence that completes a response.
        window_ms: u64,
        /// Type code of chat packets, if the server sends any.
        #[serde(default)]
        chat_type: Option<i32>,
    },
}

impl Dialect {
    /// Type code of unsolicited chat packets.
    #[must_use]
    pub fn chat_type(&self) -> Option<i32> {
        match self {
            Self::Squad => Some(SQUAD_CHAT),
            Self::GraceWindow { chat_type, .. } => *chat_type,
            Self::Source | Self::SinglePacket => None,
        }
    }

    /// The rule deciding when a response is complete.
    #[must_use]
    pub fn completion_rule(&self) -> Box<dyn CompletionRule> {
        match self {
            Self::Source => Box::new(ProbeSentinel::new(Trailer::Packet)),
            Self::Squad => Box::new(ProbeSentinel::squad()),
            Self::SinglePacket => Box::new(SingleFragment),
            Self::GraceWindow { window_ms, .. } => {
                Box::new(GraceWindow::new(Duration::from_millis(*window_ms)))
            }
        }
    }
}

/// Everything needed to open a connection, except for the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    /// Hostname or address of the server.
    pub host: String,
    /// RCON port.
    pub port: u16,
    /// How long to wait for each response, in milliseconds.
    pub timeout_ms: u64,
    /// Largest size field accepted from the server.
    pub max_packet_size: usize,
    /// See [`Dialect`].
    pub dialect: Dialect,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            dialect: Dialect::default(),
        }
    }
}

impl RconConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `Err` if `json` is not a valid configuration.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// The response timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
