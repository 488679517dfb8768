//! Client for the [Source RCON](https://developer.valvesoftware.com/wiki/Source_RCON_Protocol)
//! protocol, with support for the Squad server's variant: responses split over
//! several packets, and chat messages pushed onto the same connection.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]

pub mod config;
pub mod errors;
pub mod rcon;
pub mod socket;

pub use config::{Dialect, RconConfig};
pub use errors::{FrameError, RconError};
pub use rcon::{ConnectionState, RconClient};
