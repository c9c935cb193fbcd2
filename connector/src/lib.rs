//! Detects a running League client, reads its lockfile credentials and talks
//! to its local API over a WebSocket event channel and one-shot HTTPS requests.

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod locator;
pub mod lockfile;
pub mod paths;
pub mod presence;
pub mod request;
pub mod socket;
pub mod status;
mod tls;

pub use client::{ClientOptions, DetectionState, LeagueClient};
pub use error::{Error, Result};
pub use lockfile::{Credentials, ProcessKind};
pub use request::{request, RequestOptions};
pub use socket::{connect, JsonApiEvent, LeagueSocket};
