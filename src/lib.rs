//! Rust library for discovering and controlling HEOS networked audio players
//!
//! HEOS devices expose a line-oriented command interface on TCP port 1255:
//! commands are sent as `heos://<namespace>/<verb>?key=value&...` lines and
//! answered with JSON documents. This library provides an async API for:
//!
//! - Discovery of a device via SSDP multicast
//! - A persistent command connection with reply correlation
//! - Volume, mute and play state control
//! - Queue, group and music source queries
//! - Streaming local content to a player
//!
//! # Quick Start
//!
//! ```no_run
//! use heos::{ClientConfig, DiscoveryConfig, HeosClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Find the first device and connect to it
//!     let mut client = HeosClient::discover(&DiscoveryConfig::default(), ClientConfig::default()).await?;
//!
//!     // Select the first player as the implicit target
//!     let players = client.get_players().await?;
//!     println!("Found {} player(s)", players.len());
//!
//!     client.set_volume(25, None).await?;
//!     client.play(None).await?;
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Raw Commands
//!
//! Commands outside the typed vocabulary can be sent directly:
//!
//! ```no_run
//! use heos::{Command, HeosClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = HeosClient::connect("192.168.1.27", 1255).await?;
//!     let reply = client.send_command(&Command::new("system/heart_beat")).await?;
//!     println!("{:?}", reply);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Discovery**: SSDP `M-SEARCH` to `239.255.255.250:1900`
//! - **Connection**: Raw byte stream to the device
//! - **Protocol**: Command encoding, JSON decoding and message reassembly
//! - **Correlator**: Waits for the reply matching the command just sent
//! - **Client**: Typed operations and cached session state
//! - **Content**: HTTP server handing local media to a player

mod client;
mod config;
mod connection;
mod content;
mod correlator;
mod discovery;
mod error;
mod protocol;
mod state;
mod types;

// Public exports
pub use client::HeosClient;
pub use config::{ClientConfig, DiscoveryConfig, DEFAULT_PORT, HEOS_SEARCH_TARGET};
pub use connection::Connection;
pub use content::ContentServer;
pub use correlator::Correlator;
pub use discovery::{build_search_request, discover, SSDP_MULTICAST_ADDR, SSDP_PORT};
pub use error::{HeosError, Result};
pub use protocol::{
    decode, parse_message, Command, CommandResult, Decoded, Header, MessageBuffer, MessageMap,
    ParamValue, Reply, WireMessage,
};
pub use state::{clamp_volume, PlayState, SessionState};
pub use types::{
    DeviceAddress, Group, GroupId, GroupMember, MusicSource, NowPlayingMedia, Player, PlayerId,
    QueueItem, SourceId,
};
