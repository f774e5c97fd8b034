//! Rust library for polling and grouping LinkPlay/WiiM networked speakers
//!
//! This library provides an async API over the speakers' local HTTP control
//! interface. It supports:
//!
//! - HTTPS with a pinned vendor root and automatic, per-device downgrade to
//!   unverified TLS, across several candidate ports
//! - Normalizing every firmware dialect of the status responses into one
//!   [`StatusSnapshot`]
//! - Playback, volume, source, preset and maintenance commands
//! - Multiroom grouping: create, join, leave, kick and per-member mute/volume
//! - A poll coordinator with exponential backoff, publishing [`DeviceState`]
//! - A group registry and an aggregated [`GroupPlayer`] over all members
//!
//! # Quick Start
//!
//! ```no_run
//! use linkplay_multiroom::{ClientConfig, Coordinator, GroupRegistry, PollConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = Coordinator::connect(
//!         "192.168.1.100",
//!         &ClientConfig::default(),
//!         PollConfig::default(),
//!         GroupRegistry::new(),
//!     )?;
//!
//!     let state = coordinator.refresh().await?;
//!     println!("{:?} at volume {:?}", state.snapshot.playback, state.snapshot.volume_level());
//!
//!     coordinator.set_volume(0.25).await?;
//!     coordinator.create_group().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Direct Commands
//!
//! If you only need to send commands, use the client without a coordinator:
//!
//! ```no_run
//! use linkplay_multiroom::{ClientConfig, LinkplayClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LinkplayClient::new("192.168.1.100", &ClientConfig::default())?;
//!     client.pause().await?;
//!     client.join_group("192.168.1.101").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Endpoint / Transport**: fallback matrix over ports and TLS trust modes
//! - **Protocol**: the `command=<verb>[:<args>]` vocabulary
//! - **Normalize**: raw key table plus derived fields
//! - **Client / Group**: device commands and the cached group view
//! - **Coordinator**: poll cycles, backoff and state publication
//! - **Registry / GroupPlayer**: cross-device lookups and group control

mod client;
mod config;
mod coordinator;
mod endpoint;
mod error;
mod group;
mod group_player;
mod normalize;
mod poll;
mod protocol;
mod registry;
mod tls;
mod transport;
mod types;

// Public exports
pub use client::LinkplayClient;
pub use config::{
    ClientConfig, PollConfig, Scheme, DEFAULT_POLL_INTERVAL, DEFAULT_PORTS, DEFAULT_TIMEOUT,
    DEFAULT_VOLUME_STEP, DEGRADED_AFTER, MAX_POLL_INTERVAL,
};
pub use coordinator::{Coordinator, DeviceState};
pub use endpoint::{Attempt, Endpoint};
pub use error::{LinkplayError, Result};
pub use group::{parse_multiroom, GroupCache};
pub use group_player::{GroupPlayer, DEFAULT_GROUP_PREFIX};
pub use normalize::{decode_hex_text, normalize, normalize_payload, parse_meta_info, parse_sources};
pub use poll::{PollHealth, PollState};
pub use protocol::{Command, CONTROL_PATH};
pub use registry::{DeviceRegistry, GroupRegistry, GroupState, MemberState};
pub use tls::PINNED_ROOT_PEM;
pub use transport::{AttemptError, HttpSender, RawPayload, ReqwestSender};
pub use types::{
    Address, MultiroomInfo, PlayMode, PlaybackState, Repeat, Role, SlaveEntry, StatusSnapshot,
    TrackMetadata,
};
