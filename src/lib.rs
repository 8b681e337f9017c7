//! # lorans
//!
//! The core of a LoRaWAN network server: it sits between a fleet of
//! LoRa gateways and an application/join backend, terminates the
//! LoRaWAN MAC layer and drives the timing-critical downlink response
//! to every uplink.
//!
//! Three tightly coupled subsystems make up the core:
//!
//! - **Deduplication**: gateways in range all forward the same
//!   transmission; a time-windowed collector merges the copies into one
//!   logical reception with the full RX-metadata set
//!   ([`uplink::collect_and_call_once`]).
//! - **MAC state machine**: MAC commands received from a device are
//!   reconciled against the pending requests stored on its session;
//!   device-initiated requests (link checks, time requests) get their
//!   answers built server-side ([`maccommand::handle`]).
//! - **Downlink scheduling**: the RX1 and RX2 candidate frames are
//!   computed up-front; when a gateway rejects RX1 (too late, busy
//!   slot, ...) the prepared RX2 frame is emitted without any
//!   recomputation ([`downlink`]).
//!
//! The gateway transport, application server and join server are
//! pluggable collaborators behind the traits in [`backend`]; sessions
//! and short-lived scheduling artifacts live behind the
//! [`storage::Store`] trait.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lorans::{Config, MemoryStore, NetworkServer};
//! use lorans::region::Eu868;
//! # async fn run(gateway: Arc<dyn lorans::backend::GatewayBackend>,
//! #              application: Arc<dyn lorans::backend::ApplicationBackend>,
//! #              join: Arc<dyn lorans::backend::JoinBackend>) -> lorans::Result<()> {
//!
//! let server = NetworkServer::new(
//!     Config::default(),
//!     Arc::new(MemoryStore::new()),
//!     gateway,
//!     application,
//!     join,
//!     Arc::new(Eu868),
//! )?;
//! server.start()?;
//! // ... until shutdown:
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod downlink;
pub mod error;
pub mod lorawan;
pub mod maccommand;
pub mod region;
pub mod storage;
pub mod uplink;

// Re-export the types most integrations touch.
pub use config::{Config, RxWindow};
pub use error::{Error, Result, RpcCode};
pub use lorawan::{Aes128Key, Cid, DevAddr, DevEui, DeviceClass, MacCommand};
pub use storage::{DeviceSession, MacCommandBlock, MemoryStore, Store};
pub use uplink::{Context, NetworkServer, RxPacket};
