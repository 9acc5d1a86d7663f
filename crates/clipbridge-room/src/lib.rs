//! Room registry and broadcast relay for Clipbridge.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! membership and fans payloads out to members' bounded outbound queues.
//!
//! # Key types
//!
//! - [`RelayService`]: create/join/send/leave, the transport-facing API
//! - [`RoomRegistry`]: code → room map, creation, lookup, eviction
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`CodeGenerator`]: unique, unambiguous room codes
//! - [`RelayConfig`]: TTL, sweep interval, queue bounds, limits
//!
//! All state lives in process memory and is gone after a restart.

mod codegen;
mod config;
mod error;
mod registry;
mod relay;
mod room;
mod sweeper;

pub use codegen::CodeGenerator;
pub use config::RelayConfig;
pub use error::RoomError;
pub use registry::{RoomRegistry, SweepReport};
pub use relay::RelayService;
pub use room::{Delivery, MemberSender, RoomHandle, RoomInfo};
pub use sweeper::{SweeperHandle, spawn_sweeper};
