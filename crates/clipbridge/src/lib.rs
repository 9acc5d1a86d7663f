//! # Clipbridge
//!
//! Real-time clipboard relay between devices that share a short room code.
//!
//! One device creates a room and gets a code like `AB3XQ9`; every device
//! that joins with that code receives whatever the others copy. Nothing is
//! stored: rooms live in memory and disappear after a day of inactivity.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clipbridge::prelude::*;
//!
//! # async fn start() -> Result<(), ClipbridgeError> {
//! let server = ClipbridgeServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .relay_config(RelayConfig::default())
//!     .build()
//!     .await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::ClipbridgeError;
pub use server::{ClipbridgeServer, ClipbridgeServerBuilder};

/// Commonly used types.
pub mod prelude {
    pub use crate::{ClipbridgeError, ClipbridgeServer, ClipbridgeServerBuilder};
    pub use clipbridge_protocol::{ClientMessage, RoomCode, ServerMessage};
    pub use clipbridge_room::{RelayConfig, RelayService, RoomError, RoomInfo};
}
