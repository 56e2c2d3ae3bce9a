//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Client side:
//!     listener.rs (accept loop, connection limits)
//!     → connection.rs (session ids, drain tracking)
//!     → prebuffered.rs (read-ahead for HTTP head parsing and hijack)
//!     → Hand off to HTTP layer
//!
//! Upstream side:
//!     TcpStream → cork.rs (optional write coalescing) → transform
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each session tracked for graceful shutdown
//! - Corking is a transparent decorator, never required

pub mod connection;
pub mod cork;
pub mod listener;
pub mod prebuffered;

pub use connection::{SessionGuard, SessionId, SessionTracker};
pub use cork::{CorkPolicy, Corked};
pub use listener::{Listener, ListenerError};
pub use prebuffered::Prebuffered;
