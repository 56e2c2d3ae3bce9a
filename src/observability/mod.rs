//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems emit tracing events:
//!     → logging.rs (EnvFilter + pretty/JSON formatter)
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (peer, target, session id)
//! - `RUST_LOG` overrides the configured level

pub mod logging;

pub use logging::{default_filter, init_logging};
