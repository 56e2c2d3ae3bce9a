//! HTTP/1.x front-end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept, one task per connection)
//!     → request.rs (parse head, validate target, buffer body)
//!     → bridge::Bridge::handle
//!     → response.rs (status line + headers, body, or hijack for CONNECT)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{read_request, ClientRequest, RequestError, RequestHead};
pub use response::{Hijacked, ResponseWriter};
pub use server::HttpServer;
