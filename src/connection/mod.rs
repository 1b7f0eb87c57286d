//! Per-connection state machine and application callback seam.
//!
//! ## Connection lifecycle
//!
//! 1. **Connecting** - handshake in progress, HTTP bytes only
//! 2. **Open** - upgrade response queued, frames flow both ways
//! 3. **Closing** - close frame sent, waiting for the peer's close
//! 4. **Closed** - connection finished
//!
//! ## Example
//!
//! ```rust,ignore
//! use wsengine::{Connection, Handler};
//!
//! struct Echo;
//! impl Handler for Echo {}
//!
//! let mut conn = Connection::new(Echo);
//! conn.receive_data(&chunk_from_transport)?;
//! transport.write(&conn.take_output());
//! ```

pub mod handler;
mod state;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::{Connection, ConnectionInfo};
pub use handler::{ConnectRequest, Handler, NoopHandler, Rejection};
pub use state::ConnectionState;
