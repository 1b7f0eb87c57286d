//! # wsengine - Server-side WebSocket Protocol Engine
//!
//! `wsengine` implements the server half of the WebSocket wire protocol
//! (RFC 6455) as a sans-IO engine: it upgrades an HTTP connection, frames
//! and unframes messages over a byte stream delivered in arbitrary-sized
//! chunks, reassembles fragmented messages, and drives the closing
//! handshake. The transport (sockets, event loop, TLS) and the application
//! logic live outside and talk to the engine through byte buffers and a
//! callback trait.
//!
//! ## Features
//!
//! - **Incremental parsing** - attacker-controlled bytes are consumed
//!   chunk by chunk without ever blocking on incomplete input
//! - **Strict server-role validation** - masking, length encoding and
//!   control-frame rules enforced exactly
//! - **Deterministic failure policy** - the first protocol violation
//!   answers with a close frame and stops the stream
//! - **Bounded resources** - configurable limits on handshake, frame and
//!   message sizes
//!
//! ## Quick Start
//!
//! ```rust
//! use wsengine::{Connection, Handler};
//!
//! struct App;
//! impl Handler for App {
//!     fn on_message(&mut self, payload: &[u8], binary: bool) {
//!         println!("got {} bytes (binary: {binary})", payload.len());
//!     }
//! }
//!
//! let mut conn = Connection::new(App);
//! // transport delivers chunks:
//! //   conn.receive_data(&chunk)?;
//! // and writes whatever the engine queued:
//! //   socket.write_all(&conn.take_output())?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;

pub use config::{Config, Limits};
pub use connection::{
    ConnectRequest, Connection, ConnectionInfo, ConnectionState, Handler, NoopHandler, Rejection,
};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseStatus, Message};
pub use protocol::{Frame, FrameDecoder, OpCode, WS_GUID, compute_accept_key};
