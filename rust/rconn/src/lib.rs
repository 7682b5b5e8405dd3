//! rconn: connection subsystem for an R-style language runtime.
//!
//! Connections are handle-addressed byte streams over files, compressed
//! files, pipes, fifos, sockets, URLs, in-memory text and raw buffers, and
//! host-supplied channels. Text, character and binary readers share one
//! read path per connection, with a push-back stack for lines returned to
//! the stream. All session state lives in an explicit [`ConnectionRegistry`].
#![warn(clippy::all)]

pub mod backend;
pub mod builtins;
pub mod codec;
pub mod config;
pub mod connection;
pub mod encoding;
pub mod error;
pub mod mode;
pub mod pushback;
pub mod registry;
pub mod warnings;

pub use backend::{ConnectionClass, ExternalChannel, StreamChannel};
pub use codec::{BinType, BinVector, ByteOrder, ByteOrderCodec, Complex};
pub use config::{ConfigError, ConnectionsConfig};
pub use connection::{ConnState, Connection, ConnectionSummary, OpenGuard};
pub use encoding::Encoding;
pub use error::{ConnError, ConnResult};
pub use mode::{OpenMode, SeekOrigin, SeekRw};
pub use pushback::PushBackBuffer;
pub use registry::{ConnectionRegistry, Handle};
pub use warnings::WarningLog;
