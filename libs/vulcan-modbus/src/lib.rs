//! Controller link for the curing press
//!
//! - [`codec`]: register word conversions
//! - [`transport`]: Modbus TCP access behind a trait
//! - [`link`]: connection state machine and reconnect supervisor
//! - [`acquisition`]: periodic sampling into a [`ReadingSink`]

pub mod acquisition;
pub mod codec;
pub mod error;
pub mod link;
pub mod transport;

pub use acquisition::{AcquisitionLoop, Reading, ReadingSink, RegisterMap};
pub use codec::{IntFormat, WordOrder};
pub use error::{CodecError, LinkError};
pub use link::{run_supervisor, LinkSession, LinkState, LinkStats};
pub use transport::{ModbusTransport, TcpEndpoint, TcpTransport};
