//! Pluggable outbound connect layer, so tests never touch a real socket.
//!
//! Grounded on the original core's `net_connect`/`net_vc_from_fd`/
//! `http_connect` external interfaces (§6): one seam a real embedding
//! provides with a reactor-backed implementation, and an in-memory
//! substitute (`iostream-testkit::MockOrigin`) drives the same trait in tests.

use std::net::SocketAddr;

use crate::error::CoreError;
use crate::vio::VConn;

/// Establishes outbound connections on behalf of the connecting-entry pool
/// and background fetch.
pub trait NetConnector {
    /// Start a non-blocking connect to `addr`. Implementations return
    /// immediately; completion is signalled through whatever VConn/event
    /// machinery the embedding reactor wires up, not by blocking here.
    fn connect(&self, addr: SocketAddr) -> Result<Box<dyn VConn>, CoreError>;
}
