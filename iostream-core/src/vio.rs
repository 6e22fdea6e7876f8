//! Component B: virtual connections and virtual I/O operations.
//!
//! A [`VConn`] wraps one of three origins (a real socket, an adopted file
//! descriptor, or an in-process intercept pipe) behind a single trait so the
//! rest of the core never special-cases the transport. Each VConn owns
//! exactly two [`Vio`]s (one read, one write) per the ownership model: a VIO
//! never outlives its VConn, and a VIO only weakly references the
//! continuation that drives it (by [`crate::event::ContId`], resolved
//! through the thread-local continuation table at dispatch time, not by a
//! strong pointer).

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{CoreError, TransportError};
use crate::event::ContId;
use crate::iobuffer::{IoBuffer, Reader};

/// Direction of a [`Vio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VioDirection {
    Read,
    Write,
}

/// A single pending I/O operation against a [`VConn`].
///
/// Mirrors the original VIO contract: a target byte count (`nbytes`), a
/// running `ndone`, the buffer it drains into or fills from, and a weak
/// reference to the continuation to re-notify. `reenable()` is how a
/// continuation hands control back to the VConn after consuming/producing
/// bytes, without blocking.
pub struct Vio {
    direction: VioDirection,
    pub nbytes: u64,
    pub ndone: u64,
    pub buffer: IoBuffer,
    pub reader: Option<Reader>,
    cont: ContId,
}

impl Vio {
    pub fn new(direction: VioDirection, nbytes: u64, buffer: IoBuffer, cont: ContId) -> Self {
        // A write VIO drains bytes the caller already placed in `buffer`
        // before starting the write, so its reader must see the whole
        // buffer rather than only writes from this point forward.
        let reader = matches!(direction, VioDirection::Write).then(|| buffer.alloc_reader_from_start());
        Self {
            direction,
            nbytes,
            ndone: 0,
            buffer,
            reader,
            cont,
        }
    }

    #[must_use]
    pub fn direction(&self) -> VioDirection {
        self.direction
    }

    #[must_use]
    pub fn continuation(&self) -> ContId {
        self.cont
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.nbytes.saturating_sub(self.ndone)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.ndone >= self.nbytes
    }
}

/// The three VConn origins named in the data model. `Intercept` connects
/// two in-process `VConn`s back to back (see [`crate::intercept`]).
#[derive(Debug, Clone, Copy)]
pub enum VConnKind {
    Tcp { peer: SocketAddr },
    AdoptedFd { fd: std::os::fd::RawFd },
    Intercept,
}

/// A virtual connection: something a continuation can read from, write to,
/// shut down, and set timeouts on, regardless of what's underneath.
pub trait VConn {
    fn kind(&self) -> &VConnKind;

    /// Start (or continue) a read of up to `nbytes` into `buffer`. Returns
    /// immediately; completion/readiness is signalled later via the event
    /// loop, never by blocking this call.
    fn do_io_read(&mut self, nbytes: u64, buffer: IoBuffer, cont: ContId) -> Vio;

    /// Start (or continue) a write of up to `nbytes` drained from `buffer`.
    fn do_io_write(&mut self, nbytes: u64, buffer: IoBuffer, cont: ContId) -> Vio;

    /// Half-close: `read` and/or `write` select which direction(s) to shut.
    fn shutdown(&mut self, read: bool, write: bool) -> Result<(), CoreError>;

    /// Fully close and release the underlying transport resource.
    fn close(&mut self);

    fn set_inactivity_timeout(&mut self, d: Option<Duration>);
    fn set_active_timeout(&mut self, d: Option<Duration>);
}

/// A `VConn` backed by a real TCP socket (non-blocking, driven by whatever
/// reactor the embedding binary runs — the core itself stays reactor-agnostic
/// and only models the VIO/event contract).
pub struct TcpVConn {
    kind: VConnKind,
    stream: Option<std::net::TcpStream>,
    inactivity_timeout: Option<Duration>,
    active_timeout: Option<Duration>,
}

impl TcpVConn {
    #[must_use]
    pub fn new(stream: std::net::TcpStream, peer: SocketAddr) -> Self {
        let _ = stream.set_nonblocking(true);
        Self {
            kind: VConnKind::Tcp { peer },
            stream: Some(stream),
            inactivity_timeout: None,
            active_timeout: None,
        }
    }

    pub fn connect(addr: SocketAddr) -> Result<Self, CoreError> {
        let stream = std::net::TcpStream::connect(addr).map_err(|e| TransportError::ConnectFailed {
            addr,
            source: e,
        })?;
        Ok(Self::new(stream, addr))
    }
}

impl VConn for TcpVConn {
    fn kind(&self) -> &VConnKind {
        &self.kind
    }

    fn do_io_read(&mut self, nbytes: u64, buffer: IoBuffer, cont: ContId) -> Vio {
        Vio::new(VioDirection::Read, nbytes, buffer, cont)
    }

    fn do_io_write(&mut self, nbytes: u64, buffer: IoBuffer, cont: ContId) -> Vio {
        Vio::new(VioDirection::Write, nbytes, buffer, cont)
    }

    fn shutdown(&mut self, read: bool, write: bool) -> Result<(), CoreError> {
        if let Some(stream) = &self.stream {
            let how = match (read, write) {
                (true, true) => std::net::Shutdown::Both,
                (true, false) => std::net::Shutdown::Read,
                (false, true) => std::net::Shutdown::Write,
                (false, false) => return Ok(()),
            };
            stream
                .shutdown(how)
                .map_err(TransportError::WriteFailed)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None;
    }

    fn set_inactivity_timeout(&mut self, d: Option<Duration>) {
        self.inactivity_timeout = d;
    }

    fn set_active_timeout(&mut self, d: Option<Duration>) {
        self.active_timeout = d;
    }
}
