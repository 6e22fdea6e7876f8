//! The event vocabulary handed to continuations by the event loop.
//!
//! Mirrors the small, fixed set of signals an ATS-style event-driven core
//! hands to a continuation's handler: readiness, completion, end-of-stream,
//! timeouts and errors, plus the two synthetic events (`Immediate`, `Call`)
//! used to schedule work without an underlying I/O readiness notification.

use std::fmt;

use crate::connect_pool::SharedSession;

/// Opaque handle identifying a continuation inside a thread-local
/// [`crate::continuation::ContinuationTable`]. VIOs hold this instead of a
/// raw pointer or an `Rc`, per the ownership model: a VIO's reference to its
/// continuation is resolved by table lookup at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContId(pub(crate) u64);

impl fmt::Display for ContId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cont#{}", self.0)
    }
}

/// Events delivered to a [`crate::continuation::ContinuationHandler`].
/// Most variants are plain signals; `NetConnectOpen` additionally carries
/// the shared session a waiter on the connecting-entry pool was fanned out
/// (Component G), so the handler can actually use the connection that was
/// coalesced for it rather than just learning that one exists.
#[derive(Clone)]
pub enum Event {
    /// Readable bytes are available on a read VIO.
    ReadReady,
    /// A read has filled its requested `nbytes` (or hit EOS while doing so).
    ReadComplete,
    /// The write side has room for more bytes.
    WriteReady,
    /// A write has flushed its requested `nbytes`.
    WriteComplete,
    /// The peer closed its write side; no more bytes will ever arrive.
    Eos,
    /// An unrecoverable error occurred on the VConn.
    Error,
    /// The active-duration timeout fired.
    ActiveTimeout,
    /// No bytes moved in either direction within the inactivity window.
    InactivityTimeout,
    /// Fired once, synchronously, the turn after it was scheduled with
    /// `EventLoop::schedule_now`.
    Immediate,
    /// A synchronous cross-continuation call, bypassing the timer wheel.
    Call,
    /// A new inbound connection has been accepted (intercept acceptor only).
    NetAccept,
    /// Accepting a new inbound connection failed.
    NetAcceptFailed,
    /// An outbound connect finished successfully (connecting-entry pool),
    /// carrying the session the waiter was fanned out.
    NetConnectOpen(SharedSession),
    /// An outbound connect failed.
    NetConnectOpenFailed,
    /// A waiter on the connecting pool should go connect again itself,
    /// without ever seeing `NetConnectOpen` (it didn't get the shared session).
    ConnectEventDirect,
}

impl Event {
    /// True for the events that signal the VConn is no longer usable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::Eos
                | Event::Error
                | Event::ActiveTimeout
                | Event::InactivityTimeout
                | Event::NetAcceptFailed
                | Event::NetConnectOpenFailed
        )
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ReadReady => write!(f, "ReadReady"),
            Event::ReadComplete => write!(f, "ReadComplete"),
            Event::WriteReady => write!(f, "WriteReady"),
            Event::WriteComplete => write!(f, "WriteComplete"),
            Event::Eos => write!(f, "Eos"),
            Event::Error => write!(f, "Error"),
            Event::ActiveTimeout => write!(f, "ActiveTimeout"),
            Event::InactivityTimeout => write!(f, "InactivityTimeout"),
            Event::Immediate => write!(f, "Immediate"),
            Event::Call => write!(f, "Call"),
            Event::NetAccept => write!(f, "NetAccept"),
            Event::NetAcceptFailed => write!(f, "NetAcceptFailed"),
            Event::NetConnectOpen(_) => write!(f, "NetConnectOpen(..)"),
            Event::NetConnectOpenFailed => write!(f, "NetConnectOpenFailed"),
            Event::ConnectEventDirect => write!(f, "ConnectEventDirect"),
        }
    }
}
