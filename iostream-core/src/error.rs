//! Error taxonomy for the streaming I/O core.
//!
//! The five kinds mirror how the original event-driven proxy core propagates
//! failures: transport errors surface through the event loop as an `ERROR`
//! event, resource exhaustion is checked synchronously at allocation time,
//! protocol violations are local to the component that detects them, and
//! configuration errors are rejected before a component is ever scheduled.

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

/// Top-level error type returned by fallible operations across the core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    BackgroundFetch(#[from] BgFetchError),
}

/// Failures from the network/VConn layer: connect, read, write, shutdown.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("peer closed the connection")]
    Eos,

    #[error("operation timed out")]
    Timeout,
}

/// Local resource exhaustion: buffer allocation, pool capacity, FD limits.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("connecting pool exhausted for {addr}")]
    PoolExhausted { addr: SocketAddr },

    #[error("no free continuation slots")]
    ContinuationTableFull,
}

/// Malformed or unexpected data on an otherwise healthy transport.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("helper transform returned bad status frame")]
    BadTransformStatus,

    #[error("expected 4-byte length prefix, got {0} bytes")]
    ShortLengthPrefix(usize),

    #[error("invalid range header value: {0}")]
    InvalidRangeHeader(String),

    #[error("invalid HTTP date: {0}")]
    InvalidDate(String),
}

/// Errors detected before a component starts running: bad tunables, missing
/// wiring, mutually exclusive options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid buffer size class: {0}")]
    InvalidSizeClass(usize),

    #[error("missing required connector for {0}")]
    MissingConnector(&'static str),
}

/// Background-fetch-specific failures, layered on top of `TransportError`.
#[derive(Debug, Error)]
pub enum BgFetchError {
    #[error("a background fetch for {0:?} is already in flight")]
    AlreadyInFlight(String),

    #[error("background fetch connect failed: {0}")]
    ConnectFailed(#[source] TransportError),
}

/// Lightweight alternative to a full backtrace: where in the pipeline an
/// error originated, useful once it has been logged and degraded (e.g. a
/// transform falling back to BYPASS still wants to record why).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    IoBuffer,
    VConn,
    Continuation,
    Intercept,
    Transform,
    CacheKey,
    BgFetch,
    ConnectingPool,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IoBuffer => "io_buffer",
            Self::VConn => "vconn",
            Self::Continuation => "continuation",
            Self::Intercept => "intercept",
            Self::Transform => "transform",
            Self::CacheKey => "cache_key",
            Self::BgFetch => "bg_fetch",
            Self::ConnectingPool => "connecting_pool",
        };
        f.write_str(s)
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
