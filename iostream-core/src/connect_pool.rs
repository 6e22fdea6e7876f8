//! Component G: connecting-entry pool.
//!
//! Coalesces concurrent connect attempts to the same `(addr)` destination
//! behind a single in-flight [`ConnectingEntry`], fanning the outcome out to
//! every waiter once the connect (and, for TLS-bearing transports, the
//! handshake) completes. Grounded line-for-line on
//! `ConnectingEntry.h`/`ConnectingEntry.cc`: `state_http_server_open`'s
//! `NET_EVENT_OPEN → {READ_COMPLETE,WRITE_READY,WRITE_COMPLETE} → fan-out`
//! happy path, and the identical fan-out-of-failure on
//! `{INACTIVITY_TIMEOUT,ACTIVE_TIMEOUT,ERROR,NET_EVENT_OPEN_FAILED}`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;

use crate::continuation::ContinuationHandler;
use crate::error::CoreError;
use crate::event::{ContId, Event};
use crate::vio::VConn;

/// A connect outcome's session, shared by `Rc<RefCell<_>>` across every
/// waiter it's fanned out to, so a multiplexing session really is the *same*
/// connection object on each waiter's side rather than a copy of the signal
/// that one existed.
pub type SharedSession = Rc<RefCell<PoolableSession>>;

/// `PoolableSession::PooledState`, renamed from the original's
/// `INIT/SSN_IN_USE/KA_RESERVED/KA_POOLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PooledState {
    Init,
    InUse,
    Reserved,
    Pooled,
}

/// A session that can be handed out to a waiter and later returned to the
/// pool for reuse, carrying the fields `PoolableSession.h` tracks beyond the
/// raw VConn: whether it may be shared across transactions at all
/// (`is_private`), and whether it is HTTP/2-style multiplexing-capable
/// (decided once the handshake/ALPN result is known — see `DESIGN.md`'s
/// Open Question 3 on the timing of that decision).
pub struct PoolableSession {
    pub state: PooledState,
    pub is_private: bool,
    pub is_multiplexing: bool,
    vc: Box<dyn VConn>,
}

impl PoolableSession {
    #[must_use]
    pub fn new(vc: Box<dyn VConn>, is_multiplexing: bool) -> Self {
        Self {
            state: PooledState::Init,
            is_private: false,
            is_multiplexing,
            vc,
        }
    }

    #[must_use]
    pub fn vconn(&self) -> &dyn VConn {
        self.vc.as_ref()
    }

    pub fn set_active(&mut self) {
        self.state = PooledState::InUse;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == PooledState::InUse
    }
}

/// One outstanding connect attempt, with every continuation currently
/// waiting on it. Keyed in the pool by `(ip, port)`, matching the
/// `ConnectingIpPool` multimap (SNI/cert-name keying is a TLS concern, out
/// of scope per the non-goals — plain `(IpAddr, u16)` here).
pub struct ConnectingEntry {
    addr: SocketAddr,
    waiters: Vec<ContId>,
    multiplexing_known: Option<bool>,
}

impl ConnectingEntry {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            waiters: Vec::new(),
            multiplexing_known: None,
        }
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn waiters(&self) -> &[ContId] {
        &self.waiters
    }
}

/// Per-event-loop pool, one `HashMap` keyed by destination address, mirroring
/// `ConnectingPool::m_ip_pool`.
#[derive(Default)]
pub struct ConnectingPool {
    entries: HashMap<SocketAddr, ConnectingEntry>,
}

impl ConnectingPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `waiter` against an in-flight (or newly created) connect to
    /// `addr`. Returns `true` if this call created a brand-new entry (i.e.
    /// the caller should actually start the connect), `false` if it
    /// coalesced onto an existing one.
    pub fn join_or_create(&mut self, addr: SocketAddr, waiter: ContId) -> bool {
        match self.entries.get_mut(&addr) {
            Some(entry) => {
                entry.waiters.push(waiter);
                false
            }
            None => {
                let mut entry = ConnectingEntry::new(addr);
                entry.waiters.push(waiter);
                self.entries.insert(addr, entry);
                true
            }
        }
    }

    /// `remove_entry`: erase the entry for `addr` and return it so the
    /// caller can fan its outcome out.
    #[must_use]
    pub fn remove(&mut self, addr: SocketAddr) -> Option<ConnectingEntry> {
        self.entries.remove(&addr)
    }
}

/// Outcome of a connect attempt, fanned out to waiters by `fan_out`.
pub enum ConnectOutcome {
    Success(PoolableSession),
    Failure(Event),
}

/// `state_http_server_open`'s fan-out logic: if the session multiplexes,
/// every waiter gets `NetConnectOpen` carrying the *same* shared session
/// (they'll each open their own stream on it); otherwise the last ("prime")
/// waiter gets the session directly via a synchronous `loop_.call`, and
/// every other waiter gets `ConnectEventDirect` to signal "go connect again,
/// you don't get this one".
pub fn fan_out(
    loop_: &crate::continuation::EventLoop,
    entry: &ConnectingEntry,
    outcome: ConnectOutcome,
) -> Result<(), CoreError> {
    match outcome {
        ConnectOutcome::Success(session) => {
            let is_multiplexing = session.is_multiplexing;
            let shared: SharedSession = Rc::new(RefCell::new(session));
            if is_multiplexing {
                for &w in entry.waiters() {
                    loop_.call(w, Event::NetConnectOpen(shared.clone()))?;
                }
            } else if let Some((&prime, rest)) = entry.waiters().split_last() {
                loop_.call(prime, Event::NetConnectOpen(shared))?;
                for &w in rest {
                    loop_.call(w, Event::ConnectEventDirect)?;
                }
            }
        }
        ConnectOutcome::Failure(event) => {
            for &w in entry.waiters() {
                loop_.call(w, event.clone())?;
            }
        }
    }
    Ok(())
}

/// Drives one [`ConnectingEntry`]'s lifecycle as a continuation: owns the
/// connect attempt itself and, on completion, removes itself from the pool
/// and fans the outcome out.
pub struct ConnectingEntryHandler {
    addr: SocketAddr,
}

impl ConnectingEntryHandler {
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl ContinuationHandler for ConnectingEntryHandler {
    fn handle(&mut self, _event: Event) -> Result<(), CoreError> {
        // The real connect/teardown sequencing is driven externally by the
        // embedding reactor (which owns the actual `NetConnector` and
        // `ConnectingPool`); this handler exists so a `ConnectingEntry` has
        // a continuation identity to register waiters against.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::EventLoop;

    fn addr() -> SocketAddr {
        "127.0.0.1:80".parse().unwrap()
    }

    #[test]
    fn second_joiner_coalesces_onto_first() {
        let mut pool = ConnectingPool::new();
        let loop_ = EventLoop::new();
        let w1 = loop_.register(Box::new(ConnectingEntryHandler::new(addr())));
        let w2 = loop_.register(Box::new(ConnectingEntryHandler::new(addr())));
        assert!(pool.join_or_create(addr(), w1));
        assert!(!pool.join_or_create(addr(), w2));
        let entry = pool.remove(addr()).unwrap();
        assert_eq!(entry.waiters(), &[w1, w2]);
    }

    #[test]
    fn multiplexing_session_fans_out_to_all_waiters() {
        let loop_ = EventLoop::new();
        let mut pool = ConnectingPool::new();
        let w1 = loop_.register(Box::new(ConnectingEntryHandler::new(addr())));
        let w2 = loop_.register(Box::new(ConnectingEntryHandler::new(addr())));
        pool.join_or_create(addr(), w1);
        pool.join_or_create(addr(), w2);
        let entry = pool.remove(addr()).unwrap();

        struct Stub;
        impl VConn for Stub {
            fn kind(&self) -> &crate::vio::VConnKind {
                unimplemented!()
            }
            fn do_io_read(
                &mut self,
                nbytes: u64,
                buffer: crate::iobuffer::IoBuffer,
                cont: ContId,
            ) -> crate::vio::Vio {
                crate::vio::Vio::new(crate::vio::VioDirection::Read, nbytes, buffer, cont)
            }
            fn do_io_write(
                &mut self,
                nbytes: u64,
                buffer: crate::iobuffer::IoBuffer,
                cont: ContId,
            ) -> crate::vio::Vio {
                crate::vio::Vio::new(crate::vio::VioDirection::Write, nbytes, buffer, cont)
            }
            fn shutdown(&mut self, _r: bool, _w: bool) -> Result<(), CoreError> {
                Ok(())
            }
            fn close(&mut self) {}
            fn set_inactivity_timeout(&mut self, _d: Option<std::time::Duration>) {}
            fn set_active_timeout(&mut self, _d: Option<std::time::Duration>) {}
        }

        let session = PoolableSession::new(Box::new(Stub), true);
        let outcome = ConnectOutcome::Success(session);
        assert!(fan_out(&loop_, &entry, outcome).is_ok());
    }
}
