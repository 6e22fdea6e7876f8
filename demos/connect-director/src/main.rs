//! Demo: three continuations all want a connection to the same origin at
//! once. The connecting-entry pool (Component G) coalesces them into a
//! single connect attempt and fans the resulting session out, analogous to
//! `vmod_director`'s pool of backends except the pooling happens at the
//! connect level rather than at request-routing time.

use std::time::Duration;

use iostream_core::connect_pool::{
    fan_out, ConnectOutcome, ConnectingEntryHandler, ConnectingPool, PoolableSession,
};
use iostream_core::continuation::{ContinuationHandler, EventLoop};
use iostream_core::error::CoreError;
use iostream_core::event::Event;
use iostream_core::vio::{VConn, VConnKind};

struct Waiter {
    name: &'static str,
}
impl ContinuationHandler for Waiter {
    fn handle(&mut self, event: Event) -> Result<(), CoreError> {
        match event {
            Event::NetConnectOpen(session) => {
                let session = session.borrow();
                log::info!(
                    "{} got the coalesced session, origin kind {:?}",
                    self.name,
                    session.vconn().kind()
                );
            }
            other => log::info!("{} received {:?}", self.name, other),
        }
        Ok(())
    }
}

struct DummyOrigin {
    kind: VConnKind,
}
impl VConn for DummyOrigin {
    fn kind(&self) -> &VConnKind {
        &self.kind
    }
    fn do_io_read(
        &mut self,
        nbytes: u64,
        buffer: iostream_core::iobuffer::IoBuffer,
        cont: iostream_core::ContId,
    ) -> iostream_core::vio::Vio {
        iostream_core::vio::Vio::new(iostream_core::vio::VioDirection::Read, nbytes, buffer, cont)
    }
    fn do_io_write(
        &mut self,
        nbytes: u64,
        buffer: iostream_core::iobuffer::IoBuffer,
        cont: iostream_core::ContId,
    ) -> iostream_core::vio::Vio {
        iostream_core::vio::Vio::new(iostream_core::vio::VioDirection::Write, nbytes, buffer, cont)
    }
    fn shutdown(&mut self, _r: bool, _w: bool) -> Result<(), iostream_core::CoreError> {
        Ok(())
    }
    fn close(&mut self) {}
    fn set_inactivity_timeout(&mut self, _d: Option<Duration>) {}
    fn set_active_timeout(&mut self, _d: Option<Duration>) {}
}

fn main() {
    env_logger::init();

    let loop_ = EventLoop::new();
    let mut pool = ConnectingPool::new();
    let addr = "93.184.216.34:80".parse().unwrap();

    let w1 = loop_.register(Box::new(Waiter { name: "txn-a" }));
    let w2 = loop_.register(Box::new(Waiter { name: "txn-b" }));
    let w3 = loop_.register(Box::new(Waiter { name: "txn-c" }));

    assert!(pool.join_or_create(addr, w1));
    assert!(!pool.join_or_create(addr, w2));
    assert!(!pool.join_or_create(addr, w3));

    let _entry_cont = loop_.register(Box::new(ConnectingEntryHandler::new(addr)));

    let entry = pool.remove(addr).expect("entry was created above");
    let session = PoolableSession::new(Box::new(DummyOrigin { kind: VConnKind::Tcp { peer: addr } }), false);
    fan_out(&loop_, &entry, ConnectOutcome::Success(session)).expect("fan-out succeeds");

    println!("coalesced {} waiters into one connect", entry.waiters().len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_waiters_coalesce_into_one_entry() {
        let loop_ = EventLoop::new();
        let mut pool = ConnectingPool::new();
        let addr = "10.0.0.1:443".parse().unwrap();
        let w1 = loop_.register(Box::new(Waiter { name: "a" }));
        let w2 = loop_.register(Box::new(Waiter { name: "b" }));
        assert!(pool.join_or_create(addr, w1));
        assert!(!pool.join_or_create(addr, w2));
        let entry = pool.remove(addr).unwrap();
        assert_eq!(entry.waiters().len(), 2);
    }
}
