//! Component F (part 2): background fill.
//!
//! Grounded on `background_fetch.{h,cc}`: a process-wide `BgFetchState`
//! guaranteeing at most one in-flight background fetch per URL, and a
//! per-fetch `BgFetchData` continuation that replays the client's request
//! to the origin, streams the response into nowhere but a running byte
//! counter (the original discards the body; only the *side effect* of
//! populating the cache matters), and releases its URL lock on teardown via
//! `Drop`, exactly mirroring the original's destructor.

use std::cell::RefCell;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::rc::Rc;

use crate::continuation::ContinuationHandler;
use crate::error::{BgFetchError, CoreError};
use crate::event::Event;
use crate::headers::Http11Headers;
use crate::iobuffer::{BufferSizeClass, IoBuffer, Reader};
use crate::vio::VConn;

/// Process-wide singleton (here: an explicit, cloneable handle rather than a
/// `static`, so tests get a fresh instance each time) tracking URLs with an
/// in-flight background fetch. Mirrors `BgFetchState::acquire`/`release`'s
/// `TSMutexLock`-guarded `unordered_map<string,bool>`.
#[derive(Clone, Default)]
pub struct BgFetchState {
    inner: Rc<RefCell<HashSet<String>>>,
}

impl BgFetchState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the lock was acquired (no fetch for `url` was
    /// already in flight).
    pub fn acquire(&self, url: &str) -> bool {
        self.inner.borrow_mut().insert(url.to_string())
    }

    pub fn release(&self, url: &str) {
        self.inner.borrow_mut().remove(url);
    }

    #[must_use]
    pub fn is_in_flight(&self, url: &str) -> bool {
        self.inner.borrow().contains(url)
    }
}

/// One background-fetch attempt's state, replaying `request` against
/// `client_ip`'s origin once scheduled.
pub struct BgFetchData {
    state: BgFetchState,
    url: String,
    pub client_ip: SocketAddr,
    pub request: Http11Headers,
    pub req_buf: IoBuffer,
    pub resp_buf: IoBuffer,
    /// Allocated once, in `initialize`, before anything is ever written to
    /// `resp_buf` — a reader allocated later would only see bytes written
    /// after its own creation, undercounting everything already buffered.
    resp_reader: Reader,
    vc: Option<Box<dyn VConn>>,
    bytes: u64,
    acquired: bool,
}

impl BgFetchData {
    /// `BgFetchData::initialize`: captures the client address and request,
    /// and attempts to acquire the URL lock. Returns `Err` if a fetch for
    /// this URL is already running.
    pub fn initialize(
        state: BgFetchState,
        url: String,
        client_ip: SocketAddr,
        request: Http11Headers,
    ) -> Result<Self, CoreError> {
        if !state.acquire(&url) {
            return Err(BgFetchError::AlreadyInFlight(url).into());
        }
        let resp_buf = IoBuffer::new(BufferSizeClass::default());
        let resp_reader = resp_buf.alloc_reader();
        Ok(Self {
            state,
            url,
            client_ip,
            request,
            req_buf: IoBuffer::new(BufferSizeClass::default()),
            resp_buf,
            resp_reader,
            vc: None,
            bytes: 0,
            acquired: true,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn bytes_fetched(&self) -> u64 {
        self.bytes
    }

    fn add_bytes(&mut self, n: u64) {
        self.bytes += n;
    }

    /// `BgFetchData::schedule`: serialize the request into `req_buf` ready
    /// to be written once connected.
    pub fn schedule(&mut self) {
        self.req_buf.write(self.request.to_string().as_bytes());
    }

    /// `cont_bg_fetch`'s `IMMEDIATE`/`TIMEOUT` arm: attach the connected
    /// VConn and kick off the write/read pair.
    pub fn on_connected(&mut self, vc: Box<dyn VConn>) {
        self.vc = Some(vc);
    }

    /// `cont_bg_fetch`'s `VCONN_READ_READY` arm: drain whatever arrived,
    /// counting bytes but discarding content (the cache-store side effect
    /// is external to this core, matching the original's "response body is
    /// never inspected here" design).
    pub fn on_read_ready(&mut self) {
        let avail = self.resp_reader.avail_total();
        let consumed = self.resp_reader.consume(avail) as u64;
        self.add_bytes(consumed);
    }

    /// Terminal event: drain any remainder, then tear down. Mirrors the
    /// original's identical handling for `READ_COMPLETE`/`EOS`/
    /// `INACTIVITY_TIMEOUT`/`ERROR` (abort on timeout, else close).
    pub fn on_terminal(&mut self, event: Event) {
        self.on_read_ready();
        if let Some(mut vc) = self.vc.take() {
            vc.close();
        }
        let _ = event;
    }
}

impl Drop for BgFetchData {
    fn drop(&mut self) {
        if self.acquired {
            self.state.release(&self.url);
        }
        if let Some(mut vc) = self.vc.take() {
            vc.close();
        }
    }
}

impl ContinuationHandler for BgFetchData {
    fn handle(&mut self, event: Event) -> Result<(), CoreError> {
        match event {
            Event::Immediate | Event::WriteReady => {}
            Event::ReadReady => self.on_read_ready(),
            Event::ReadComplete | Event::Eos | Event::InactivityTimeout | Event::Error => {
                self.on_terminal(event);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn second_fetch_for_same_url_is_rejected() {
        let state = BgFetchState::new();
        let req = Http11Headers::new_request("GET", "/x", "HTTP/1.1");
        let first = BgFetchData::initialize(state.clone(), "u1".into(), addr(), req.clone());
        assert!(first.is_ok());
        let second = BgFetchData::initialize(state.clone(), "u1".into(), addr(), req);
        assert!(second.is_err());
    }

    #[test]
    fn dropping_releases_the_url_for_reuse() {
        let state = BgFetchState::new();
        let req = Http11Headers::new_request("GET", "/x", "HTTP/1.1");
        {
            let _fetch = BgFetchData::initialize(state.clone(), "u2".into(), addr(), req.clone());
            assert!(state.is_in_flight("u2"));
        }
        assert!(!state.is_in_flight("u2"));
        assert!(BgFetchData::initialize(state, "u2".into(), addr(), req).is_ok());
    }

    #[test]
    fn read_ready_accumulates_byte_count() {
        let state = BgFetchState::new();
        let req = Http11Headers::new_request("GET", "/x", "HTTP/1.1");
        let mut fetch = BgFetchData::initialize(state, "u3".into(), addr(), req).unwrap();
        fetch.resp_buf.write(b"0123456789");
        fetch.on_read_ready();
        assert_eq!(fetch.bytes_fetched(), 10);
    }
}
