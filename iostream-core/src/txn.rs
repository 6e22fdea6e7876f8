//! §6 external interfaces: transaction hooks and per-transaction controls.
//!
//! `TxnHook` enumerates the points in a transaction's lifecycle a
//! continuation can attach to; `Txn` is the set of controls a hook handler
//! is allowed to call (intercept installation, transform output discovery,
//! cache-key override, cacheability overrides, connection metadata). Exact
//! names are implementation-defined per the original's own caveat — this
//! file picks one concrete set and is the canonical mapping, documented in
//! `DESIGN.md`. `TestTxn` is the in-memory fixture other crates' tests drive
//! against, grounded on the real/test dual-constructor split `TestCtx` gives
//! the original core's VCL context.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use crate::continuation::ContinuationHandler;
use crate::error::CoreError;
use crate::event::ContId;
use crate::headers::Http11Headers;
use crate::vio::VConn;

/// Points in a transaction's lifecycle a continuation can hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnHook {
    ReadRequestHdr,
    CacheLookupComplete,
    SendRequestHdr,
    ReadResponseHdr,
    SendResponseHdr,
    TxnClose,
}

/// `cache_lookup_status_get`/`_set`'s value space, mirroring the original's
/// `CACHE_LOOKUP_MISS`/`HIT_FRESH`/`HIT_STALE`/`SKIPPED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookupStatus {
    Miss,
    HitFresh,
    HitStale,
    Skipped,
}

/// Controls available on a live transaction. One concrete `Txn`
/// implementation (`TestTxn`, below, or whatever the embedding binary
/// provides) threads these through to the relevant component.
pub trait Txn {
    /// Request headers as seen (and mutable) at this hook point.
    fn req_headers(&mut self) -> &mut Http11Headers;

    /// Response headers, available from `ReadResponseHdr` onward.
    fn resp_headers(&mut self) -> Option<&mut Http11Headers>;

    /// Let `cont` masquerade as the origin for this transaction (Component D).
    fn server_intercept(&mut self, cont: Box<dyn ContinuationHandler>) -> Result<(), CoreError>;

    /// The output VConn a transform attached at `cont` should write its
    /// transformed bytes to (Component E), discovered rather than passed
    /// in directly since the transform's own VConn is created by the
    /// framework, not the transform itself.
    fn transform_output_vconn_get(&mut self, cont: ContId) -> Option<&mut (dyn VConn + '_)>;

    /// Declare that the *untransformed* bytes should be what gets cached.
    fn untransformed_resp_cache(&mut self, cache: bool);

    /// Declare that the *transformed* bytes should be what gets cached.
    fn transformed_resp_cache(&mut self, cache: bool);

    /// Disable (or re-enable) storing the origin's response in the cache.
    fn server_resp_no_store(&mut self, no_store: bool);

    /// Override whether the response is cacheable at all.
    fn resp_cacheable_set(&mut self, cacheable: bool);

    /// Force the cache-lookup result to `HIT_STALE` even if the object is
    /// otherwise fresh (used by the `X-Crr-Ims` conditional-revalidation path).
    fn cache_lookup_force_stale(&mut self);

    fn cache_lookup_status_get(&self) -> CacheLookupStatus;
    fn cache_lookup_status_set(&mut self, status: CacheLookupStatus);

    /// Override the key used to store/look up this transaction in the
    /// cache (Component F). Returns an error if called after the cache
    /// lookup has already started.
    fn cache_url_set(&mut self, url: &str) -> Result<(), CoreError>;

    /// The client's address, available from the moment the transaction starts.
    fn client_addr_get(&self) -> SocketAddr;

    /// The origin/next-hop address this transaction connected (or will
    /// connect) to, once the connect attempt has been made.
    fn next_hop_ip_get(&self) -> Option<IpAddr>;
    fn next_hop_port_get(&self) -> Option<u16>;

    /// Whether `resp` is cacheable under the transaction's current policy,
    /// without committing to that decision (no `resp_cacheable_set` side
    /// effect). The default implementation applies the ordinary HTTP rule —
    /// a cacheable status code and no `Cache-Control: no-store` — and is
    /// what most hook handlers should defer to rather than reimplementing.
    fn is_cacheable(&self, resp: &Http11Headers) -> bool {
        let Some(status) = resp.status else {
            return false;
        };
        if !matches!(status, 200 | 203 | 204 | 206 | 300 | 301 | 404 | 410) {
            return false;
        }
        !resp
            .field("Cache-Control")
            .is_some_and(|v| v.to_ascii_lowercase().contains("no-store"))
    }

    /// Set an integer-valued per-transaction config override (e.g. a
    /// timeout tunable a hook wants to tighten for just this transaction).
    fn config_int_set(&mut self, key: &str, value: i64);
}

/// In-memory `Txn` fixture for tests, analogous to the original core's
/// `TestCtx`: a real struct backed by plain fields instead of a live
/// transaction, so hook logic can be exercised without a running proxy.
pub struct TestTxn {
    req: Http11Headers,
    resp: Option<Http11Headers>,
    client_addr: SocketAddr,
    next_hop: Option<SocketAddr>,
    transform_outputs: HashMap<ContId, Box<dyn VConn>>,
    untransformed_cached: bool,
    transformed_cached: bool,
    no_store: bool,
    cacheable_override: Option<bool>,
    lookup_status: CacheLookupStatus,
    cache_url: Option<String>,
    config: HashMap<String, i64>,
}

impl TestTxn {
    #[must_use]
    pub fn new() -> Self {
        Self {
            req: Http11Headers::new_request("GET", "/", "HTTP/1.1"),
            resp: None,
            client_addr: "127.0.0.1:0".parse().unwrap(),
            next_hop: None,
            transform_outputs: HashMap::new(),
            untransformed_cached: false,
            transformed_cached: false,
            no_store: false,
            cacheable_override: None,
            lookup_status: CacheLookupStatus::Miss,
            cache_url: None,
            config: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_request(mut self, req: Http11Headers) -> Self {
        self.req = req;
        self
    }

    #[must_use]
    pub fn with_response(mut self, resp: Http11Headers) -> Self {
        self.resp = Some(resp);
        self
    }

    #[must_use]
    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = addr;
        self
    }

    #[must_use]
    pub fn with_next_hop(mut self, addr: SocketAddr) -> Self {
        self.next_hop = Some(addr);
        self
    }

    /// Wire a transform's output VConn in ahead of time, as if the framework
    /// had already created the transform's write side for `cont`.
    pub fn set_transform_output_vconn(&mut self, cont: ContId, vc: Box<dyn VConn>) {
        self.transform_outputs.insert(cont, vc);
    }

    #[must_use]
    pub fn untransformed_is_cached(&self) -> bool {
        self.untransformed_cached
    }

    #[must_use]
    pub fn transformed_is_cached(&self) -> bool {
        self.transformed_cached
    }

    #[must_use]
    pub fn is_no_store(&self) -> bool {
        self.no_store
    }

    #[must_use]
    pub fn cacheable_override(&self) -> Option<bool> {
        self.cacheable_override
    }

    #[must_use]
    pub fn cache_url(&self) -> Option<&str> {
        self.cache_url.as_deref()
    }

    #[must_use]
    pub fn config_int(&self, key: &str) -> Option<i64> {
        self.config.get(key).copied()
    }
}

impl Default for TestTxn {
    fn default() -> Self {
        Self::new()
    }
}

impl Txn for TestTxn {
    fn req_headers(&mut self) -> &mut Http11Headers {
        &mut self.req
    }

    fn resp_headers(&mut self) -> Option<&mut Http11Headers> {
        self.resp.as_mut()
    }

    fn server_intercept(&mut self, _cont: Box<dyn ContinuationHandler>) -> Result<(), CoreError> {
        Ok(())
    }

    fn transform_output_vconn_get(&mut self, cont: ContId) -> Option<&mut (dyn VConn + '_)> {
        match self.transform_outputs.get_mut(&cont) {
            Some(vc) => Some(vc.as_mut()),
            None => None,
        }
    }

    fn untransformed_resp_cache(&mut self, cache: bool) {
        self.untransformed_cached = cache;
    }

    fn transformed_resp_cache(&mut self, cache: bool) {
        self.transformed_cached = cache;
    }

    fn server_resp_no_store(&mut self, no_store: bool) {
        self.no_store = no_store;
    }

    fn resp_cacheable_set(&mut self, cacheable: bool) {
        self.cacheable_override = Some(cacheable);
    }

    fn cache_lookup_force_stale(&mut self) {
        self.lookup_status = CacheLookupStatus::HitStale;
    }

    fn cache_lookup_status_get(&self) -> CacheLookupStatus {
        self.lookup_status
    }

    fn cache_lookup_status_set(&mut self, status: CacheLookupStatus) {
        self.lookup_status = status;
    }

    fn cache_url_set(&mut self, url: &str) -> Result<(), CoreError> {
        self.cache_url = Some(url.to_string());
        Ok(())
    }

    fn client_addr_get(&self) -> SocketAddr {
        self.client_addr
    }

    fn next_hop_ip_get(&self) -> Option<IpAddr> {
        self.next_hop.map(|a| a.ip())
    }

    fn next_hop_port_get(&self) -> Option<u16> {
        self.next_hop.map(|a| a.port())
    }

    fn config_int_set(&mut self, key: &str, value: i64) {
        self.config.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_cacheable_honors_no_store() {
        let txn = TestTxn::new();
        let mut resp = Http11Headers::new_response(200, "OK", "HTTP/1.1");
        assert!(txn.is_cacheable(&resp));
        resp.set_header("Cache-Control", "no-store");
        assert!(!txn.is_cacheable(&resp));
    }

    #[test]
    fn is_cacheable_rejects_uncacheable_status() {
        let txn = TestTxn::new();
        let resp = Http11Headers::new_response(500, "Internal Server Error", "HTTP/1.1");
        assert!(!txn.is_cacheable(&resp));
    }

    #[test]
    fn cache_lookup_force_stale_sets_status() {
        let mut txn = TestTxn::new();
        assert_eq!(txn.cache_lookup_status_get(), CacheLookupStatus::Miss);
        txn.cache_lookup_force_stale();
        assert_eq!(txn.cache_lookup_status_get(), CacheLookupStatus::HitStale);
    }

    #[test]
    fn transform_output_vconn_get_finds_what_was_registered() {
        struct Dummy;
        impl VConn for Dummy {
            fn kind(&self) -> &crate::vio::VConnKind {
                &crate::vio::VConnKind::Intercept
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

        let mut txn = TestTxn::new();
        assert!(txn.transform_output_vconn_get(ContId(1)).is_none());
        txn.set_transform_output_vconn(ContId(1), Box::new(Dummy));
        assert!(txn.transform_output_vconn_get(ContId(1)).is_some());
    }
}
