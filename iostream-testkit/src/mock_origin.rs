//! An in-memory stand-in for an origin server, implementing `VConn` over two
//! plain byte queues instead of a socket. Mirrors `TestWS`'s "instantiate a
//! real struct around a fake buffer" idiom, applied to a transport instead
//! of a workspace allocator.

use std::collections::VecDeque;
use std::time::Duration;

use iostream_core::error::CoreError;
use iostream_core::event::ContId;
use iostream_core::iobuffer::IoBuffer;
use iostream_core::vio::{VConn, VConnKind, Vio};

/// A `VConn` whose "network" is just two in-memory queues: bytes written by
/// the test's code-under-test land in `to_origin`, and bytes the test script
/// pushes into `from_origin` are what subsequent reads see.
pub struct MockOrigin {
    kind: VConnKind,
    pub to_origin: VecDeque<u8>,
    pub from_origin: VecDeque<u8>,
    closed: bool,
}

impl MockOrigin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: VConnKind::Intercept,
            to_origin: VecDeque::new(),
            from_origin: VecDeque::new(),
            closed: false,
        }
    }

    /// Queue bytes for the next read to pick up.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.from_origin.extend(bytes.iter().copied());
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for MockOrigin {
    fn default() -> Self {
        Self::new()
    }
}

impl VConn for MockOrigin {
    fn kind(&self) -> &VConnKind {
        &self.kind
    }

    fn do_io_read(&mut self, nbytes: u64, buffer: IoBuffer, cont: ContId) -> Vio {
        let n = (nbytes as usize).min(self.from_origin.len());
        let drained: Vec<u8> = self.from_origin.drain(..n).collect();
        buffer.write(&drained);
        Vio::new(iostream_core::vio::VioDirection::Read, nbytes, buffer, cont)
    }

    fn do_io_write(&mut self, nbytes: u64, buffer: IoBuffer, cont: ContId) -> Vio {
        // `buffer` arrives already populated by the caller (e.g. a write VIO
        // drained from a request/response buffer); a reader allocated now
        // must still see those bytes, not just ones written after this call.
        let mut reader = buffer.alloc_reader_from_start();
        let avail = reader.avail_total().min(nbytes as usize);
        let mut chunk = vec![0u8; avail];
        reader.copy_out(&mut chunk);
        self.to_origin.extend(chunk);
        Vio::new(iostream_core::vio::VioDirection::Write, nbytes, buffer, cont)
    }

    fn shutdown(&mut self, _read: bool, _write: bool) -> Result<(), CoreError> {
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn set_inactivity_timeout(&mut self, _d: Option<Duration>) {}
    fn set_active_timeout(&mut self, _d: Option<Duration>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use iostream_core::continuation::{ContinuationHandler, EventLoop};
    use iostream_core::error::CoreError;

    struct Noop;
    impl ContinuationHandler for Noop {
        fn handle(&mut self, _event: iostream_core::event::Event) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[test]
    fn write_then_read_round_trips_through_the_queues() {
        let loop_ = EventLoop::new();
        let cont = loop_.register(Box::new(Noop));
        let mut origin = MockOrigin::new();
        origin.feed(b"response-bytes");
        let buf = IoBuffer::new(iostream_core::iobuffer::BufferSizeClass::default());
        let vio = origin.do_io_read(14, buf.clone(), cont);
        assert_eq!(vio.nbytes, 14);
        let mut reader = buf.alloc_reader_from_start();
        let mut out = vec![0u8; 14];
        reader.copy_out(&mut out);
        assert_eq!(&out, b"response-bytes");
    }
}
