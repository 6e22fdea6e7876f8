//! Component E: transform chain.
//!
//! Two chain directions — delivery-side (response body to the client) and
//! fetch-side (body as pulled from the origin) — each a sequence of pure
//! push/pull filters. The external-service transform delegates a single
//! filter stage to a helper process over a byte-oriented connection, using a
//! 4-byte length prefix on the way in and a 4-byte status word on the way
//! back, falling back to `Bypass` on any helper failure — grounded directly
//! on `server_transform.c`'s `STATE_BUFFER/CONNECT/WRITE/READ_STATUS/READ/BYPASS`
//! state machine.

use crate::error::{CoreError, ProtocolError, TransportError};
use crate::event::ContId;
use crate::iobuffer::{IoBuffer, Reader};
use crate::txn::Txn;
use crate::vio::VConn;

/// Outcome of pushing a chunk of bytes through a delivery filter.
pub enum PushResult {
    Err(CoreError),
    Ok,
    End,
}

/// Outcome of pulling a chunk of bytes through a fetch filter.
pub enum PullResult {
    Err(CoreError),
    Ok(usize),
    End(usize),
}

/// A response-side (delivery) filter: receives bytes pushed in, optionally
/// transforming them before handing them to the next filter/client.
pub trait DeliveryFilter {
    fn name(&self) -> &'static str;
    fn push(&mut self, chunk: &[u8]) -> PushResult;
}

/// A body-side (fetch) filter: pulls bytes from the next filter/origin.
pub trait FetchFilter {
    fn name(&self) -> &'static str;
    fn pull(&mut self, out: &mut IoBuffer) -> PullResult;
}

/// The external-service transform's own state machine, mirroring
/// `STATE_BUFFER .. STATE_BYPASS` exactly (same ordering, same meaning).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformPhase {
    /// Buffering the full untransformed body before connecting to the helper.
    Buffer,
    /// Connecting to the helper service.
    Connect,
    /// Writing the length-prefixed body to the helper.
    Write,
    /// Reading the helper's 4-byte status word.
    ReadStatus,
    /// Reading the transformed body back from the helper.
    Read,
    /// Helper failed at some point; pass the original body through untouched.
    Bypass,
}

/// Drives one external-service transform instance through its phases.
/// `connector` supplies the connection to the helper on demand so tests can
/// substitute an in-memory one.
pub struct ExternalTransform {
    /// The continuation identity this transform was created for, used to
    /// look its own output VConn back up from the owning [`Txn`] exactly as
    /// `transform_output_vconn_get` does in the original core.
    cont: ContId,
    phase: TransformPhase,
    untransformed: IoBuffer,
    /// Allocated once, here, before `buffer_chunk` ever writes to
    /// `untransformed` — a reader allocated after those writes would see
    /// zero bytes available, since a fresh reader only observes writes from
    /// its own creation point forward.
    untransformed_reader: Reader,
    helper: Option<Box<dyn VConn>>,
    bytes_written: u64,
    status: Option<i32>,
}

impl ExternalTransform {
    #[must_use]
    pub fn new(cont: ContId, untransformed: IoBuffer) -> Self {
        let untransformed_reader = untransformed.alloc_reader();
        Self {
            cont,
            phase: TransformPhase::Buffer,
            untransformed,
            untransformed_reader,
            helper: None,
            bytes_written: 0,
            status: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> TransformPhase {
        self.phase
    }

    /// The write VIO's VConn this transform should push transformed bytes
    /// into, discovered from the owning transaction the way
    /// `transform_output_vconn_get` discovers it in the original core.
    pub fn output_vconn<'t>(&self, txn: &'t mut dyn Txn) -> Option<&'t mut dyn VConn> {
        txn.transform_output_vconn_get(self.cont)
    }

    /// Buffer phase: call once per chunk of the pre-transform body. Once
    /// `last` is true the buffering is complete and the caller should move
    /// to `connect`.
    pub fn buffer_chunk(&mut self, chunk: &[u8], last: bool) {
        debug_assert_eq!(self.phase, TransformPhase::Buffer);
        self.untransformed.write(chunk);
        if last {
            self.phase = TransformPhase::Connect;
        }
    }

    /// Connect phase: hand in an already-established connection to the
    /// helper (or bypass immediately if none could be made).
    pub fn connect(&mut self, helper: Option<Box<dyn VConn>>) {
        debug_assert_eq!(self.phase, TransformPhase::Connect);
        match helper {
            Some(vc) => {
                self.helper = Some(vc);
                self.phase = TransformPhase::Write;
            }
            None => self.bypass(),
        }
    }

    /// Write phase: produce the wire frame (4-byte big-endian length prefix
    /// + body) that should be written to the helper. Called once; the
    /// result is the complete frame since the body was already buffered.
    #[must_use]
    pub fn write_frame(&mut self) -> Vec<u8> {
        debug_assert_eq!(self.phase, TransformPhase::Write);
        let len = self.untransformed_reader.avail_total();
        let mut body = vec![0u8; len];
        self.untransformed_reader.copy_out(&mut body);
        self.bytes_written = len as u64;
        let mut frame = Vec::with_capacity(4 + len);
        frame.extend_from_slice(&(len as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        self.phase = TransformPhase::ReadStatus;
        frame
    }

    /// Read-status phase: feed the 4 status bytes read from the helper.
    /// A negative status means the helper rejected the body; bypass.
    pub fn on_status_bytes(&mut self, bytes: &[u8; 4]) -> Result<(), CoreError> {
        debug_assert_eq!(self.phase, TransformPhase::ReadStatus);
        let status = i32::from_be_bytes(*bytes);
        self.status = Some(status);
        if status < 0 {
            self.bypass();
            return Err(ProtocolError::BadTransformStatus.into());
        }
        self.phase = TransformPhase::Read;
        Ok(())
    }

    /// Read phase: the transformed body has arrived in `transformed`.
    #[must_use]
    pub fn take_transformed(&mut self, transformed: IoBuffer) -> IoBuffer {
        debug_assert_eq!(self.phase, TransformPhase::Read);
        transformed
    }

    /// Any helper failure (connect error, short read, transport error)
    /// drops straight to bypass, serving the buffered original body.
    pub fn bypass(&mut self) {
        self.phase = TransformPhase::Bypass;
        if let Some(mut vc) = self.helper.take() {
            vc.close();
        }
    }

    #[must_use]
    pub fn bypassed_body(&self) -> IoBuffer {
        self.untransformed.clone()
    }
}

/// Report a helper I/O failure and fall back to bypass, matching the
/// original's "any helper failure" rule exactly (connect, write, and read
/// errors are all treated identically).
pub fn on_helper_error(t: &mut ExternalTransform, _err: TransportError) {
    t.bypass();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path_through_all_phases() {
        let body = IoBuffer::new(crate::iobuffer::BufferSizeClass::default());
        let mut t = ExternalTransform::new(ContId(0), body);
        t.buffer_chunk(b"hello", true);
        assert_eq!(t.phase(), TransformPhase::Connect);

        struct Dummy;
        impl VConn for Dummy {
            fn kind(&self) -> &crate::vio::VConnKind {
                unimplemented!()
            }
            fn do_io_read(
                &mut self,
                nbytes: u64,
                buffer: IoBuffer,
                cont: crate::event::ContId,
            ) -> crate::vio::Vio {
                crate::vio::Vio::new(crate::vio::VioDirection::Read, nbytes, buffer, cont)
            }
            fn do_io_write(
                &mut self,
                nbytes: u64,
                buffer: IoBuffer,
                cont: crate::event::ContId,
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

        t.connect(Some(Box::new(Dummy)));
        assert_eq!(t.phase(), TransformPhase::Write);
        let frame = t.write_frame();
        assert_eq!(&frame[..4], &5u32.to_be_bytes());
        assert_eq!(&frame[4..], b"hello");
        assert_eq!(t.phase(), TransformPhase::ReadStatus);
        t.on_status_bytes(&0i32.to_be_bytes()).unwrap();
        assert_eq!(t.phase(), TransformPhase::Read);
    }

    #[test]
    fn negative_status_bypasses() {
        let body = IoBuffer::new(crate::iobuffer::BufferSizeClass::default());
        let mut t = ExternalTransform::new(ContId(0), body);
        t.buffer_chunk(b"x", true);
        t.connect(None);
        assert_eq!(t.phase(), TransformPhase::Bypass);
    }

    #[test]
    fn buffering_in_several_chunks_still_produces_the_whole_frame() {
        let body = IoBuffer::new(crate::iobuffer::BufferSizeClass::default());
        let mut t = ExternalTransform::new(ContId(0), body);
        t.buffer_chunk(b"hel", false);
        t.buffer_chunk(b"lo", true);

        struct Dummy;
        impl VConn for Dummy {
            fn kind(&self) -> &crate::vio::VConnKind {
                unimplemented!()
            }
            fn do_io_read(
                &mut self,
                nbytes: u64,
                buffer: IoBuffer,
                cont: crate::event::ContId,
            ) -> crate::vio::Vio {
                crate::vio::Vio::new(crate::vio::VioDirection::Read, nbytes, buffer, cont)
            }
            fn do_io_write(
                &mut self,
                nbytes: u64,
                buffer: IoBuffer,
                cont: crate::event::ContId,
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

        t.connect(Some(Box::new(Dummy)));
        let frame = t.write_frame();
        assert_eq!(&frame[..4], &5u32.to_be_bytes());
        assert_eq!(&frame[4..], b"hello");
    }

    #[test]
    fn output_vconn_is_discovered_through_the_owning_txn() {
        use crate::txn::TestTxn;

        let cont = ContId(7);
        let body = IoBuffer::new(crate::iobuffer::BufferSizeClass::default());
        let t = ExternalTransform::new(cont, body);

        struct Dummy;
        impl VConn for Dummy {
            fn kind(&self) -> &crate::vio::VConnKind {
                &crate::vio::VConnKind::Intercept
            }
            fn do_io_read(
                &mut self,
                nbytes: u64,
                buffer: IoBuffer,
                cont: crate::event::ContId,
            ) -> crate::vio::Vio {
                crate::vio::Vio::new(crate::vio::VioDirection::Read, nbytes, buffer, cont)
            }
            fn do_io_write(
                &mut self,
                nbytes: u64,
                buffer: IoBuffer,
                cont: crate::event::ContId,
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
        txn.set_transform_output_vconn(cont, Box::new(Dummy));

        assert!(t.output_vconn(&mut txn).is_some());
    }
}
