//! Demo: a continuation that intercepts a transaction (Component D) and
//! echoes whatever the client writes back at it, entirely in-process —
//! analogous to `examples/vmod_be`'s pattern of wrapping a toy backend
//! around the core's plugin traits, but exercising the intercept path
//! instead of the outbound-backend path.

use iostream_core::intercept::{InterceptHandler, InterceptLeg, InterceptState};
use iostream_core::vio::{VConn, VConnKind, Vio, VioDirection};

struct LoopbackVConn {
    kind: VConnKind,
    open: bool,
}

impl LoopbackVConn {
    fn new() -> Self {
        Self {
            kind: VConnKind::Intercept,
            open: true,
        }
    }
}

impl VConn for LoopbackVConn {
    fn kind(&self) -> &VConnKind {
        &self.kind
    }

    fn do_io_read(
        &mut self,
        nbytes: u64,
        buffer: iostream_core::iobuffer::IoBuffer,
        cont: iostream_core::ContId,
    ) -> Vio {
        Vio::new(VioDirection::Read, nbytes, buffer, cont)
    }

    fn do_io_write(
        &mut self,
        nbytes: u64,
        buffer: iostream_core::iobuffer::IoBuffer,
        cont: iostream_core::ContId,
    ) -> Vio {
        Vio::new(VioDirection::Write, nbytes, buffer, cont)
    }

    fn shutdown(&mut self, _read: bool, _write: bool) -> Result<(), iostream_core::CoreError> {
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn set_inactivity_timeout(&mut self, _d: Option<std::time::Duration>) {}
    fn set_active_timeout(&mut self, _d: Option<std::time::Duration>) {}
}

fn main() {
    env_logger::init();

    let state = InterceptState::new(Box::new(LoopbackVConn::new()), Box::new(LoopbackVConn::new()));
    let mut handler = InterceptHandler::new(state);

    handler.state.client.read_buffer.write(b"ping");
    handler
        .handle_leg(InterceptLeg::Client, iostream_core::Event::ReadReady)
        .expect("client leg handles ReadReady");

    let mut reader = handler.state.server.write_buffer.alloc_reader_from_start();
    let mut echoed = vec![0u8; reader.avail_total()];
    reader.copy_out(&mut echoed);
    log::info!("server side received: {:?}", String::from_utf8_lossy(&echoed));
    println!("{}", String::from_utf8_lossy(&echoed));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_write_shows_up_on_the_server_side() {
        let state = InterceptState::new(Box::new(LoopbackVConn::new()), Box::new(LoopbackVConn::new()));
        let mut handler = InterceptHandler::new(state);
        handler.state.client.read_buffer.write(b"hello");
        handler
            .handle_leg(InterceptLeg::Client, iostream_core::Event::ReadReady)
            .unwrap();
        let mut reader = handler.state.server.write_buffer.alloc_reader_from_start();
        let mut out = [0u8; 5];
        reader.copy_out(&mut out);
        assert_eq!(&out, b"hello");
    }
}
