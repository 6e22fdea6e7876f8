//! Fixtures and a deterministic driver for exercising `iostream-core`
//! without a real reactor or real sockets.
//!
//! Grounded on the teacher's dual real/test constructor pattern
//! (`Ctx`/`TestCtx`, `Workspace`/`TestWS`): every fixture here has the same
//! shape as its production counterpart but is backed by an in-memory
//! transport instead of a file descriptor, so tests can single-step a
//! scenario and assert on exact byte counts.

pub mod mock_origin;
pub mod scenario;

pub use mock_origin::MockOrigin;
pub use scenario::{run_scenario, Scenario};
