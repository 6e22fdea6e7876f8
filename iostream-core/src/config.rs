//! Ambient: per-pool and per-transform tunables.
//!
//! There is no VCL-equivalent configuration language in scope here (the
//! original core is configured entirely through its embedding language), so
//! tunables are a plain struct with `Default`, matching how the teacher
//! repo's own `TestCtx`/`TestWS` fixtures favor small concrete structs over
//! a generic config-file loader.

use std::time::Duration;

use serde::Deserialize;

use crate::iobuffer::BufferSizeClass;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Default IOBuffer size class index (0..=8, see [`BufferSizeClass`]).
    pub buffer_size_class_index: u8,
    /// Default connect timeout for the connecting-entry pool.
    pub connect_timeout: Duration,
    /// Default inactivity timeout applied to a freshly-opened VConn.
    pub inactivity_timeout: Duration,
    /// Whether background fill is enabled at all.
    pub background_fetch_enabled: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            buffer_size_class_index: BufferSizeClass::default_class().bytes().trailing_zeros() as u8 - 7,
            connect_timeout: Duration::from_secs(30),
            inactivity_timeout: Duration::from_secs(120),
            background_fetch_enabled: true,
        }
    }
}

impl CoreConfig {
    /// Resolve the configured size class, falling back to the default on an
    /// out-of-range index rather than failing construction.
    #[must_use]
    pub fn buffer_size_class(&self) -> BufferSizeClass {
        BufferSizeClass::new(self.buffer_size_class_index).unwrap_or_default()
    }
}
