//! Logging and tracing configuration for ffx-vfs
//!
//! The library only emits `tracing` events. Applications that want to see
//! them install a subscriber, either their own or one of the two below.
//!
//! # Usage
//!
//! ```rust
//! ffx_vfs::logging::init();
//! ```
//!
//! # Log Levels
//!
//! - `warn`  - tolerated corruption (truncated gzip member, footer mismatch,
//!   compressed stream without end marker)
//! - `info`  - resolver set-up
//! - `debug` - layers opened and closed, cache inserts and evictions, gzip
//!   member discovery
//! - `trace` - per-chunk decoding and seek realignment
//!
//! # Environment Variable Control
//!
//! Set `RUST_LOG` to control log levels at runtime:
//! ```bash
//! RUST_LOG=ffx_vfs=trace                        # Everything from this crate
//! RUST_LOG=ffx_vfs::gzip=debug,ffx_vfs=warn     # Per-module control
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn default_filter() -> EnvFilter {
    if cfg!(debug_assertions) || cfg!(feature = "debug-logging") {
        EnvFilter::new("ffx_vfs=debug")
    } else {
        EnvFilter::new("ffx_vfs=info")
    }
}

/// Initialize the logging/tracing system
///
/// Safe to call more than once; only the first subscriber is installed.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact(),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Initialize logging with file:line and thread IDs, trace level by default
pub fn init_verbose() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ffx_vfs=trace"));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .pretty(),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Check if debug logging is enabled
/// Can be used to skip expensive debug computations
#[inline]
pub fn is_debug_enabled() -> bool {
    tracing::enabled!(Level::DEBUG)
}

#[inline]
pub fn is_trace_enabled() -> bool {
    tracing::enabled!(Level::TRACE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info};

    #[test]
    fn test_init_twice() {
        init();
        init_verbose();
        info!("Test log message");
        debug!(layer = "GZIP", "Structured log");
        if is_trace_enabled() {
            assert!(is_debug_enabled());
        }
    }
}
