//! spsync Core - Domain types, configuration and ports
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `FileRecord`, `RemoteItemMetadata`, `ProbeResult`, name sanitization
//! - **Port definitions** - Traits for adapters: `IRemoteLibrary`, `IDiagramRenderer`
//! - **Retry policy** - the `(max attempts, delay of attempt)` abstraction shared by
//!   the transport, chunk-upload and metadata layers
//! - **Configuration** - the YAML configuration file and its validation
//!
//! # Architecture
//!
//! The domain module is pure logic with no network dependencies. Ports
//! define the trait interfaces implemented by `spsync-graph` and consumed
//! by the `spsync-sync` engine.

pub mod config;
pub mod domain;
pub mod ports;
pub mod retry;

/// Logs a metadata diagnostic line.
///
/// Emitted at `debug` with `metadata_debug = true`, and promoted to `info`
/// when `DEBUG_METADATA` is set.
#[macro_export]
macro_rules! metadata_debug {
    ($($arg:tt)+) => {
        if $crate::config::metadata_debug_enabled() {
            ::tracing::info!(metadata_debug = true, $($arg)+);
        } else {
            ::tracing::debug!(metadata_debug = true, $($arg)+);
        }
    };
}
