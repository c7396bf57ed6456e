//! Tracing and logging setup shared by binaries.

pub mod tracing;

pub use tracing::{LogFormat, UnknownLogFormat};

/// Initialize process-wide logging: `RUST_LOG` (default `info`), JSON lines.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init_with("info", LogFormat::Json);
}

pub fn init_with(default_filter: &str, format: LogFormat) {
    tracing::init_with(default_filter, format);
}
