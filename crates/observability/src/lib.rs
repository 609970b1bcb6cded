//! Process-wide tracing setup.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogConfig, LogFormat};

/// Initialize tracing from the environment (`RUST_LOG`, `KB_LOG_FORMAT`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    self::tracing::init(LogConfig::from_env());
}
