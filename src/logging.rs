//! Logging setup
//!
//! The library only emits `tracing` events. Applications and tests that want to see
//! them call [`init`] once; later calls are ignored.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive used when `RUST_LOG` is not set
pub const DEFAULT_DIRECTIVE: &str = "tandem=info";

/// Install a formatting subscriber filtered by `RUST_LOG`.
///
/// Returns false when a global subscriber was already installed.
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_DIRECTIVE.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        assert!(!init());
    }
}
