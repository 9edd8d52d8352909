//! Structured logging setup
//!
//! The scheduler only emits `tracing` events; whoever embeds it decides where
//! they go. `init_tracing` installs the JSON subscriber the proxy services use.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Install a global JSON subscriber filtered by `LOG_LEVEL`, then `RUST_LOG`,
/// falling back to `info`.
///
/// Fails if a global subscriber has already been installed.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_error() {
        // The first call may lose to another test binary's subscriber; the
        // second can never succeed.
        let _ = init_tracing();
        assert!(init_tracing().is_err(), "second install must fail");
    }
}
