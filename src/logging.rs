//! Tracing subscriber setup for binaries and tests built on this crate.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is the application's call.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor an explicit default is given.
pub const DEFAULT_FILTER: &str = "data_concepts=info";

/// Install a global fmt subscriber filtered by `RUST_LOG`, or by
/// `default_filter` when `RUST_LOG` is unset or invalid.
///
/// Safe to call more than once: later calls report the existing subscriber
/// instead of panicking.
///
/// # Errors
///
/// Returns a message when `default_filter` does not parse or a global
/// subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), String> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|err| format!("invalid log filter `{default_filter}`: {err}"))?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|err| format!("tracing already initialized: {err}"))
}
