//! Structured logging with `tracing`.
//!
//! Library crates only emit events. The probe installs a stderr subscriber
//! through [`init_subscriber`]; tests install a capturing layer through
//! [`capture_logs`].

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when neither `RUST_LOG` nor `level` parses.
const FALLBACK_DIRECTIVE: &str = "warn";

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVE))
}

/// Install the process-wide stderr subscriber.
///
/// `RUST_LOG` wins over `level`. Only the first call has an effect.
pub fn init_subscriber(level: &str) {
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter_for(level))
        .with(stderr)
        .try_init();
}
