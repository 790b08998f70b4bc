//! Tracing subscriber setup for embedders.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! embedding application's call. [`init`] covers the common case.

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install a formatted stderr subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise engine logs pass at
/// `info` and everything else at `error`. Safe to call more than once;
/// later calls are no-ops.
///
/// # Examples
///
/// ```
/// weftrun::telemetry::init();
/// tracing::info!("subscriber ready");
/// ```
pub fn init() {
    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("error,weftrun=info"))
        .expect("static filter directive parses");

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
