//! `tracing` output: the browser console on wasm32, stderr elsewhere.

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info,rollum_client=debug";

/// Plain-text formatter over `writer`. The browser has no wall clock for the
/// default timer and no ANSI colors, so both are off.
pub fn subscriber<W>(writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry().with(EnvFilter::new(DEFAULT_FILTER)).with(
        fmt::layer()
            .with_ansi(false)
            .without_time()
            .with_writer(writer),
    )
}

pub fn init() {
    #[cfg(target_arch = "wasm32")]
    let writer = tracing_web::MakeWebConsoleWriter::new();
    #[cfg(not(target_arch = "wasm32"))]
    let writer = std::io::stderr;
    // Already installed after a hot reload.
    let _ = subscriber(writer).try_init();
}
