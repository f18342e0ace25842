pub mod activity;

pub use activity::{ActivityEvent, ActivityEventType, ActivityLogger};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global `tracing` subscriber: JSON-formatted structured
/// logs gated by `RUST_LOG` (spec C13). Call once at process startup.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
