//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("edenframe={level},tower_http={level}", level = config.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
