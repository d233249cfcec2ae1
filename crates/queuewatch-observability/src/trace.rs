//! Tracing subscriber setup

use crate::ObservabilityError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the default `info` filter. Fails if a subscriber is
/// already installed.
pub fn init_tracing(json: bool) -> Result<(), ObservabilityError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };
    result.map_err(|e| ObservabilityError::TracingInit(e.to_string()))?;

    tracing::debug!(json, "Initialized structured tracing");
    Ok(())
}
