//! Logging setup on top of tracing-subscriber.
//!
//! Level and format come from the `logging` config section; the `DEBUG`
//! env var forces debug level and `LOG_FORMAT` overrides the format. The
//! level filter is reloadable so SIGHUP can change it at runtime.

use crate::config::LoggingConfig;
use anyhow::Result;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install the global subscriber. Call once at process start.
pub fn init(cfg: &LoggingConfig) {
    let level = if std::env::var("DEBUG").map(|v| !v.is_empty()).unwrap_or(false) {
        "debug".to_string()
    } else {
        cfg.level.clone()
    };

    let format = match std::env::var("LOG_FORMAT") {
        Ok(f) if f == "text" || f == "json" => f,
        _ => cfg.format.clone(),
    };

    let (filter, handle) = reload::Layer::new(EnvFilter::new(&level));
    let registry = tracing_subscriber::registry().with(filter);

    if format == "text" {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }

    let _ = FILTER_HANDLE.set(handle);
}

/// Swap the active log level; used by config hot reload.
pub fn set_level(level: &str) -> Result<()> {
    if let Some(handle) = FILTER_HANDLE.get() {
        handle
            .reload(EnvFilter::new(level))
            .map_err(|e| anyhow::anyhow!("reload log filter: {e}"))?;
    }
    Ok(())
}
