//! Forecourt Console - reconciliation core backend
//!
//! Role-based operations backend for a fuel-retail network (stations,
//! dealers, OMCs, attendants). The host UI calls the functions in
//! [`commands`] with an already-trusted [`scope::Identity`]; everything
//! else — meter math, scope filtering, aggregation, the deposit lifecycle,
//! document fingerprints — lives in the flat domain modules below and is
//! exercised against a local SQLite store.

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod commands;
pub mod db;
pub mod deposits;
mod error;
pub mod fingerprint;
pub mod meter;
pub mod network;
pub mod sales;
pub mod scope;
pub mod summary;

pub use error::PosError;

/// Initialize structured logging for a host process.
///
/// Console output only; file rotation belongs to the host. Safe to call
/// once at startup — respects `RUST_LOG` when set.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,forecourt_console=debug"));

    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();

    info!("Forecourt Console core v{}", env!("CARGO_PKG_VERSION"));
}

pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_i64(v: &serde_json::Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_i64()) {
            return Some(n);
        }
    }
    None
}
