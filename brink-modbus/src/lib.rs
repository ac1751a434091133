//! Brink Modbus Engine
//!
//! Modbus RTU client and polling engine for Brink HRU ventilation units
//! (FLAIR series):
//!
//! - [`registers`] - Register catalog (addresses, scaling, bounds, labels)
//! - [`client`] - Serial RTU transport with retry and timeout handling
//! - [`poller`] - Poll cycle engine and cadence loop
//! - [`snapshot`] - Point-in-time snapshots and the shared store
//! - [`device`] - Device handle: reads, guarded writes, diagnostics
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`error`] - Error types

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod poller;
pub mod registers;
pub mod snapshot;

// Re-export commonly used types at the crate root
pub use client::{ModbusTransport, RtuClient};
pub use config::{Config, ConfigError, LinkConfig, LoggingConfig, Model, PollConfig};
pub use device::{Device, DeviceInfo};
pub use error::{Error, Result};
pub use registers::{Bank, CATALOG, Guard, RegisterDescriptor, ValueKind};
pub use snapshot::{Snapshot, SnapshotStore, Value};

/// Initialize tracing with the given configuration.
///
/// The `RUST_LOG` environment variable, when set, wins over the configured
/// level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;

    Ok(())
}
