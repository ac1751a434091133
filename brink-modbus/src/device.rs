//! Device session handle.
//!
//! [`Device`] ties the transport, the snapshot store and the poll loop
//! together and is the only party that writes to the unit. Writes are
//! serialized behind a gate so a mode-arming sequence can never interleave
//! with another write, while polling continues between the individual bus
//! operations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{ModbusTransport, RtuClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::poller::{PollLoop, run_cycle};
use crate::registers::{self, Bank, RegisterDescriptor, keys};
use crate::snapshot::{Snapshot, SnapshotStore, Value};

/// Identity registers of the unit.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub device_type: i16,
    pub serial_number_1: i16,
    pub serial_number_2: i16,
    pub software_version: i16,
}

/// Handle to one ventilation unit on one serial link.
///
/// Clones share the link, the snapshot store and the write ordering.
pub struct Device<T: ModbusTransport = RtuClient> {
    client: Arc<Mutex<T>>,
    store: Arc<SnapshotStore>,
    refresh: Arc<Notify>,
    write_gate: Arc<Mutex<()>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    unit_id: u8,
    poll_interval: Duration,
    settle: Duration,
}

impl<T: ModbusTransport> Clone for Device<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.store),
            refresh: Arc::clone(&self.refresh),
            write_gate: Arc::clone(&self.write_gate),
            shutdown_tx: Arc::clone(&self.shutdown_tx),
            unit_id: self.unit_id,
            poll_interval: self.poll_interval,
            settle: self.settle,
        }
    }
}

impl Device<RtuClient> {
    /// Create a device handle backed by the serial client.
    pub fn from_config(config: &Config) -> Self {
        let client = RtuClient::new(
            config.link.clone(),
            config.poll.read_timeout(),
            config.poll.retries,
        );
        Self::with_transport(
            client,
            config.link.unit_id,
            config.poll.interval(),
            config.poll.settle(),
        )
    }
}

impl<T: ModbusTransport + 'static> Device<T> {
    /// Create a device handle over an arbitrary transport.
    pub fn with_transport(
        transport: T,
        unit_id: u8,
        poll_interval: Duration,
        settle: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            client: Arc::new(Mutex::new(transport)),
            store: Arc::new(SnapshotStore::new()),
            refresh: Arc::new(Notify::new()),
            write_gate: Arc::new(Mutex::new(())),
            shutdown_tx: Arc::new(shutdown_tx),
            unit_id,
            poll_interval,
            settle,
        }
    }

    /// Spawn the poll loop. The loop runs until [`Device::shutdown`].
    pub fn start(&self) -> JoinHandle<()> {
        let poll_loop = PollLoop::new(
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            Arc::clone(&self.refresh),
            self.unit_id,
            self.poll_interval,
        );
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(poll_loop.run(shutdown))
    }

    /// Signal the poll loop to stop and release the port.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// The most recent snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.load()
    }

    /// Last observed value for a catalog key. `None` when the most recent
    /// cycle did not read it.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key)
    }

    /// Identity registers from the latest snapshot, once a cycle has read
    /// them.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        let snapshot = self.store.load();
        Some(DeviceInfo {
            device_type: snapshot.get(keys::DEVICE_TYPE)?.as_i16()?,
            serial_number_1: snapshot.get(keys::SERIAL_NUMBER_1)?.as_i16()?,
            serial_number_2: snapshot.get(keys::SERIAL_NUMBER_2)?.as_i16()?,
            software_version: snapshot.get(keys::SOFTWARE_VERSION)?.as_i16()?,
        })
    }

    /// Run one poll cycle right now and publish the result.
    ///
    /// Used at startup for a first snapshot before the cadence begins, and
    /// anywhere a caller wants to wait for fresh data instead of merely
    /// requesting it.
    pub async fn refresh_now(&self) -> Result<Arc<Snapshot>> {
        match run_cycle(self.client.as_ref(), self.unit_id).await {
            Ok(snapshot) => {
                self.store.publish(snapshot);
                Ok(self.store.load())
            }
            Err(e) => {
                self.store.publish(Snapshot::empty());
                Err(e)
            }
        }
    }

    /// Ask the poll loop for a refresh without waiting for it.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Write a value to a holding register, honoring catalog bounds and any
    /// mode precondition the register carries.
    ///
    /// Returns `Ok(false)` when the unit refuses the write. A successful
    /// write triggers an out-of-cycle refresh; the result does not wait for
    /// that refresh to finish.
    pub async fn write(&self, key: &str, value: i16) -> Result<bool> {
        let descriptor = lookup_writable(key)?;
        match descriptor.precondition {
            Some(guard) => {
                self.write_guarded(key, value, guard.mode_key, guard.required)
                    .await
            }
            None => {
                validate_bounds(descriptor, value)?;
                let _gate = self.write_gate.lock().await;
                let accepted = self.write_raw(descriptor, value).await?;
                if accepted {
                    self.request_refresh();
                }
                Ok(accepted)
            }
        }
    }

    /// Guarded write: ensure the mode register holds the required value
    /// before writing the target register.
    ///
    /// The mode is checked against the cached snapshot and armed over the
    /// bus only when it differs, with a settle delay before the dependent
    /// write. The whole sequence holds the write gate, so two guarded
    /// writes can never interleave on the bus.
    pub async fn write_guarded(
        &self,
        key: &str,
        value: i16,
        mode_key: &str,
        mode_value: i16,
    ) -> Result<bool> {
        let descriptor = lookup_writable(key)?;
        validate_bounds(descriptor, value)?;
        let mode = lookup_writable(mode_key)?;
        validate_bounds(mode, mode_value)?;

        let _gate = self.write_gate.lock().await;

        // The cached mode is at most one poll interval stale; arming is
        // skipped only when the cache already shows the required value.
        let current = self.store.get(mode.key).and_then(|v| v.as_i16());
        if current != Some(mode_value) {
            info!(
                mode = mode.key,
                required = mode_value,
                current = ?current,
                "arming mode register before dependent write"
            );
            let armed = self.write_raw(mode, mode_value).await?;
            if !armed {
                warn!(mode = mode.key, "mode write refused, dependent write aborted");
                return Ok(false);
            }
            tokio::time::sleep(self.settle).await;
        }

        let accepted = self.write_raw(descriptor, value).await?;
        if accepted {
            self.request_refresh();
        }
        Ok(accepted)
    }

    async fn write_raw(&self, descriptor: &RegisterDescriptor, value: i16) -> Result<bool> {
        debug!(
            register = descriptor.key,
            address = descriptor.address,
            value,
            "writing register"
        );
        let mut client = self.client.lock().await;
        client
            .write_register(descriptor.address, value as u16, self.unit_id)
            .await
    }

    /// Select the bypass mode: 0 automatic, 1 closed, 2 open.
    pub async fn set_bypass_mode(&self, mode: i16) -> Result<bool> {
        self.write(keys::BYPASS_MODE_SETTING, mode).await
    }

    /// Set the ventilation flow setpoint in m³/h. Arms flow control mode
    /// first when the unit is not already in it.
    pub async fn set_flow_setpoint(&self, flow: i16) -> Result<bool> {
        self.write(keys::FLOW_SETPOINT, flow).await
    }

    /// Select the power switch position: 0 absence, 1 low, 2 normal, 3 high.
    /// Arms switch control mode first when needed.
    pub async fn set_power_mode(&self, position: i16) -> Result<bool> {
        self.write(keys::POWER_SWITCH_POSITION, position).await
    }

    /// Hand control of the unit to the bus or back: 0 disabled, 1 switch
    /// control, 2 flow control.
    pub async fn set_modbus_control(&self, mode: i16) -> Result<bool> {
        self.write(keys::MODBUS_CONTROL, mode).await
    }

    /// Trigger a device reset.
    pub async fn reset_device(&self) -> Result<bool> {
        self.write(keys::DEVICE_RESET, 1).await
    }

    /// Fresh single-register read, bypassing the snapshot. Scaled like a
    /// polled value.
    pub async fn read_now(&self, key: &str) -> Result<Value> {
        let descriptor =
            registers::find(key).ok_or_else(|| Error::UnknownRegister(key.to_string()))?;
        let raw = {
            let mut client = self.client.lock().await;
            client
                .read_register(descriptor.bank, descriptor.address, self.unit_id)
                .await?
        };
        Ok(descriptor.apply(raw))
    }

    /// Best-effort fresh read of the entire catalog, including registers
    /// the poll cycle skips.
    ///
    /// Keys are prefixed with their bank. Input values are scaled, holding
    /// values stay raw so the dump shows what would be written back.
    /// Registers that fail to read are left out.
    pub async fn read_all(&self) -> Result<BTreeMap<String, Value>> {
        {
            let mut client = self.client.lock().await;
            client.connect().await?;
        }

        let mut dump = BTreeMap::new();
        for descriptor in registers::CATALOG {
            let result = {
                let mut client = self.client.lock().await;
                client
                    .read_register(descriptor.bank, descriptor.address, self.unit_id)
                    .await
            };
            match result {
                Ok(raw) => {
                    let value = match descriptor.bank {
                        Bank::Input => descriptor.apply(raw),
                        Bank::Holding => Value::from(raw),
                    };
                    dump.insert(
                        format!("{}_{}", descriptor.bank.as_str(), descriptor.key),
                        value,
                    );
                }
                Err(e) => {
                    debug!(register = descriptor.key, error = %e, "diagnostic read failed");
                }
            }
        }
        Ok(dump)
    }

    /// Check the link: open the port and read the device type register.
    pub async fn probe(&self) -> Result<i16> {
        let descriptor = registers::find(keys::DEVICE_TYPE)
            .ok_or_else(|| Error::UnknownRegister(keys::DEVICE_TYPE.to_string()))?;
        let mut client = self.client.lock().await;
        client.connect().await?;
        client
            .read_register(descriptor.bank, descriptor.address, self.unit_id)
            .await
    }
}

fn lookup_writable(key: &str) -> Result<&'static RegisterDescriptor> {
    let descriptor =
        registers::find(key).ok_or_else(|| Error::UnknownRegister(key.to_string()))?;
    if !descriptor.writable() {
        return Err(Error::NotWritable(descriptor.key));
    }
    Ok(descriptor)
}

fn validate_bounds(descriptor: &RegisterDescriptor, value: i16) -> Result<()> {
    if let Some((min, max)) = descriptor.bounds {
        if value < min || value > max {
            return Err(Error::OutOfRange {
                key: descriptor.key,
                value,
                min,
                max,
            });
        }
    }
    Ok(())
}
