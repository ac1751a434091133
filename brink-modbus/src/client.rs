//! Serial Modbus RTU transport.
//!
//! [`RtuClient`] owns the port handle and wraps every bus operation in the
//! retry and timeout envelope. Everything above it talks through the
//! [`ModbusTransport`] trait, so the engine can be driven by a scripted
//! transport in tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_modbus::client::{Client as _, Context, Reader, Writer, rtu};
use tokio_modbus::slave::{Slave, SlaveContext as _};
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};
use tracing::{debug, warn};

use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::registers::Bank;

/// Single-register Modbus operations.
#[async_trait]
pub trait ModbusTransport: Send {
    /// Ensure the link is up. Cheap when already connected.
    async fn connect(&mut self) -> Result<()>;

    /// Whether the link is currently up.
    fn connected(&self) -> bool;

    /// Read one register and sign-extend it.
    async fn read_register(&mut self, bank: Bank, address: u16, unit_id: u8) -> Result<i16>;

    /// Write one register. `Ok(false)` means the device refused the request
    /// at the protocol level.
    async fn write_register(&mut self, address: u16, value: u16, unit_id: u8) -> Result<bool>;

    /// Close the link. Close errors are logged, not surfaced.
    async fn disconnect(&mut self);
}

/// Modbus RTU client for a single serial link.
///
/// The unit id travels with every call instead of being fixed at connect
/// time, so one link could address several units on the same bus.
pub struct RtuClient {
    link: LinkConfig,
    read_timeout: Duration,
    retries: u32,
    ctx: Option<Context>,
}

impl RtuClient {
    /// Create a client for the given link. No I/O happens until the first
    /// operation.
    pub fn new(link: LinkConfig, read_timeout: Duration, retries: u32) -> Self {
        Self {
            link,
            read_timeout,
            retries,
            ctx: None,
        }
    }

    fn open_port(&self) -> Result<Context> {
        let builder = tokio_serial::new(&self.link.port, self.link.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::One);

        let serial = SerialStream::open(&builder).map_err(|e| {
            Error::Connection(format!("Failed to open {}: {}", self.link.port, e))
        })?;

        Ok(rtu::attach_slave(serial, Slave(self.link.unit_id)))
    }

    // A late reply after a timeout or framing fault would desynchronize the
    // next exchange, so the port is reopened rather than reused.
    fn drop_link(&mut self) {
        self.ctx = None;
    }
}

#[async_trait]
impl ModbusTransport for RtuClient {
    async fn connect(&mut self) -> Result<()> {
        if self.ctx.is_some() {
            return Ok(());
        }

        let ctx = self.open_port()?;
        debug!(
            port = %self.link.port,
            baud = self.link.baud_rate,
            unit = self.link.unit_id,
            "serial link opened"
        );
        self.ctx = Some(ctx);
        Ok(())
    }

    fn connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn read_register(&mut self, bank: Bank, address: u16, unit_id: u8) -> Result<i16> {
        let mut last_error = String::new();

        for attempt in 1..=self.retries {
            self.connect().await?;
            let Some(ctx) = self.ctx.as_mut() else {
                return Err(Error::connection("Serial context missing after connect"));
            };

            ctx.set_slave(Slave(unit_id));
            let outcome = match bank {
                Bank::Input => {
                    timeout(self.read_timeout, ctx.read_input_registers(address, 1)).await
                }
                Bank::Holding => {
                    timeout(self.read_timeout, ctx.read_holding_registers(address, 1)).await
                }
            };

            match outcome {
                Ok(Ok(Ok(words))) => {
                    if let Some(&word) = words.first() {
                        return Ok(word as i16);
                    }
                    last_error = "Empty response".to_string();
                    warn!(address, attempt, "empty register response");
                    self.drop_link();
                }
                // An exception response is a definitive refusal; retrying
                // will not change it.
                Ok(Ok(Err(exception))) => {
                    return Err(Error::read(address, format!("Exception: {:?}", exception)));
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(address, attempt, error = %last_error, "read transport error");
                    self.drop_link();
                }
                Err(_) => {
                    last_error = format!("Timeout after {:?}", self.read_timeout);
                    warn!(address, attempt, "read timed out");
                    self.drop_link();
                }
            }
        }

        Err(Error::Read {
            address,
            reason: last_error,
        })
    }

    async fn write_register(&mut self, address: u16, value: u16, unit_id: u8) -> Result<bool> {
        let mut last_error = String::new();

        for attempt in 1..=self.retries {
            self.connect().await?;
            let Some(ctx) = self.ctx.as_mut() else {
                return Err(Error::connection("Serial context missing after connect"));
            };

            ctx.set_slave(Slave(unit_id));
            match timeout(self.read_timeout, ctx.write_single_register(address, value)).await {
                Ok(Ok(Ok(()))) => return Ok(true),
                Ok(Ok(Err(exception))) => {
                    warn!(address, value, error = ?exception, "write refused by device");
                    return Ok(false);
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(address, attempt, error = %last_error, "write transport error");
                    self.drop_link();
                }
                Err(_) => {
                    last_error = format!("Timeout after {:?}", self.read_timeout);
                    warn!(address, attempt, "write timed out");
                    self.drop_link();
                }
            }
        }

        Err(Error::Write {
            address,
            reason: last_error,
        })
    }

    async fn disconnect(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.disconnect().await {
                debug!(error = %e, "error closing serial link");
            }
        }
    }
}
