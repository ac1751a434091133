//! brinkctl - monitor and control a Brink HRU ventilation unit over
//! Modbus RTU.

mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use brink_modbus::registers::{self, keys};
use brink_modbus::{Config, Device, LoggingConfig, Snapshot, init_tracing};

#[derive(Parser, Debug)]
#[command(
    name = "brinkctl",
    about = "Monitor and control a Brink HRU ventilation unit over Modbus RTU",
    version
)]
struct Args {
    /// Path to the configuration file (JSON5)
    #[arg(short, long, default_value = "brink.json5")]
    config: PathBuf,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll continuously and print each fresh snapshot until interrupted
    Watch,
    /// Read one register fresh off the bus
    Get {
        /// Catalog key, e.g. "supply_air_temperature"
        key: String,
    },
    /// Write one holding register
    Set {
        /// Catalog key, e.g. "bypass_mode_setting"
        key: String,
        /// Value to write: a number, a state label, or on/off
        value: String,
    },
    /// Set the flow setpoint in m³/h (arms flow control mode if needed)
    Flow {
        /// Target flow, 50-325 m³/h
        setpoint: i16,
    },
    /// Select the power switch position (arms switch control mode if needed)
    Power {
        /// absence, low, normal or high (or 0-3)
        position: String,
    },
    /// Select the bypass mode
    Bypass {
        /// automatic, closed or open (or 0-2)
        mode: String,
    },
    /// Trigger a device reset
    Reset,
    /// Read every catalog register and print the dump as JSON
    Dump,
    /// Open the port and read the device type register
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let logging = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
    };
    init_tracing(&logging)?;

    let device = Device::from_config(&config);

    match args.command {
        Command::Watch => watch(&device, &config).await,
        Command::Get { key } => get(&device, &key).await,
        Command::Set { key, value } => set(&device, &key, &value).await,
        Command::Flow { setpoint } => flow(&device, setpoint).await,
        Command::Power { position } => power(&device, &position).await,
        Command::Bypass { mode } => bypass(&device, &mode).await,
        Command::Reset => reset(&device).await,
        Command::Dump => dump(&device).await,
        Command::Probe => probe(&device, &config).await,
    }
}

async fn watch(device: &Device, config: &Config) -> Result<()> {
    info!(
        model = %config.model,
        port = %config.link.port,
        unit = config.link.unit_id,
        "watching unit, press Ctrl-C to stop"
    );

    let mut seen = device.snapshot().taken_at();
    let handle = device.start();

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let snapshot = device.snapshot();
                if snapshot.taken_at() != seen {
                    seen = snapshot.taken_at();
                    print_snapshot(&snapshot);
                }
            }
        }
    }

    device.shutdown();
    handle.await?;
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("--- {} ---", snapshot.taken_at().format("%Y-%m-%d %H:%M:%S"));
    if snapshot.is_empty() {
        println!("(no data: poll cycle failed)");
        return;
    }
    for descriptor in registers::polled() {
        if let Some(value) = snapshot.get(descriptor.key) {
            println!(
                "{:<26} {}",
                descriptor.key,
                render::format_value(descriptor, value)
            );
        }
    }
}

async fn get(device: &Device, key: &str) -> Result<()> {
    let descriptor = registers::find(key).ok_or_else(|| anyhow!("unknown register '{key}'"))?;
    let value = device.read_now(key).await?;
    println!("{}", render::format_value(descriptor, value));
    Ok(())
}

async fn set(device: &Device, key: &str, value: &str) -> Result<()> {
    let descriptor = registers::find(key).ok_or_else(|| anyhow!("unknown register '{key}'"))?;
    let raw = render::parse_input(descriptor, value)?;

    if device.write(key, raw).await? {
        println!("{key} = {raw}");
        Ok(())
    } else {
        bail!("the unit refused the write to {key}");
    }
}

async fn flow(device: &Device, setpoint: i16) -> Result<()> {
    if device.set_flow_setpoint(setpoint).await? {
        println!("flow setpoint = {setpoint} m³/h");
        Ok(())
    } else {
        bail!("the unit refused the flow setpoint");
    }
}

async fn power(device: &Device, position: &str) -> Result<()> {
    let descriptor = registers::find(keys::POWER_SWITCH_POSITION)
        .ok_or_else(|| anyhow!("catalog is missing the power switch register"))?;
    let raw = render::parse_input(descriptor, position)?;

    if device.set_power_mode(raw).await? {
        let label = descriptor.kind.label_for(raw).unwrap_or("?");
        println!("power switch position = {label} ({raw})");
        Ok(())
    } else {
        bail!("the unit refused the power switch change");
    }
}

async fn bypass(device: &Device, mode: &str) -> Result<()> {
    let descriptor = registers::find(keys::BYPASS_MODE_SETTING)
        .ok_or_else(|| anyhow!("catalog is missing the bypass mode register"))?;
    let raw = render::parse_input(descriptor, mode)?;

    if device.set_bypass_mode(raw).await? {
        let label = descriptor.kind.label_for(raw).unwrap_or("?");
        println!("bypass mode = {label} ({raw})");
        Ok(())
    } else {
        bail!("the unit refused the bypass mode change");
    }
}

async fn reset(device: &Device) -> Result<()> {
    if device.reset_device().await? {
        println!("reset triggered");
        Ok(())
    } else {
        bail!("the unit refused the reset");
    }
}

async fn dump(device: &Device) -> Result<()> {
    let values = device.read_all().await?;
    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}

async fn probe(device: &Device, config: &Config) -> Result<()> {
    let device_type = device.probe().await?;
    println!(
        "{} on {} answers as unit {} (device type {})",
        config.model, config.link.port, config.link.unit_id, device_type
    );
    if let Ok(serial) = device.read_now(keys::SERIAL_NUMBER_1).await {
        println!("serial number {serial}");
    }
    Ok(())
}
