//! Value rendering and operator input parsing over the register catalog.
//!
//! Everything here is driven by the descriptor's [`ValueKind`], so new
//! registers render and parse correctly without any code changes.

use anyhow::{Result, anyhow, bail};
use brink_modbus::{RegisterDescriptor, Value, ValueKind};

/// Format a value for display using the descriptor's presentation kind.
pub fn format_value(descriptor: &RegisterDescriptor, value: Value) -> String {
    match descriptor.kind {
        ValueKind::Numeric { unit: Some(unit) } => format!("{value} {unit}"),
        ValueKind::Numeric { unit: None } => value.to_string(),
        ValueKind::Enum { .. } => {
            match value.as_i16().and_then(|raw| descriptor.kind.label_for(raw)) {
                Some(label) => format!("{label} ({value})"),
                None => format!("{value} (unknown state)"),
            }
        }
        ValueKind::Boolean => match value.as_i16() {
            Some(0) => "off".to_string(),
            Some(_) => "on".to_string(),
            None => value.to_string(),
        },
    }
}

/// Parse operator input for a register: a plain number, a state label, or
/// an on/off word.
pub fn parse_input(descriptor: &RegisterDescriptor, input: &str) -> Result<i16> {
    let input = input.trim();
    if let Ok(value) = input.parse::<i16>() {
        return Ok(value);
    }

    match descriptor.kind {
        ValueKind::Enum { labels } => descriptor.kind.raw_for_label(input).ok_or_else(|| {
            let options: Vec<&str> = labels.iter().map(|(_, label)| *label).collect();
            anyhow!(
                "'{}' is not a valid state for {} (expected one of: {})",
                input,
                descriptor.key,
                options.join(", ")
            )
        }),
        ValueKind::Boolean => match input.to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" => Ok(1),
            "off" | "false" | "no" => Ok(0),
            _ => bail!(
                "'{}' is not a valid value for {} (use on or off)",
                input,
                descriptor.key
            ),
        },
        ValueKind::Numeric { .. } => {
            bail!("'{}' is not a number (required for {})", input, descriptor.key)
        }
    }
}
