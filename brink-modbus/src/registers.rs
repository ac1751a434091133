//! Register catalog for the Brink FLAIR Modbus memory map.
//!
//! The catalog is the single source of truth for addressing, scaling, write
//! bounds and presentation. Consumers iterate it instead of hard-coding
//! per-register logic; adding a register means adding one entry here.

use crate::snapshot::Value;

/// Modbus register bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    /// Input registers (read-only, function code 04).
    Input,
    /// Holding registers (read/write, function codes 03/06).
    Holding,
}

impl Bank {
    /// Return the string name for this bank.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bank::Input => "input",
            Bank::Holding => "holding",
        }
    }
}

impl std::fmt::Display for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a register value is presented to people.
///
/// The engine itself only moves numbers; presentation metadata rides along
/// so frontends can render and parse values without per-register code.
#[derive(Debug, Clone, Copy)]
pub enum ValueKind {
    /// Plain quantity, with an optional unit of measurement.
    Numeric { unit: Option<&'static str> },
    /// Enumerated state with display labels.
    Enum {
        labels: &'static [(i16, &'static str)],
    },
    /// On/off flag stored as 0/1.
    Boolean,
}

impl ValueKind {
    /// Display label for a raw value, when this kind defines one.
    pub fn label_for(&self, raw: i16) -> Option<&'static str> {
        match self {
            ValueKind::Enum { labels } => labels
                .iter()
                .find(|(value, _)| *value == raw)
                .map(|(_, label)| *label),
            _ => None,
        }
    }

    /// Reverse label lookup, case-insensitive.
    pub fn raw_for_label(&self, label: &str) -> Option<i16> {
        match self {
            ValueKind::Enum { labels } => labels
                .iter()
                .find(|(_, candidate)| candidate.eq_ignore_ascii_case(label))
                .map(|(value, _)| *value),
            _ => None,
        }
    }
}

/// Write precondition: the mode register must hold a value before the
/// dependent register accepts writes.
#[derive(Debug, Clone, Copy)]
pub struct Guard {
    /// Catalog key of the mode register.
    pub mode_key: &'static str,
    /// Value the mode register must hold.
    pub required: i16,
}

/// One entry in the device memory map.
#[derive(Debug, Clone, Copy)]
pub struct RegisterDescriptor {
    /// Stable lookup key.
    pub key: &'static str,
    /// Register address on the bus.
    pub address: u16,
    /// Which bank the address lives in.
    pub bank: Bank,
    /// Multiplier applied exactly once at read time.
    pub scale: Option<f64>,
    /// Inclusive writable range, on registers that accept writes.
    pub bounds: Option<(i16, i16)>,
    /// Presentation metadata.
    pub kind: ValueKind,
    /// Whether the poll cycle reads this register.
    pub polled: bool,
    /// Mode precondition for writes.
    pub precondition: Option<Guard>,
}

impl RegisterDescriptor {
    /// An input register, polled by default.
    const fn input(key: &'static str, address: u16) -> Self {
        Self {
            key,
            address,
            bank: Bank::Input,
            scale: None,
            bounds: None,
            kind: ValueKind::Numeric { unit: None },
            polled: true,
            precondition: None,
        }
    }

    /// A holding register with its writable range, polled by default.
    const fn holding(key: &'static str, address: u16, min: i16, max: i16) -> Self {
        Self {
            key,
            address,
            bank: Bank::Holding,
            scale: None,
            bounds: Some((min, max)),
            kind: ValueKind::Numeric { unit: None },
            polled: true,
            precondition: None,
        }
    }

    const fn unit(mut self, unit: &'static str) -> Self {
        self.kind = ValueKind::Numeric { unit: Some(unit) };
        self
    }

    const fn scaled(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    const fn enumerated(mut self, labels: &'static [(i16, &'static str)]) -> Self {
        self.kind = ValueKind::Enum { labels };
        self
    }

    const fn boolean(mut self) -> Self {
        self.kind = ValueKind::Boolean;
        self
    }

    const fn unpolled(mut self) -> Self {
        self.polled = false;
        self
    }

    const fn requires(mut self, mode_key: &'static str, required: i16) -> Self {
        self.precondition = Some(Guard { mode_key, required });
        self
    }

    /// Apply read-time scaling to a raw reading.
    ///
    /// Scaling happens exactly once, here. Snapshot values are ready to use.
    pub fn apply(&self, raw: i16) -> Value {
        match self.scale {
            Some(scale) => Value::Float(f64::from(raw) * scale),
            None => Value::Integer(i64::from(raw)),
        }
    }

    /// Whether this register accepts writes at all.
    pub fn writable(&self) -> bool {
        self.bank == Bank::Holding
    }
}

/// Bypass valve state as reported by the unit.
pub const BYPASS_STATE_LABELS: &[(i16, &'static str)] = &[
    (0, "Initializing"),
    (1, "Open"),
    (2, "Closed"),
    (3, "Open"),
    (4, "Closed"),
    (255, "Error"),
];

/// Filter condition flag.
pub const FILTER_STATE_LABELS: &[(i16, &'static str)] = &[(0, "Clean"), (1, "Dirty")];

/// Preheater activity.
pub const PREHEATER_STATE_LABELS: &[(i16, &'static str)] =
    &[(0, "Off"), (1, "Starting"), (2, "Active")];

/// Requested bypass behavior.
pub const BYPASS_MODE_LABELS: &[(i16, &'static str)] =
    &[(0, "Automatic"), (1, "Closed"), (2, "Open")];

/// Ventilation level selector. Position 4 is reported when the unit is under
/// manual control and cannot be requested over the bus.
pub const POWER_SWITCH_LABELS: &[(i16, &'static str)] = &[
    (0, "Absence"),
    (1, "Low"),
    (2, "Normal"),
    (3, "High"),
    (4, "Manual"),
];

/// `modbus_control` value that disables bus control.
pub const CONTROL_MODE_DISABLED: i16 = 0;
/// `modbus_control` value that enables the power switch selector.
pub const CONTROL_MODE_SWITCH: i16 = 1;
/// `modbus_control` value that enables direct flow setpoints.
pub const CONTROL_MODE_FLOW: i16 = 2;

/// Who is allowed to steer the unit.
pub const CONTROL_MODE_LABELS: &[(i16, &'static str)] = &[
    (CONTROL_MODE_DISABLED, "Disabled"),
    (CONTROL_MODE_SWITCH, "Switch Control"),
    (CONTROL_MODE_FLOW, "Flow Control"),
];

/// Complete register catalog, in memory-map order.
pub static CATALOG: &[RegisterDescriptor] = &[
    // System identity
    RegisterDescriptor::input("device_type", 4004),
    RegisterDescriptor::input("serial_number_1", 4010),
    RegisterDescriptor::input("serial_number_2", 4011),
    RegisterDescriptor::input("software_version", 4012),
    // Pressures
    RegisterDescriptor::input("supply_pressure", 4023).scaled(0.1).unit("Pa"),
    RegisterDescriptor::input("exhaust_pressure", 4024).scaled(0.1).unit("Pa"),
    // Supply side
    RegisterDescriptor::input("supply_volume_setpoint", 4031).unit("m³/h"),
    RegisterDescriptor::input("supply_volume_actual", 4032).unit("m³/h"),
    RegisterDescriptor::input("supply_fan_rpm", 4034).unit("RPM"),
    RegisterDescriptor::input("supply_air_temperature", 4036).scaled(0.1).unit("°C"),
    RegisterDescriptor::input("supply_air_humidity", 4037).unit("%"),
    // Exhaust side
    RegisterDescriptor::input("exhaust_volume_setpoint", 4041).unit("m³/h"),
    RegisterDescriptor::input("exhaust_volume_actual", 4042).unit("m³/h"),
    RegisterDescriptor::input("exhaust_fan_rpm", 4044).unit("RPM"),
    RegisterDescriptor::input("exhaust_air_temperature", 4046).scaled(0.1).unit("°C"),
    RegisterDescriptor::input("exhaust_air_humidity", 4047).unit("%"),
    // Unit status
    RegisterDescriptor::input("bypass_state", 4050).enumerated(BYPASS_STATE_LABELS),
    RegisterDescriptor::input("preheater_state", 4060).enumerated(PREHEATER_STATE_LABELS),
    RegisterDescriptor::input("preheater_power", 4061).unit("%"),
    RegisterDescriptor::input("outside_temperature", 4081).scaled(0.1).unit("°C"),
    RegisterDescriptor::input("filter_state", 4100).enumerated(FILTER_STATE_LABELS),
    RegisterDescriptor::input("filter_usage_hours", 4115).unit("h"),
    // CO2 sensors (only populated on units that have them)
    RegisterDescriptor::input("co2_sensor_1", 4201).unit("ppm"),
    RegisterDescriptor::input("co2_sensor_2", 4203).unit("ppm"),
    RegisterDescriptor::input("co2_sensor_3", 4205).unit("ppm"),
    RegisterDescriptor::input("co2_sensor_4", 4207).unit("ppm"),
    // Flow presets per switch position
    RegisterDescriptor::holding("flow_level_0_absence", 6000, 0, 325).unit("m³/h"),
    RegisterDescriptor::holding("flow_level_1_low", 6001, 0, 325).unit("m³/h"),
    RegisterDescriptor::holding("flow_level_2_normal", 6002, 0, 325).unit("m³/h"),
    RegisterDescriptor::holding("flow_level_3_high", 6003, 0, 325).unit("m³/h"),
    // Imbalance settings
    RegisterDescriptor::holding("imbalance_allowed", 6033, 0, 1).boolean(),
    RegisterDescriptor::holding("supply_imbalance_offset", 6035, -15, 15).unit("%"),
    RegisterDescriptor::holding("exhaust_imbalance_offset", 6036, -15, 15).unit("%"),
    // Bypass and sensors
    RegisterDescriptor::holding("bypass_mode_setting", 6100, 0, 2).enumerated(BYPASS_MODE_LABELS),
    RegisterDescriptor::holding("co2_sensor_mode", 6150, 0, 1).boolean(),
    // Geo heat exchanger
    RegisterDescriptor::holding("geo_heat_exchanger", 6240, 0, 1).boolean(),
    RegisterDescriptor::holding("geo_min_temperature", 6241, 0, 100).unit("°C"),
    RegisterDescriptor::holding("geo_max_temperature", 6242, 150, 400).unit("°C"),
    // Bus and control. The slave address is only touched during commissioning
    // and the reset register is write-only in practice, so neither is polled.
    RegisterDescriptor::holding("slave_address", 7991, 1, 247).unpolled(),
    RegisterDescriptor::holding("modbus_control", 8000, 0, 2).enumerated(CONTROL_MODE_LABELS),
    RegisterDescriptor::holding("power_switch_position", 8001, 0, 3)
        .enumerated(POWER_SWITCH_LABELS)
        .requires(keys::MODBUS_CONTROL, CONTROL_MODE_SWITCH),
    RegisterDescriptor::holding("flow_setpoint", 8002, 50, 325)
        .unit("m³/h")
        .requires(keys::MODBUS_CONTROL, CONTROL_MODE_FLOW),
    RegisterDescriptor::holding("device_reset", 8011, 0, 1).unpolled(),
];

/// Catalog keys referenced from code.
pub mod keys {
    pub const DEVICE_TYPE: &str = "device_type";
    pub const SERIAL_NUMBER_1: &str = "serial_number_1";
    pub const SERIAL_NUMBER_2: &str = "serial_number_2";
    pub const SOFTWARE_VERSION: &str = "software_version";
    pub const BYPASS_MODE_SETTING: &str = "bypass_mode_setting";
    pub const MODBUS_CONTROL: &str = "modbus_control";
    pub const POWER_SWITCH_POSITION: &str = "power_switch_position";
    pub const FLOW_SETPOINT: &str = "flow_setpoint";
    pub const DEVICE_RESET: &str = "device_reset";
}

/// Look up a descriptor by key.
pub fn find(key: &str) -> Option<&'static RegisterDescriptor> {
    CATALOG.iter().find(|descriptor| descriptor.key == key)
}

/// Descriptors read by the regular poll cycle.
pub fn polled() -> impl Iterator<Item = &'static RegisterDescriptor> {
    CATALOG.iter().filter(|descriptor| descriptor.polled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_keys_unique() {
        let mut seen = HashSet::new();
        for descriptor in CATALOG {
            assert!(seen.insert(descriptor.key), "duplicate key {}", descriptor.key);
        }
    }

    #[test]
    fn test_catalog_addresses_unique_per_bank() {
        let mut seen = HashSet::new();
        for descriptor in CATALOG {
            assert!(
                seen.insert((descriptor.bank, descriptor.address)),
                "duplicate address {} in {} bank",
                descriptor.address,
                descriptor.bank
            );
        }
    }

    #[test]
    fn test_holding_registers_have_bounds() {
        for descriptor in CATALOG {
            if descriptor.bank == Bank::Holding {
                assert!(descriptor.bounds.is_some(), "{} has no bounds", descriptor.key);
            }
        }
    }

    #[test]
    fn test_guards_reference_valid_mode_registers() {
        for descriptor in CATALOG {
            let Some(guard) = descriptor.precondition else {
                continue;
            };
            let mode = find(guard.mode_key).expect("guard references unknown key");
            assert_eq!(mode.bank, Bank::Holding);
            assert!(mode.polled, "mode register {} must be polled", mode.key);
            let (min, max) = mode.bounds.expect("mode register has no bounds");
            assert!(guard.required >= min && guard.required <= max);
        }
    }

    #[test]
    fn test_code_referenced_keys_exist() {
        for key in [
            keys::DEVICE_TYPE,
            keys::SERIAL_NUMBER_1,
            keys::SERIAL_NUMBER_2,
            keys::SOFTWARE_VERSION,
            keys::BYPASS_MODE_SETTING,
            keys::MODBUS_CONTROL,
            keys::POWER_SWITCH_POSITION,
            keys::FLOW_SETPOINT,
            keys::DEVICE_RESET,
        ] {
            assert!(find(key).is_some(), "missing catalog entry for {}", key);
        }
    }

    #[test]
    fn test_scaling_applied_exactly_once() {
        let pressure = find("supply_pressure").unwrap();
        match pressure.apply(153) {
            Value::Float(v) => assert!((v - 15.3).abs() < 1e-9),
            other => panic!("expected float, got {:?}", other),
        }

        // Negative readings keep their sign through scaling.
        let temperature = find("outside_temperature").unwrap();
        match temperature.apply(-52) {
            Value::Float(v) => assert!((v + 5.2).abs() < 1e-9),
            other => panic!("expected float, got {:?}", other),
        }

        let rpm = find("supply_fan_rpm").unwrap();
        assert_eq!(rpm.apply(1450), Value::Integer(1450));
    }

    #[test]
    fn test_find_flow_setpoint() {
        let descriptor = find("flow_setpoint").unwrap();
        assert_eq!(descriptor.address, 8002);
        assert_eq!(descriptor.bank, Bank::Holding);
        assert_eq!(descriptor.bounds, Some((50, 325)));
        let guard = descriptor.precondition.unwrap();
        assert_eq!(guard.mode_key, "modbus_control");
        assert_eq!(guard.required, CONTROL_MODE_FLOW);

        assert!(find("does_not_exist").is_none());
    }

    #[test]
    fn test_maintenance_registers_not_polled() {
        let polled_keys: HashSet<&str> = polled().map(|d| d.key).collect();
        assert!(!polled_keys.contains("slave_address"));
        assert!(!polled_keys.contains("device_reset"));
        assert_eq!(polled_keys.len(), CATALOG.len() - 2);
    }

    #[test]
    fn test_label_lookup() {
        let bypass = find("bypass_mode_setting").unwrap();
        assert_eq!(bypass.kind.label_for(2), Some("Open"));
        assert_eq!(bypass.kind.raw_for_label("open"), Some(2));
        assert_eq!(bypass.kind.raw_for_label("AUTOMATIC"), Some(0));
        assert_eq!(bypass.kind.label_for(99), None);

        let state = find("bypass_state").unwrap();
        assert_eq!(state.kind.label_for(255), Some("Error"));

        let control = find("modbus_control").unwrap();
        assert_eq!(control.kind.label_for(CONTROL_MODE_DISABLED), Some("Disabled"));
        assert_eq!(
            control.kind.raw_for_label("flow control"),
            Some(CONTROL_MODE_FLOW)
        );

        let rpm = find("supply_fan_rpm").unwrap();
        assert_eq!(rpm.kind.label_for(1), None);
    }
}
