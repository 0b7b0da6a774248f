//! OBD-II PID Definitions
//!
//! PID codes are scoped by mode: `00` means "PIDs supported" in mode 01 but
//! "read trouble codes" in mode 03. Every PID is registered once, keyed by
//! `(mode, code)`, and looked up through [`Pid::parse`].

use crate::error::ObdError;
use crate::mode::Mode;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::mode::Mode::{ClearTroubleCodes, CurrentData, Diagnostic, FreezeFrameData, VehicleInfo};

const LIVE: &[Mode] = &[CurrentData, FreezeFrameData];

/// A parameter identifier together with the modes it may be requested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid {
    code: u8,
    name: &'static str,
    modes: &'static [Mode],
}

impl Pid {
    /// Bitmap of supported PIDs 01-20
    pub const PIDS_SUPPORTED: Pid = Pid::new(0x00, "pids_supported", &[CurrentData]);
    /// Stored trouble codes
    pub const DIAGNOSTIC_CODES: Pid = Pid::new(0x00, "diagnostic_codes", &[Diagnostic]);
    /// Clear trouble codes
    pub const CLEAR_TROUBLE_CODES: Pid = Pid::new(0x00, "clear_trouble_codes", &[ClearTroubleCodes]);
    /// Monitor status since DTCs cleared
    pub const MONITOR_STATUS: Pid = Pid::new(0x01, "monitor_status", LIVE);
    /// Number of messages carrying the VIN
    pub const VIN_MESSAGE_COUNT: Pid = Pid::new(0x01, "vin_message_count", &[VehicleInfo]);
    /// Vehicle identification number
    pub const VIN: Pid = Pid::new(0x02, "vin", &[VehicleInfo]);
    /// Fuel system status
    pub const FUEL_STATUS: Pid = Pid::new(0x03, "fuel_status", LIVE);
    /// Calculated engine load
    pub const ENGINE_LOAD: Pid = Pid::new(0x04, "engine_load", LIVE);
    /// Engine coolant temperature
    pub const ENGINE_COOLANT_TEMPERATURE: Pid = Pid::new(0x05, "engine_coolant_temperature", LIVE);
    /// Short term fuel trim, bank 1
    pub const FUEL_TRIM_SHORT_BANK1: Pid = Pid::new(0x06, "fuel_trim_short_bank1", LIVE);
    /// Long term fuel trim, bank 1
    pub const FUEL_TRIM_LONG_BANK1: Pid = Pid::new(0x07, "fuel_trim_long_bank1", LIVE);
    /// Short term fuel trim, bank 2
    pub const FUEL_TRIM_SHORT_BANK2: Pid = Pid::new(0x08, "fuel_trim_short_bank2", LIVE);
    /// Long term fuel trim, bank 2
    pub const FUEL_TRIM_LONG_BANK2: Pid = Pid::new(0x09, "fuel_trim_long_bank2", LIVE);
    /// Intake air temperature
    pub const INTAKE_AIR_TEMPERATURE: Pid = Pid::new(0x0F, "intake_air_temperature", LIVE);
    /// Commanded secondary air status
    pub const SECONDARY_AIR_STATUS: Pid = Pid::new(0x12, "secondary_air_status", LIVE);
    /// OBD standards this vehicle conforms to
    pub const ECU_COMPATIBILITY: Pid = Pid::new(0x1C, "ecu_compatibility", &[CurrentData]);
    /// Distance traveled with malfunction indicator lamp on
    pub const DISTANCE_WITH_MALFUNCTION: Pid = Pid::new(0x21, "distance_with_malfunction", LIVE);
    /// Commanded EGR
    pub const COMMANDED_EGR: Pid = Pid::new(0x2C, "commanded_egr", LIVE);
    /// EGR error
    pub const EGR_ERROR: Pid = Pid::new(0x2D, "egr_error", LIVE);
    /// Fuel tank level input
    pub const FUEL_LEVEL_INPUT: Pid = Pid::new(0x2F, "fuel_level_input", LIVE);
    /// Distance traveled since codes cleared
    pub const DISTANCE_SINCE_CODES_CLEARED: Pid = Pid::new(0x31, "distance_since_codes_cleared", LIVE);
    /// Catalyst temperature, bank 1 sensor 1
    pub const CATALYST_TEMPERATURE_BANK1_SENSOR1: Pid =
        Pid::new(0x3C, "catalyst_temperature_bank1_sensor1", LIVE);
    /// Catalyst temperature, bank 2 sensor 1
    pub const CATALYST_TEMPERATURE_BANK2_SENSOR1: Pid =
        Pid::new(0x3D, "catalyst_temperature_bank2_sensor1", LIVE);
    /// Catalyst temperature, bank 1 sensor 2
    pub const CATALYST_TEMPERATURE_BANK1_SENSOR2: Pid =
        Pid::new(0x3E, "catalyst_temperature_bank1_sensor2", LIVE);
    /// Catalyst temperature, bank 2 sensor 2
    pub const CATALYST_TEMPERATURE_BANK2_SENSOR2: Pid =
        Pid::new(0x3F, "catalyst_temperature_bank2_sensor2", LIVE);
    /// Ambient air temperature
    pub const AMBIENT_AIR_TEMPERATURE: Pid = Pid::new(0x46, "ambient_air_temperature", LIVE);
    /// Ethanol fuel percentage
    pub const ETHANOL_FUEL: Pid = Pid::new(0x52, "ethanol_fuel", LIVE);
    /// Engine oil temperature
    pub const ENGINE_OIL_TEMPERATURE: Pid = Pid::new(0x5C, "engine_oil_temperature", LIVE);
    /// Fuel injection timing
    pub const FUEL_INJECTION_TIMING: Pid = Pid::new(0x5D, "fuel_injection_timing", LIVE);
    /// Engine fuel rate
    pub const FUEL_RATE: Pid = Pid::new(0x5E, "fuel_rate", LIVE);
    /// Intake air temperature sensor
    pub const INTAKE_AIR_TEMPERATURE_SENSOR: Pid =
        Pid::new(0x68, "intake_air_temperature_sensor", LIVE);
    /// Exhaust gas recirculation temperature
    pub const EGR_TEMPERATURE: Pid = Pid::new(0x6B, "egr_temperature", LIVE);
    /// Manifold surface temperature
    pub const MANIFOLD_SURFACE_TEMPERATURE: Pid =
        Pid::new(0x84, "manifold_surface_temperature", LIVE);

    const REGISTERED: [Pid; 33] = [
        Pid::PIDS_SUPPORTED,
        Pid::DIAGNOSTIC_CODES,
        Pid::CLEAR_TROUBLE_CODES,
        Pid::MONITOR_STATUS,
        Pid::VIN_MESSAGE_COUNT,
        Pid::VIN,
        Pid::FUEL_STATUS,
        Pid::ENGINE_LOAD,
        Pid::ENGINE_COOLANT_TEMPERATURE,
        Pid::FUEL_TRIM_SHORT_BANK1,
        Pid::FUEL_TRIM_LONG_BANK1,
        Pid::FUEL_TRIM_SHORT_BANK2,
        Pid::FUEL_TRIM_LONG_BANK2,
        Pid::INTAKE_AIR_TEMPERATURE,
        Pid::SECONDARY_AIR_STATUS,
        Pid::ECU_COMPATIBILITY,
        Pid::DISTANCE_WITH_MALFUNCTION,
        Pid::COMMANDED_EGR,
        Pid::EGR_ERROR,
        Pid::FUEL_LEVEL_INPUT,
        Pid::DISTANCE_SINCE_CODES_CLEARED,
        Pid::CATALYST_TEMPERATURE_BANK1_SENSOR1,
        Pid::CATALYST_TEMPERATURE_BANK2_SENSOR1,
        Pid::CATALYST_TEMPERATURE_BANK1_SENSOR2,
        Pid::CATALYST_TEMPERATURE_BANK2_SENSOR2,
        Pid::AMBIENT_AIR_TEMPERATURE,
        Pid::ETHANOL_FUEL,
        Pid::ENGINE_OIL_TEMPERATURE,
        Pid::FUEL_INJECTION_TIMING,
        Pid::FUEL_RATE,
        Pid::INTAKE_AIR_TEMPERATURE_SENSOR,
        Pid::EGR_TEMPERATURE,
        Pid::MANIFOLD_SURFACE_TEMPERATURE,
    ];

    const fn new(code: u8, name: &'static str, modes: &'static [Mode]) -> Self {
        Self { code, name, modes }
    }

    /// Get the PID byte
    pub fn code(&self) -> u8 {
        self.code
    }

    /// Snake-case name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Modes in which this PID may be requested
    pub fn modes(&self) -> &'static [Mode] {
        self.modes
    }

    /// Two-digit lowercase hex rendering, as sent on the wire
    pub fn hex(&self) -> String {
        format!("{:02x}", self.code)
    }

    /// Check whether this PID is legal in `mode`
    pub fn allows(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    /// Fail with [`ObdError::ModeMismatch`] unless the PID is legal in `mode`
    pub fn ensure_mode(&self, mode: Mode) -> Result<(), ObdError> {
        if self.allows(mode) {
            Ok(())
        } else {
            Err(ObdError::ModeMismatch {
                pid: self.code,
                mode,
            })
        }
    }

    /// Every registered PID
    pub fn all() -> &'static [Pid] {
        &Self::REGISTERED
    }

    /// Resolve a hex-encoded PID code within `mode`
    pub fn parse(hex: &str, mode: Mode) -> Result<Pid, ObdError> {
        let code = u8::from_str_radix(hex.trim(), 16)
            .map_err(|_| ObdError::InvalidPid(hex.to_string()))?;
        registry().lookup(mode, code)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:02X})", self.name, self.code)
    }
}

struct PidRegistry {
    by_key: HashMap<(Mode, u8), Pid>,
}

impl PidRegistry {
    fn build() -> Self {
        let mut by_key = HashMap::new();
        for pid in Pid::REGISTERED {
            for &mode in pid.modes {
                by_key.insert((mode, pid.code), pid);
            }
        }
        Self { by_key }
    }

    fn lookup(&self, mode: Mode, code: u8) -> Result<Pid, ObdError> {
        if let Some(pid) = self.by_key.get(&(mode, code)) {
            return Ok(*pid);
        }
        if self.by_key.keys().any(|&(_, known)| known == code) {
            Err(ObdError::ModeMismatch { pid: code, mode })
        } else {
            Err(ObdError::InvalidPid(format!("{code:02x}")))
        }
    }
}

fn registry() -> &'static PidRegistry {
    static REGISTRY: OnceLock<PidRegistry> = OnceLock::new();
    REGISTRY.get_or_init(PidRegistry::build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_round_trip_every_registered_pair() {
        for pid in Pid::all() {
            for &mode in pid.modes() {
                assert_eq!(Pid::parse(&pid.hex(), mode).unwrap(), *pid);
            }
        }
    }

    #[test]
    fn test_codes_are_mode_scoped() {
        assert_eq!(Pid::parse("00", Mode::CurrentData).unwrap(), Pid::PIDS_SUPPORTED);
        assert_eq!(Pid::parse("00", Mode::Diagnostic).unwrap(), Pid::DIAGNOSTIC_CODES);
        assert_eq!(Pid::parse("01", Mode::VehicleInfo).unwrap(), Pid::VIN_MESSAGE_COUNT);
        assert_eq!(Pid::parse("01", Mode::FreezeFrameData).unwrap(), Pid::MONITOR_STATUS);
    }

    #[test]
    fn test_fuel_trim_banks() {
        assert_eq!(Pid::parse("07", Mode::CurrentData).unwrap(), Pid::FUEL_TRIM_LONG_BANK1);
        assert_eq!(Pid::parse("08", Mode::CurrentData).unwrap(), Pid::FUEL_TRIM_SHORT_BANK2);
        assert_eq!(Pid::parse("09", Mode::CurrentData).unwrap(), Pid::FUEL_TRIM_LONG_BANK2);
    }

    #[test]
    fn test_mode_mismatch() {
        let err = Pid::parse("1c", Mode::FreezeFrameData).unwrap_err();
        assert!(matches!(err, ObdError::ModeMismatch { pid: 0x1C, mode: Mode::FreezeFrameData }));

        let err = Pid::parse("05", Mode::VehicleInfo).unwrap_err();
        assert!(matches!(err, ObdError::ModeMismatch { .. }));
    }

    #[test]
    fn test_unknown_code() {
        assert!(matches!(Pid::parse("ff", Mode::CurrentData), Err(ObdError::InvalidPid(_))));
        assert!(matches!(Pid::parse("xx", Mode::CurrentData), Err(ObdError::InvalidPid(_))));
    }

    #[test]
    fn test_hex_rendering() {
        assert_eq!(Pid::ENGINE_LOAD.hex(), "04");
        assert_eq!(Pid::ECU_COMPATIBILITY.hex(), "1c");
        assert_eq!(Pid::MANIFOLD_SURFACE_TEMPERATURE.hex(), "84");
    }

    proptest! {
        #[test]
        fn prop_disallowed_modes_mismatch(index in 0usize..33, mode_index in 0usize..5) {
            let pid = Pid::all()[index];
            let mode = Mode::ALL[mode_index];
            match Pid::parse(&pid.hex(), mode) {
                Ok(parsed) => prop_assert!(parsed.allows(mode)),
                Err(ObdError::ModeMismatch { pid: code, .. }) => {
                    prop_assert!(!pid.allows(mode));
                    prop_assert_eq!(code, pid.code());
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
    }
}
