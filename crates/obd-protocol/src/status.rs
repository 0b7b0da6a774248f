//! Enumerated and bit-packed PID values

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! code_table {
    (
        $(#[$meta:meta])*
        $name:ident, $table:literal {
            $($(#[$vmeta:meta])* $variant:ident = $code:literal => $description:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Every table entry
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Byte value on the wire
            pub fn code(&self) -> u8 {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            /// Human-readable meaning
            pub fn description(&self) -> &'static str {
                match self {
                    $($name::$variant => $description,)+
                }
            }

            /// Exact match against the table
            pub fn from_code(code: u8) -> Result<Self, ObdError> {
                match code {
                    $($code => Ok($name::$variant),)+
                    _ => Err(ObdError::UnknownEnumCode { table: $table, code }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.description())
            }
        }
    };
}

code_table! {
    /// Fuel system loop status (PID 03, one byte per fuel system)
    FuelStatus, "fuel status" {
        /// Open loop due to insufficient engine temperature
        OpenLowTemperature = 0x01 => "Open loop due to insufficient engine temperature",
        /// Closed loop on oxygen sensor feedback
        ClosedLoop = 0x02 => "Closed loop, using oxygen sensor feedback to determine fuel mix",
        /// Open loop due to engine load or deceleration fuel cut
        OpenEngineLoad = 0x04 => "Open loop due to engine load OR fuel cut due to deceleration",
        /// Open loop due to system failure
        OpenSystemFailure = 0x08 => "Open loop due to system failure",
        /// Closed loop with a feedback fault
        ClosedFeedbackFault = 0x10 => "Closed loop, using at least one oxygen sensor but there is a fault in the feedback system",
    }
}

code_table! {
    /// Commanded secondary air status (PID 12)
    SecondaryAirStatus, "secondary air status" {
        /// Upstream of the catalytic converter
        Upstream = 0x01 => "Upstream of catalytic converter",
        /// Downstream of the catalytic converter
        Downstream = 0x02 => "Downstream of catalytic converter",
        /// From the outside atmosphere or off
        OutsideOrOff = 0x04 => "From the outside atmosphere or off",
        /// Pump commanded on for diagnostics
        PumpDiagnostics = 0x08 => "Pump commanded on for diagnostics",
    }
}

code_table! {
    /// OBD standards the vehicle conforms to (PID 1C)
    EcuCompatibility, "ECU compatibility" {
        Carb = 0x01 => "OBD-II as defined by the CARB",
        Epa = 0x02 => "OBD as defined by the EPA",
        ObdAndObdII = 0x03 => "OBD and OBD-II",
        ObdI = 0x04 => "OBD-I",
        NotCompliant = 0x05 => "Not meant to comply with any OBD standard",
        Eobd = 0x06 => "EOBD (Europe)",
        EobdAndObdII = 0x07 => "EOBD and OBD-II",
        EobdAndObd = 0x08 => "EOBD and OBD",
        EobdObdAndObdII = 0x09 => "EOBD, OBD and OBD II",
        Jobd = 0x0A => "JOBD (Japan)",
        JobdAndObdII = 0x0B => "JOBD and OBD II",
        JobdAndEobd = 0x0C => "JOBD and EOBD",
        JobdEobdAndObdII = 0x0D => "JOBD, EOBD, and OBD II",
    }
}

/// Status of both fuel systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelSystemStatus {
    /// Fuel system 1
    pub system1: FuelStatus,
    /// Fuel system 2, absent when the vehicle reports only one
    pub system2: Option<FuelStatus>,
}

impl FuelSystemStatus {
    /// Decode bytes A and B; a zero B means no second fuel system
    pub fn from_bytes(a: u8, b: Option<u8>) -> Result<Self, ObdError> {
        let system2 = match b {
            None | Some(0) => None,
            Some(code) => Some(FuelStatus::from_code(code)?),
        };
        Ok(Self {
            system1: FuelStatus::from_code(a)?,
            system2,
        })
    }
}

/// Availability and completeness of one readiness monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    /// Test is available on this vehicle
    pub available: bool,
    /// Test has not completed since codes were cleared
    pub incomplete: bool,
}

/// Monitor status since DTCs cleared (PID 01)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    /// Malfunction indicator lamp on
    pub mil: bool,
    /// Number of emission-related DTCs stored
    pub emission_related_dtcs: u8,
    /// Misfire monitoring
    pub misfire: Readiness,
    /// Fuel system monitoring
    pub fuel_system: Readiness,
    /// Comprehensive component monitoring
    pub components: Readiness,
    /// Compression ignition (diesel) engine, spark otherwise
    pub compression_ignition: bool,
    /// Reserved bit B7
    pub reserved_bit_b7: bool,
    /// Byte C (non-continuous monitors available), not decoded
    pub raw_c: u8,
    /// Byte D (non-continuous monitors incomplete), not decoded
    pub raw_d: u8,
}

impl MonitorStatus {
    /// Decode the 4-byte payload A B C D
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        let [a, b, c, d] = bytes;
        let bit = |byte: u8, n: u8| byte & (1 << n) != 0;
        Self {
            mil: bit(a, 7),
            emission_related_dtcs: a & 0x7F,
            misfire: Readiness {
                available: bit(b, 0),
                incomplete: bit(b, 4),
            },
            fuel_system: Readiness {
                available: bit(b, 1),
                incomplete: bit(b, 5),
            },
            components: Readiness {
                available: bit(b, 2),
                incomplete: bit(b, 6),
            },
            compression_ignition: bit(b, 3),
            reserved_bit_b7: bit(b, 7),
            raw_c: c,
            raw_d: d,
        }
    }
}
