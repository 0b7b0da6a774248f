//! OBD-II service modes

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// OBD-II service selector sent as the first byte of every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    /// Current data (0x01)
    CurrentData = 0x01,
    /// Freeze frame data (0x02)
    FreezeFrameData = 0x02,
    /// Stored diagnostic trouble codes (0x03)
    Diagnostic = 0x03,
    /// Clear trouble codes and stored values (0x04)
    ClearTroubleCodes = 0x04,
    /// Vehicle information (0x09)
    VehicleInfo = 0x09,
}

impl Mode {
    /// Every supported mode
    pub const ALL: [Mode; 5] = [
        Mode::CurrentData,
        Mode::FreezeFrameData,
        Mode::Diagnostic,
        Mode::ClearTroubleCodes,
        Mode::VehicleInfo,
    ];

    /// Get the mode byte
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Two-digit lowercase hex rendering, as sent on the wire
    pub fn hex(&self) -> String {
        format!("{:02x}", self.code())
    }

    /// Resolve a hex-encoded mode byte
    pub fn parse_hex(hex: &str) -> Result<Mode, ObdError> {
        let code = u8::from_str_radix(hex.trim(), 16)
            .map_err(|_| ObdError::InvalidResponse(format!("invalid mode: {hex:?}")))?;
        Mode::ALL
            .into_iter()
            .find(|mode| mode.code() == code)
            .ok_or_else(|| ObdError::InvalidResponse(format!("invalid mode: {hex:?}")))
    }

    /// Whether positive replies in this mode echo the requested PID.
    ///
    /// Trouble code reads and clears answer with the mode byte followed
    /// directly by data.
    pub fn echoes_pid(&self) -> bool {
        !matches!(self, Mode::Diagnostic | Mode::ClearTroubleCodes)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_is_zero_padded() {
        assert_eq!(Mode::CurrentData.hex(), "01");
        assert_eq!(Mode::VehicleInfo.hex(), "09");
    }

    #[test]
    fn test_parse_hex_round_trip() {
        for mode in Mode::ALL {
            assert_eq!(Mode::parse_hex(&mode.hex()).unwrap(), mode);
        }
        assert!(Mode::parse_hex("05").is_err());
        assert!(Mode::parse_hex("zz").is_err());
    }

    #[test]
    fn test_pid_echo() {
        assert!(Mode::CurrentData.echoes_pid());
        assert!(Mode::FreezeFrameData.echoes_pid());
        assert!(!Mode::Diagnostic.echoes_pid());
        assert!(!Mode::ClearTroubleCodes.echoes_pid());
    }
}
