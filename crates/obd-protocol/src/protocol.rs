//! OBD-II Protocol Definitions

use serde::{Deserialize, Serialize};

/// Vehicle bus protocols an ELM327 can be pinned to with `ATSP`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObdProtocol {
    /// Automatic protocol detection
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    /// The `AT` command body selecting this protocol (without the `AT` prefix)
    pub fn at_command(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "SP0",
            ObdProtocol::J1850Pwm => "SP1",
            ObdProtocol::J1850Vpw => "SP2",
            ObdProtocol::Iso9141_2 => "SP3",
            ObdProtocol::Iso14230_4Kwp => "SP4",
            ObdProtocol::Iso14230_4KwpFast => "SP5",
            ObdProtocol::Iso15765_4Can11bit500 => "SP6",
            ObdProtocol::Iso15765_4Can29bit500 => "SP7",
            ObdProtocol::Iso15765_4Can11bit250 => "SP8",
            ObdProtocol::Iso15765_4Can29bit250 => "SP9",
        }
    }

    /// Check if this is a CAN protocol.
    ///
    /// CAN adapters answer multi-frame requests with `0:`/`1:` segment
    /// prefixes, which the line codec does not reassemble.
    pub fn is_can(&self) -> bool {
        matches!(
            self,
            ObdProtocol::Iso15765_4Can11bit500
                | ObdProtocol::Iso15765_4Can29bit500
                | ObdProtocol::Iso15765_4Can11bit250
                | ObdProtocol::Iso15765_4Can29bit250
        )
    }
}
