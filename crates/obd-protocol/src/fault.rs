//! Diagnostic trouble code decoding

use crate::codec::{Response, ResponseBody};
use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const SYSTEMS: [char; 4] = ['P', 'C', 'B', 'U'];
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// A five-character DTC such as `P0301`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fault(String);

impl Fault {
    /// Slot value meaning "no code stored"
    pub const EMPTY_SLOT: &'static str = "P0000";

    /// Decode the two bytes of one DTC slot
    pub fn decode(a: u8, b: u8) -> Self {
        let nibble = |n: u8| char::from(HEX_DIGITS[usize::from(n & 0x0F)]);
        let code: String = [
            SYSTEMS[usize::from(a >> 6)],
            char::from(b'0' + ((a >> 4) & 0x03)),
            nibble(a),
            nibble(b >> 4),
            nibble(b),
        ]
        .iter()
        .collect();
        Fault(code)
    }

    /// The code as text
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Whether this is the `P0000` filler slot
    pub fn is_empty_slot(&self) -> bool {
        self.0 == Self::EMPTY_SLOT
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decode the stored codes from a mode 03 reply.
///
/// A negative first response yields `None`; `NO DATA` yields an empty list.
pub fn faults(responses: &[Response]) -> Result<Option<Vec<Fault>>, ObdError> {
    if responses.first().is_some_and(Response::is_error) {
        return Ok(None);
    }

    let mut found = Vec::new();
    for response in responses {
        let bytes = match &response.body {
            ResponseBody::Data(Some(bytes)) => bytes,
            ResponseBody::Data(None) | ResponseBody::NoData => continue,
            ResponseBody::Negative(line) => {
                debug!("Ignoring trailing negative response {}", line);
                continue;
            }
        };
        if bytes.len() % 2 != 0 {
            return Err(ObdError::InvalidResponse(format!(
                "odd number of DTC bytes: {:02X?}",
                bytes
            )));
        }
        found.extend(
            bytes
                .chunks_exact(2)
                .map(|slot| Fault::decode(slot[0], slot[1]))
                .filter(|fault| !fault.is_empty_slot()),
        );
    }
    debug!("Decoded {} fault codes", found.len());
    Ok(Some(found))
}
