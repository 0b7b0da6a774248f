//! Value decoders
//!
//! Every decoder takes classified responses and yields `Ok(None)` when the
//! ECU refused, reported `NO DATA` or sent no payload. A payload shorter than
//! the formula needs is an [`ObdError::InvalidResponse`].

use crate::codec::Response;
use crate::error::ObdError;
use crate::status::{EcuCompatibility, FuelSystemStatus, MonitorStatus, SecondaryAirStatus};
use tracing::debug;

/// First `N` payload bytes of a positive response
fn payload<const N: usize>(response: &Response) -> Result<Option<[u8; N]>, ObdError> {
    let Some(bytes) = response.bytes() else {
        return Ok(None);
    };
    match bytes.get(..N) {
        Some(head) => {
            let mut out = [0u8; N];
            out.copy_from_slice(head);
            Ok(Some(out))
        }
        None => Err(ObdError::InvalidResponse(format!(
            "expected {} data bytes, got {:02X?}",
            N, bytes
        ))),
    }
}

fn word(a: u8, b: u8) -> f64 {
    f64::from(a) * 256.0 + f64::from(b)
}

/// A×100/255, in percent
pub fn percentage(response: &Response) -> Result<Option<f64>, ObdError> {
    Ok(payload::<1>(response)?.map(|[a]| f64::from(a) * 100.0 / 255.0))
}

/// A−40, in °C
pub fn temperature(response: &Response) -> Result<Option<i16>, ObdError> {
    Ok(payload::<1>(response)?.map(|[a]| i16::from(a) - 40))
}

/// (A−128)×100/128, in percent
pub fn centered_percentage(response: &Response) -> Result<Option<f64>, ObdError> {
    Ok(payload::<1>(response)?.map(|[a]| (f64::from(a) - 128.0) * 100.0 / 128.0))
}

/// A×256+B, in km
pub fn distance(response: &Response) -> Result<Option<u16>, ObdError> {
    Ok(payload::<2>(response)?.map(u16::from_be_bytes))
}

/// (A×256+B)/10−40, in °C
pub fn catalyst_temperature(response: &Response) -> Result<Option<f64>, ObdError> {
    Ok(payload::<2>(response)?.map(|[a, b]| word(a, b) / 10.0 - 40.0))
}

/// (A×256+B−26880)/128, in degrees before top dead centre
pub fn injection_timing(response: &Response) -> Result<Option<f64>, ObdError> {
    Ok(payload::<2>(response)?.map(|[a, b]| (word(a, b) - 26880.0) / 128.0))
}

/// (A×256+B)×0.05, in L/h
pub fn fuel_rate(response: &Response) -> Result<Option<f64>, ObdError> {
    Ok(payload::<2>(response)?.map(|[a, b]| word(a, b) * 0.05))
}

/// Supported-PID bitmap, most significant bit of each byte first
pub fn supported_pids(response: &Response) -> Result<Option<Vec<bool>>, ObdError> {
    Ok(response.bytes().map(|bytes| {
        bytes
            .iter()
            .flat_map(|byte| (0..8).rev().map(move |bit| byte & (1 << bit) != 0))
            .collect()
    }))
}

/// Fuel system 1 from A, system 2 from B when present and nonzero
pub fn fuel_status(response: &Response) -> Result<Option<FuelSystemStatus>, ObdError> {
    let Some(bytes) = response.bytes() else {
        return Ok(None);
    };
    match bytes {
        [a, rest @ ..] => FuelSystemStatus::from_bytes(*a, rest.first().copied()).map(Some),
        [] => Ok(None),
    }
}

/// Commanded secondary air status
pub fn secondary_air_status(response: &Response) -> Result<Option<SecondaryAirStatus>, ObdError> {
    payload::<1>(response)?
        .map(|[a]| SecondaryAirStatus::from_code(a))
        .transpose()
}

/// OBD standards the ECU conforms to
pub fn ecu_compatibility(response: &Response) -> Result<Option<EcuCompatibility>, ObdError> {
    payload::<1>(response)?
        .map(|[a]| EcuCompatibility::from_code(a))
        .transpose()
}

/// Monitor status since DTCs cleared
pub fn monitor_status(response: &Response) -> Result<Option<MonitorStatus>, ObdError> {
    Ok(payload::<4>(response)?.map(MonitorStatus::from_bytes))
}

/// Vehicle identification number from the lines of a mode 09 PID 02 reply.
///
/// Each line starts with a sequence byte; zero padding is dropped.
pub fn vin(responses: &[Response]) -> Result<Option<String>, ObdError> {
    let mut frames = Vec::with_capacity(responses.len());
    for response in responses {
        match response.bytes() {
            Some([sequence, data @ ..]) => frames.push((*sequence, data)),
            _ => return Ok(None),
        }
    }
    if frames.is_empty() {
        return Ok(None);
    }
    frames.sort_by_key(|(sequence, _)| *sequence);

    let bytes: Vec<u8> = frames
        .iter()
        .flat_map(|(_, data)| data.iter().copied())
        .filter(|byte| *byte != 0)
        .collect();
    debug!("VIN assembled from {} frames", frames.len());

    if !bytes.is_ascii() {
        return Err(ObdError::InvalidResponse(format!(
            "VIN is not ASCII: {:02X?}",
            bytes
        )));
    }
    Ok(Some(bytes.iter().map(|byte| char::from(*byte)).collect()))
}
