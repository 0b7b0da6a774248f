//! Diagnostic report

use chrono::{DateTime, Utc};
use obd_protocol::{
    EcuCompatibility, Fault, FuelSystemStatus, MonitorStatus, Readiness, SecondaryAirStatus,
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Every reading collected by one report run.
///
/// Readings the vehicle did not provide are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// When the report was assembled
    pub timestamp: DateTime<Utc>,

    pub supported_pids: Option<Vec<bool>>,
    pub ecu_compatibility: Option<EcuCompatibility>,
    pub monitor_status: Option<MonitorStatus>,
    pub faults: Option<Vec<Fault>>,

    /// km
    pub distance_since_codes_cleared: Option<u16>,
    pub distance_with_malfunction: Option<u16>,

    /// °C
    pub ambient_air_temperature: Option<i16>,
    pub engine_oil_temperature: Option<i16>,
    pub engine_coolant_temperature: Option<i16>,
    pub manifold_surface_temperature: Option<i16>,
    pub intake_air_temperature: Option<i16>,
    pub intake_air_temperature_sensor: Option<i16>,
    pub egr_temperature: Option<i16>,

    /// %
    pub engine_load: Option<f64>,
    /// degrees before top dead centre
    pub fuel_injection_timing: Option<f64>,
    /// %
    pub fuel_level: Option<f64>,
    /// L/h
    pub fuel_rate: Option<f64>,
    pub fuel_status: Option<FuelSystemStatus>,

    /// °C
    pub catalyst_temperature_bank1_sensor1: Option<f64>,
    pub catalyst_temperature_bank1_sensor2: Option<f64>,
    pub catalyst_temperature_bank2_sensor1: Option<f64>,
    pub catalyst_temperature_bank2_sensor2: Option<f64>,

    pub secondary_air_status: Option<SecondaryAirStatus>,
    /// %
    pub commanded_egr: Option<f64>,
    pub egr_error: Option<f64>,

    /// %
    pub fuel_trim_short_bank1: Option<f64>,
    pub fuel_trim_long_bank1: Option<f64>,
    pub fuel_trim_short_bank2: Option<f64>,
    pub fuel_trim_long_bank2: Option<f64>,
    pub ethanol_fuel: Option<f64>,
}

impl Report {
    /// Empty report stamped with `timestamp`
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            supported_pids: None,
            ecu_compatibility: None,
            monitor_status: None,
            faults: None,
            distance_since_codes_cleared: None,
            distance_with_malfunction: None,
            ambient_air_temperature: None,
            engine_oil_temperature: None,
            engine_coolant_temperature: None,
            manifold_surface_temperature: None,
            intake_air_temperature: None,
            intake_air_temperature_sensor: None,
            egr_temperature: None,
            engine_load: None,
            fuel_injection_timing: None,
            fuel_level: None,
            fuel_rate: None,
            fuel_status: None,
            catalyst_temperature_bank1_sensor1: None,
            catalyst_temperature_bank1_sensor2: None,
            catalyst_temperature_bank2_sensor1: None,
            catalyst_temperature_bank2_sensor2: None,
            secondary_air_status: None,
            commanded_egr: None,
            egr_error: None,
            fuel_trim_short_bank1: None,
            fuel_trim_long_bank1: None,
            fuel_trim_short_bank2: None,
            fuel_trim_long_bank2: None,
            ethanol_fuel: None,
        }
    }

    /// PID numbers flagged in the supported-PID bitmap
    pub fn supported_pid_codes(&self) -> Vec<usize> {
        self.supported_pids
            .iter()
            .flatten()
            .enumerate()
            .filter_map(|(index, supported)| supported.then_some(index + 1))
            .collect()
    }
}

fn header(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    let rule = "-".repeat(title.len());
    writeln!(f)?;
    writeln!(f, "{rule}")?;
    writeln!(f, "{title}")?;
    writeln!(f, "{rule}")
}

fn line<V: Display>(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    value: Option<V>,
    unit: Option<&str>,
) -> fmt::Result {
    write!(f, "{label}: ")?;
    match value {
        Some(value) => write!(f, "{value}")?,
        None => f.write_str("--")?,
    }
    if let Some(unit) = unit {
        write!(f, " {unit}")?;
    }
    writeln!(f)
}

fn decimal(value: Option<f64>) -> Option<String> {
    value.map(|v| format!("{v:.1}"))
}

fn readiness(value: Option<Readiness>) -> Option<&'static str> {
    value.map(|r| match (r.available, r.incomplete) {
        (false, _) => "not available",
        (true, false) => "complete",
        (true, true) => "incomplete",
    })
}

impl Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Report created at {}", self.timestamp.to_rfc3339())?;

        header(f, "Vehicle")?;
        line(f, "ECU compatibility", self.ecu_compatibility, None)?;
        let pids = self.supported_pids.as_ref().map(|_| {
            self.supported_pid_codes()
                .iter()
                .map(|code| format!("{code:02X}"))
                .collect::<Vec<_>>()
                .join(" ")
        });
        line(f, "Supported PIDs", pids, None)?;

        header(f, "Monitor Status")?;
        let status = self.monitor_status;
        line(f, "MIL", status.map(|s| if s.mil { "on" } else { "off" }), None)?;
        line(f, "Stored trouble codes", status.map(|s| s.emission_related_dtcs), None)?;
        line(f, "Misfire monitoring", readiness(status.map(|s| s.misfire)), None)?;
        line(f, "Fuel system monitoring", readiness(status.map(|s| s.fuel_system)), None)?;
        line(f, "Component monitoring", readiness(status.map(|s| s.components)), None)?;
        let ignition = status.map(|s| if s.compression_ignition { "compression" } else { "spark" });
        line(f, "Ignition", ignition, None)?;

        header(f, "Trouble Codes")?;
        let faults = self.faults.as_ref().map(|faults| {
            if faults.is_empty() {
                "none".to_string()
            } else {
                faults.iter().map(Fault::code).collect::<Vec<_>>().join(", ")
            }
        });
        line(f, "Faults", faults, None)?;
        line(f, "Distance since codes cleared", self.distance_since_codes_cleared, Some("km"))?;
        line(f, "Distance with malfunction", self.distance_with_malfunction, Some("km"))?;

        header(f, "Temperatures")?;
        line(f, "Ambient air", self.ambient_air_temperature, Some("°C"))?;
        line(f, "Engine oil", self.engine_oil_temperature, Some("°C"))?;
        line(f, "Engine coolant", self.engine_coolant_temperature, Some("°C"))?;
        line(f, "Manifold surface", self.manifold_surface_temperature, Some("°C"))?;
        line(f, "Intake air", self.intake_air_temperature, Some("°C"))?;
        line(f, "Intake air sensor", self.intake_air_temperature_sensor, Some("°C"))?;
        line(f, "EGR", self.egr_temperature, Some("°C"))?;
        let catalysts = [
            ("Catalyst bank 1 sensor 1", self.catalyst_temperature_bank1_sensor1),
            ("Catalyst bank 1 sensor 2", self.catalyst_temperature_bank1_sensor2),
            ("Catalyst bank 2 sensor 1", self.catalyst_temperature_bank2_sensor1),
            ("Catalyst bank 2 sensor 2", self.catalyst_temperature_bank2_sensor2),
        ];
        for (label, value) in catalysts {
            line(f, label, decimal(value), Some("°C"))?;
        }

        header(f, "Engine and Fuel")?;
        line(f, "Engine load", decimal(self.engine_load), Some("%"))?;
        line(f, "Fuel injection timing", decimal(self.fuel_injection_timing), Some("°"))?;
        line(f, "Fuel level", decimal(self.fuel_level), Some("%"))?;
        line(f, "Fuel rate", decimal(self.fuel_rate), Some("L/h"))?;
        line(f, "Fuel system 1", self.fuel_status.map(|s| s.system1), None)?;
        line(f, "Fuel system 2", self.fuel_status.and_then(|s| s.system2), None)?;
        line(f, "Short term fuel trim bank 1", decimal(self.fuel_trim_short_bank1), Some("%"))?;
        line(f, "Long term fuel trim bank 1", decimal(self.fuel_trim_long_bank1), Some("%"))?;
        line(f, "Short term fuel trim bank 2", decimal(self.fuel_trim_short_bank2), Some("%"))?;
        line(f, "Long term fuel trim bank 2", decimal(self.fuel_trim_long_bank2), Some("%"))?;
        line(f, "Ethanol fuel", decimal(self.ethanol_fuel), Some("%"))?;

        header(f, "Emissions")?;
        line(f, "Secondary air", self.secondary_air_status, None)?;
        line(f, "Commanded EGR", decimal(self.commanded_egr), Some("%"))?;
        line(f, "EGR error", decimal(self.egr_error), Some("%"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_absent_values_render_as_dashes() {
        let text = Report::new(timestamp()).to_string();
        assert!(text.starts_with("Report created at 2024-03-01T12:00:00+00:00\n"));
        assert!(text.contains("\n------------\nTemperatures\n------------\n"));
        assert!(text.contains("Engine coolant: -- °C\n"));
        assert!(text.contains("Faults: --\n"));
        assert!(text.contains("MIL: --\n"));
    }

    #[test]
    fn test_present_values() {
        let mut report = Report::new(timestamp());
        report.engine_coolant_temperature = Some(15);
        report.engine_load = Some(0.0);
        report.faults = Some(vec![Fault::decode(0x01, 0x33), Fault::decode(0x03, 0x01)]);
        report.supported_pids = Some(vec![false, false, false, true, true]);

        let text = report.to_string();
        assert!(text.contains("Engine coolant: 15 °C\n"));
        assert!(text.contains("Engine load: 0.0 %\n"));
        assert!(text.contains("Faults: P0133, P0301\n"));
        assert!(text.contains("Supported PIDs: 04 05\n"));
    }

    #[test]
    fn test_long_bitmap_renders() {
        let mut report = Report::new(timestamp());
        report.supported_pids = Some(vec![true; 300]);
        let codes = report.supported_pid_codes();
        assert_eq!(codes.len(), 300);
        assert_eq!(codes.last(), Some(&300));
        assert!(report.to_string().contains(" FF 100 101 "));
    }

    #[test]
    fn test_empty_fault_list() {
        let mut report = Report::new(timestamp());
        report.faults = Some(vec![]);
        assert!(report.to_string().contains("Faults: none\n"));
    }

    #[test]
    fn test_serializes_absent_as_null() {
        let mut report = Report::new(timestamp());
        report.distance_with_malfunction = Some(42);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["distance_with_malfunction"], 42);
        assert!(json["fuel_rate"].is_null());
        assert_eq!(json["timestamp"], "2024-03-01T12:00:00Z");
    }
}
