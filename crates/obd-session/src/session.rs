//! Diagnostic session over one adapter

use crate::config::SessionConfig;
use crate::report::Report;
use chrono::Utc;
use obd_protocol::decode;
use obd_protocol::{
    faults, EcuCompatibility, Fault, FuelSystemStatus, Mode, MonitorStatus, ObdClient, ObdError,
    ObdProtocol, Pid, Response, ResponseBody, Result, SecondaryAirStatus,
};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialStream;
use tracing::{debug, info, warn};

/// Bank and sensor position of a catalyst temperature sensor
const CATALYST_PIDS: [[Pid; 2]; 2] = [
    [
        Pid::CATALYST_TEMPERATURE_BANK1_SENSOR1,
        Pid::CATALYST_TEMPERATURE_BANK1_SENSOR2,
    ],
    [
        Pid::CATALYST_TEMPERATURE_BANK2_SENSOR1,
        Pid::CATALYST_TEMPERATURE_BANK2_SENSOR2,
    ],
];

/// One open adapter and the queries that can be run against it
pub struct DiagnosticSession<T = SerialStream> {
    client: Option<ObdClient<T>>,
}

impl DiagnosticSession<SerialStream> {
    /// Open the configured serial port and initialize the adapter
    pub async fn open(config: &SessionConfig) -> Result<Self> {
        let mut client = ObdClient::open(&config.port)?;
        if let Some(protocol) = config.protocol {
            client = client.with_protocol(protocol);
        }
        Self::start(client).await
    }
}

impl<T> DiagnosticSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Initialize an adapter reachable over any async byte stream
    pub async fn with_transport(
        io: T,
        timeout: Duration,
        protocol: Option<ObdProtocol>,
    ) -> Result<Self> {
        let mut client = ObdClient::new(io, timeout);
        if let Some(protocol) = protocol {
            client = client.with_protocol(protocol);
        }
        Self::start(client).await
    }

    async fn start(mut client: ObdClient<T>) -> Result<Self> {
        client.initialize().await?;
        info!("Diagnostic session started");
        Ok(Self {
            client: Some(client),
        })
    }

    /// Whether [`DiagnosticSession::close`] has run
    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    fn client(&mut self) -> Result<&mut ObdClient<T>> {
        self.client.as_mut().ok_or(ObdError::SessionClosed)
    }

    /// Single-line query decoded with `decode`
    async fn query<V>(
        &mut self,
        mode: Mode,
        pid: Pid,
        decode: fn(&Response) -> Result<Option<V>>,
    ) -> Result<Option<V>> {
        let Some(response) = self.client()?.ask_one_line(mode, pid, &[]).await? else {
            debug!("{} returned no lines", pid);
            return Ok(None);
        };
        match &response.body {
            ResponseBody::Negative(line) => warn!("{} refused in mode {}: {}", pid, mode, line),
            ResponseBody::NoData => debug!("{} has no data in mode {}", pid, mode),
            ResponseBody::Data(_) => {}
        }
        decode(&response)
    }

    /// Collect every reading into a report.
    ///
    /// Readings the vehicle refuses or lacks stay empty; transport and
    /// adapter failures abort the report.
    pub async fn create_report(&mut self) -> Result<Report> {
        info!("Creating report");
        let current = Mode::CurrentData;
        let mut report = Report::new(Utc::now());

        report.supported_pids = self.supported_pids().await?;
        report.ecu_compatibility = self.ecu_compatibility().await?;
        report.monitor_status = self.monitor_status().await?;
        report.faults = self.faults().await?;

        report.distance_since_codes_cleared = self.distance_since_codes_cleared(current).await?;
        report.distance_with_malfunction = self.distance_with_malfunction(current).await?;

        report.ambient_air_temperature = self.ambient_air_temperature(current).await?;
        report.engine_oil_temperature = self.engine_oil_temperature(current).await?;
        report.engine_coolant_temperature = self.engine_coolant_temperature(current).await?;
        report.manifold_surface_temperature = self.manifold_surface_temperature(current).await?;

        report.engine_load = self.engine_load(current).await?;
        report.egr_temperature = self.egr_temperature(current).await?;
        report.fuel_injection_timing = self.fuel_injection_timing(current).await?;
        report.fuel_level = self.fuel_level(current).await?;
        report.fuel_rate = self.fuel_rate(current).await?;
        report.fuel_status = self.fuel_status(current).await?;
        report.intake_air_temperature = self.intake_air_temperature(current).await?;
        report.intake_air_temperature_sensor = self.intake_air_temperature_sensor(current).await?;
        report.catalyst_temperature_bank1_sensor1 = self.catalyst_temperature(current, 1, 1).await?;
        report.catalyst_temperature_bank1_sensor2 = self.catalyst_temperature(current, 1, 2).await?;
        report.catalyst_temperature_bank2_sensor1 = self.catalyst_temperature(current, 2, 1).await?;
        report.catalyst_temperature_bank2_sensor2 = self.catalyst_temperature(current, 2, 2).await?;
        report.secondary_air_status = self.secondary_air_status(current).await?;
        report.commanded_egr = self.commanded_egr(current).await?;
        report.egr_error = self.egr_error(current).await?;

        report.fuel_trim_short_bank1 = self.fuel_trim(current, 1, false).await?;
        report.fuel_trim_long_bank1 = self.fuel_trim(current, 1, true).await?;
        report.fuel_trim_short_bank2 = self.fuel_trim(current, 2, false).await?;
        report.fuel_trim_long_bank2 = self.fuel_trim(current, 2, true).await?;
        report.ethanol_fuel = self.ethanol_fuel(current).await?;

        info!("Report created");
        Ok(report)
    }

    /// PIDs 01-20 supported in current data
    pub async fn supported_pids(&mut self) -> Result<Option<Vec<bool>>> {
        self.query(Mode::CurrentData, Pid::PIDS_SUPPORTED, decode::supported_pids)
            .await
    }

    /// OBD standards the vehicle conforms to
    pub async fn ecu_compatibility(&mut self) -> Result<Option<EcuCompatibility>> {
        self.query(Mode::CurrentData, Pid::ECU_COMPATIBILITY, decode::ecu_compatibility)
            .await
    }

    /// MIL, stored-code count and readiness monitors
    pub async fn monitor_status(&mut self) -> Result<Option<MonitorStatus>> {
        self.query(Mode::CurrentData, Pid::MONITOR_STATUS, decode::monitor_status)
            .await
    }

    /// Stored diagnostic trouble codes
    pub async fn faults(&mut self) -> Result<Option<Vec<Fault>>> {
        let responses = self
            .client()?
            .ask(Mode::Diagnostic, Pid::DIAGNOSTIC_CODES, &[])
            .await?;
        faults(&responses)
    }

    /// Clear stored codes and freeze frames; `true` when the ECU acknowledged
    pub async fn clear_trouble_codes(&mut self) -> Result<bool> {
        info!("Clearing trouble codes");
        let response = self
            .client()?
            .ask_one_line(Mode::ClearTroubleCodes, Pid::CLEAR_TROUBLE_CODES, &[])
            .await?;
        let acknowledged = matches!(
            response,
            Some(Response {
                body: ResponseBody::Data(_),
                ..
            })
        );
        if !acknowledged {
            warn!("Clearing trouble codes was not acknowledged: {:?}", response);
        }
        Ok(acknowledged)
    }

    /// Vehicle identification number (legacy multi-line format)
    pub async fn vin(&mut self) -> Result<Option<String>> {
        let client = self.client()?;
        if client.protocol().is_some_and(|protocol| protocol.is_can()) {
            warn!("Multi-frame CAN VIN replies are not reassembled");
        }
        let responses = client.ask(Mode::VehicleInfo, Pid::VIN, &[]).await?;
        decode::vin(&responses)
    }

    /// Distance travelled since codes were cleared, km
    pub async fn distance_since_codes_cleared(&mut self, mode: Mode) -> Result<Option<u16>> {
        self.query(mode, Pid::DISTANCE_SINCE_CODES_CLEARED, decode::distance)
            .await
    }

    /// Distance travelled with the MIL on, km
    pub async fn distance_with_malfunction(&mut self, mode: Mode) -> Result<Option<u16>> {
        self.query(mode, Pid::DISTANCE_WITH_MALFUNCTION, decode::distance)
            .await
    }

    /// Ambient air temperature, °C
    pub async fn ambient_air_temperature(&mut self, mode: Mode) -> Result<Option<i16>> {
        self.query(mode, Pid::AMBIENT_AIR_TEMPERATURE, decode::temperature)
            .await
    }

    /// Engine oil temperature, °C
    pub async fn engine_oil_temperature(&mut self, mode: Mode) -> Result<Option<i16>> {
        self.query(mode, Pid::ENGINE_OIL_TEMPERATURE, decode::temperature)
            .await
    }

    /// Engine coolant temperature, °C
    pub async fn engine_coolant_temperature(&mut self, mode: Mode) -> Result<Option<i16>> {
        self.query(mode, Pid::ENGINE_COOLANT_TEMPERATURE, decode::temperature)
            .await
    }

    /// Manifold surface temperature, °C
    pub async fn manifold_surface_temperature(&mut self, mode: Mode) -> Result<Option<i16>> {
        self.query(mode, Pid::MANIFOLD_SURFACE_TEMPERATURE, decode::temperature)
            .await
    }

    /// Intake air temperature, °C
    pub async fn intake_air_temperature(&mut self, mode: Mode) -> Result<Option<i16>> {
        self.query(mode, Pid::INTAKE_AIR_TEMPERATURE, decode::temperature)
            .await
    }

    /// Intake air temperature sensor A (PID 68)
    pub async fn intake_air_temperature_sensor(&mut self, mode: Mode) -> Result<Option<i16>> {
        self.query(mode, Pid::INTAKE_AIR_TEMPERATURE_SENSOR, decode::temperature)
            .await
    }

    /// Exhaust gas recirculation temperature
    pub async fn egr_temperature(&mut self, mode: Mode) -> Result<Option<i16>> {
        self.query(mode, Pid::EGR_TEMPERATURE, decode::temperature)
            .await
    }

    /// Calculated engine load, %
    pub async fn engine_load(&mut self, mode: Mode) -> Result<Option<f64>> {
        self.query(mode, Pid::ENGINE_LOAD, decode::percentage).await
    }

    /// Fuel injection timing, degrees
    pub async fn fuel_injection_timing(&mut self, mode: Mode) -> Result<Option<f64>> {
        self.query(mode, Pid::FUEL_INJECTION_TIMING, decode::injection_timing)
            .await
    }

    /// Fuel tank level input, %
    pub async fn fuel_level(&mut self, mode: Mode) -> Result<Option<f64>> {
        self.query(mode, Pid::FUEL_LEVEL_INPUT, decode::percentage)
            .await
    }

    /// Engine fuel rate, L/h
    pub async fn fuel_rate(&mut self, mode: Mode) -> Result<Option<f64>> {
        self.query(mode, Pid::FUEL_RATE, decode::fuel_rate).await
    }

    /// Open or closed loop status of both fuel systems
    pub async fn fuel_status(&mut self, mode: Mode) -> Result<Option<FuelSystemStatus>> {
        self.query(mode, Pid::FUEL_STATUS, decode::fuel_status).await
    }

    /// Catalyst temperature for `bank` 1-2 and `sensor` 1-2, °C
    pub async fn catalyst_temperature(
        &mut self,
        mode: Mode,
        bank: usize,
        sensor: usize,
    ) -> Result<Option<f64>> {
        let pid = bank
            .checked_sub(1)
            .and_then(|b| CATALYST_PIDS.get(b))
            .and_then(|sensors| sensor.checked_sub(1).and_then(|s| sensors.get(s)))
            .copied()
            .ok_or_else(|| {
                ObdError::InvalidPid(format!("catalyst bank {bank} sensor {sensor}"))
            })?;
        self.query(mode, pid, decode::catalyst_temperature).await
    }

    /// Commanded secondary air status
    pub async fn secondary_air_status(&mut self, mode: Mode) -> Result<Option<SecondaryAirStatus>> {
        self.query(mode, Pid::SECONDARY_AIR_STATUS, decode::secondary_air_status)
            .await
    }

    /// Commanded EGR, %
    pub async fn commanded_egr(&mut self, mode: Mode) -> Result<Option<f64>> {
        self.query(mode, Pid::COMMANDED_EGR, decode::percentage)
            .await
    }

    /// EGR error, %
    pub async fn egr_error(&mut self, mode: Mode) -> Result<Option<f64>> {
        self.query(mode, Pid::EGR_ERROR, decode::centered_percentage)
            .await
    }

    /// Short or long term fuel trim for `bank` 1-2, %
    pub async fn fuel_trim(&mut self, mode: Mode, bank: usize, long_term: bool) -> Result<Option<f64>> {
        let pid = match (bank, long_term) {
            (1, false) => Pid::FUEL_TRIM_SHORT_BANK1,
            (1, true) => Pid::FUEL_TRIM_LONG_BANK1,
            (2, false) => Pid::FUEL_TRIM_SHORT_BANK2,
            (2, true) => Pid::FUEL_TRIM_LONG_BANK2,
            _ => return Err(ObdError::InvalidPid(format!("fuel trim bank {bank}"))),
        };
        self.query(mode, pid, decode::centered_percentage).await
    }

    /// Ethanol fuel percentage
    pub async fn ethanol_fuel(&mut self, mode: Mode) -> Result<Option<f64>> {
        self.query(mode, Pid::ETHANOL_FUEL, decode::percentage).await
    }

    /// Close the transport; later calls are no-ops
    pub async fn close(&mut self) -> Result<()> {
        match self.client.take() {
            Some(mut client) => {
                info!("Closing diagnostic session");
                client.disconnect().await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use obd_protocol::mock::MockAdapter;
    use obd_protocol::FuelStatus;
    use tokio::io::DuplexStream;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn vehicle() -> MockAdapter {
        MockAdapter::new()
            .with_response("0100", "41 00 BE 3E B8 11")
            .with_response("011C", "41 1C 06")
            .with_response("0101", "41 01 00 07 65 65")
            .with_response("0300", "43 01 33 00 00 00 00")
            .with_response("0131", "41 31 01 02")
            .with_response("0121", "41 21 00 00")
            .with_response("0146", "41 46 3C")
            .with_response("015C", "41 5C 6E")
            .with_response("0105", "41 05 37")
            .with_response("0104", "41 04 00")
            .with_response("012F", "41 2F FF")
            .with_response("0103", "41 03 02 00")
            .with_response("010F", "41 0F 36")
            .with_response("013C", "41 3C 0F A0")
            .with_response("0112", "41 12 01")
            .with_response("0106", "41 06 80")
            .with_response("0107", "41 07 00")
            .with_response("0152", "7F 01 12")
    }

    async fn session(mock: MockAdapter) -> DiagnosticSession<DuplexStream> {
        DiagnosticSession::with_transport(mock.spawn(), TIMEOUT, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_report() {
        let mut session = session(vehicle()).await;
        let report = session.create_report().await.unwrap();

        assert_eq!(report.ecu_compatibility, Some(EcuCompatibility::Eobd));
        assert_eq!(report.supported_pids.as_ref().map(Vec::len), Some(32));
        assert_eq!(report.faults, Some(vec![Fault::decode(0x01, 0x33)]));
        let status = report.monitor_status.unwrap();
        assert!(!status.mil);
        assert!(status.misfire.available);

        assert_eq!(report.distance_since_codes_cleared, Some(258));
        assert_eq!(report.distance_with_malfunction, Some(0));
        assert_eq!(report.ambient_air_temperature, Some(20));
        assert_eq!(report.engine_oil_temperature, Some(70));
        assert_eq!(report.engine_coolant_temperature, Some(15));
        assert_eq!(report.intake_air_temperature, Some(14));
        assert_eq!(report.engine_load, Some(0.0));
        assert_eq!(report.fuel_level, Some(100.0));
        assert_eq!(report.fuel_status.map(|s| s.system1), Some(FuelStatus::ClosedLoop));
        assert_eq!(report.catalyst_temperature_bank1_sensor1, Some(360.0));
        assert_eq!(report.secondary_air_status, Some(SecondaryAirStatus::Upstream));
        assert_eq!(report.fuel_trim_short_bank1, Some(0.0));
        assert_eq!(report.fuel_trim_long_bank1, Some(-100.0));
    }

    #[tokio::test]
    async fn test_unanswered_readings_are_absent() {
        let mut session = session(vehicle()).await;
        let report = session.create_report().await.unwrap();

        // NO DATA
        assert_eq!(report.fuel_rate, None);
        assert_eq!(report.manifold_surface_temperature, None);
        assert_eq!(report.catalyst_temperature_bank2_sensor2, None);
        assert_eq!(report.fuel_trim_long_bank2, None);
        // 7F negative response
        assert_eq!(report.ethanol_fuel, None);
    }

    #[tokio::test]
    async fn test_identical_transcripts_give_identical_reports() {
        let mut first = session(vehicle()).await.create_report().await.unwrap();
        let mut second = session(vehicle()).await.create_report().await.unwrap();
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        first.timestamp = epoch;
        second.timestamp = epoch;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_freeze_frame_getter() {
        let mock = MockAdapter::new().with_response("0205", "42 05 37");
        let mut session = session(mock).await;
        let temperature = session
            .engine_coolant_temperature(Mode::FreezeFrameData)
            .await
            .unwrap();
        assert_eq!(temperature, Some(15));
    }

    #[tokio::test]
    async fn test_getter_rejects_other_modes() {
        let mut session = session(MockAdapter::new()).await;
        let err = session.engine_load(Mode::VehicleInfo).await.unwrap_err();
        assert!(matches!(err, ObdError::ModeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_faults() {
        let mock = MockAdapter::new().with_response("0300", "43 01 33 03 01 00 00\r43 C1 00 00 00 00 00");
        let mut session = session(mock).await;
        let codes: Vec<String> = session
            .faults()
            .await
            .unwrap()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(codes, ["P0133", "P0301", "U0100"]);
    }

    #[tokio::test]
    async fn test_faults_refused() {
        let mock = MockAdapter::new().with_response("0300", "7F 03 11");
        let mut session = session(mock).await;
        assert_eq!(session.faults().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_faults() {
        let mut session = session(MockAdapter::new()).await;
        assert_eq!(session.faults().await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_clear_trouble_codes() {
        let mut session = session(MockAdapter::new().with_response("0400", "44")).await;
        assert!(session.clear_trouble_codes().await.unwrap());

        let mut session = session_refusing_clear().await;
        assert!(!session.clear_trouble_codes().await.unwrap());
    }

    async fn session_refusing_clear() -> DiagnosticSession<DuplexStream> {
        session(MockAdapter::new().with_response("0400", "7F 04 22")).await
    }

    #[tokio::test]
    async fn test_vin() {
        let mock = MockAdapter::new().with_response(
            "0902",
            "49 02 01 00 00 00 31\r49 02 02 44 34 47 50\r49 02 03 30 30 52 35\r49 02 04 35 42 31 32\r49 02 05 33 34 35 36",
        );
        let mut session = session(mock).await;
        assert_eq!(session.vin().await.unwrap().as_deref(), Some("1D4GP00R55B123456"));
    }

    #[tokio::test]
    async fn test_invalid_positions() {
        let mut session = session(MockAdapter::new()).await;
        assert!(matches!(
            session.catalyst_temperature(Mode::CurrentData, 3, 1).await,
            Err(ObdError::InvalidPid(_))
        ));
        assert!(matches!(
            session.fuel_trim(Mode::CurrentData, 0, false).await,
            Err(ObdError::InvalidPid(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut session = session(MockAdapter::new()).await;
        session.close().await.unwrap();
        assert!(session.is_closed());
        session.close().await.unwrap();

        let err = session.create_report().await.unwrap_err();
        assert!(matches!(err, ObdError::SessionClosed));
        assert!(matches!(session.vin().await, Err(ObdError::SessionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_adapter_times_out() {
        let (client, _adapter) = tokio::io::duplex(64);
        let result = DiagnosticSession::with_transport(client, TIMEOUT, None).await;
        assert!(matches!(result, Err(ObdError::Timeout(500))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_faults_end_the_session() {
        let mock = vehicle().with_delay("0300", Duration::from_millis(300));
        let mut session = DiagnosticSession::with_transport(mock.spawn(), Duration::from_millis(100), None)
            .await
            .unwrap();

        assert!(matches!(session.faults().await, Err(ObdError::Timeout(100))));
        assert!(matches!(
            session.clear_trouble_codes().await,
            Err(ObdError::NotReady(_))
        ));
        assert!(matches!(session.create_report().await, Err(ObdError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_adapter_error_aborts_report() {
        let mock = vehicle().with_response("0131", "CAN ERROR");
        let mut session = session(mock).await;
        let err = session.create_report().await.unwrap_err();
        assert!(matches!(err, ObdError::AdapterError(_)));
    }

    #[tokio::test]
    async fn test_negative_response_body_is_kept() {
        let mut session = session(vehicle()).await;
        let response = session
            .client()
            .unwrap()
            .ask_one_line(Mode::CurrentData, Pid::ETHANOL_FUEL, &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.body, ResponseBody::Negative("7F 01 12".to_string()));
    }
}
