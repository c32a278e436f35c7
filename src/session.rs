//! Acquisition session.
//!
//! [`AcquisitionSession`] owns everything an acquisition needs: the driver
//! instance, the connected device, the current [`ConfigurationEpoch`] and the
//! reader. Nothing is global; every operation goes through the session.
//!
//! # Reader lifecycle
//!
//! ```text
//! Idle --create_reader--> Created --start_reader--> Primed --read_raw--> Primed
//!   ^                        |                         |
//!   +------ stop_reader -----+-------------------------+
//! ```
//!
//! Reads block until every signal has the requested number of samples or
//! the timeout elapses. A short read is reported as
//! [`SiriusError::ReadTimeout`]; there is no internal retry.
//!
//! [`acquire_raw`](AcquisitionSession::acquire_raw) and
//! [`acquire_processed`](AcquisitionSession::acquire_processed) run the full
//! create/prime/read/stop cycle and always release the reader, including on
//! error.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sirius_daq::channel::{ChannelConfigMap, ChannelSettings};
//! use sirius_daq::driver::simulated::SimulatedInstance;
//! use sirius_daq::session::{AcquisitionSession, OutputFormat};
//!
//! # fn main() -> sirius_daq::Result<()> {
//! let mut session = AcquisitionSession::new(Box::new(SimulatedInstance::default()));
//! session.try_connect("daq.sim://sirius-1")?;
//! session.set_sample_rate(1000.0)?;
//!
//! let channels = ChannelConfigMap::new().with_channel(
//!     0,
//!     ChannelSettings::new()
//!         .with_name("acc_X")
//!         .with_measurement("IEPE")
//!         .with_sensitivity(100.0, "mV/g")
//!         .with_unit("g"),
//! );
//! session.configure_channels(channels)?;
//!
//! let data = session.acquire_processed(Duration::from_secs(2), OutputFormat::Labeled)?;
//! let labeled = data.as_labeled().expect("labeled output");
//! assert_eq!(labeled["acc_X"].signal.len(), 2000);
//! assert_eq!(labeled["time"].unit, "s");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::channel::{self, ChannelConfigMap, ConfigureReport};
use crate::conversion::convert;
use crate::driver::{
    Channel, Device, DeviceDescriptor, Instance, MultiReader, PropertyInfo, PropertyValue,
    ReadTimeoutType, SignalHandle, SAMPLE_RATE_PROPERTY,
};
use crate::error::{Result, SiriusError};
use crate::signal::{self, ActiveSignalSet};

/// Timeout of the zero-sample warm-up read, in milliseconds.
pub const PRIME_TIMEOUT_MS: u64 = 10;

/// Name of the synthetic time entry in labeled output.
pub const TIME_KEY: &str = "time";

/// Shape of [`AcquisitionSession::acquire_processed`] output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// A single (time, channel) array
    #[default]
    Array,
    /// One entry per channel name plus a time vector
    Labeled,
}

/// A calibrated series with its unit.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSignal {
    /// Samples
    pub signal: Array1<f64>,
    /// Unit symbol
    pub unit: String,
}

/// Channel name to labeled signal, in configuration order, followed by `time`.
pub type LabeledAcquisition = IndexMap<String, LabeledSignal>;

/// Result of a processed acquisition.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    /// (time, channel) array, columns in configuration order
    Array(Array2<f64>),
    /// Labeled signals
    Labeled(LabeledAcquisition),
}

impl Acquisition {
    /// The array form, if this is one.
    pub fn as_array(&self) -> Option<&Array2<f64>> {
        match self {
            Self::Array(data) => Some(data),
            Self::Labeled(_) => None,
        }
    }

    /// The labeled form, if this is one.
    pub fn as_labeled(&self) -> Option<&LabeledAcquisition> {
        match self {
            Self::Labeled(data) => Some(data),
            Self::Array(_) => None,
        }
    }

    /// Samples per channel.
    pub fn sample_count(&self) -> usize {
        match self {
            Self::Array(data) => data.nrows(),
            Self::Labeled(data) => data.get(TIME_KEY).map_or(0, |t| t.signal.len()),
        }
    }
}

/// Channel configuration in effect, replaced wholesale on reconfiguration.
#[derive(Debug, Clone)]
pub struct ConfigurationEpoch {
    channels: ChannelConfigMap,
    signals: ActiveSignalSet,
    report: ConfigureReport,
}

impl ConfigurationEpoch {
    /// Configured channels, with names resolved.
    pub fn channels(&self) -> &ChannelConfigMap {
        &self.channels
    }

    /// Signals read by acquisitions, in column order.
    pub fn signals(&self) -> &ActiveSignalSet {
        &self.signals
    }

    /// Settings rejected while applying this configuration.
    pub fn report(&self) -> &ConfigureReport {
        &self.report
    }
}

/// Description of a function block for listings.
#[derive(Debug, Clone)]
pub struct FunctionBlockInfo {
    /// Block name
    pub name: String,
    /// Visible properties
    pub properties: Vec<PropertyInfo>,
}

/// Description of a channel for listings.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    /// Position in the device channel list
    pub index: usize,
    /// Globally unique identifier
    pub global_id: String,
    /// Display name
    pub name: String,
    /// Signal-conditioning blocks
    pub function_blocks: Vec<FunctionBlockInfo>,
}

impl fmt::Display for ChannelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Channel Global ID: {}", self.global_id)?;
        writeln!(f, "Channel Name     : {}", self.name)?;
        for block in &self.function_blocks {
            writeln!(f, "  Function Block Name: {}", block.name)?;
            for prop in &block.properties {
                let options = prop
                    .selection_values
                    .as_ref()
                    .map(|values| {
                        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                        format!("[{}]", values.join(", "))
                    })
                    .unwrap_or_default();
                writeln!(
                    f,
                    "    {:20} : {:10} {} {}",
                    prop.name,
                    prop.display_value().to_string(),
                    options,
                    prop.unit.as_deref().unwrap_or("")
                )?;
            }
        }
        Ok(())
    }
}

struct ActiveReader {
    reader: Box<dyn MultiReader>,
    primed: bool,
}

/// Host-side session with one DAQ device.
pub struct AcquisitionSession {
    instance: Box<dyn Instance>,
    device: Option<Box<dyn Device>>,
    epoch: Option<ConfigurationEpoch>,
    reader: Option<ActiveReader>,
}

impl AcquisitionSession {
    /// Create a disconnected session over a driver instance.
    pub fn new(instance: Box<dyn Instance>) -> Self {
        Self {
            instance,
            device: None,
            epoch: None,
            reader: None,
        }
    }

    // =========================================================================
    // Device
    // =========================================================================

    /// Devices visible to the driver.
    pub fn list_available_devices(&self) -> Vec<DeviceDescriptor> {
        let devices = self.instance.available_devices();
        for device in &devices {
            debug!(
                name = %device.name,
                connection_string = %device.connection_string,
                "Device available"
            );
        }
        devices
    }

    /// Connect to a device, replacing any current connection.
    ///
    /// The configuration and reader of a previous device are discarded.
    pub fn try_connect(&mut self, connection_string: &str) -> Result<()> {
        self.stop_reader();
        self.epoch = None;
        self.device = None;

        let device = self.instance.add_device(connection_string)?;
        info!(
            name = %device.info().name,
            connection_string = connection_string,
            "Connected to device"
        );
        self.device = Some(device);
        Ok(())
    }

    /// Connect to a device, logging failures instead of returning them.
    ///
    /// Returns `true` on success. On failure the session stays disconnected.
    pub fn connect(&mut self, connection_string: &str) -> bool {
        match self.try_connect(connection_string) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    connection_string = connection_string,
                    error = %e,
                    "Error connecting to device"
                );
                false
            }
        }
    }

    /// Check if a device is connected.
    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    fn device(&self) -> Result<&dyn Device> {
        self.device.as_deref().ok_or(SiriusError::NotConnected)
    }

    /// Current sample rate in Hz.
    pub fn sample_rate(&self) -> Result<f64> {
        let value = self.device()?.property_value(SAMPLE_RATE_PROPERTY)?;
        value.as_f64().ok_or_else(|| SiriusError::PropertyType {
            name: SAMPLE_RATE_PROPERTY.to_string(),
            expected: "number".to_string(),
            actual: value.type_name().to_string(),
        })
    }

    /// Request a sample rate and return the rate the device actually applied.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> Result<f64> {
        self.device()?
            .set_property_value(SAMPLE_RATE_PROPERTY, PropertyValue::Float(sample_rate))?;
        let applied = self.sample_rate()?;
        info!(requested = sample_rate, applied, "Sample rate set");
        Ok(applied)
    }

    /// All device channels, in device order.
    pub fn available_channels(&self) -> Result<Vec<Arc<dyn Channel>>> {
        Ok(self.device()?.channels_recursive())
    }

    /// Channels with their function blocks and visible properties.
    pub fn channel_listing(&self) -> Result<Vec<ChannelInfo>> {
        let listing = self
            .available_channels()?
            .iter()
            .enumerate()
            .map(|(index, channel)| ChannelInfo {
                index,
                global_id: channel.global_id(),
                name: channel.name(),
                function_blocks: channel
                    .function_blocks()
                    .iter()
                    .map(|block| FunctionBlockInfo {
                        name: block.name(),
                        properties: block.list_properties(),
                    })
                    .collect(),
            })
            .collect();
        Ok(listing)
    }

    /// Analog-input signals, in catalog order.
    pub fn available_ai_signals(&self) -> Result<Vec<SignalHandle>> {
        Ok(signal::ai_signals(self.device()?))
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Apply a channel configuration, replacing the current one.
    ///
    /// Any active reader is stopped first. Rejected settings do not fail the
    /// call; they are returned in the report.
    pub fn configure_channels(&mut self, mut channels: ChannelConfigMap) -> Result<ConfigureReport> {
        self.stop_reader();
        self.epoch = None;

        let device = self.device()?;
        let (signals, report) = channel::configure_all(device, &channels)?;
        channels.resolve_names(device);

        self.epoch = Some(ConfigurationEpoch {
            channels,
            signals,
            report: report.clone(),
        });
        Ok(report)
    }

    /// Configuration currently in effect.
    pub fn configuration(&self) -> Option<&ConfigurationEpoch> {
        self.epoch.as_ref()
    }

    fn epoch(&self) -> Result<&ConfigurationEpoch> {
        self.epoch.as_ref().ok_or(SiriusError::NotConfigured)
    }

    // =========================================================================
    // Reader lifecycle
    // =========================================================================

    /// Create a reader over the active signals, replacing any existing one.
    pub fn create_reader(&mut self) -> Result<()> {
        let device = self.device()?;
        let epoch = self.epoch()?;
        let reader =
            device.create_multi_reader(epoch.signals.as_slice(), ReadTimeoutType::All)?;
        debug!(signals = epoch.signals.len(), "Reader created");

        self.reader = Some(ActiveReader {
            reader,
            primed: false,
        });
        Ok(())
    }

    /// Prime the reader with a zero-sample read.
    pub fn start_reader(&mut self) -> Result<()> {
        let active = self.reader.as_mut().ok_or(SiriusError::ReaderNotActive)?;
        active.reader.read(0, PRIME_TIMEOUT_MS)?;
        active.primed = true;
        debug!("Reader started");
        Ok(())
    }

    /// Read `sample_count` samples per channel as a (time, channel) array.
    ///
    /// # Errors
    ///
    /// - [`SiriusError::ReaderNotActive`] without a reader (or after stop)
    /// - [`SiriusError::ReaderNotPrimed`] if `start_reader` was skipped
    /// - [`SiriusError::ReadTimeout`] if fewer samples arrived in time
    pub fn read_raw(&mut self, sample_count: usize, timeout: Duration) -> Result<Array2<f64>> {
        let active = self.reader.as_mut().ok_or(SiriusError::ReaderNotActive)?;
        if !active.primed {
            return Err(SiriusError::ReaderNotPrimed);
        }

        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let native = active.reader.read(sample_count, timeout_ms)?;
        if native.ncols() < sample_count {
            return Err(SiriusError::ReadTimeout {
                requested: sample_count,
                received: native.ncols(),
                timeout_ms,
            });
        }

        // Reader delivers (signal, time)
        Ok(native.reversed_axes())
    }

    /// Read and calibrate `sample_count` samples per channel.
    pub fn read_processed(
        &mut self,
        sample_count: usize,
        timeout: Duration,
    ) -> Result<Array2<f64>> {
        let raw = self.read_raw(sample_count, timeout)?;
        let epoch = self.epoch()?;
        Ok(calibrate(raw.view(), &epoch.channels))
    }

    /// Samples per channel buffered in the reader, without blocking.
    pub fn available_samples(&self) -> Result<usize> {
        self.reader
            .as_ref()
            .map(|active| active.reader.available_count())
            .ok_or(SiriusError::ReaderNotActive)
    }

    /// Release the reader. Safe to call repeatedly.
    pub fn stop_reader(&mut self) {
        if self.reader.take().is_some() {
            debug!("Reader stopped");
        }
    }

    /// Check if a reader exists.
    pub fn has_reader(&self) -> bool {
        self.reader.is_some()
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    /// Create, prime, read and stop in one call.
    ///
    /// The reader is released whether or not the read succeeds.
    pub fn acquire_raw(&mut self, sample_count: usize, timeout: Duration) -> Result<Array2<f64>> {
        let result = self.run_reader(sample_count, timeout);
        self.stop_reader();
        result
    }

    fn run_reader(&mut self, sample_count: usize, timeout: Duration) -> Result<Array2<f64>> {
        self.create_reader()?;
        self.start_reader()?;
        self.read_raw(sample_count, timeout)
    }

    /// Acquire `acquisition_time` worth of calibrated samples.
    ///
    /// The sample count is `floor(acquisition_time * sample_rate)` and the
    /// read timeout is twice the acquisition time.
    ///
    /// # Errors
    ///
    /// [`SiriusError::AcquisitionTooLong`] if either value does not fit,
    /// before any reader is created.
    pub fn acquire_processed(
        &mut self,
        acquisition_time: Duration,
        format: OutputFormat,
    ) -> Result<Acquisition> {
        self.epoch()?;
        let sample_rate = self.sample_rate()?;
        let duration_secs = acquisition_time.as_secs_f64();
        let samples = (duration_secs * sample_rate).floor();
        let too_long = SiriusError::AcquisitionTooLong {
            duration_secs,
            sample_rate,
        };
        if samples >= usize::MAX as f64 {
            return Err(too_long);
        }
        let timeout = acquisition_time.checked_mul(2).ok_or(too_long)?;
        let sample_count = samples as usize;

        info!(
            duration_secs,
            sample_rate, sample_count, "Starting acquisition"
        );
        let raw = self.acquire_raw(sample_count, timeout)?;

        let epoch = self.epoch()?;
        let calibrated = calibrate(raw.view(), &epoch.channels);
        info!(sample_count, channels = epoch.channels.len(), "Acquisition complete");

        Ok(match format {
            OutputFormat::Array => Acquisition::Array(calibrated),
            OutputFormat::Labeled => {
                Acquisition::Labeled(label(&calibrated, epoch, duration_secs))
            }
        })
    }
}

/// Apply per-channel sensitivity and unit conversion to a (time, channel) batch.
fn calibrate(raw: ArrayView2<'_, f64>, channels: &ChannelConfigMap) -> Array2<f64> {
    let mut calibrated = Array2::zeros(raw.raw_dim());
    for ((raw_col, mut out_col), (_, settings)) in raw
        .axis_iter(Axis(1))
        .zip(calibrated.axis_iter_mut(Axis(1)))
        .zip(channels.iter())
    {
        let converted = convert(
            raw_col,
            settings.sensitivity(),
            settings.sensitivity_unit(),
            settings.unit(),
        );
        out_col.assign(&converted);
    }
    calibrated
}

fn label(
    calibrated: &Array2<f64>,
    epoch: &ConfigurationEpoch,
    duration_secs: f64,
) -> LabeledAcquisition {
    let mut labeled = LabeledAcquisition::new();
    for (column, ((_, settings), signal)) in epoch
        .channels
        .iter()
        .zip(epoch.signals.iter())
        .enumerate()
    {
        let name = settings
            .name
            .clone()
            .unwrap_or_else(|| signal.name.clone());
        labeled.insert(
            name,
            LabeledSignal {
                signal: calibrated.column(column).to_owned(),
                unit: settings.unit().to_string(),
            },
        );
    }

    labeled.insert(
        TIME_KEY.to_string(),
        LabeledSignal {
            signal: Array1::linspace(0.0, duration_secs, calibrated.nrows()),
            unit: "s".to_string(),
        },
    );
    labeled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelSettings;
    use crate::driver::simulated::{SimulatedDevice, SimulatedInstance, Waveform};
    use ndarray::array;
    use tracing_test::traced_test;

    fn session_with(device: &SimulatedDevice) -> AcquisitionSession {
        let mut session = AcquisitionSession::new(Box::new(SimulatedInstance::with_devices(
            vec![device.clone()],
        )));
        assert!(session.connect(&device.connection_string()));
        session
    }

    fn two_channel_map() -> ChannelConfigMap {
        ChannelConfigMap::new()
            .with_channel(
                1,
                ChannelSettings::new()
                    .with_name("acc_Y")
                    .with_sensitivity(10.0, "mV/g")
                    .with_unit("m/s^2"),
            )
            .with_channel(0, ChannelSettings::new().with_name("vol_1"))
    }

    #[traced_test]
    #[test]
    fn test_connect_failure_stays_disconnected() {
        let mut session = AcquisitionSession::new(Box::new(SimulatedInstance::default()));
        assert!(!session.connect("daq.sim://nowhere"));
        assert!(!session.is_connected());
        assert!(logs_contain("Error connecting to device"));
        assert!(matches!(session.sample_rate(), Err(SiriusError::NotConnected)));
    }

    #[test]
    fn test_sample_rate_round_trip() {
        let device = SimulatedDevice::default();
        let mut session = session_with(&device);
        let applied = session.set_sample_rate(2400.0).unwrap();
        assert_eq!(applied, 2500.0);
        assert_eq!(session.sample_rate().unwrap(), applied);
        assert_eq!(session.sample_rate().unwrap(), applied);
    }

    #[test]
    fn test_read_lifecycle_errors() {
        let device = SimulatedDevice::default();
        let mut session = session_with(&device);

        assert!(matches!(
            session.create_reader(),
            Err(SiriusError::NotConfigured)
        ));
        session.configure_channels(two_channel_map()).unwrap();

        assert!(matches!(
            session.read_raw(10, Duration::from_secs(1)),
            Err(SiriusError::ReaderNotActive)
        ));

        session.create_reader().unwrap();
        assert!(matches!(
            session.read_raw(10, Duration::from_secs(1)),
            Err(SiriusError::ReaderNotPrimed)
        ));

        session.start_reader().unwrap();
        assert_eq!(session.read_raw(10, Duration::from_secs(1)).unwrap().dim(), (10, 2));

        session.stop_reader();
        session.stop_reader();
        assert!(matches!(
            session.read_raw(10, Duration::from_secs(1)),
            Err(SiriusError::ReaderNotActive)
        ));
        assert!(session.available_samples().is_err());
    }

    #[test]
    fn test_read_raw_transposes_in_config_order() {
        let device = SimulatedDevice::default();
        device.set_waveform(0, Waveform::Constant(5.0)).unwrap();
        device.set_waveform(1, Waveform::Constant(7.0)).unwrap();
        let mut session = session_with(&device);
        session.configure_channels(two_channel_map()).unwrap();

        let raw = session.acquire_raw(4, Duration::from_secs(1)).unwrap();
        assert_eq!(raw.dim(), (4, 2));
        // channel 1 was configured first
        assert!(raw.column(0).iter().all(|&v| v == 7.0));
        assert!(raw.column(1).iter().all(|&v| v == 5.0));
        assert!(!session.has_reader());
    }

    #[test]
    fn test_timeout_releases_reader() {
        let device = SimulatedDevice::default();
        let mut session = session_with(&device);
        session.configure_channels(two_channel_map()).unwrap();
        device.set_stalled(true);

        let err = session
            .acquire_raw(100, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(
            err,
            SiriusError::ReadTimeout {
                requested: 100,
                received: 0,
                timeout_ms: 50
            }
        ));
        assert!(!session.has_reader());
    }

    #[test]
    fn test_partial_read_is_timeout() {
        let device = SimulatedDevice::default();
        let mut session = session_with(&device);
        session.set_sample_rate(1000.0).unwrap();
        session.configure_channels(two_channel_map()).unwrap();
        session.create_reader().unwrap();
        session.start_reader().unwrap();

        let err = session.read_raw(500, Duration::from_millis(200)).unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("received 200"));
    }

    #[test]
    fn test_available_samples_tracks_buffer() {
        let device = SimulatedDevice::default();
        let mut session = session_with(&device);
        session.set_sample_rate(1000.0).unwrap();
        session.configure_channels(two_channel_map()).unwrap();
        session.create_reader().unwrap();
        session.start_reader().unwrap();

        assert_eq!(session.available_samples().unwrap(), 0);
        device.advance(Duration::from_millis(100));
        assert_eq!(session.available_samples().unwrap(), 100);
        session.read_raw(60, Duration::ZERO).unwrap();
        assert_eq!(session.available_samples().unwrap(), 40);
    }

    #[test]
    fn test_reconfigure_replaces_epoch_and_stops_reader() {
        let device = SimulatedDevice::default();
        let mut session = session_with(&device);
        session.configure_channels(two_channel_map()).unwrap();
        session.create_reader().unwrap();

        let map = ChannelConfigMap::new().with_channel(4, ChannelSettings::new());
        session.configure_channels(map).unwrap();
        assert!(!session.has_reader());

        let epoch = session.configuration().unwrap();
        assert_eq!(epoch.channels().len(), 1);
        assert_eq!(epoch.signals().as_slice()[0].name, "AI 5");
        assert_eq!(epoch.channels().get(4).unwrap().name.as_deref(), Some("AI 5"));
    }

    #[test]
    fn test_failed_configuration_clears_epoch() {
        let device = SimulatedDevice::default();
        let mut session = session_with(&device);
        session.configure_channels(two_channel_map()).unwrap();

        let bad = ChannelConfigMap::new().with_channel(99, ChannelSettings::new());
        assert!(session.configure_channels(bad).unwrap_err().is_index_error());
        assert!(session.configuration().is_none());
    }

    #[test]
    fn test_acquire_processed_array() {
        let device = SimulatedDevice::default();
        device.set_waveform(0, Waveform::Constant(2.0)).unwrap();
        device.set_waveform(1, Waveform::Constant(10.0)).unwrap();
        let mut session = session_with(&device);
        session.set_sample_rate(100.0).unwrap();
        session.configure_channels(two_channel_map()).unwrap();

        let data = session
            .acquire_processed(Duration::from_millis(500), OutputFormat::Array)
            .unwrap();
        let array = data.as_array().unwrap();
        assert_eq!(array.dim(), (50, 2));
        assert_eq!(data.sample_count(), 50);
        // 10 mV / (10 mV/g) = 1 g = 9.81 m/s^2
        assert!((array[[0, 0]] - 9.81).abs() < 1e-12);
        assert!((array[[0, 1]] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_overlong_acquisition_is_rejected() {
        let device = SimulatedDevice::default();
        let mut session = session_with(&device);
        session.configure_channels(two_channel_map()).unwrap();

        for duration in [Duration::from_secs(u64::MAX / 2 + 1), Duration::MAX] {
            let err = session
                .acquire_processed(duration, OutputFormat::Array)
                .unwrap_err();
            assert!(matches!(err, SiriusError::AcquisitionTooLong { .. }));
            assert!(!session.has_reader());
            assert_eq!(device.open_readers(), 0);
        }

        // The session is still usable afterwards
        let data = session
            .acquire_processed(Duration::from_millis(10), OutputFormat::Array)
            .unwrap();
        assert_eq!(data.sample_count(), 10);
    }

    #[test]
    fn test_acquire_processed_labeled() {
        let device = SimulatedDevice::default();
        let mut session = session_with(&device);
        session.set_sample_rate(1000.0).unwrap();
        session.configure_channels(two_channel_map()).unwrap();

        let data = session
            .acquire_processed(Duration::from_secs(1), OutputFormat::Labeled)
            .unwrap();
        let labeled = data.as_labeled().unwrap();
        let keys: Vec<&str> = labeled.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["acc_Y", "vol_1", "time"]);
        assert_eq!(labeled["acc_Y"].unit, "m/s^2");
        assert_eq!(labeled["vol_1"].unit, "V");

        let time = &labeled["time"].signal;
        assert_eq!(time.len(), 1000);
        assert_eq!(time[0], 0.0);
        assert!((time[999] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_calibrate_columns_independently() {
        let raw = array![[100.0, 1.0], [200.0, 2.0]];
        let map = ChannelConfigMap::new()
            .with_channel(0, ChannelSettings::new().with_sensitivity(100.0, "mV/g").with_unit("g"))
            .with_channel(1, ChannelSettings::new());
        let out = calibrate(raw.view(), &map);
        assert_eq!(out, array![[1.0, 1.0], [2.0, 2.0]]);
    }

    #[test]
    fn test_channel_listing() {
        let device = SimulatedDevice::default();
        let session = session_with(&device);
        let listing = session.channel_listing().unwrap();
        assert_eq!(listing.len(), 8);
        assert_eq!(listing[0].function_blocks[0].name, "Amplifier");

        let text = listing[0].to_string();
        assert!(text.contains("Channel Name     : AI 1"));
        assert!(text.contains("Measurement"));
        assert!(text.contains("[IEPE, Voltage]"));
    }

    #[test]
    fn test_session_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AcquisitionSession>();
    }
}
