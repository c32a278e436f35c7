//! Simulated Sirius-class device.
//!
//! Implements the [`driver`](crate::driver) traits in-process so the
//! configuration and acquisition pipeline can run without hardware.
//!
//! # Simulated hardware
//!
//! - N analog channels, each with one "Amplifier" function block
//! - `Measurement`: IEPE / Voltage
//! - `Range`: IEPE [10000, 5000, 1000, 200] mV, Voltage [10, 5, 1, 0.2] V
//! - `HPFilter`: IEPE [AC 0.1Hz, AC 1Hz], Voltage [DC, AC 0.1Hz, AC 1Hz]
//! - `Excitation`: [2, 4, 6] mA, visible only in IEPE mode
//! - `Offset`: free numeric property (not enumerated)
//! - `SampleRate`: quantized to the nearest entry of [`SUPPORTED_SAMPLE_RATES`]
//!
//! The signal catalog contains one "AI n" signal per channel, interleaved
//! with non-analog signals, so catalog order differs from channel order.
//!
//! # Timing model
//!
//! Readers run on a virtual clock: a read that needs more samples than are
//! buffered "waits" by producing up to `sample_rate * timeout` samples, and
//! returns a short batch when that is not enough. Nothing sleeps. Use
//! [`SimulatedDevice::advance`] to let buffered samples accumulate and
//! [`SimulatedDevice::set_stalled`] to stop sample production entirely.
//!
//! # Example
//!
//! ```
//! use sirius_daq::driver::simulated::{SimulatedDevice, SimulatedInstance};
//! use sirius_daq::driver::Instance;
//!
//! let device = SimulatedDevice::default();
//! let mut instance = SimulatedInstance::with_devices(vec![device.clone()]);
//! assert_eq!(instance.available_devices().len(), 1);
//! assert!(instance.add_device(&device.connection_string()).is_ok());
//! ```

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use ndarray::Array2;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::{
    Channel, Device, DeviceDescriptor, FunctionBlock, Instance, MultiReader, PropertyInfo,
    PropertyValue, ReadTimeoutType, SignalHandle, SAMPLE_RATE_PROPERTY,
};
use crate::error::{Result, SiriusError};

/// Connection-string scheme accepted by the simulated transport.
pub const SIMULATED_SCHEME: &str = "daq.sim://";

/// Sample rates the simulated device can run at, in Hz.
pub const SUPPORTED_SAMPLE_RATES: &[f64] = &[
    10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 2500.0, 5000.0, 10000.0, 12500.0,
    20000.0, 25000.0, 40000.0, 50000.0, 100000.0, 200000.0,
];

const MEASUREMENT_MODES: [&str; 2] = ["IEPE", "Voltage"];
const IEPE: usize = 0;
const VOLTAGE: usize = 1;

/// Return the supported rate closest to `requested` (ties go to the lower rate).
pub fn quantize_sample_rate(requested: f64) -> f64 {
    SUPPORTED_SAMPLE_RATES
        .iter()
        .copied()
        .fold(SUPPORTED_SAMPLE_RATES[0], |best, rate| {
            if (rate - requested).abs() < (best - requested).abs() {
                rate
            } else {
                best
            }
        })
}

/// Configuration for a simulated device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedDeviceConfig {
    /// Device name reported during discovery
    #[serde(default = "default_name")]
    pub name: String,
    /// Address the device answers to (must start with `daq.sim://`)
    #[serde(default = "default_connection_string")]
    pub connection_string: String,
    /// Number of analog input channels
    #[serde(default = "default_channel_count")]
    pub channel_count: usize,
    /// Initial sample rate in Hz (quantized on creation)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
}

fn default_name() -> String {
    "SiriusX-1".to_string()
}

fn default_connection_string() -> String {
    format!("{}sirius-1", SIMULATED_SCHEME)
}

fn default_channel_count() -> usize {
    8
}

fn default_sample_rate() -> f64 {
    1000.0
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            connection_string: default_connection_string(),
            channel_count: default_channel_count(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Waveform produced by a simulated signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// `amplitude * sin(2 pi f t)`
    Sine {
        /// Peak value
        amplitude: f64,
        /// Frequency in Hz
        frequency_hz: f64,
    },
    /// Fixed value
    Constant(f64),
}

impl Waveform {
    fn sample(&self, index: u64, sample_rate: f64) -> f64 {
        match *self {
            Waveform::Sine {
                amplitude,
                frequency_hz,
            } => amplitude * (2.0 * PI * frequency_hz * index as f64 / sample_rate).sin(),
            Waveform::Constant(value) => value,
        }
    }
}

// =============================================================================
// Instance
// =============================================================================

/// Simulated transport: discovers and connects to [`SimulatedDevice`]s.
pub struct SimulatedInstance {
    devices: Vec<SimulatedDevice>,
}

impl SimulatedInstance {
    /// Create a transport that knows the given devices.
    pub fn with_devices(devices: Vec<SimulatedDevice>) -> Self {
        Self { devices }
    }
}

impl Default for SimulatedInstance {
    fn default() -> Self {
        Self::with_devices(vec![SimulatedDevice::default()])
    }
}

impl Instance for SimulatedInstance {
    fn available_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.iter().map(|d| d.info()).collect()
    }

    fn add_device(&mut self, connection_string: &str) -> Result<Box<dyn Device>> {
        if !connection_string.starts_with(SIMULATED_SCHEME) {
            return Err(SiriusError::ConnectionFailed {
                connection_string: connection_string.to_string(),
                message: format!("unsupported scheme, expected '{}'", SIMULATED_SCHEME),
            });
        }

        self.devices
            .iter()
            .find(|d| d.connection_string() == connection_string)
            .map(|d| Box::new(d.clone()) as Box<dyn Device>)
            .ok_or_else(|| SiriusError::ConnectionFailed {
                connection_string: connection_string.to_string(),
                message: "no device answers at this address".to_string(),
            })
    }
}

// =============================================================================
// Device
// =============================================================================

struct DeviceState {
    descriptor: DeviceDescriptor,
    channels: Vec<Arc<SimulatedChannel>>,
    signals: Vec<SignalHandle>,
    sample_rate: RwLock<f64>,
    waveforms: RwLock<HashMap<String, Waveform>>,
    stalled: AtomicBool,
    readers: Mutex<Vec<Weak<Mutex<ReaderBuffer>>>>,
}

/// A simulated device. Clones share the same device state.
#[derive(Clone)]
pub struct SimulatedDevice {
    state: Arc<DeviceState>,
}

impl SimulatedDevice {
    /// Create a device from configuration.
    pub fn new(config: SimulatedDeviceConfig) -> Self {
        let channels: Vec<Arc<SimulatedChannel>> = (0..config.channel_count)
            .map(|i| {
                Arc::new(SimulatedChannel::new(
                    format!("{}/Ch/AI{}", config.name, i + 1),
                    format!("AI {}", i + 1),
                ))
            })
            .collect();

        let ai_signals: Vec<SignalHandle> = (0..config.channel_count)
            .map(|i| SignalHandle {
                global_id: format!("{}/Sig/AI{}", config.name, i + 1),
                name: format!("AI {}", i + 1),
            })
            .collect();

        let mut waveforms = HashMap::new();
        for (i, signal) in ai_signals.iter().enumerate() {
            waveforms.insert(
                signal.global_id.clone(),
                Waveform::Sine {
                    amplitude: 1.0,
                    frequency_hz: 10.0 * (i + 1) as f64,
                },
            );
        }

        // Catalog order: non-analog signals interleaved with the analog ones
        let half = ai_signals.len() / 2;
        let mut signals = vec![SignalHandle {
            global_id: format!("{}/Sig/Sync", config.name),
            name: "Sync".to_string(),
        }];
        signals.extend(ai_signals[..half].iter().cloned());
        signals.push(SignalHandle {
            global_id: format!("{}/Sig/CAN1", config.name),
            name: "CAN 1".to_string(),
        });
        signals.extend(ai_signals[half..].iter().cloned());

        Self {
            state: Arc::new(DeviceState {
                descriptor: DeviceDescriptor {
                    name: config.name,
                    connection_string: config.connection_string,
                },
                channels,
                signals,
                sample_rate: RwLock::new(quantize_sample_rate(config.sample_rate)),
                waveforms: RwLock::new(waveforms),
                stalled: AtomicBool::new(false),
                readers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Address this device answers to.
    pub fn connection_string(&self) -> String {
        self.state.descriptor.connection_string.clone()
    }

    /// Current sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        *self.state.sample_rate.read()
    }

    /// Replace the waveform of the `ai_index`-th analog-input signal.
    pub fn set_waveform(&self, ai_index: usize, waveform: Waveform) -> Result<()> {
        let available = self.state.channels.len();
        let signal_id = format!("{}/Sig/AI{}", self.state.descriptor.name, ai_index + 1);
        if ai_index >= available {
            return Err(SiriusError::SignalIndexOutOfRange {
                index: ai_index,
                available,
            });
        }
        self.state.waveforms.write().insert(signal_id, waveform);
        Ok(())
    }

    /// Stop (or resume) sample production; reads then time out.
    pub fn set_stalled(&self, stalled: bool) {
        self.state.stalled.store(stalled, Ordering::Release);
    }

    /// Let virtual time pass: every open reader buffers `rate * elapsed` samples.
    pub fn advance(&self, elapsed: Duration) {
        if self.state.stalled.load(Ordering::Acquire) {
            return;
        }
        let produced = (self.sample_rate() * elapsed.as_secs_f64()).floor() as usize;
        let mut readers = self.state.readers.lock();
        readers.retain(|weak| match weak.upgrade() {
            Some(buffer) => {
                buffer.lock().buffered += produced;
                true
            }
            None => false,
        });
    }

    /// Number of readers still alive.
    pub fn open_readers(&self) -> usize {
        let mut readers = self.state.readers.lock();
        readers.retain(|weak| weak.strong_count() > 0);
        readers.len()
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(SimulatedDeviceConfig::default())
    }
}

impl Device for SimulatedDevice {
    fn info(&self) -> DeviceDescriptor {
        self.state.descriptor.clone()
    }

    fn channels_recursive(&self) -> Vec<Arc<dyn Channel>> {
        self.state
            .channels
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn Channel>)
            .collect()
    }

    fn signals_recursive(&self) -> Vec<SignalHandle> {
        self.state.signals.clone()
    }

    fn property_value(&self, name: &str) -> Result<PropertyValue> {
        match name {
            SAMPLE_RATE_PROPERTY => Ok(PropertyValue::Float(self.sample_rate())),
            _ => Err(SiriusError::UnknownProperty {
                owner: self.state.descriptor.name.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn set_property_value(&self, name: &str, value: PropertyValue) -> Result<()> {
        if name != SAMPLE_RATE_PROPERTY {
            return Err(SiriusError::UnknownProperty {
                owner: self.state.descriptor.name.clone(),
                name: name.to_string(),
            });
        }

        let requested = value.as_f64().ok_or_else(|| SiriusError::PropertyType {
            name: name.to_string(),
            expected: "number".to_string(),
            actual: value.type_name().to_string(),
        })?;
        let rate = quantize_sample_rate(requested);
        *self.state.sample_rate.write() = rate;
        debug!(requested, applied = rate, "Simulated sample rate set");
        Ok(())
    }

    fn create_multi_reader(
        &self,
        signals: &[SignalHandle],
        timeout_type: ReadTimeoutType,
    ) -> Result<Box<dyn MultiReader>> {
        if signals.is_empty() {
            return Err(SiriusError::driver(
                "create_multi_reader",
                "at least one signal is required",
            ));
        }

        let waveforms = self.state.waveforms.read();
        let mut signal_waveforms = Vec::with_capacity(signals.len());
        for signal in signals {
            let waveform = waveforms.get(&signal.global_id).copied().ok_or_else(|| {
                SiriusError::driver(
                    "create_multi_reader",
                    format!("signal '{}' cannot be read", signal.name),
                )
            })?;
            signal_waveforms.push(waveform);
        }

        let buffer = Arc::new(Mutex::new(ReaderBuffer::default()));
        self.state.readers.lock().push(Arc::downgrade(&buffer));

        Ok(Box::new(SimulatedReader {
            device: Arc::clone(&self.state),
            waveforms: signal_waveforms,
            timeout_type,
            buffer,
        }))
    }
}

// =============================================================================
// Channel and amplifier
// =============================================================================

struct SimulatedChannel {
    global_id: String,
    name: RwLock<String>,
    amplifier: Arc<Amplifier>,
}

impl SimulatedChannel {
    fn new(global_id: String, name: String) -> Self {
        Self {
            global_id,
            name: RwLock::new(name),
            amplifier: Arc::new(Amplifier::default()),
        }
    }
}

impl Channel for SimulatedChannel {
    fn global_id(&self) -> String {
        self.global_id.clone()
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn set_name(&self, name: &str) -> Result<()> {
        *self.name.write() = name.to_string();
        Ok(())
    }

    fn function_blocks(&self) -> Vec<Arc<dyn FunctionBlock>> {
        vec![Arc::clone(&self.amplifier) as Arc<dyn FunctionBlock>]
    }
}

#[derive(Debug, Clone)]
struct AmplifierState {
    measurement: usize,
    range: usize,
    hp_filter: usize,
    excitation: usize,
    offset: f64,
}

impl Default for AmplifierState {
    fn default() -> Self {
        Self {
            measurement: VOLTAGE,
            range: 0,
            hp_filter: 0,
            excitation: 0,
            offset: 0.0,
        }
    }
}

#[derive(Default)]
struct Amplifier {
    state: RwLock<AmplifierState>,
}

fn range_options(measurement: usize) -> (Vec<PropertyValue>, &'static str) {
    use PropertyValue::{Float, Integer};
    if measurement == IEPE {
        (
            vec![Integer(10000), Integer(5000), Integer(1000), Integer(200)],
            "mV",
        )
    } else {
        (vec![Float(10.0), Float(5.0), Float(1.0), Float(0.2)], "V")
    }
}

fn hp_filter_options(measurement: usize) -> Vec<PropertyValue> {
    if measurement == IEPE {
        vec!["AC 0.1Hz".into(), "AC 1Hz".into()]
    } else {
        vec!["DC".into(), "AC 0.1Hz".into(), "AC 1Hz".into()]
    }
}

fn excitation_options() -> Vec<PropertyValue> {
    vec![
        PropertyValue::Float(2.0),
        PropertyValue::Float(4.0),
        PropertyValue::Float(6.0),
    ]
}

impl Amplifier {
    fn enumerated(
        name: &str,
        index: usize,
        options: Vec<PropertyValue>,
        unit: Option<&str>,
    ) -> PropertyInfo {
        PropertyInfo {
            name: name.to_string(),
            value: PropertyValue::Integer(index as i64),
            selection_values: Some(options),
            unit: unit.map(str::to_string),
        }
    }

    fn index_for(name: &str, value: &PropertyValue, len: usize) -> Result<usize> {
        match value.as_index() {
            Some(idx) if idx < len => Ok(idx),
            _ => Err(SiriusError::PropertyType {
                name: name.to_string(),
                expected: format!("selection index 0..{}", len),
                actual: value.to_string(),
            }),
        }
    }
}

impl FunctionBlock for Amplifier {
    fn name(&self) -> String {
        "Amplifier".to_string()
    }

    fn list_properties(&self) -> Vec<PropertyInfo> {
        let state = self.state.read();
        let (ranges, range_unit) = range_options(state.measurement);

        let mut properties = vec![
            Self::enumerated(
                "Measurement",
                state.measurement,
                MEASUREMENT_MODES.iter().map(|m| (*m).into()).collect(),
                None,
            ),
            Self::enumerated("Range", state.range, ranges, Some(range_unit)),
            Self::enumerated(
                "HPFilter",
                state.hp_filter,
                hp_filter_options(state.measurement),
                None,
            ),
        ];
        if state.measurement == IEPE {
            properties.push(Self::enumerated(
                "Excitation",
                state.excitation,
                excitation_options(),
                Some("mA"),
            ));
        }
        properties.push(PropertyInfo {
            name: "Offset".to_string(),
            value: PropertyValue::Float(state.offset),
            selection_values: None,
            unit: Some(range_unit.to_string()),
        });
        properties
    }

    fn set(&self, name: &str, value: PropertyValue) -> Result<()> {
        let mut state = self.state.write();
        match name {
            "Measurement" => {
                let mode = Self::index_for(name, &value, MEASUREMENT_MODES.len())?;
                if mode != state.measurement {
                    state.measurement = mode;
                    // Option lists change with the mode; fall back to the first entry
                    if state.range >= range_options(mode).0.len() {
                        state.range = 0;
                    }
                    if state.hp_filter >= hp_filter_options(mode).len() {
                        state.hp_filter = 0;
                    }
                }
            }
            "Range" => {
                let len = range_options(state.measurement).0.len();
                state.range = Self::index_for(name, &value, len)?;
            }
            "HPFilter" => {
                state.hp_filter =
                    Self::index_for(name, &value, hp_filter_options(state.measurement).len())?;
            }
            "Excitation" if state.measurement == IEPE => {
                state.excitation = Self::index_for(name, &value, excitation_options().len())?;
            }
            "Offset" => {
                state.offset = value.as_f64().ok_or_else(|| SiriusError::PropertyType {
                    name: name.to_string(),
                    expected: "number".to_string(),
                    actual: value.type_name().to_string(),
                })?;
            }
            _ => {
                return Err(SiriusError::UnknownProperty {
                    owner: "Amplifier".to_string(),
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }
}

// =============================================================================
// Reader
// =============================================================================

#[derive(Debug, Default)]
struct ReaderBuffer {
    /// Samples per signal produced but not yet read
    buffered: usize,
    /// Index of the next sample to deliver
    position: u64,
}

struct SimulatedReader {
    device: Arc<DeviceState>,
    waveforms: Vec<Waveform>,
    timeout_type: ReadTimeoutType,
    buffer: Arc<Mutex<ReaderBuffer>>,
}

impl MultiReader for SimulatedReader {
    fn read(&mut self, count: usize, timeout_ms: u64) -> Result<Array2<f64>> {
        let rate = *self.device.sample_rate.read();
        let stalled = self.device.stalled.load(Ordering::Acquire);
        let mut buffer = self.buffer.lock();

        let must_wait = match self.timeout_type {
            ReadTimeoutType::All => count > buffer.buffered,
            ReadTimeoutType::Any => buffer.buffered == 0 && count > 0,
        };
        if must_wait && !stalled {
            let needed = count - buffer.buffered;
            let producible = (rate * timeout_ms as f64 / 1000.0).floor() as usize;
            buffer.buffered += needed.min(producible);
        }

        let delivered = count.min(buffer.buffered);
        buffer.buffered -= delivered;
        let start = buffer.position;
        buffer.position += delivered as u64;

        let waveforms = &self.waveforms;
        Ok(Array2::from_shape_fn((waveforms.len(), delivered), |(sig, t)| {
            waveforms[sig].sample(start + t as u64, rate)
        }))
    }

    fn available_count(&self) -> usize {
        self.buffer.lock().buffered
    }
}
