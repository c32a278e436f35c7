//! # Sirius DAQ
//!
//! Host-side control and acquisition for Sirius-class multi-channel DAQ
//! devices: discover and connect to a device, configure per-channel analog
//! front-end settings, read synchronized multi-channel sample batches and
//! convert them into calibrated physical units.
//!
//! ## Crate Structure
//!
//! - **`driver`**: the device object model (instance, device, channel,
//!   function block, multi-reader) as traits, plus an in-process simulated
//!   device in `driver::simulated`.
//! - **`channel`**: per-channel settings and the configurator that writes
//!   them to the amplifier, validating enumerated values.
//! - **`signal`**: selection of the analog-input signals to read, in
//!   configuration order.
//! - **`session`**: `AcquisitionSession`, which owns the device, the current
//!   configuration and the reader lifecycle, and assembles output.
//! - **`conversion`**: sensitivity correction and g / m/s^2 conversion.
//! - **`config`**: Figment-based TOML + environment configuration.
//! - **`logging`**: `tracing-subscriber` initialization.
//! - **`error`**: the `SiriusError` enum used throughout the crate.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use sirius_daq::channel::{ChannelConfigMap, ChannelSettings};
//! use sirius_daq::driver::simulated::SimulatedInstance;
//! use sirius_daq::session::{AcquisitionSession, OutputFormat};
//!
//! # fn main() -> sirius_daq::Result<()> {
//! let mut session = AcquisitionSession::new(Box::new(SimulatedInstance::default()));
//! for device in session.list_available_devices() {
//!     println!("{} at {}", device.name, device.connection_string);
//! }
//! session.try_connect("daq.sim://sirius-1")?;
//!
//! let channels = ChannelConfigMap::new()
//!     .with_channel(0, ChannelSettings::new().with_name("vol_1").with_measurement("Voltage"));
//! let report = session.configure_channels(channels)?;
//! assert!(report.is_clean());
//!
//! let data = session.acquire_processed(Duration::from_millis(100), OutputFormat::Array)?;
//! assert_eq!(data.sample_count(), 100);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod conversion;
pub mod driver;
pub mod error;
pub mod logging;
pub mod session;
pub mod signal;

pub use channel::{ChannelConfigMap, ChannelSettings, ConfigureReport, RejectedSetting};
pub use error::{Result, SiriusError};
pub use session::{Acquisition, AcquisitionSession, OutputFormat};
