//! Channel configuration.
//!
//! Maps declarative per-channel settings onto the device's amplifier
//! properties. Enumerated properties are validated against the legal-value
//! list the device reports *at the time of the write*, so a mode change
//! (e.g. switching `Measurement` to IEPE) that alters other properties'
//! option lists is honoured within a single pass.
//!
//! Invalid values are not errors: they are logged, collected in a
//! [`ConfigureReport`], and the property keeps its previous value.
//! Structural problems (bad channel index, missing amplifier block, driver
//! write failures) are propagated.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::driver::{Device, PropertyValue};
use crate::error::{Result, SiriusError};
use crate::signal::{self, ActiveSignalSet};

/// Sensitivity applied when none is configured.
pub const DEFAULT_SENSITIVITY: f64 = 1.0;
/// Sensitivity unit applied when none is configured.
pub const DEFAULT_SENSITIVITY_UNIT: &str = "V/V";
/// Output unit applied when none is configured.
pub const DEFAULT_UNIT: &str = "V";

/// Settings for one channel, keyed by the device's property names.
///
/// Amplifier settings (`Measurement`, `Range`, `HPFilter`, `Excitation` and
/// any key collected in `extra`) are written to the channel's amplifier.
/// `Sensitivity`, `Sensitivity Unit` and `Unit` are host-side calibration
/// metadata used when converting samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Channel display name
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Measurement mode (e.g. "IEPE", "Voltage")
    #[serde(rename = "Measurement", default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<PropertyValue>,

    /// Input range, in the unit the device reports for the current mode
    #[serde(rename = "Range", default, skip_serializing_if = "Option::is_none")]
    pub range: Option<PropertyValue>,

    /// High-pass filter (e.g. "DC", "AC 1Hz")
    #[serde(rename = "HPFilter", default, skip_serializing_if = "Option::is_none")]
    pub hp_filter: Option<PropertyValue>,

    /// IEPE excitation current in mA
    #[serde(rename = "Excitation", default, skip_serializing_if = "Option::is_none")]
    pub excitation: Option<PropertyValue>,

    /// Transducer sensitivity (scale factor)
    #[serde(rename = "Sensitivity", default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f64>,

    /// Sensitivity unit of the form `"<input>/<output>"`, e.g. `"mV/g"`
    #[serde(
        rename = "Sensitivity Unit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sensitivity_unit: Option<String>,

    /// Output unit of calibrated samples
    #[serde(rename = "Unit", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Any other amplifier property, by name
    #[serde(flatten)]
    pub extra: IndexMap<String, PropertyValue>,
}

impl ChannelSettings {
    /// Empty settings: nothing is written to the amplifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the measurement mode.
    pub fn with_measurement(mut self, value: impl Into<PropertyValue>) -> Self {
        self.measurement = Some(value.into());
        self
    }

    /// Set the input range.
    pub fn with_range(mut self, value: impl Into<PropertyValue>) -> Self {
        self.range = Some(value.into());
        self
    }

    /// Set the high-pass filter.
    pub fn with_hp_filter(mut self, value: impl Into<PropertyValue>) -> Self {
        self.hp_filter = Some(value.into());
        self
    }

    /// Set the excitation current.
    pub fn with_excitation(mut self, value: impl Into<PropertyValue>) -> Self {
        self.excitation = Some(value.into());
        self
    }

    /// Set the transducer sensitivity and its unit.
    pub fn with_sensitivity(mut self, sensitivity: f64, unit: impl Into<String>) -> Self {
        self.sensitivity = Some(sensitivity);
        self.sensitivity_unit = Some(unit.into());
        self
    }

    /// Set the output unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Request an arbitrary amplifier property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Value requested for the amplifier property `property`, if any.
    pub fn requested(&self, property: &str) -> Option<&PropertyValue> {
        match property {
            "Measurement" => self.measurement.as_ref(),
            "Range" => self.range.as_ref(),
            "HPFilter" => self.hp_filter.as_ref(),
            "Excitation" => self.excitation.as_ref(),
            other => self.extra.get(other),
        }
    }

    /// Names of all amplifier properties these settings request.
    pub fn requested_properties(&self) -> Vec<&str> {
        let named = [
            ("Measurement", &self.measurement),
            ("Range", &self.range),
            ("HPFilter", &self.hp_filter),
            ("Excitation", &self.excitation),
        ];
        named
            .iter()
            .filter(|(_, value)| value.is_some())
            .map(|(name, _)| *name)
            .chain(self.extra.keys().map(String::as_str))
            .collect()
    }

    /// Sensitivity, defaulting to 1.0.
    pub fn sensitivity(&self) -> f64 {
        self.sensitivity.unwrap_or(DEFAULT_SENSITIVITY)
    }

    /// Sensitivity unit, defaulting to "V/V".
    pub fn sensitivity_unit(&self) -> &str {
        self.sensitivity_unit
            .as_deref()
            .unwrap_or(DEFAULT_SENSITIVITY_UNIT)
    }

    /// Output unit, defaulting to "V".
    pub fn unit(&self) -> &str {
        self.unit.as_deref().unwrap_or(DEFAULT_UNIT)
    }
}

/// Ordered mapping from channel index to settings.
///
/// Insertion order defines the column order of every acquisition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelConfigMap {
    entries: IndexMap<usize, ChannelSettings>,
}

impl ChannelConfigMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the settings of a channel.
    ///
    /// Replacing keeps the channel's original position.
    pub fn insert(&mut self, channel: usize, settings: ChannelSettings) -> Option<ChannelSettings> {
        self.entries.insert(channel, settings)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_channel(mut self, channel: usize, settings: ChannelSettings) -> Self {
        self.insert(channel, settings);
        self
    }

    /// Settings of a channel.
    pub fn get(&self, channel: usize) -> Option<&ChannelSettings> {
        self.entries.get(&channel)
    }

    /// Channel indices in insertion order.
    pub fn channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.keys().copied()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ChannelSettings)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Number of configured channels.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no channel is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fill in missing names with the device's current channel names.
    pub fn resolve_names(&mut self, device: &dyn Device) {
        let channels = device.channels_recursive();
        for (index, settings) in self.entries.iter_mut() {
            if settings.name.is_none() {
                if let Some(channel) = channels.get(*index) {
                    settings.name = Some(channel.name());
                }
            }
        }
    }
}

impl FromIterator<(usize, ChannelSettings)> for ChannelConfigMap {
    fn from_iter<I: IntoIterator<Item = (usize, ChannelSettings)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A requested value that was not in the property's legal-value list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedSetting {
    /// Channel index
    pub channel: usize,
    /// Amplifier property name
    pub property: String,
    /// The value that was requested
    pub requested: PropertyValue,
    /// Legal values at the time of the write
    pub legal_values: Vec<PropertyValue>,
}

impl fmt::Display for RejectedSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let legal: Vec<String> = self.legal_values.iter().map(|v| v.to_string()).collect();
        write!(
            f,
            "channel {}: setting '{}' not available for property '{}'; available values are: [{}]",
            self.channel,
            self.requested,
            self.property,
            legal.join(", ")
        )
    }
}

/// Outcome of a configuration pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigureReport {
    /// Settings that were rejected and left unchanged on the device
    pub rejected: Vec<RejectedSetting>,
}

impl ConfigureReport {
    /// Check if every requested setting was applied.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Append another report's rejections.
    pub fn merge(&mut self, other: ConfigureReport) {
        self.rejected.extend(other.rejected);
    }
}

/// Apply `settings` to the channel at `channel_index`.
///
/// # Errors
///
/// - [`SiriusError::ChannelIndexOutOfRange`] if the channel does not exist
/// - [`SiriusError::MissingFunctionBlock`] if it has no amplifier block
/// - any driver error raised while writing a property
pub fn configure_channel(
    device: &dyn Device,
    channel_index: usize,
    settings: &ChannelSettings,
) -> Result<ConfigureReport> {
    let channels = device.channels_recursive();
    let channel = channels
        .get(channel_index)
        .ok_or(SiriusError::ChannelIndexOutOfRange {
            index: channel_index,
            available: channels.len(),
        })?;

    if let Some(name) = &settings.name {
        channel.set_name(name)?;
        debug!(channel = channel_index, name = %name, "Channel renamed");
    }

    let amplifier = channel
        .function_blocks()
        .into_iter()
        .next()
        .ok_or(SiriusError::MissingFunctionBlock {
            channel: channel_index,
        })?;

    let mut report = ConfigureReport::default();
    let mut handled: HashSet<String> = HashSet::new();

    // Re-list after every write: a mode change can reveal new properties
    // or replace the option lists of others.
    loop {
        let next = amplifier.list_properties().into_iter().find_map(|prop| {
            if handled.contains(&prop.name) {
                return None;
            }
            settings
                .requested(&prop.name)
                .cloned()
                .map(|requested| (prop, requested))
        });
        let Some((prop, requested)) = next else {
            break;
        };
        handled.insert(prop.name.clone());

        match &prop.selection_values {
            Some(legal) => match legal.iter().position(|v| *v == requested) {
                Some(index) => {
                    amplifier.set(&prop.name, PropertyValue::Integer(index as i64))?;
                    debug!(
                        channel = channel_index,
                        property = %prop.name,
                        value = %requested,
                        index,
                        "Property set"
                    );
                }
                None => {
                    let rejected = RejectedSetting {
                        channel: channel_index,
                        property: prop.name.clone(),
                        requested,
                        legal_values: legal.clone(),
                    };
                    warn!(
                        channel = channel_index,
                        property = %rejected.property,
                        requested = %rejected.requested,
                        "{}",
                        rejected
                    );
                    report.rejected.push(rejected);
                }
            },
            None => {
                amplifier.set(&prop.name, requested.clone())?;
                debug!(
                    channel = channel_index,
                    property = %prop.name,
                    value = %requested,
                    "Property set"
                );
            }
        }
    }

    for property in settings.requested_properties() {
        if !handled.contains(property) {
            debug!(
                channel = channel_index,
                property = property,
                "Requested property is not visible on the amplifier, skipped"
            );
        }
    }

    Ok(report)
}

/// Apply every entry of `map` in order, then derive the active signals.
///
/// An empty map configures nothing and yields an empty signal set.
pub fn configure_all(
    device: &dyn Device,
    map: &ChannelConfigMap,
) -> Result<(ActiveSignalSet, ConfigureReport)> {
    let mut report = ConfigureReport::default();
    for (channel, settings) in map.iter() {
        report.merge(configure_channel(device, channel, settings)?);
    }

    let signals = signal::select_signals(device, map)?;
    info!(
        channels = map.len(),
        rejected = report.rejected.len(),
        "Channels configured"
    );
    Ok((signals, report))
}
