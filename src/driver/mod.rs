//! Device driver abstraction.
//!
//! The hardware-abstraction library that talks to the device is an external
//! collaborator. This module defines the surface the rest of the crate relies
//! on, modelled on the object tree such libraries expose:
//!
//! - [`Instance`] - discovers devices and opens connections
//! - [`Device`] - channel and signal catalogs plus device-level properties
//! - [`Channel`] - a physical input with its signal-conditioning blocks
//! - [`FunctionBlock`] - a dynamic property bag (amplifier settings)
//! - [`MultiReader`] - synchronized multi-signal sample reader
//!
//! Property values are dynamically typed ([`PropertyValue`]). Enumerated
//! properties store an *index* into their selection list; the human-readable
//! options are reported by [`PropertyInfo::selection_values`].
//!
//! [`simulated`] provides an in-process implementation used by the CLI and
//! the test suite.

pub mod simulated;

use std::fmt;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of the device-level sample rate property.
pub const SAMPLE_RATE_PROPERTY: &str = "SampleRate";

/// A dynamically-typed property value.
///
/// Numeric comparison ignores the integer/float distinction, so a requested
/// `2` matches a legal value of `2.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean flag
    Bool(bool),
    /// Integer, also used for enumeration indices
    Integer(i64),
    /// Floating-point number
    Float(f64),
    /// Text, e.g. an enumeration label
    Text(String),
}

impl PropertyValue {
    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of the value, used for enumeration indices.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Integer(v) if *v >= 0 => Some(*v as usize),
            _ => None,
        }
    }

    /// Text view of the value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }

    /// Check whether two values have the same type class (numbers are one class).
    pub fn same_kind(&self, other: &PropertyValue) -> bool {
        match (self, other) {
            (Self::Bool(_), Self::Bool(_)) | (Self::Text(_), Self::Text(_)) => true,
            _ => self.as_f64().is_some() && other.as_f64().is_some(),
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Snapshot of one visible property of a function block.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    /// Property name (e.g. "Measurement")
    pub name: String,
    /// Stored value; an index into `selection_values` for enumerated properties
    pub value: PropertyValue,
    /// Human-readable legal values, if the property is enumerated
    pub selection_values: Option<Vec<PropertyValue>>,
    /// Unit symbol, if any
    pub unit: Option<String>,
}

impl PropertyInfo {
    /// Check if the property is restricted to a list of options.
    pub fn is_enumerated(&self) -> bool {
        self.selection_values.is_some()
    }

    /// Human-readable form of the current value.
    ///
    /// For enumerated properties this resolves the stored index.
    pub fn display_value(&self) -> PropertyValue {
        match (&self.selection_values, self.value.as_index()) {
            (Some(options), Some(idx)) if idx < options.len() => options[idx].clone(),
            _ => self.value.clone(),
        }
    }
}

/// A device reported during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device name
    pub name: String,
    /// Address used to connect to the device
    pub connection_string: String,
}

/// Handle to a signal in the device's signal catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalHandle {
    /// Globally unique signal identifier
    pub global_id: String,
    /// Signal name (analog-input signals contain "AI ")
    pub name: String,
}

/// Policy deciding when a multi-signal read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadTimeoutType {
    /// Return once every signal has the requested count (or on timeout)
    #[default]
    All,
    /// Return as soon as any data is available
    Any,
}

/// Entry point of the driver library: device discovery and connection.
pub trait Instance: Send {
    /// Devices visible to the transport.
    fn available_devices(&self) -> Vec<DeviceDescriptor>;

    /// Connect to a device by address.
    fn add_device(&mut self, connection_string: &str) -> Result<Box<dyn Device>>;
}

/// A connected device.
pub trait Device: Send {
    /// Descriptor of the connected device.
    fn info(&self) -> DeviceDescriptor;

    /// All channels, recursively enumerated, in device order.
    fn channels_recursive(&self) -> Vec<Arc<dyn Channel>>;

    /// All signals, recursively enumerated, in catalog order.
    fn signals_recursive(&self) -> Vec<SignalHandle>;

    /// Read a device-level property.
    fn property_value(&self, name: &str) -> Result<PropertyValue>;

    /// Write a device-level property. The device may adjust the value.
    fn set_property_value(&self, name: &str, value: PropertyValue) -> Result<()>;

    /// Create a synchronized reader over `signals`, in the given order.
    fn create_multi_reader(
        &self,
        signals: &[SignalHandle],
        timeout_type: ReadTimeoutType,
    ) -> Result<Box<dyn MultiReader>>;
}

/// A device channel.
pub trait Channel: Send + Sync {
    /// Globally unique channel identifier.
    fn global_id(&self) -> String;

    /// Display name.
    fn name(&self) -> String;

    /// Rename the channel.
    fn set_name(&self, name: &str) -> Result<()>;

    /// Signal-conditioning blocks; the first one is the amplifier.
    fn function_blocks(&self) -> Vec<Arc<dyn FunctionBlock>>;
}

/// A property bag with runtime-discovered properties.
pub trait FunctionBlock: Send + Sync {
    /// Block name (e.g. "Amplifier").
    fn name(&self) -> String;

    /// Currently visible properties, in device order.
    fn list_properties(&self) -> Vec<PropertyInfo>;

    /// Current state of a single visible property.
    fn property(&self, name: &str) -> Option<PropertyInfo> {
        self.list_properties().into_iter().find(|p| p.name == name)
    }

    /// Write a property. Enumerated properties take an index.
    fn set(&self, name: &str, value: PropertyValue) -> Result<()>;
}

/// Synchronized reader over an ordered list of signals.
pub trait MultiReader: Send {
    /// Read up to `count` samples per signal, waiting at most `timeout_ms`.
    ///
    /// The result is shaped (signal, time). Fewer than `count` columns are
    /// returned if the timeout elapsed first.
    fn read(&mut self, count: usize, timeout_ms: u64) -> Result<Array2<f64>>;

    /// Samples per signal currently buffered and readable without blocking.
    fn available_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality_ignores_representation() {
        assert_eq!(PropertyValue::Integer(2), PropertyValue::Float(2.0));
        assert_eq!(PropertyValue::Float(10000.0), PropertyValue::Integer(10000));
        assert_ne!(PropertyValue::Integer(2), PropertyValue::Text("2".into()));
        assert_ne!(PropertyValue::Bool(true), PropertyValue::Integer(1));
    }

    #[test]
    fn test_untagged_deserialization() {
        let values: Vec<PropertyValue> =
            serde_json::from_str(r#"[true, 10000, 2.5, "AC 1Hz"]"#).unwrap();
        assert!(matches!(values[0], PropertyValue::Bool(true)));
        assert!(matches!(values[1], PropertyValue::Integer(10000)));
        assert!(matches!(values[2], PropertyValue::Float(_)));
        assert_eq!(values[3].as_str(), Some("AC 1Hz"));
    }

    #[test]
    fn test_display_value_resolves_index() {
        let info = PropertyInfo {
            name: "Measurement".into(),
            value: PropertyValue::Integer(1),
            selection_values: Some(vec!["IEPE".into(), "Voltage".into()]),
            unit: None,
        };
        assert!(info.is_enumerated());
        assert_eq!(info.display_value(), PropertyValue::from("Voltage"));

        let plain = PropertyInfo {
            name: "Gain".into(),
            value: PropertyValue::Float(1.5),
            selection_values: None,
            unit: None,
        };
        assert_eq!(plain.display_value(), PropertyValue::Float(1.5));
    }
}
