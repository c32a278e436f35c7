//! Active signal selection.
//!
//! The device's signal catalog mixes analog-input signals with others
//! (sync, CAN, ...). The active set is the analog-input list indexed by the
//! configured channel indices, in configuration order rather than catalog
//! order, so output columns always follow the order channels were declared.

use crate::channel::ChannelConfigMap;
use crate::driver::{Device, SignalHandle};
use crate::error::{Result, SiriusError};

/// Name fragment identifying analog-input signals.
pub const AI_SIGNAL_PATTERN: &str = "AI ";

/// Ordered signals read by an acquisition, one per configured channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSignalSet {
    signals: Vec<SignalHandle>,
}

impl ActiveSignalSet {
    /// Signals in column order.
    pub fn as_slice(&self) -> &[SignalHandle] {
        &self.signals
    }

    /// Iterate signals in column order.
    pub fn iter(&self) -> std::slice::Iter<'_, SignalHandle> {
        self.signals.iter()
    }

    /// Number of active signals.
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Check if no signal is active.
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl<'a> IntoIterator for &'a ActiveSignalSet {
    type Item = &'a SignalHandle;
    type IntoIter = std::slice::Iter<'a, SignalHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.signals.iter()
    }
}

/// Analog-input signals of the device, in catalog order.
pub fn ai_signals(device: &dyn Device) -> Vec<SignalHandle> {
    device
        .signals_recursive()
        .into_iter()
        .filter(|s| s.name.contains(AI_SIGNAL_PATTERN))
        .collect()
}

/// Derive the active signal set for `map`.
///
/// # Errors
///
/// [`SiriusError::SignalIndexOutOfRange`] if a channel index has no
/// matching analog-input signal.
pub fn select_signals(device: &dyn Device, map: &ChannelConfigMap) -> Result<ActiveSignalSet> {
    let available = ai_signals(device);
    let signals = map
        .channels()
        .map(|index| {
            available
                .get(index)
                .cloned()
                .ok_or(SiriusError::SignalIndexOutOfRange {
                    index,
                    available: available.len(),
                })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ActiveSignalSet { signals })
}
