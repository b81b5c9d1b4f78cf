use indexmap::IndexMap;

use crate::device::types::DiscoveredDevice;

/// Devices sighted during the current scan cycle, keyed by address in first-seen order.
#[derive(Debug)]
pub struct DeviceRegistry {
    target_name: String,
    devices: IndexMap<String, DiscoveredDevice>,
}

impl DeviceRegistry {
    pub fn new(target_name: impl Into<String>) -> Self {
        DeviceRegistry {
            target_name: target_name.into(),
            devices: IndexMap::new(),
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    /// Returns true if the device was not known yet and has been inserted. Devices advertising
    /// any other name are never inserted.
    pub fn insert_if_matching(&mut self, address: &str, name: &str) -> bool {
        if name != self.target_name || self.devices.contains_key(address) {
            return false;
        }

        self.devices.insert(address.to_string(), DiscoveredDevice {
            address: address.to_string(),
            name: name.to_string(),
        });
        true
    }

    pub fn addresses(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn lookup(&self, address: &str) -> Option<&DiscoveredDevice> {
        self.devices.get(address)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
