use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of the link to the target peripheral.
///
/// The discriminants are the stable ordinal tags sent to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Unknown = 0,
    Idle = 1,
    Scanning = 2,
    RadioOff = 3,
    Connecting = 4,
    Connected = 5,
    Disconnecting = 6,
}

impl State {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<State> {
        let state = match tag {
            0 => State::Unknown,
            1 => State::Idle,
            2 => State::Scanning,
            3 => State::RadioOff,
            4 => State::Connecting,
            5 => State::Connected,
            6 => State::Disconnecting,
            _ => return None,
        };

        Some(state)
    }
}

impl Default for State {
    fn default() -> Self {
        State::Unknown
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            State::Unknown => "unknown",
            State::Idle => "idle",
            State::Scanning => "scanning",
            State::RadioOff => "radio_off",
            State::Connecting => "connecting",
            State::Connected => "connected",
            State::Disconnecting => "disconnecting",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: String,
    pub name: String,
}

/// What observers receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    StateChanged(State),
    DevicesFound(Vec<String>), // first-seen order
}

/// Opaque id of a connection opened by a [`crate::device::adapter::RadioAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u64);

/// Asynchronous results reported by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    DeviceSighted {
        address: String,
        name: String,
    },
    ConnectionStateChanged {
        handle: ConnectionHandle,
        connected: bool,
    },
}

/// Passed to the radio when discovery starts. Radios may use any part of it to narrow the scan;
/// the coordinator checks the name again regardless.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscoveryFilter {
    pub name: String,
    pub services: Vec<Uuid>,
}

/// Wire form of a [`DeviceEvent`] for observers outside the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObserverMessage {
    #[serde(rename_all = "camelCase")]
    StateChanged {
        state: u8,
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    DevicesFound {
        addresses: Vec<String>,
    },
}

impl From<&DeviceEvent> for ObserverMessage {
    fn from(event: &DeviceEvent) -> Self {
        match event {
            DeviceEvent::StateChanged(state) => ObserverMessage::StateChanged {
                state: state.tag(),
                name: state.to_string(),
            },
            DeviceEvent::DevicesFound(addresses) => ObserverMessage::DevicesFound {
                addresses: addresses.clone(),
            },
        }
    }
}
