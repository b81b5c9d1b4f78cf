use log::debug;

use crate::device::mailbox::{Mailbox, Message};
use crate::device::types::{ConnectionHandle, DiscoveryFilter, RadioEvent};

/// Where a radio reports sightings and connection state changes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RadioEvents {
    mailbox: Mailbox,
}

impl RadioEvents {
    pub fn new(mailbox: Mailbox) -> Self {
        RadioEvents { mailbox }
    }

    pub fn device_sighted(&self, address: impl Into<String>, name: impl Into<String>) {
        self.send(RadioEvent::DeviceSighted {
            address: address.into(),
            name: name.into(),
        });
    }

    pub fn connection_state_changed(&self, handle: ConnectionHandle, connected: bool) {
        self.send(RadioEvent::ConnectionStateChanged { handle, connected });
    }

    fn send(&self, event: RadioEvent) {
        if let Err(err) = self.mailbox.unbounded_send(Message::Radio(event)) {
            // the service has stopped, nobody is interested anymore
            debug!("Dropping radio event {:?}", err.into_inner());
        }
    }
}

/// The low-energy radio as seen by the coordinator.
///
/// Every call returns immediately. Outcomes (sightings, established or lost links) are reported
/// later through the [`RadioEvents`] passed to `subscribe`.
pub trait RadioAdapter: Send {
    /// Called once, before any other call.
    fn subscribe(&mut self, events: RadioEvents);

    fn is_enabled(&self) -> bool;

    fn start_discovery(&mut self, filter: &DiscoveryFilter);

    fn stop_discovery(&mut self);

    /// Begin connecting to `address`. With `auto_reconnect` the radio keeps trying until the
    /// peripheral becomes available or the handle is closed.
    fn open_connection(&mut self, address: &str, auto_reconnect: bool) -> ConnectionHandle;

    fn close_connection(&mut self, handle: ConnectionHandle);

    fn discover_capabilities(&mut self, handle: ConnectionHandle);
}
