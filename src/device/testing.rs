use std::sync::{Arc, Mutex};

use crate::device::adapter::{RadioAdapter, RadioEvents};
use crate::device::types::{ConnectionHandle, DiscoveryFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartDiscovery(DiscoveryFilter),
    StopDiscovery,
    OpenConnection { address: String, auto_reconnect: bool },
    CloseConnection(ConnectionHandle),
    DiscoverCapabilities(ConnectionHandle),
}

struct FakeRadioState {
    enabled: bool,
    next_handle: u64,
    calls: Vec<RadioCall>,
    events: Option<RadioEvents>,
}

/// Records every call. Clones share state so a test can keep one and hand the other out.
#[derive(Clone)]
pub struct FakeRadio {
    state: Arc<Mutex<FakeRadioState>>,
}

impl FakeRadio {
    pub fn new(enabled: bool) -> Self {
        FakeRadio {
            state: Arc::new(Mutex::new(FakeRadioState {
                enabled,
                next_handle: 1,
                calls: Vec::new(),
                events: None,
            })),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().unwrap().enabled = enabled;
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count(&self, call: &RadioCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn events(&self) -> RadioEvents {
        self.state.lock().unwrap().events.clone().expect("radio was never subscribed")
    }

    pub fn sight(&self, address: &str, name: &str) {
        self.events().device_sighted(address, name);
    }

    pub fn report_connection(&self, handle: ConnectionHandle, connected: bool) {
        self.events().connection_state_changed(handle, connected);
    }
}

impl RadioAdapter for FakeRadio {
    fn subscribe(&mut self, events: RadioEvents) {
        self.state.lock().unwrap().events = Some(events);
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    fn start_discovery(&mut self, filter: &DiscoveryFilter) {
        self.state.lock().unwrap().calls.push(RadioCall::StartDiscovery(filter.clone()));
    }

    fn stop_discovery(&mut self) {
        self.state.lock().unwrap().calls.push(RadioCall::StopDiscovery);
    }

    fn open_connection(&mut self, address: &str, auto_reconnect: bool) -> ConnectionHandle {
        let mut state = self.state.lock().unwrap();
        let handle = ConnectionHandle(state.next_handle);
        state.next_handle += 1;
        state.calls.push(RadioCall::OpenConnection {
            address: address.to_string(),
            auto_reconnect,
        });
        handle
    }

    fn close_connection(&mut self, handle: ConnectionHandle) {
        self.state.lock().unwrap().calls.push(RadioCall::CloseConnection(handle));
    }

    fn discover_capabilities(&mut self, handle: ConnectionHandle) {
        self.state.lock().unwrap().calls.push(RadioCall::DiscoverCapabilities(handle));
    }
}
