use std::time::Duration;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::types::Config;
use crate::device::adapter::{RadioAdapter, RadioEvents};
use crate::device::mailbox::{Command, Mailbox, Message};
use crate::device::registry::DeviceRegistry;
use crate::device::types::{ConnectionHandle, DeviceEvent, DiscoveryFilter, RadioEvent, State};
use crate::observer::hub::ObserverHub;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub target_name: String,
    pub scan_period: Duration,
    pub auto_reconnect: bool,
    pub services: Vec<Uuid>,
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        CoordinatorSettings {
            target_name: config.target_name.clone(),
            scan_period: Duration::from_millis(config.scan_period_ms),
            auto_reconnect: config.auto_reconnect,
            services: config.service_uuids.clone(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings::from(&Config::default())
    }
}

/// Owns the link state, the devices of the current scan cycle and the active connection.
///
/// Not thread safe by itself: a single task feeds it [`Message`]s one at a time, see
/// [`crate::device::service::run_service`]. Every state change is broadcast to the hub before the
/// triggering call returns.
pub struct ConnectionCoordinator<R: RadioAdapter> {
    settings: CoordinatorSettings,
    state: State,
    registry: DeviceRegistry,
    active: Option<ConnectionHandle>,
    // None if the platform has no radio at all
    radio: Option<R>,
    hub: ObserverHub,
    mailbox: Mailbox,
    scan_cycle: u64,
}

impl<R: RadioAdapter> ConnectionCoordinator<R> {
    pub fn new(settings: CoordinatorSettings, mut radio: Option<R>, hub: ObserverHub, mailbox: Mailbox) -> Self {
        if let Some(radio) = radio.as_mut() {
            radio.subscribe(RadioEvents::new(mailbox.clone()));
        }

        ConnectionCoordinator {
            registry: DeviceRegistry::new(settings.target_name.clone()),
            settings,
            state: State::Unknown,
            active: None,
            radio,
            hub,
            mailbox,
            scan_cycle: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn active_connection(&self) -> Option<ConnectionHandle> {
        self.active
    }

    pub fn hub(&self) -> &ObserverHub {
        &self.hub
    }

    pub fn handle(&mut self, message: Message) {
        match message {
            Message::Command(command) => self.handle_command(command),
            Message::Radio(RadioEvent::DeviceSighted { address, name }) => {
                self.on_device_sighted(&address, &name)
            },
            Message::Radio(RadioEvent::ConnectionStateChanged { handle, connected }) => {
                self.on_connection_state_changed(handle, connected)
            },
            Message::ScanTimeout(cycle) => self.on_scan_timeout(cycle),
        }
    }

    fn handle_command(&mut self, command: Command) {
        debug!("Command {:?}", command);
        match command {
            Command::Register(observer) => self.hub.register(observer),
            Command::Unregister(observer) => {
                self.hub.unregister(&observer);
                self.on_observer_unregistered();
            },
            Command::StartScan => self.start_scan(),
            Command::Connect(address) => self.connect(&address),
            Command::Disconnect => self.disconnect(),
        }
    }

    fn set_state(&mut self, state: State) {
        if self.state == state {
            return;
        }

        info!("State {} -> {}", self.state, state);
        self.state = state;
        self.hub.broadcast(&DeviceEvent::StateChanged(state));
    }

    fn radio_enabled(&self) -> bool {
        self.radio.as_ref().map_or(false, |radio| radio.is_enabled())
    }

    // Closes the active connection without a state transition
    fn release_connection(&mut self) {
        if let Some(handle) = self.active.take() {
            info!("Closing connection {:?}", handle);
            if let Some(radio) = self.radio.as_mut() {
                radio.close_connection(handle);
            }
        }
    }

    pub fn start_scan(&mut self) {
        self.release_connection();
        self.registry.clear();
        self.scan_cycle += 1;

        if !self.radio_enabled() {
            warn!("Bluetooth radio is unavailable or disabled");
            self.set_state(State::RadioOff);
            return;
        }

        self.set_state(State::Scanning);

        let filter = DiscoveryFilter {
            name: self.settings.target_name.clone(),
            services: self.settings.services.clone(),
        };
        if let Some(radio) = self.radio.as_mut() {
            info!("Scanning for {:?} (cycle {})...", filter.name, self.scan_cycle);
            radio.start_discovery(&filter);
        }
        self.arm_scan_timeout();
    }

    fn arm_scan_timeout(&self) {
        let mailbox = self.mailbox.clone();
        let cycle = self.scan_cycle;
        let period = self.settings.scan_period;

        // the timer only holds the mailbox; the live state is checked when the message arrives
        spawn(async move {
            sleep(period).await;
            if mailbox.unbounded_send(Message::ScanTimeout(cycle)).is_err() {
                debug!("Scan timeout fired after the service stopped");
            }
        });
    }

    pub fn on_scan_timeout(&mut self, cycle: u64) {
        if self.state != State::Scanning || cycle != self.scan_cycle {
            debug!("Ignoring stale scan timeout (cycle {}, state {})", cycle, self.state);
            return;
        }

        info!("Scan period elapsed, {} device(s) found", self.registry.len());
        if let Some(radio) = self.radio.as_mut() {
            radio.stop_discovery();
        }
        self.set_state(State::Idle);
    }

    pub fn on_device_sighted(&mut self, address: &str, name: &str) {
        if self.state != State::Scanning {
            return;
        }
        if name != self.registry.target_name() {
            return;
        }

        if self.registry.insert_if_matching(address, name) {
            info!("Added {}: {}", name, address);
        }

        // re-sent on every sighting, also for devices that were already known
        self.hub.broadcast(&DeviceEvent::DevicesFound(self.registry.addresses()));
    }

    pub fn connect(&mut self, address: &str) {
        if self.registry.lookup(address).is_none() {
            warn!("Ignoring connect to unknown device {}", address);
            return;
        }
        if self.radio.is_none() {
            warn!("Ignoring connect to {}, no bluetooth radio", address);
            return;
        }

        self.release_connection();
        self.set_state(State::Connecting);

        let auto_reconnect = self.settings.auto_reconnect;
        if let Some(radio) = self.radio.as_mut() {
            info!("Connecting to {} (auto reconnect: {})...", address, auto_reconnect);
            self.active = Some(radio.open_connection(address, auto_reconnect));
        }
    }

    pub fn on_connection_state_changed(&mut self, handle: ConnectionHandle, connected: bool) {
        if self.active != Some(handle) {
            debug!("Ignoring state of stale connection {:?} (connected: {})", handle, connected);
            return;
        }

        if connected {
            info!("Connected; Discovering services...");
            self.set_state(State::Connected);
            if let Some(radio) = self.radio.as_mut() {
                radio.discover_capabilities(handle);
            }
        } else {
            warn!("Connection lost");
            self.active = None;
            self.set_state(State::Idle);
        }
    }

    pub fn disconnect(&mut self) {
        if self.active.is_none() {
            debug!("Nothing to disconnect");
            return;
        }

        self.release_connection();
        self.set_state(State::Idle);
    }

    // Courtesy disconnect: a leaving observer may be the one that asked for the link
    fn on_observer_unregistered(&mut self) {
        if self.state == State::Connected {
            self.disconnect();
        }
    }

    /// Releases radio resources when the service stops. Observers are not notified.
    pub fn shutdown(&mut self) {
        self.release_connection();
        if self.state == State::Scanning {
            if let Some(radio) = self.radio.as_mut() {
                radio.stop_discovery();
            }
        }
    }
}
