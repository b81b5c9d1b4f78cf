use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::device::adapter::{RadioAdapter, RadioEvents};
use crate::device::constants::{CONNECT_DELAY, PROPERTIES_DEADLINE};
use crate::device::types::{ConnectionHandle, DiscoveryFilter};
use crate::error::DeviceError;

struct OpenConnection {
    cancel: CancellationToken,
    // set once the link is up
    peripheral: Option<Peripheral>,
}

type Connections = Arc<Mutex<HashMap<ConnectionHandle, OpenConnection>>>;

fn lock(connections: &Connections) -> MutexGuard<'_, HashMap<ConnectionHandle, OpenConnection>> {
    connections.lock().unwrap_or_else(PoisonError::into_inner)
}

// Unknown is reported while some platforms are still starting up, only an explicit off counts
fn is_powered(state: &CentralState) -> bool {
    !matches!(state, CentralState::PoweredOff)
}

/// [`RadioAdapter`] backed by a btleplug adapter of the host.
///
/// Devices are identified by their [`PeripheralId`] rendered as a string. The hardware address is
/// not usable for this on every platform (CoreBluetooth reports all zeroes).
pub struct BtleRadio {
    _manager: Manager,
    adapter: Adapter,
    enabled: Arc<AtomicBool>,
    next_handle: u64,
    connections: Connections,
    events: Option<RadioEvents>,
    cancel: CancellationToken,
}

impl BtleRadio {
    pub async fn open(adapter_index: usize) -> Result<BtleRadio, DeviceError> {
        let manager = Manager::new().await?;
        let adapter = manager.adapters().await?
            .into_iter()
            .nth(adapter_index)
            .ok_or(DeviceError::NoAdapter { index: adapter_index })?;

        info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

        let powered = match adapter.adapter_state().await {
            Ok(state) => {
                info!("Adapter state {:?}", state);
                is_powered(&state)
            },
            Err(err) => {
                warn!("Could not query adapter state, assuming it is on: {:?}", err);
                true
            },
        };

        Ok(BtleRadio {
            _manager: manager,
            adapter,
            enabled: Arc::new(AtomicBool::new(powered)),
            next_handle: 1,
            connections: Arc::new(Mutex::new(HashMap::new())),
            events: None,
            cancel: CancellationToken::new(),
        })
    }
}

impl Drop for BtleRadio {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn report_sighting(adapter: Adapter, id: PeripheralId, events: RadioEvents) {
    let peripheral = match adapter.peripheral(&id).await {
        Ok(peripheral) => peripheral,
        Err(err) => {
            debug!("Sighted peripheral {:?} is gone: {}", id, err);
            return;
        },
    };

    let properties = tokio::select! {
        _ = sleep(Duration::from_millis(PROPERTIES_DEADLINE)) => {
            warn!("Querying peripheral properties took too long");
            return;
        }
        result = peripheral.properties() => result,
    };

    match properties {
        Err(err) => warn!("Could not query peripheral for properties: {:?}", err),
        Ok(None) => debug!("Peripheral has no properties"),
        Ok(Some(properties)) => {
            // nameless advertisements can never match the target
            if let Some(name) = properties.local_name {
                events.device_sighted(id.to_string(), name);
            }
        },
    }
}

fn report_disconnected(id: &PeripheralId, connections: &Connections, events: &RadioEvents) {
    let lost: Vec<ConnectionHandle> = {
        let mut connections = lock(connections);
        let lost: Vec<ConnectionHandle> = connections.iter()
            .filter(|(_, open)| open.peripheral.as_ref().map_or(false, |p| &p.id() == id))
            .map(|(handle, _)| *handle)
            .collect();

        for handle in &lost {
            connections.remove(handle);
        }
        lost
    };

    for handle in lost {
        events.connection_state_changed(handle, false);
    }
}

fn events_task(
    adapter: Adapter,
    cancel: CancellationToken,
    enabled: Arc<AtomicBool>,
    connections: Connections,
    events: RadioEvents,
) {
    spawn(async move {
        let mut event_stream = match adapter.events().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Failed to subscribe to adapter events: {}", err);
                return;
            },
        };

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(event) = event_stream.next() => match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        // property lookups may be slow, keep the loop free for disconnects
                        spawn(report_sighting(adapter.clone(), id, events.clone()));
                    },
                    CentralEvent::StateUpdate(state) => {
                        info!("Adapter state changed to {:?}", state);
                        enabled.store(is_powered(&state), Ordering::SeqCst);
                    },
                    CentralEvent::DeviceDisconnected(id) => {
                        report_disconnected(&id, &connections, &events);
                    },
                    _ => {},
                },
            }
        }
    });
}

fn select_by_id<T>(candidates: impl IntoIterator<Item = (String, T)>, address: &str) -> Option<T> {
    candidates.into_iter()
        .find(|(id, _)| id == address)
        .map(|(_, candidate)| candidate)
}

async fn find_peripheral(adapter: &Adapter, address: &str) -> Result<Peripheral, DeviceError> {
    let candidates = adapter.peripherals().await?
        .into_iter()
        .map(|peripheral| (peripheral.id().to_string(), peripheral));

    select_by_id(candidates, address)
        .ok_or_else(|| DeviceError::UnknownPeripheral { address: address.to_string() })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkOutcome {
    Established,
    // the link dropped before it could be handed out
    Lost,
    // the handle was closed while connecting
    Discard,
}

fn link_outcome(still_open: bool, connected: bool) -> LinkOutcome {
    match (still_open, connected) {
        (false, _) => LinkOutcome::Discard,
        (true, true) => LinkOutcome::Established,
        (true, false) => LinkOutcome::Lost,
    }
}

async fn connect_peripheral(adapter: &Adapter, address: &str) -> Result<Peripheral, DeviceError> {
    let peripheral = find_peripheral(adapter, address).await?;
    info!("Connecting to peripheral {}...", address);
    peripheral.connect().await?;
    Ok(peripheral)
}

struct ConnectJob {
    adapter: Adapter,
    address: String,
    auto_reconnect: bool,
    handle: ConnectionHandle,
    cancel: CancellationToken,
    connections: Connections,
    events: Option<RadioEvents>,
}

impl ConnectJob {
    fn report(&self, connected: bool) {
        if let Some(events) = &self.events {
            events.connection_state_changed(self.handle, connected);
        }
    }

    fn is_open(&self) -> bool {
        lock(&self.connections).contains_key(&self.handle)
    }

    fn give_up(&self) {
        lock(&self.connections).remove(&self.handle);
        self.report(false);
    }

    async fn run(self) {
        loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Connection attempt {:?} cancelled", self.handle);
                    return;
                }
                result = connect_peripheral(&self.adapter, &self.address) => result,
            };

            match result {
                Ok(peripheral) => {
                    let still_open = match lock(&self.connections).get_mut(&self.handle) {
                        Some(open) => {
                            open.peripheral = Some(peripheral.clone());
                            true
                        },
                        None => false,
                    };

                    // a disconnect event between connect() and storing the peripheral went unseen
                    let connected = still_open && peripheral.is_connected().await.unwrap_or(false);

                    match link_outcome(still_open, connected) {
                        LinkOutcome::Established => {
                            self.report(true);
                            return;
                        },
                        LinkOutcome::Discard => {
                            if let Err(err) = peripheral.disconnect().await {
                                warn!("Failed to disconnect peripheral: {:?}", err);
                            }
                            return;
                        },
                        LinkOutcome::Lost => {
                            warn!("Connection lost right after connecting");
                            if let Some(open) = lock(&self.connections).get_mut(&self.handle) {
                                open.peripheral = None;
                            }
                            if !self.auto_reconnect {
                                self.give_up();
                                return;
                            }
                        },
                    }
                },
                Err(err) => {
                    warn!("Connecting to peripheral failed: {:?}", err);
                    if !self.auto_reconnect {
                        self.give_up();
                        return;
                    }
                },
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = sleep(Duration::from_millis(CONNECT_DELAY)) => {},
            }

            if !self.is_open() {
                return;
            }
        }
    }
}

impl RadioAdapter for BtleRadio {
    fn subscribe(&mut self, events: RadioEvents) {
        events_task(
            self.adapter.clone(),
            self.cancel.child_token(),
            self.enabled.clone(),
            self.connections.clone(),
            events.clone(),
        );
        self.events = Some(events);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn start_discovery(&mut self, filter: &DiscoveryFilter) {
        let adapter = self.adapter.clone();
        let scan_filter = ScanFilter {
            services: filter.services.clone(),
        };

        spawn(async move {
            if let Err(err) = adapter.start_scan(scan_filter).await {
                warn!("Scanning failed {:?}", err);
            }
        });
    }

    fn stop_discovery(&mut self) {
        let adapter = self.adapter.clone();

        spawn(async move {
            if let Err(err) = adapter.stop_scan().await {
                warn!("Failed to stop scanning {:?}", err);
            }
        });
    }

    fn open_connection(&mut self, address: &str, auto_reconnect: bool) -> ConnectionHandle {
        let handle = ConnectionHandle(self.next_handle);
        self.next_handle += 1;

        let cancel = self.cancel.child_token();
        lock(&self.connections).insert(handle, OpenConnection {
            cancel: cancel.clone(),
            peripheral: None,
        });

        let job = ConnectJob {
            adapter: self.adapter.clone(),
            address: address.to_string(),
            auto_reconnect,
            handle,
            cancel,
            connections: self.connections.clone(),
            events: self.events.clone(),
        };
        spawn(job.run());

        handle
    }

    fn close_connection(&mut self, handle: ConnectionHandle) {
        let open = match lock(&self.connections).remove(&handle) {
            Some(open) => open,
            None => return,
        };

        open.cancel.cancel();
        if let Some(peripheral) = open.peripheral {
            spawn(async move {
                info!("Disconnecting peripheral...");
                if let Err(err) = peripheral.disconnect().await {
                    warn!("Failed to disconnect peripheral: {:?}", err);
                }
            });
        }
    }

    fn discover_capabilities(&mut self, handle: ConnectionHandle) {
        let peripheral = match lock(&self.connections).get(&handle).and_then(|open| open.peripheral.clone()) {
            Some(peripheral) => peripheral,
            None => {
                debug!("No peripheral for {:?}, skipping service discovery", handle);
                return;
            },
        };

        spawn(async move {
            if let Err(err) = peripheral.discover_services().await {
                warn!("Discovering services failed: {:?}", err);
                return;
            }

            for service in peripheral.services() {
                info!("Service {} ({} characteristics)", service.uuid, service.characteristics.len());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_powered_off_disables_the_radio() {
        assert!(is_powered(&CentralState::PoweredOn));
        assert!(is_powered(&CentralState::Unknown));
        assert!(!is_powered(&CentralState::PoweredOff));
    }

    #[test]
    fn peripherals_are_selected_by_id() {
        // two peripherals sharing the same (zeroed) hardware address stay distinguishable
        let candidates = vec![
            ("5a1e0c8f-0000-4000-8000-000000000001".to_string(), "first"),
            ("5a1e0c8f-0000-4000-8000-000000000002".to_string(), "second"),
        ];

        assert_eq!(select_by_id(candidates.clone(), "5a1e0c8f-0000-4000-8000-000000000002"), Some("second"));
        assert_eq!(select_by_id(candidates, "00:00:00:00:00:00"), None);
    }

    #[test]
    fn link_dropped_before_handover_is_lost() {
        assert_eq!(link_outcome(true, true), LinkOutcome::Established);
        assert_eq!(link_outcome(true, false), LinkOutcome::Lost);
    }

    #[test]
    fn closed_handle_discards_the_link() {
        assert_eq!(link_outcome(false, true), LinkOutcome::Discard);
        assert_eq!(link_outcome(false, false), LinkOutcome::Discard);
    }
}
