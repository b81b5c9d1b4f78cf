use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use log::info;
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::adapter::RadioAdapter;
use crate::device::coordinator::{ConnectionCoordinator, CoordinatorSettings};
use crate::device::mailbox::{mailbox, Command, Mailbox, Message};
use crate::error::ControllerError;
use crate::observer::hub::{Observer, ObserverHub};

/// Facade handed to callers. Commands are queued for the service task; their effects are
/// observed through the events delivered to registered observers.
#[derive(Clone)]
pub struct Controller {
    mailbox: Mailbox,
    hub: ObserverHub,
}

impl Controller {
    fn send(&self, command: Command) -> Result<(), ControllerError> {
        self.mailbox.unbounded_send(Message::Command(command))
            .map_err(|_| ControllerError::ServiceStopped)
    }

    pub fn register(&self, observer: Observer) -> Result<(), ControllerError> {
        self.send(Command::Register(observer))
    }

    pub fn unregister(&self, observer: &Observer) -> Result<(), ControllerError> {
        self.send(Command::Unregister(observer.clone()))
    }

    pub fn start_scan(&self) -> Result<(), ControllerError> {
        self.send(Command::StartScan)
    }

    pub fn connect(&self, address: impl Into<String>) -> Result<(), ControllerError> {
        self.send(Command::Connect(address.into()))
    }

    pub fn disconnect(&self) -> Result<(), ControllerError> {
        self.send(Command::Disconnect)
    }

    pub fn observers(&self) -> &ObserverHub {
        &self.hub
    }
}

async fn run_service<R: RadioAdapter>(
    cancel: CancellationToken,
    mut coordinator: ConnectionCoordinator<R>,
    mut rx: UnboundedReceiver<Message>,
) {
    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            message = rx.next() => match message {
                Some(message) => coordinator.handle(message),
                None => break 'mainloop,
            },
        }
    }

    coordinator.shutdown();
    info!("Connection service stopped");
}

/// Spawns the task that owns the coordinator. `radio` is `None` when the host has no usable
/// bluetooth adapter. The task runs until `cancel` is cancelled.
pub fn start_service<R>(
    cancel: CancellationToken,
    settings: CoordinatorSettings,
    radio: Option<R>,
) -> (Controller, JoinHandle<()>)
where
    R: RadioAdapter + 'static,
{
    let (tx, rx) = mailbox();
    let hub = ObserverHub::new();
    let coordinator = ConnectionCoordinator::new(settings, radio, hub.clone(), tx.clone());

    let handle = spawn(run_service(cancel, coordinator, rx));

    (Controller { mailbox: tx, hub }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use futures::channel::mpsc::{unbounded, UnboundedReceiver};
    use crate::device::testing::{FakeRadio, RadioCall};
    use crate::device::types::{ConnectionHandle, DeviceEvent, State};

    fn observer() -> (Observer, UnboundedReceiver<DeviceEvent>) {
        let (tx, rx) = unbounded::<DeviceEvent>();
        (Arc::new(tx), rx)
    }

    fn pending(rx: &mut UnboundedReceiver<DeviceEvent>) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = rx.try_next() {
            events.push(event);
        }
        events
    }

    async fn stop(cancel: CancellationToken, handle: JoinHandle<()>) {
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn radio_off_scenario() {
        let cancel = CancellationToken::new();
        let (controller, handle) = start_service(
            cancel.clone(), CoordinatorSettings::default(), Some(FakeRadio::new(false)),
        );
        let (o1, mut o1_rx) = observer();

        controller.register(o1).unwrap();
        controller.start_scan().unwrap();

        assert_eq!(o1_rx.next().await, Some(DeviceEvent::StateChanged(State::RadioOff)));
        stop(cancel, handle).await;
        assert!(pending(&mut o1_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scan_find_timeout_scenario() {
        let cancel = CancellationToken::new();
        let radio = FakeRadio::new(true);
        let (controller, handle) = start_service(
            cancel.clone(), CoordinatorSettings::default(), Some(radio.clone()),
        );
        let (o1, mut o1_rx) = observer();

        controller.register(o1).unwrap();
        controller.start_scan().unwrap();
        assert_eq!(o1_rx.next().await, Some(DeviceEvent::StateChanged(State::Scanning)));

        radio.sight("AA:BB", "SensorTag");
        assert_eq!(o1_rx.next().await, Some(DeviceEvent::DevicesFound(vec!["AA:BB".to_string()])));

        assert_eq!(o1_rx.next().await, Some(DeviceEvent::StateChanged(State::Idle)));
        assert_eq!(radio.count(&RadioCall::StopDiscovery), 1);

        stop(cancel, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_and_courtesy_disconnect_scenario() {
        let cancel = CancellationToken::new();
        let radio = FakeRadio::new(true);
        let (controller, handle) = start_service(
            cancel.clone(), CoordinatorSettings::default(), Some(radio.clone()),
        );
        let (o1, mut o1_rx) = observer();
        let (o2, mut o2_rx) = observer();

        controller.register(o1.clone()).unwrap();
        controller.register(o2).unwrap();
        controller.start_scan().unwrap();
        radio.sight("AA:BB", "SensorTag");
        // Scanning, DevicesFound, Idle after the timeout
        for rx in [&mut o1_rx, &mut o2_rx] {
            for _ in 0..3 {
                rx.next().await;
            }
        }

        controller.connect("AA:BB").unwrap();
        assert_eq!(o1_rx.next().await, Some(DeviceEvent::StateChanged(State::Connecting)));
        assert_eq!(o2_rx.next().await, Some(DeviceEvent::StateChanged(State::Connecting)));

        radio.report_connection(ConnectionHandle(1), true);
        assert_eq!(o1_rx.next().await, Some(DeviceEvent::StateChanged(State::Connected)));
        assert_eq!(o2_rx.next().await, Some(DeviceEvent::StateChanged(State::Connected)));
        assert_eq!(radio.count(&RadioCall::DiscoverCapabilities(ConnectionHandle(1))), 1);

        controller.unregister(&o1).unwrap();
        assert_eq!(o2_rx.next().await, Some(DeviceEvent::StateChanged(State::Idle)));
        assert_eq!(radio.count(&RadioCall::CloseConnection(ConnectionHandle(1))), 1);
        assert_eq!(controller.observers().len(), 1);

        stop(cancel, handle).await;
        assert!(pending(&mut o1_rx).is_empty());
    }

    #[tokio::test]
    async fn duplicate_registration_through_controller() {
        let cancel = CancellationToken::new();
        let (controller, handle) = start_service(
            cancel.clone(), CoordinatorSettings::default(), Some(FakeRadio::new(false)),
        );
        let (o1, mut o1_rx) = observer();

        controller.register(o1.clone()).unwrap();
        controller.register(o1).unwrap();
        controller.start_scan().unwrap();

        // one delivery per registration
        assert_eq!(o1_rx.next().await, Some(DeviceEvent::StateChanged(State::RadioOff)));
        assert_eq!(o1_rx.next().await, Some(DeviceEvent::StateChanged(State::RadioOff)));
        assert_eq!(controller.observers().len(), 2);

        stop(cancel, handle).await;
    }

    #[tokio::test]
    async fn gone_observer_is_pruned() {
        let cancel = CancellationToken::new();
        let (controller, handle) = start_service(
            cancel.clone(), CoordinatorSettings::default(), Some(FakeRadio::new(false)),
        );
        let (gone, gone_rx) = observer();
        let (o1, mut o1_rx) = observer();
        drop(gone_rx);

        controller.register(gone).unwrap();
        controller.register(o1).unwrap();
        controller.start_scan().unwrap();

        assert_eq!(o1_rx.next().await, Some(DeviceEvent::StateChanged(State::RadioOff)));
        assert_eq!(controller.observers().len(), 1);

        stop(cancel, handle).await;
    }

    #[tokio::test]
    async fn commands_fail_after_stop() {
        let cancel = CancellationToken::new();
        let radio = FakeRadio::new(true);
        let (controller, handle) = start_service(
            cancel.clone(), CoordinatorSettings::default(), Some(radio.clone()),
        );

        stop(cancel, handle).await;
        assert!(matches!(controller.start_scan(), Err(ControllerError::ServiceStopped)));
        assert!(radio.calls().is_empty());
    }
}
