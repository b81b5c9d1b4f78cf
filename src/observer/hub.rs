use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use futures::channel::mpsc::UnboundedSender;
use log::{debug, warn};

use crate::device::types::DeviceEvent;
use crate::error::DeliveryError;

/// An endpoint that can receive device events.
pub trait Notifiable: Send + Sync {
    /// An error means the endpoint is gone; the hub then forgets it.
    fn deliver(&self, event: &DeviceEvent) -> Result<(), DeliveryError>;
}

/// A registered observer. The hub only holds a reference; identity is the pointee.
pub type Observer = Arc<dyn Notifiable>;

impl Notifiable for UnboundedSender<DeviceEvent> {
    fn deliver(&self, event: &DeviceEvent) -> Result<(), DeliveryError> {
        self.unbounded_send(event.clone()).map_err(|_| DeliveryError::Disconnected)
    }
}

fn same_observer(a: &Observer, b: &Observer) -> bool {
    // compare the data pointers only, vtable pointers are not guaranteed to be unique
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Membership list of observers. Clones share the same list.
#[derive(Clone, Default)]
pub struct ObserverHub {
    observers: Arc<Mutex<Vec<Observer>>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        ObserverHub::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Observer>> {
        // the list stays consistent even if a holder panicked, every mutation is a single call
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends, registering the same observer twice keeps both entries.
    pub fn register(&self, observer: Observer) {
        let mut observers = self.lock();
        observers.push(observer);
        debug!("Registered observer ({} total)", observers.len());
    }

    /// Removes the first entry referring to `observer`. Returns false if there was none.
    pub fn unregister(&self, observer: &Observer) -> bool {
        let mut observers = self.lock();
        match observers.iter().position(|o| same_observer(o, observer)) {
            Some(index) => {
                observers.remove(index);
                debug!("Unregistered observer ({} left)", observers.len());
                true
            },
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Delivers `event` to every observer registered when the broadcast starts. Observers whose
    /// delivery fails are removed; failures never reach the caller.
    pub fn broadcast(&self, event: &DeviceEvent) {
        // deliver outside the lock so observers may (un)register from within deliver()
        let snapshot: Vec<Observer> = self.lock().clone();

        let failed: Vec<Observer> = snapshot.into_iter()
            .filter(|observer| match observer.deliver(event) {
                Ok(()) => false,
                Err(err) => {
                    warn!("Lost connection to observer: {}", err);
                    true
                },
            })
            .collect();

        if failed.is_empty() {
            return;
        }

        let mut observers = self.lock();
        for gone in &failed {
            if let Some(index) = observers.iter().position(|o| same_observer(o, gone)) {
                observers.remove(index);
            }
        }
    }
}
