use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};

use crate::device::types::RadioEvent;
use crate::observer::hub::Observer;

/// External commands accepted by the service.
#[derive(Clone)]
pub enum Command {
    Register(Observer),
    Unregister(Observer),
    StartScan,
    Connect(String),
    Disconnect,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Register(_) => write!(f, "Register"),
            Command::Unregister(_) => write!(f, "Unregister"),
            Command::StartScan => write!(f, "StartScan"),
            Command::Connect(address) => write!(f, "Connect({})", address),
            Command::Disconnect => write!(f, "Disconnect"),
        }
    }
}

/// Everything the service task processes, one at a time.
#[derive(Debug, Clone)]
pub enum Message {
    Command(Command),
    Radio(RadioEvent),
    // carries the scan cycle that armed the timer
    ScanTimeout(u64),
}

pub type Mailbox = UnboundedSender<Message>;

pub fn mailbox() -> (Mailbox, UnboundedReceiver<Message>) {
    unbounded::<Message>()
}
