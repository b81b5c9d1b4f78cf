use std::io::{self, Write};
use std::sync::Mutex;

use crate::device::types::{DeviceEvent, ObserverMessage};
use crate::error::DeliveryError;
use crate::observer::hub::Notifiable;

/// Writes every event as one JSON line, e.g. to stdout for scripts piping the CLI output.
pub struct JsonLinesObserver<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesObserver<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesObserver { writer: Mutex::new(writer) }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|err| err.into_inner())
    }
}

impl JsonLinesObserver<io::Stdout> {
    pub fn stdout() -> Self {
        JsonLinesObserver::new(io::stdout())
    }
}

impl<W: Write + Send> Notifiable for JsonLinesObserver<W> {
    fn deliver(&self, event: &DeviceEvent) -> Result<(), DeliveryError> {
        let line = serde_json::to_string(&ObserverMessage::from(event))?;
        let mut writer = self.writer.lock().map_err(|_| DeliveryError::Poisoned)?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}
