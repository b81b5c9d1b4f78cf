use std::env;
use std::sync::Arc;
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, CliCommand};
use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::btle::BtleRadio;
use crate::device::coordinator::CoordinatorSettings;
use crate::device::service::{start_service, Controller};
use crate::device::types::{DeviceEvent, State};
use crate::error::AppRunError;
use crate::observer::console::JsonLinesObserver;

pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod observer;

pub fn init_logging() {
    let level = env::var("LOG_LEVEL").ok()
        .and_then(|level| level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);

    // stdout carries the event stream, so logs go to stderr
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

async fn load_config(config_io: &ConfigIO) -> Config {
    match config_io.read().await {
        Ok(config) => config,
        Err(err) => {
            warn!("Failed to load config, using defaults: {}", err);
            Config::default()
        },
    }
}

async fn scan(controller: &Controller, events: &mut UnboundedReceiver<DeviceEvent>) -> Result<(), AppRunError> {
    controller.start_scan()?;

    while let Some(event) = events.next().await {
        if let DeviceEvent::StateChanged(State::Idle | State::RadioOff) = event {
            break;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectStep {
    Wait,
    Connect(String),
    Done,
}

/// Decides what the `connect` command does next for each event it observes.
#[derive(Debug, Default)]
struct ConnectFlow {
    address: Option<String>,
    requested: bool,
    // the connect request has been picked up by the service
    connecting: bool,
}

impl ConnectFlow {
    fn new(address: Option<String>) -> Self {
        ConnectFlow { address, ..ConnectFlow::default() }
    }

    fn on_event(&mut self, event: &DeviceEvent) -> ConnectStep {
        match event {
            DeviceEvent::DevicesFound(addresses) if !self.requested => {
                let target = match &self.address {
                    Some(address) => addresses.iter().find(|a| *a == address),
                    None => addresses.first(),
                };

                match target {
                    Some(target) => {
                        self.requested = true;
                        ConnectStep::Connect(target.clone())
                    },
                    None => ConnectStep::Wait,
                }
            },
            DeviceEvent::StateChanged(State::Connecting) => {
                self.connecting = true;
                ConnectStep::Wait
            },
            DeviceEvent::StateChanged(State::RadioOff) => {
                warn!("Bluetooth is off");
                ConnectStep::Done
            },
            DeviceEvent::StateChanged(State::Idle) => {
                if self.connecting {
                    info!("Link closed");
                    ConnectStep::Done
                } else if self.requested {
                    // the scan ended before the connect request was processed
                    ConnectStep::Wait
                } else {
                    warn!("No matching device found");
                    ConnectStep::Done
                }
            },
            _ => ConnectStep::Wait,
        }
    }
}

async fn connect(
    controller: &Controller,
    events: &mut UnboundedReceiver<DeviceEvent>,
    address: Option<String>,
) -> Result<(), AppRunError> {
    controller.start_scan()?;
    let mut flow = ConnectFlow::new(address);

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, disconnecting");
                controller.disconnect()?;
                return Ok(());
            }
            event = events.next() => match event {
                Some(event) => event,
                None => return Ok(()),
            },
        };

        match flow.on_event(&event) {
            ConnectStep::Wait => {},
            ConnectStep::Connect(target) => controller.connect(target)?,
            ConnectStep::Done => return Ok(()),
        }
    }
}

pub async fn run(cli: Cli) -> Result<(), AppRunError> {
    let config_io = match &cli.config {
        Some(path) => ConfigIO::open_sync(path)?,
        None => ConfigIO::new_sync()?,
    };

    // one instance per config file
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    let mut config = load_config(&config_io).await;
    cli.apply(&mut config);

    if let CliCommand::Config { save } = &cli.command {
        println!("{}", serde_json::to_string_pretty(&config).unwrap_or_default());
        if *save {
            config_io.save(&config).await?;
        }
        return Ok(());
    }

    let radio = match BtleRadio::open(config.adapter_index).await {
        Ok(radio) => Some(radio),
        Err(err) => {
            warn!("Bluetooth is unavailable: {}", err);
            None
        },
    };

    let cancel = CancellationToken::new();
    let (controller, handle) = start_service(cancel.clone(), CoordinatorSettings::from(&config), radio);

    let (events_tx, mut events) = unbounded::<DeviceEvent>();
    controller.register(Arc::new(JsonLinesObserver::stdout()))?;
    controller.register(Arc::new(events_tx))?;

    let result = match cli.command {
        CliCommand::Connect { address } => connect(&controller, &mut events, address).await,
        _ => scan(&controller, &mut events).await,
    };

    cancel.cancel();
    if let Err(err) = handle.await {
        warn!("Connection service did not stop cleanly: {}", err);
    }
    result
}
