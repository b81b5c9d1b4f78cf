use std::io;
use thiserror::Error;
use std::str::Utf8Error;
use btleplug;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter with index {index}")]
    NoAdapter { index: usize },

    #[error("No peripheral with address {address}")]
    UnknownPeripheral { address: String },
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Observer has gone away")]
    Disconnected,

    #[error("Observer lock was poisoned")]
    Poisoned,

    #[error("Failed to write to observer: {source}")]
    Io { #[from] source: io::Error },

    #[error("Failed to encode event for observer: {source}")]
    Json { #[from] source: serde_json::Error },
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("The connection service has stopped")]
    ServiceStopped,
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (device): {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Failed to control the connection service: {source}")]
    ControllerError { #[from] source: ControllerError },

    #[error("Failed to start application (runtime): {source}")]
    IOError { #[from] source: io::Error },
}
