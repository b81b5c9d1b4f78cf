use std::path::PathBuf;
use clap::{Parser, Subcommand};

use crate::config::types::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Finds a SensorTag-like BLE peripheral and keeps a connection to it")]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Advertised name of the peripheral to look for
    #[arg(long)]
    pub target_name: Option<String>,

    /// How long a scan runs, in milliseconds
    #[arg(long)]
    pub scan_period_ms: Option<u64>,

    /// Give up after the first failed connection attempt
    #[arg(long)]
    pub no_auto_reconnect: bool,

    /// Index of the bluetooth adapter to use
    #[arg(long)]
    pub adapter: Option<usize>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Scan once and print the devices found
    Scan,
    /// Scan, then connect to ADDRESS (or the first device found) until the link is lost
    Connect {
        address: Option<String>,
    },
    /// Print the effective config
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

impl Cli {
    pub fn apply(&self, config: &mut Config) {
        if let Some(target_name) = &self.target_name {
            config.target_name = target_name.clone();
        }
        if let Some(scan_period_ms) = self.scan_period_ms {
            config.scan_period_ms = scan_period_ms;
        }
        if self.no_auto_reconnect {
            config.auto_reconnect = false;
        }
        if let Some(adapter) = self.adapter {
            config.adapter_index = adapter;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_config() {
        let cli = Cli::parse_from([
            "sensortag-link", "--target-name", "CC2650", "--scan-period-ms", "10000",
            "--no-auto-reconnect", "connect", "AA:BB",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.target_name, "CC2650");
        assert_eq!(config.scan_period_ms, 10000);
        assert!(!config.auto_reconnect);
        assert_eq!(cli.command, CliCommand::Connect { address: Some("AA:BB".to_string()) });
    }

    #[test]
    fn no_flags_keep_config() {
        let cli = Cli::parse_from(["sensortag-link", "scan"]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config, Config::default());
        assert_eq!(cli.command, CliCommand::Scan);
    }
}
