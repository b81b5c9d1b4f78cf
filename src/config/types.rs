use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{SCAN_PERIOD, TARGET_NAME};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Advertised name a peripheral must have to be listed.
    pub target_name: String,
    pub scan_period_ms: u64,
    pub auto_reconnect: bool,
    /// Which of the host's bluetooth adapters to use.
    pub adapter_index: usize,
    /// Optional service filter handed to the radio when scanning.
    pub service_uuids: Vec<Uuid>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            target_name: TARGET_NAME.to_string(),
            scan_period_ms: SCAN_PERIOD,
            auto_reconnect: true,
            adapter_index: 0,
            service_uuids: vec![],
        }
    }
}
