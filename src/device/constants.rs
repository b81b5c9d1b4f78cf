/**
 * How long (milliseconds) a scan cycle runs before discovery is stopped.
 */
pub const SCAN_PERIOD: u64 = 3000;

/**
 * How often (milliseconds) to retry a connection attempt when auto-reconnect is enabled.
 */
pub const CONNECT_DELAY: u64 = 1000;

/**
 * How long (milliseconds) looking up peripheral properties for a sighting may take.
 */
pub const PROPERTIES_DEADLINE: u64 = 2000;

/**
 * The advertised name a peripheral must present to be considered a candidate.
 */
pub const TARGET_NAME: &str = "SensorTag";
