//! Application-wide constants

pub const APP_NAME: &str = "relaymq";

// =============================================================================
// Server defaults
// =============================================================================

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7070;

// =============================================================================
// Broker defaults
// =============================================================================

/// Records per delivery batch when a subscriber does not ask for a size
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Records per storage read inside the subscription read-pump
pub const PUMP_FETCH_SIZE: u64 = 20;

// =============================================================================
// SSE edge
// =============================================================================

/// Keep-alive comment interval on subscribe streams
pub const SSE_KEEP_ALIVE_SECS: u64 = 30;

/// Batches buffered between the read-pump and the SSE flush. Kept small so
/// delivery latency paces storage reads.
pub const SSE_BRIDGE_CAPACITY: usize = 1;

// =============================================================================
// SQLite storage
// =============================================================================

pub const DEFAULT_DB_PATH: &str = "relaymq.db";
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Shutdown
// =============================================================================

pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Environment variables and config file
// =============================================================================

pub const ENV_LOG: &str = "RELAYMQ_LOG";
pub const ENV_HOST: &str = "RELAYMQ_HOST";
pub const ENV_PORT: &str = "RELAYMQ_PORT";
pub const ENV_STORAGE: &str = "RELAYMQ_STORAGE";
pub const ENV_DB_PATH: &str = "RELAYMQ_DB_PATH";
pub const ENV_CONFIG: &str = "RELAYMQ_CONFIG";

pub const CONFIG_FILE_NAME: &str = "relaymq.json";
