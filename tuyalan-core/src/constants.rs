//! Protocol constants

use std::time::Duration;

/// Sentinel opening every frame
pub const MAGIC_PREFIX: u32 = 0x0000_55AA;

/// Sentinel closing every frame
pub const MAGIC_SUFFIX: u32 = 0x0000_AA55;

/// Big-endian bytes of [`MAGIC_SUFFIX`], used as the stream delimiter
pub const MAGIC_SUFFIX_BYTES: [u8; 4] = MAGIC_SUFFIX.to_be_bytes();

/// Default connection timeout (seconds)
pub const DEFAULT_TIMEOUT: u64 = 5;

/// Default keepalive interval (seconds)
pub const DEFAULT_PING_INTERVAL: u64 = 10;

/// Default time-to-live of a queued message (seconds)
pub const DEFAULT_MESSAGE_TTL: u64 = 5;

/// Retries after the first failed send attempt
pub const MAX_SEND_RETRIES: usize = 2;

/// Pause between send retries
pub const SEND_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Datapoint code that receives the connection-failure marker
pub const DEFAULT_ERROR_DATAPOINT: &str = "106";

/// Value written to the error datapoint when a connect times out
pub const CONNECTION_FAILED: &str = "CONNECTION_FAILED";

/// Outbound queue pacing
pub mod queue {
    use std::time::Duration;

    /// Tick interval while the device is healthy
    pub const INITIAL_INTERVAL: Duration = Duration::from_millis(100);

    /// First backoff interval (seconds)
    pub const INITIAL_BACKOFF_SECS: f64 = 5.0;

    /// Geometric growth of the backoff interval
    pub const BACKOFF_MULTIPLIER: f64 = 1.70224;

    /// Upper bound on the backoff interval (seconds)
    pub const MAX_BACKOFF_SECS: f64 = 600.0;

    /// Consecutive failures tolerated before backing off
    pub const FAILURE_THRESHOLD: u32 = 3;
}
