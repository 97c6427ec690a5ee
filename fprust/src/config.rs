//! Engine configuration

use std::time::Duration;

use fprust_core::constants::*;

use crate::error::{Error, Result};

/// Retry schedule for commands that may be replayed safely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub retries: u8,

    /// Pause before each extra attempt
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u8, delay: Duration) -> Self {
        Self { retries, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(50))
    }
}

/// Sensor engine configuration
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fprust::SensorConfig;
///
/// let config = SensorConfig::default()
///     .with_password(0x1234)
///     .with_capacity(300)
///     .with_poll_interval(Duration::from_millis(200));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    /// Module address
    pub address: u32,

    /// Module password checked at startup
    pub password: u32,

    /// Library capacity; `None` uses the size the sensor reports
    pub capacity: Option<u16>,

    /// Deadline for ordinary commands
    pub command_timeout: Duration,

    /// Deadline for feature extraction and search
    pub slow_command_timeout: Duration,

    /// Upper bound of a single read inside a deadline
    pub read_slice: Duration,

    /// Reads allowed while hunting for a frame header
    pub max_sync_attempts: usize,

    /// Failed attempts per workflow state before the workflow aborts
    pub max_retries: u8,

    /// Transport retries for feature extraction and search
    pub slow_command_retry: RetryPolicy,

    /// Delay between finger polls
    pub poll_interval: Duration,

    /// Delay between finger polls once idle
    pub idle_poll_interval: Duration,

    /// Empty polls before switching to the idle interval
    pub idle_threshold: u32,

    /// Request queue depth
    pub queue_capacity: usize,

    /// Event channel depth per subscriber
    pub event_capacity: usize,

    /// How long a caller waits for room in the request queue
    pub submit_timeout: Duration,

    /// Time the module needs after power-up before it answers
    pub boot_delay: Duration,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            password: DEFAULT_PASSWORD,
            capacity: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            slow_command_timeout: DEFAULT_SLOW_COMMAND_TIMEOUT,
            read_slice: DEFAULT_READ_SLICE,
            max_sync_attempts: DEFAULT_MAX_SYNC_ATTEMPTS,
            max_retries: MAX_RETRIES,
            slow_command_retry: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            idle_poll_interval: DEFAULT_IDLE_POLL_INTERVAL,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            boot_delay: Duration::from_millis(200),
        }
    }
}

impl SensorConfig {
    /// Set module address
    pub fn with_address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    /// Set module password
    pub fn with_password(mut self, password: u32) -> Self {
        self.password = password;
        self
    }

    /// Fix the library capacity instead of reading it from the sensor
    pub fn with_capacity(mut self, capacity: u16) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set ordinary command timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set feature extraction and search timeout
    pub fn with_slow_command_timeout(mut self, timeout: Duration) -> Self {
        self.slow_command_timeout = timeout;
        self
    }

    /// Set per-state retry ceiling
    pub fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set transport retry policy for feature extraction and search
    pub fn with_slow_command_retry(mut self, policy: RetryPolicy) -> Self {
        self.slow_command_retry = policy;
        self
    }

    /// Set finger poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set idle poll interval and the number of empty polls before it applies
    pub fn with_idle_polling(mut self, interval: Duration, threshold: u32) -> Self {
        self.idle_poll_interval = interval;
        self.idle_threshold = threshold;
        self
    }

    /// Set request queue depth
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set request submit timeout
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Set power-up delay
    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.capacity == Some(0) {
            return Err(Error::InvalidConfig("capacity must be at least 1".into()));
        }
        if self.command_timeout.is_zero() || self.slow_command_timeout.is_zero() {
            return Err(Error::InvalidConfig("command timeouts must be non-zero".into()));
        }
        if self.read_slice.is_zero() {
            return Err(Error::InvalidConfig("read slice must be non-zero".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig("max_retries must be at least 1".into()));
        }
        if self.queue_capacity == 0 || self.event_capacity == 0 {
            return Err(Error::InvalidConfig("queue and event capacity must be non-zero".into()));
        }
        Ok(())
    }
}
