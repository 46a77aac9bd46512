//! Runtime-configurable tuning parameters for starling.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `STARLING_`) or by constructing a custom `StarlingConfig`.

use std::time::Duration;

/// Tuning parameters for the collective engine and the simulated fabric.
#[derive(Debug, Clone)]
pub struct StarlingConfig {
    /// Payloads at or above this size are classified as bulk transfers;
    /// smaller payloads ride as header-only messages. Only the injection
    /// delay applied by the fabric depends on the class.
    pub eager_cutoff: usize,

    /// Simulated injection delay charged per header-class message.
    pub header_delay: Duration,

    /// Simulated injection delay charged per bulk-class message.
    pub bulk_delay: Duration,

    /// How long a blocking poll waits before giving up. A timeout is an
    /// error, not a hang: a collective that never completes within this
    /// window is a deadlock in the simulated program.
    pub poll_timeout: Duration,

    /// Algorithm variant used for allgather: `"bruck"` or `"ring"`.
    pub allgather_algorithm: String,

    /// Algorithm variant used for alltoall: `"direct"`.
    pub alltoall_algorithm: String,
}

impl Default for StarlingConfig {
    fn default() -> Self {
        Self {
            eager_cutoff: 512,
            header_delay: Duration::ZERO,
            bulk_delay: Duration::ZERO,
            poll_timeout: Duration::from_secs(30),
            allgather_algorithm: "bruck".into(),
            alltoall_algorithm: "direct".into(),
        }
    }
}

impl StarlingConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `STARLING_EAGER_CUTOFF`
    /// - `STARLING_HEADER_DELAY_US`
    /// - `STARLING_BULK_DELAY_US`
    /// - `STARLING_POLL_TIMEOUT_SECS`
    /// - `STARLING_ALLGATHER`
    /// - `STARLING_ALLTOALL`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("STARLING_EAGER_CUTOFF") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.eager_cutoff = n;
            }
        }
        if let Ok(v) = std::env::var("STARLING_HEADER_DELAY_US") {
            if let Ok(us) = v.parse::<u64>() {
                cfg.header_delay = Duration::from_micros(us);
            }
        }
        if let Ok(v) = std::env::var("STARLING_BULK_DELAY_US") {
            if let Ok(us) = v.parse::<u64>() {
                cfg.bulk_delay = Duration::from_micros(us);
            }
        }
        if let Ok(v) = std::env::var("STARLING_POLL_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.poll_timeout = Duration::from_secs(s);
            }
        }
        if let Ok(v) = std::env::var("STARLING_ALLGATHER") {
            cfg.allgather_algorithm = v;
        }
        if let Ok(v) = std::env::var("STARLING_ALLTOALL") {
            cfg.alltoall_algorithm = v;
        }

        cfg
    }
}
