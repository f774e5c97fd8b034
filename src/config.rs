//! Client and polling configuration.
//!
//! Both structs deserialize from any serde format with every field optional,
//! so a host application can embed them in its own config file. Durations are
//! written as whole seconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default HTTPS ports tried in order
pub const DEFAULT_PORTS: [u16; 2] = [443, 4443];

/// Default per-attempt request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default poll interval while healthy
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound for the degraded poll interval
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Consecutive failures before the poll interval starts to grow
pub const DEGRADED_AFTER: u32 = 3;

/// Default relative volume step for volume up/down
pub const DEFAULT_VOLUME_STEP: f32 = 0.05;

/// URL scheme used to reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP, one attempt per port
    Http,
    /// HTTPS with the verified/unverified TLS matrix
    #[default]
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Transport settings for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Candidate ports, tried in order
    pub ports: Vec<u16>,

    pub scheme: Scheme,

    /// Timeout applied to each attempt independently
    #[serde(with = "seconds")]
    pub request_timeout: Duration,

    /// Verify against the pinned vendor root before falling back to unverified TLS
    pub pinned_ca: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ports: DEFAULT_PORTS.to_vec(),
            scheme: Scheme::Https,
            request_timeout: DEFAULT_TIMEOUT,
            pinned_ca: true,
        }
    }
}

/// Poll loop settings for one coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    #[serde(with = "seconds")]
    pub base_interval: Duration,

    #[serde(with = "seconds")]
    pub max_interval: Duration,

    pub degraded_after: u32,

    /// Step used by volume up/down, in the 0.0-1.0 range
    pub volume_step: f32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_interval: DEFAULT_POLL_INTERVAL,
            max_interval: MAX_POLL_INTERVAL,
            degraded_after: DEGRADED_AFTER,
            volume_step: DEFAULT_VOLUME_STEP,
        }
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
