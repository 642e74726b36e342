use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Bytes in one MB as used for display and export (binary megabyte).
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Measurements collected for a single candidate address.
///
/// `received` is not stored separately: every successful attempt contributes
/// exactly one RTT sample, so the sample count is the number of successes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeRecord {
    pub address: IpAddr,
    pub sent: u32,
    pub rtt_samples: Vec<Duration>,
    /// Download throughput in bytes per second; `None` until tested.
    pub throughput: Option<f64>,
}

impl ProbeRecord {
    /// Build a record from the outcome of `sent` attempts.
    ///
    /// Panics in debug builds if there are more samples than attempts.
    pub fn new(address: IpAddr, sent: u32, rtt_samples: Vec<Duration>) -> Self {
        debug_assert!(rtt_samples.len() <= sent as usize);
        Self {
            address,
            sent,
            rtt_samples,
            throughput: None,
        }
    }

    pub fn received(&self) -> u32 {
        self.rtt_samples.len() as u32
    }

    /// Mean RTT over successful attempts, `None` if nothing succeeded.
    pub fn average_delay(&self) -> Option<Duration> {
        if self.rtt_samples.is_empty() {
            return None;
        }
        let total: Duration = self.rtt_samples.iter().sum();
        Some(total / self.rtt_samples.len() as u32)
    }

    pub fn loss_rate(&self) -> f64 {
        if self.sent == 0 {
            return 1.0;
        }
        f64::from(self.sent.saturating_sub(self.received())) / f64::from(self.sent)
    }

    /// Average delay in milliseconds with sub-millisecond precision.
    pub fn average_delay_ms(&self) -> Option<f64> {
        self.average_delay().map(|d| d.as_secs_f64() * 1000.0)
    }

    pub fn throughput_mb(&self) -> Option<f64> {
        self.throughput.map(|bps| bps / BYTES_PER_MB)
    }
}

/// Flat, serializable view of a record as written to result files.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub ip: IpAddr,
    pub sent: u32,
    pub received: u32,
    pub loss_rate: f64,
    pub average_delay_ms: f64,
    pub speed_mb_s: f64,
}

impl From<&ProbeRecord> for ResultRow {
    fn from(r: &ProbeRecord) -> Self {
        Self {
            ip: r.address,
            sent: r.sent,
            received: r.received(),
            loss_rate: r.loss_rate(),
            average_delay_ms: r.average_delay_ms().unwrap_or(0.0),
            speed_mb_s: r.throughput_mb().unwrap_or(0.0),
        }
    }
}
