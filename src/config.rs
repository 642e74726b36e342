//! Run configuration, built once at startup and passed down to every stage.
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tracing::warn;

use crate::iprange::{Expansion, Family};
use crate::types::BYTES_PER_MB;

/// Upper bound on latency workers; keeps weak hosts (routers) usable.
pub const MAX_THREADS: usize = 1000;
/// Per-attempt TCP connect timeout.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_URL: &str = "https://cf.xiu2.xyz/Github/CloudflareSpeedTest.png";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("ping times must be at least 1")]
    ZeroPingTimes,
    #[error("thread count must be at least 1")]
    ZeroThreads,
    #[error("download count must be at least 1 when download testing is enabled")]
    ZeroDownloadCount,
    #[error("download time must be greater than zero")]
    ZeroDownloadTime,
    #[error("minimum speed must be a non-negative number, got {0}")]
    InvalidMinSpeed(f64),
    #[error("minimum delay ({min} ms) must be below maximum delay ({max} ms)")]
    InvalidDelayWindow { min: u64, max: u64 },
    #[error("testing every IP is only supported for IPv4 ranges")]
    AllIpWithIpv6,
    #[error("invalid download URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Latency prober settings.
#[derive(Debug, Clone)]
pub struct PingSettings {
    pub threads: usize,
    pub times: u32,
    pub port: u16,
    pub timeout: Duration,
}

/// Exclusive lower / inclusive upper bound on average delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWindow {
    pub min: Duration,
    pub max: Duration,
}

impl Default for DelayWindow {
    fn default() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::from_millis(9999),
        }
    }
}

/// Throughput tester settings.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub url: Url,
    pub count: usize,
    pub budget: Duration,
    /// Minimum acceptable throughput in bytes per second; 0 accepts anything.
    pub min_speed: f64,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub path: PathBuf,
    pub family: Family,
    pub expansion: Expansion,
}

#[derive(Debug, Clone, Default)]
pub struct OutputSettings {
    pub csv: Option<PathBuf>,
    pub json: Option<PathBuf>,
    pub print_num: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceSettings,
    pub ping: PingSettings,
    pub delay: DelayWindow,
    /// `None` when download testing is disabled.
    pub download: Option<DownloadSettings>,
    pub output: OutputSettings,
}

/// Raw operator input, before validation. Mirrors the command line.
#[derive(Debug, Clone)]
pub struct RawConfig {
    pub file: PathBuf,
    pub ipv6: bool,
    pub all_ip: bool,
    pub threads: usize,
    pub ping_times: u32,
    pub port: u16,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub disable_download: bool,
    pub download_count: usize,
    pub download_time_secs: u64,
    pub url: String,
    pub min_speed_mb: f64,
    pub output: String,
    pub json: Option<PathBuf>,
    pub print_num: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("ip.txt"),
            ipv6: false,
            all_ip: false,
            threads: 200,
            ping_times: 4,
            port: 443,
            min_delay_ms: 0,
            max_delay_ms: 9999,
            disable_download: false,
            download_count: 20,
            download_time_secs: 10,
            url: DEFAULT_URL.to_string(),
            min_speed_mb: 0.0,
            output: "result.csv".to_string(),
            json: None,
            print_num: 20,
        }
    }
}

impl RawConfig {
    /// Check the operator's input and turn it into a [`Config`].
    ///
    /// A thread count above [`MAX_THREADS`] is clamped rather than rejected.
    pub fn validate(self) -> Result<Config, ConfigError> {
        if self.ping_times == 0 {
            return Err(ConfigError::ZeroPingTimes);
        }
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        let threads = if self.threads > MAX_THREADS {
            warn!(requested = self.threads, max = MAX_THREADS, "thread count clamped");
            MAX_THREADS
        } else {
            self.threads
        };
        if self.min_delay_ms >= self.max_delay_ms {
            return Err(ConfigError::InvalidDelayWindow {
                min: self.min_delay_ms,
                max: self.max_delay_ms,
            });
        }
        if self.all_ip && self.ipv6 {
            return Err(ConfigError::AllIpWithIpv6);
        }

        let download = if self.disable_download {
            None
        } else {
            if self.download_count == 0 {
                return Err(ConfigError::ZeroDownloadCount);
            }
            if self.download_time_secs == 0 {
                return Err(ConfigError::ZeroDownloadTime);
            }
            if !self.min_speed_mb.is_finite() || self.min_speed_mb < 0.0 {
                return Err(ConfigError::InvalidMinSpeed(self.min_speed_mb));
            }
            Some(DownloadSettings {
                url: parse_download_url(&self.url)?,
                count: self.download_count,
                budget: Duration::from_secs(self.download_time_secs),
                min_speed: self.min_speed_mb * BYTES_PER_MB,
            })
        };

        let csv = if self.output.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(self.output))
        };

        Ok(Config {
            source: SourceSettings {
                path: self.file,
                family: if self.ipv6 { Family::V6 } else { Family::V4 },
                expansion: if self.all_ip {
                    Expansion::All
                } else {
                    Expansion::RandomPerRange
                },
            },
            ping: PingSettings {
                threads,
                times: self.ping_times,
                port: self.port,
                timeout: TCP_CONNECT_TIMEOUT,
            },
            delay: DelayWindow {
                min: Duration::from_millis(self.min_delay_ms),
                max: Duration::from_millis(self.max_delay_ms),
            },
            download,
            output: OutputSettings {
                csv,
                json: self.json,
                print_num: self.print_num,
            },
        })
    }
}

fn parse_download_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(url)
}
