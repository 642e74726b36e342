//! Sequential, time-bounded download testing of latency-sorted candidates.
use crate::config::DownloadSettings;
use crate::progress::{self, ProgressSender};
use crate::types::{ProbeRecord, BYTES_PER_MB};
use async_trait::async_trait;
use reqwest::{redirect, Client, Url};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("cdn-speed-rs/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REDIRECTS: usize = 10;

/// Measures download throughput through one candidate address.
#[async_trait]
pub trait SpeedProbe: Send + Sync {
    /// Bytes per second, or 0 if nothing could be transferred.
    async fn measure(&self, ip: IpAddr) -> f64;
}

/// Downloads a fixed URL with its host pinned to the candidate address.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    url: Url,
    budget: Duration,
}

impl HttpDownloader {
    pub fn new(url: Url, budget: Duration) -> Self {
        Self { url, budget }
    }

    fn client_for(&self, ip: IpAddr) -> reqwest::Result<Client> {
        let host = self.url.host_str().unwrap_or_default().to_string();
        let port = self.url.port_or_known_default().unwrap_or(443);
        Client::builder()
            .resolve(&host, SocketAddr::new(ip, port))
            .no_proxy()
            .connect_timeout(CONNECT_TIMEOUT.min(self.budget))
            .redirect(same_host_redirects(host))
            .user_agent(USER_AGENT)
            .build()
    }
}

/// Follow redirects only while they stay on `host`, which is the one name pinned to the
/// candidate. A redirect elsewhere stops with the 3xx response, so no bytes from another
/// address are credited to the candidate.
fn same_host_redirects(host: String) -> redirect::Policy {
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if attempt.url().host_str() == Some(host.as_str()) {
            attempt.follow()
        } else {
            attempt.stop()
        }
    })
}

#[async_trait]
impl SpeedProbe for HttpDownloader {
    async fn measure(&self, ip: IpAddr) -> f64 {
        let client = match self.client_for(ip) {
            Ok(c) => c,
            Err(e) => {
                debug!(%ip, "failed to build HTTP client: {e}");
                return 0.0;
            }
        };

        let start = Instant::now();
        let deadline = start + self.budget;
        let mut response = match time::timeout_at(deadline, client.get(self.url.clone()).send()).await {
            Ok(Ok(r)) if r.status().is_success() => r,
            Ok(Ok(r)) => {
                debug!(%ip, status = %r.status(), "download rejected");
                return 0.0;
            }
            Ok(Err(e)) => {
                debug!(%ip, "download request failed: {e}");
                return 0.0;
            }
            Err(_) => {
                debug!(%ip, "no response within the download budget");
                return 0.0;
            }
        };

        let mut bytes: u64 = 0;
        loop {
            match time::timeout_at(deadline, response.chunk()).await {
                Ok(Ok(Some(chunk))) => bytes += chunk.len() as u64,
                // Body complete.
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    debug!(%ip, bytes, "download interrupted: {e}");
                    break;
                }
                // Budget spent.
                Err(_) => break,
            }
        }

        throughput(bytes, start.elapsed())
    }
}

/// Bytes per second; 0 when nothing arrived.
pub fn throughput(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 / secs
}

/// Test candidates one at a time in input order.
///
/// With `min_speed == 0` testing stops after `count` candidates. Otherwise it keeps going
/// until `count` candidates reach `min_speed` or the input runs out, and when at least one
/// did, only those are returned. Tested records carry their throughput; the rest are
/// returned untouched.
pub async fn run<P: SpeedProbe + ?Sized>(
    mut records: Vec<ProbeRecord>,
    settings: &DownloadSettings,
    probe: &P,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
) -> Vec<ProbeRecord> {
    let want = settings.count;
    let filtering = settings.min_speed > 0.0;
    let total = want.min(records.len()) as u64;
    let mut tested = 0usize;
    let mut satisfied: Vec<usize> = Vec::new();

    for idx in 0..records.len() {
        if cancel.is_cancelled() {
            break;
        }
        if (filtering && satisfied.len() >= want) || (!filtering && tested >= want) {
            break;
        }

        let ip = records[idx].address;
        let speed = tokio::select! {
            speed = probe.measure(ip) => speed,
            // Abandon the transfer in flight; the record stays untested.
            _ = cancel.cancelled() => break,
        };
        tested += 1;
        records[idx].throughput = Some(speed);
        debug!(%ip, speed_mb_s = speed / BYTES_PER_MB, "download tested");

        if filtering && speed > 0.0 && speed >= settings.min_speed {
            satisfied.push(idx);
        }
        let done = if filtering { satisfied.len() } else { tested };
        progress::report(progress.as_ref(), done as u64, total);
    }

    info!(tested, satisfied = satisfied.len(), "download testing finished");

    if satisfied.is_empty() {
        return records;
    }
    let mut keep = satisfied.into_iter().peekable();
    records
        .into_iter()
        .enumerate()
        .filter_map(|(i, r)| {
            if keep.peek() == Some(&i) {
                keep.next();
                Some(r)
            } else {
                None
            }
        })
        .collect()
}
