use crate::config::PingSettings;
use crate::progress::{self, ProgressSender};
use crate::types::ProbeRecord;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One connection attempt against an address.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Round-trip time of a completed connection, `None` if the attempt failed.
    async fn connect(&self, addr: SocketAddr) -> Option<Duration>;
}

/// TCP handshake timing bounded by a per-attempt timeout. No data is exchanged.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    pub timeout: Duration,
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: SocketAddr) -> Option<Duration> {
        let start = Instant::now();
        match time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Some(start.elapsed()),
            // Refused, unreachable, or timed out.
            _ => None,
        }
    }
}

/// Run `settings.times` sequential attempts against one address.
///
/// A failed attempt is recorded as loss and never retried.
pub async fn probe_address<C: Connector + ?Sized>(
    connector: &C,
    ip: IpAddr,
    settings: &PingSettings,
) -> ProbeRecord {
    let addr = SocketAddr::new(ip, settings.port);
    let mut samples = Vec::with_capacity(settings.times as usize);
    for _ in 0..settings.times {
        if let Some(rtt) = connector.connect(addr).await {
            samples.push(rtt);
        }
    }
    ProbeRecord::new(ip, settings.times, samples)
}

/// Probe every target with a fixed pool of workers draining a shared queue.
///
/// - Spawns `min(threads, targets)` workers; each pulls the next address, probes it, and
///   appends the finished record to the shared output.
/// - Returns once every worker has exited. Completion order is unspecified.
/// - On cancellation workers stop taking new addresses; records already finished are kept.
pub async fn run<C: Connector + 'static>(
    targets: Vec<IpAddr>,
    settings: &PingSettings,
    connector: Arc<C>,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
) -> Vec<ProbeRecord> {
    let total = targets.len() as u64;
    let workers = settings.threads.max(1).min(targets.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(targets)));
    let records = Arc::new(Mutex::new(Vec::with_capacity(total as usize)));
    let done = Arc::new(AtomicU64::new(0));
    let settings = Arc::new(settings.clone());

    debug!(total, workers, port = settings.port, times = settings.times, "latency probing started");

    let mut set = JoinSet::new();
    for _ in 0..workers {
        let queue = queue.clone();
        let records = records.clone();
        let done = done.clone();
        let settings = settings.clone();
        let connector = connector.clone();
        let progress = progress.clone();
        let cancel = cancel.clone();

        set.spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let Some(ip) = queue.lock().await.pop_front() else {
                    break;
                };
                let record = probe_address(connector.as_ref(), ip, &settings).await;
                records.lock().await.push(record);
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress::report(progress.as_ref(), n, total);
            }
        });
    }

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            warn!("latency worker failed: {e}");
        }
    }

    let out = std::mem::take(&mut *records.lock().await);
    debug!(probed = out.len(), "latency probing finished");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    /// Replays a fixed outcome sequence per address.
    struct Scripted {
        plans: StdMutex<HashMap<IpAddr, VecDeque<Option<u64>>>>,
    }

    impl Scripted {
        fn new(plans: Vec<(IpAddr, Vec<Option<u64>>)>) -> Self {
            let plans = plans.into_iter().map(|(ip, p)| (ip, p.into())).collect();
            Self { plans: StdMutex::new(plans) }
        }
    }

    #[async_trait]
    impl Connector for Scripted {
        async fn connect(&self, addr: SocketAddr) -> Option<Duration> {
            let mut plans = self.plans.lock().unwrap();
            plans
                .get_mut(&addr.ip())
                .and_then(|p| p.pop_front())
                .flatten()
                .map(Duration::from_millis)
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn settings(threads: usize, times: u32) -> PingSettings {
        PingSettings {
            threads,
            times,
            port: 443,
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn scripted_outcomes_aggregate_per_address() {
        let connector = Arc::new(Scripted::new(vec![
            (ip(1), vec![Some(10), Some(20), Some(30), Some(40)]),
            (ip(2), vec![Some(30), None, Some(50), None]),
            (ip(3), vec![None, None, None, None]),
        ]));
        let mut records = run(
            vec![ip(1), ip(2), ip(3)],
            &settings(2, 4),
            connector,
            None,
            CancellationToken::new(),
        )
        .await;
        records.sort_by_key(|r| r.address);

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.sent == 4 && r.received() <= r.sent));
        assert_eq!(records[0].average_delay(), Some(Duration::from_millis(25)));
        assert_eq!(records[0].loss_rate(), 0.0);
        assert_eq!(records[1].received(), 2);
        assert_eq!(records[1].loss_rate(), 0.5);
        assert_eq!(records[2].received(), 0);
        assert_eq!(records[2].average_delay(), None);
    }

    /// Tracks how many attempts are running at once.
    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    #[async_trait]
    impl Connector for InFlight {
        async fn connect(&self, _addr: SocketAddr) -> Option<Duration> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
            time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Some(Duration::from_millis(20))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn worker_pool_bounds_concurrency() {
        let connector = Arc::new(InFlight::default());
        let targets: Vec<IpAddr> = (1..=24).map(ip).collect();
        let records = run(targets, &settings(3, 2), connector.clone(), None, CancellationToken::new()).await;

        assert_eq!(records.len(), 24);
        let max = connector.max.load(Ordering::SeqCst);
        assert!(max <= 3, "{max} attempts in flight with 3 workers");
        assert!(max > 1, "workers never overlapped");
        assert_eq!(connector.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_attempt_failure_is_total_loss() {
        let connector = Arc::new(Scripted::new(vec![(ip(9), vec![None])]));
        let records = run(vec![ip(9)], &settings(8, 1), connector, None, CancellationToken::new()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].loss_rate(), 1.0);
    }

    #[tokio::test]
    async fn reports_progress_for_every_address() {
        let targets: Vec<IpAddr> = (1..=20).map(ip).collect();
        let connector = Arc::new(Scripted::new(targets.iter().map(|&t| (t, vec![Some(1)])).collect()));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let records = run(targets, &settings(4, 1), connector, Some(tx), CancellationToken::new()).await;
        assert_eq!(records.len(), 20);

        let mut last = None;
        while let Some(p) = rx.recv().await {
            assert_eq!(p.total, 20);
            last = Some(p.done);
        }
        assert_eq!(last, Some(20));
    }

    #[tokio::test]
    async fn cancelled_run_connects_to_nothing_new() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let connector = Arc::new(Scripted::new(vec![]));
        let records = run(vec![ip(1), ip(2)], &settings(2, 2), connector, None, cancel).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn empty_target_list_returns_immediately() {
        let connector = Arc::new(Scripted::new(vec![]));
        let records = run(vec![], &settings(4, 4), connector, None, CancellationToken::new()).await;
        assert!(records.is_empty());
    }
}
