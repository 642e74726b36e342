use std::path::PathBuf;
use std::sync::Arc;

use cdn_speed_rs::config::{Config, RawConfig, DEFAULT_URL};
use cdn_speed_rs::download::{self, HttpDownloader};
use cdn_speed_rs::ping::{self, TcpConnector};
use cdn_speed_rs::results::{self, ResultSet};
use cdn_speed_rs::{filter, iprange, output, progress, update};

use anyhow::{bail, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// cdn-speed-rs — find the lowest-latency, fastest addresses in a CDN's IP ranges.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cdn-speed-rs",
    version,
    about = "Find the lowest-latency, fastest addresses in a CDN's published IP ranges.",
    long_about = None
)]
struct Cli {
    /// Latency test workers; keep this low on weak devices such as routers (max 1000).
    #[arg(short = 'n', long, default_value_t = 200)]
    threads: usize,

    /// Connection attempts per address; with 1 any failed attempt drops the address.
    #[arg(short = 't', long = "ping-times", default_value_t = 4)]
    ping_times: u32,

    /// TCP port used for latency testing.
    #[arg(long, default_value_t = 443)]
    port: u16,

    /// Only keep addresses whose average delay is at most this many milliseconds.
    #[arg(long = "max-delay", default_value_t = 9999)]
    max_delay: u64,

    /// Only keep addresses whose average delay is above this many milliseconds.
    #[arg(long = "min-delay", default_value_t = 0)]
    min_delay: u64,

    /// Number of addresses to download-test, starting from the lowest delay.
    #[arg(long = "download-count", default_value_t = 20)]
    download_count: usize,

    /// Maximum download time per address, in seconds.
    #[arg(long = "download-time", default_value_t = 10)]
    download_time: u64,

    /// File downloaded for throughput testing; must be served by the CDN under test.
    #[arg(long, env = "CDN_SPEED_URL", default_value = DEFAULT_URL)]
    url: String,

    /// Minimum download speed in MB/s; testing continues until enough addresses reach it.
    #[arg(long = "min-speed", default_value_t = 0.0)]
    min_speed: f64,

    /// Number of results printed; 0 prints nothing.
    #[arg(short = 'p', long = "print-num", default_value_t = 20)]
    print_num: usize,

    /// File with CIDR ranges or addresses, one per line.
    #[arg(short = 'f', long, env = "CDN_SPEED_FILE", default_value = "ip.txt")]
    file: PathBuf,

    /// CSV result file; pass an empty string to skip writing it.
    #[arg(short = 'o', long, default_value = "result.csv")]
    output: String,

    /// Also write results as pretty JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Skip download testing and sort results by loss and delay.
    #[arg(long = "disable-download", default_value_t = false)]
    disable_download: bool,

    /// IPv6 mode; the range file must contain IPv6 ranges only.
    #[arg(long, default_value_t = false)]
    ipv6: bool,

    /// Test every address in each range instead of one random address (IPv4 only).
    #[arg(long = "all-ip", default_value_t = false)]
    all_ip: bool,

    /// Endpoint returning the latest version as plain text; no check when omitted.
    #[arg(long = "update-url")]
    update_url: Option<String>,

    /// Print the version, check `--update-url` for a newer one, and exit.
    #[arg(long = "check-update", default_value_t = false, requires = "update_url")]
    check_update: bool,

    /// Verbose logging (overridden by RUST_LOG).
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,
}

impl Cli {
    fn into_raw(self) -> RawConfig {
        RawConfig {
            file: self.file,
            ipv6: self.ipv6,
            all_ip: self.all_ip,
            threads: self.threads,
            ping_times: self.ping_times,
            port: self.port,
            min_delay_ms: self.min_delay,
            max_delay_ms: self.max_delay,
            disable_download: self.disable_download,
            download_count: self.download_count,
            download_time_secs: self.download_time,
            url: self.url,
            min_speed_mb: self.min_speed,
            output: self.output,
            json: self.json,
            print_num: self.print_num,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if cli.check_update {
        let url = cli.update_url.as_deref().unwrap_or_default();
        println!("{}", update::version_report(url, env!("CARGO_PKG_VERSION")).await);
        return Ok(());
    }
    let update_url = cli.update_url.clone();
    let cfg = cli.into_raw().validate()?;

    let update_check = update_url.map(|url| {
        tokio::spawn(async move { update::check_latest(&url, env!("CARGO_PKG_VERSION")).await })
    });

    let ranges = iprange::load_ranges_from_path(&cfg.source.path, cfg.source.family)?;
    let targets = iprange::expand_ranges(&ranges, cfg.source.expansion, &mut rand::thread_rng());
    if targets.is_empty() {
        bail!("no candidate addresses in {}", cfg.source.path.display());
    }

    // Ctrl-C stops measuring; whatever finished is still reported.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupted, finishing with the results collected so far (Ctrl-C again to quit)");
        cancel_ctrlc.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    print_banner(&cfg, targets.len());
    let results = measure(&cfg, targets, cancel).await;

    let csv_written = match cfg.output.csv.as_deref() {
        Some(path) => match output::write_csv_file(path, &results) {
            Ok(()) => Some(path),
            Err(e) => {
                eprintln!("Failed to write CSV to {}: {e:#}", path.display());
                None
            }
        },
        None => None,
    };
    if let Some(path) = cfg.output.json.as_deref() {
        if let Err(e) = output::write_json_file(path, &results) {
            eprintln!("Failed to write JSON to {}: {e:#}", path.display());
        } else {
            println!("Wrote JSON results to {}", path.display());
        }
    }
    output::print_results_table(&results, cfg.output.print_num);

    // A slow update endpoint never delays exit.
    if let Some(handle) = update_check.filter(|h| h.is_finished()) {
        if let Ok(Some(latest)) = handle.await {
            println!("\n*** New version {latest} available. ***");
        }
    }
    if let Some(path) = csv_written {
        println!("Full results written to {}.", path.display());
    }

    pause_on_windows();
    Ok(())
}

fn print_banner(cfg: &Config, candidates: usize) {
    println!("cdn-speed-rs {}", env!("CARGO_PKG_VERSION"));
    println!(
        "Latency test: TCP {}, port {}, {} candidates, {} attempts each, delay window ({} ms, {} ms]",
        cfg.source.family.label(),
        cfg.ping.port,
        candidates,
        cfg.ping.times,
        cfg.delay.min.as_millis(),
        cfg.delay.max.as_millis(),
    );
}

/// Latency probe, delay filter and, unless disabled, download test.
async fn measure(cfg: &Config, targets: Vec<std::net::IpAddr>, cancel: CancellationToken) -> ResultSet {
    let connector = Arc::new(TcpConnector {
        timeout: cfg.ping.timeout,
    });
    let (tx, bar) = progress::spawn_bar(targets.len() as u64, "latency ");
    let records = ping::run(targets, &cfg.ping, connector, Some(tx), cancel.clone()).await;
    let _ = bar.await;

    let mut records = filter::filter_delay(records, &cfg.delay);
    info!(kept = records.len(), "delay filter applied");

    let Some(dl) = cfg.download.as_ref() else {
        return ResultSet::by_latency(records);
    };
    if records.is_empty() {
        return ResultSet::by_throughput(records);
    }

    results::sort_by_latency(&mut records);
    println!(
        "Download test: up to {} addresses, {} s each, minimum {:.2} MB/s",
        dl.count,
        dl.budget.as_secs(),
        dl.min_speed / cdn_speed_rs::types::BYTES_PER_MB,
    );
    let downloader = HttpDownloader::new(dl.url.clone(), dl.budget);
    let (tx, bar) = progress::spawn_bar(dl.count.min(records.len()) as u64, "download");
    let records = download::run(records, dl, &downloader, Some(tx), cancel).await;
    let _ = bar.await;
    ResultSet::by_throughput(records)
}

/// Keep the console open when started by double-click.
#[cfg(windows)]
fn pause_on_windows() {
    println!("Press Enter to exit.");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}

#[cfg(not(windows))]
fn pause_on_windows() {}
