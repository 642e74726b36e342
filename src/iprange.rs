use anyhow::{bail, Context, Result};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use rand::Rng;
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

/// Address family of a run. Ranges of the other family are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    fn matches(self, net: &IpNet) -> bool {
        matches!((self, net), (Family::V4, IpNet::V4(_)) | (Family::V6, IpNet::V6(_)))
    }

    pub fn label(self) -> &'static str {
        match self {
            Family::V4 => "IPv4",
            Family::V6 => "IPv6",
        }
    }
}

/// How a range turns into candidate addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// One random host address per range.
    RandomPerRange,
    /// Every host address in the range (IPv4 only).
    All,
}

/// Parse range file content into a list of networks.
///
/// Supported formats per line:
/// - CIDR: `104.16.0.0/13`, `2606:4700::/32`
/// - bare address, treated as a single-host range: `1.1.1.1`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
pub fn parse_ranges_str(s: &str, family: Family) -> Result<Vec<IpNet>> {
    let mut out = Vec::new();
    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }
        let net = if line.contains('/') {
            line.parse::<IpNet>()
                .with_context(|| format!("line {line_no}: invalid CIDR: {line}"))?
        } else {
            let ip = line
                .parse::<IpAddr>()
                .with_context(|| format!("line {line_no}: invalid IP: {line}"))?;
            let host_len = if ip.is_ipv4() { 32 } else { 128 };
            IpNet::new(ip, host_len)
                .with_context(|| format!("line {line_no}: invalid IP: {line}"))?
        };
        if !family.matches(&net) {
            bail!(
                "line {line_no}: {net} is not an {} range (mixing address families is not supported)",
                family.label()
            );
        }
        out.push(net.trunc());
    }
    Ok(out)
}

/// Load ranges from a file path. Errors if the file cannot be read or parsed.
pub fn load_ranges_from_path(path: impl AsRef<Path>, family: Family) -> Result<Vec<IpNet>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read IP range file: {}", path.as_ref().display()))?;
    parse_ranges_str(&content, family)
}

/// Turn ranges into candidate addresses, dropping duplicates but keeping the
/// order of first appearance.
pub fn expand_ranges<R: Rng + ?Sized>(
    ranges: &[IpNet],
    expansion: Expansion,
    rng: &mut R,
) -> Vec<IpAddr> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for net in ranges {
        let ips = match expansion {
            Expansion::RandomPerRange => vec![random_host(*net, rng)],
            Expansion::All => expand_cidr_to_ips(*net),
        };
        for ip in ips {
            if seen.insert(ip) {
                out.push(ip);
            }
        }
    }
    out
}

/// Expand a CIDR into every host address.
///
/// For IPv4, excludes the network and broadcast addresses except on /31 and
/// /32. IPv6 ranges are far too large to enumerate and return an empty list.
pub fn expand_cidr_to_ips(cidr: IpNet) -> Vec<IpAddr> {
    match cidr {
        IpNet::V4(n4) => n4.hosts().map(IpAddr::V4).collect(),
        IpNet::V6(_) => Vec::new(),
    }
}

/// Pick one host address of the range uniformly at random.
pub fn random_host<R: Rng + ?Sized>(cidr: IpNet, rng: &mut R) -> IpAddr {
    match cidr {
        IpNet::V4(n4) => IpAddr::V4(random_ipv4(n4, rng)),
        IpNet::V6(n6) => IpAddr::V6(random_ipv6(n6, rng)),
    }
}

fn random_ipv4<R: Rng + ?Sized>(net: Ipv4Net, rng: &mut R) -> Ipv4Addr {
    let mut start = u32::from(net.network());
    let mut end = u32::from(net.broadcast());
    // Skip network and broadcast when the range has real host addresses.
    if net.prefix_len() < 31 {
        start += 1;
        end -= 1;
    }
    Ipv4Addr::from(rng.gen_range(start..=end))
}

fn random_ipv6<R: Rng + ?Sized>(net: Ipv6Net, rng: &mut R) -> Ipv6Addr {
    let start = u128::from(net.network());
    let end = u128::from(net.broadcast());
    Ipv6Addr::from(rng.gen_range(start..=end))
}
