use crate::types::ProbeRecord;
use serde::Serialize;
use std::cmp::Ordering;
use std::time::Duration;

/// Which total order a [`ResultSet`] was sorted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Throughput descending.
    Throughput,
    /// Loss rate ascending, then average delay ascending.
    Latency,
}

/// Stable sort: lowest loss first, each loss group by ascending delay.
/// Records without a delay sort last within their group.
pub fn sort_by_latency(records: &mut [ProbeRecord]) {
    records.sort_by(compare_latency);
}

/// Stable sort by throughput descending; untested records count as zero.
pub fn sort_by_throughput(records: &mut [ProbeRecord]) {
    records.sort_by(|a, b| {
        let (ta, tb) = (a.throughput.unwrap_or(0.0), b.throughput.unwrap_or(0.0));
        tb.total_cmp(&ta)
    });
}

fn compare_latency(a: &ProbeRecord, b: &ProbeRecord) -> Ordering {
    a.loss_rate().total_cmp(&b.loss_rate()).then_with(|| {
        let da = a.average_delay().unwrap_or(Duration::MAX);
        let db = b.average_delay().unwrap_or(Duration::MAX);
        da.cmp(&db)
    })
}

/// Final ordered records of a run, ready for export and display.
#[derive(Debug, Clone)]
pub struct ResultSet {
    records: Vec<ProbeRecord>,
    order: SortOrder,
}

impl ResultSet {
    pub fn by_latency(mut records: Vec<ProbeRecord>) -> Self {
        sort_by_latency(&mut records);
        Self {
            records,
            order: SortOrder::Latency,
        }
    }

    pub fn by_throughput(mut records: Vec<ProbeRecord>) -> Self {
        sort_by_throughput(&mut records);
        Self {
            records,
            order: SortOrder::Throughput,
        }
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn records(&self) -> &[ProbeRecord] {
        &self.records
    }

    /// The first `k` records (all of them if fewer).
    pub fn top(&self, k: usize) -> &[ProbeRecord] {
        &self.records[..k.min(self.records.len())]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn record(last: u8, samples: &[u64], sent: u32) -> ProbeRecord {
        ProbeRecord::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)),
            sent,
            samples.iter().copied().map(Duration::from_millis).collect(),
        )
    }

    fn last_octets(records: &[ProbeRecord]) -> Vec<u8> {
        records
            .iter()
            .map(|r| match r.address {
                IpAddr::V4(v4) => v4.octets()[3],
                IpAddr::V6(_) => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn reliable_beats_fast_but_lossy() {
        let lossy_fast = record(1, &[5, 5, 5], 4);
        let reliable_slow = record(2, &[80, 80, 80, 80], 4);
        let reliable_fast = record(3, &[40, 40, 40, 40], 4);
        let set = ResultSet::by_latency(vec![lossy_fast, reliable_slow, reliable_fast]);
        assert_eq!(set.order(), SortOrder::Latency);
        assert_eq!(last_octets(set.records()), vec![3, 2, 1]);
    }

    #[test]
    fn latency_sort_is_stable() {
        let recs = vec![record(1, &[10], 1), record(2, &[10], 1), record(3, &[5], 1), record(4, &[10], 1)];
        let set = ResultSet::by_latency(recs);
        assert_eq!(last_octets(set.records()), vec![3, 1, 2, 4]);
    }

    #[test]
    fn throughput_descending_untested_last() {
        let mut a = record(1, &[10], 1);
        let b = record(2, &[20], 1);
        let mut c = record(3, &[30], 1);
        a.throughput = Some(1.0);
        c.throughput = Some(9.0);
        let set = ResultSet::by_throughput(vec![a, b, c]);
        assert_eq!(set.order(), SortOrder::Throughput);
        assert_eq!(last_octets(set.records()), vec![3, 1, 2]);
    }

    #[test]
    fn top_clamps_to_len() {
        let set = ResultSet::by_latency(vec![record(1, &[1], 1), record(2, &[2], 1)]);
        assert_eq!(set.top(10).len(), 2);
        assert_eq!(set.top(1).len(), 1);
        assert!(set.top(0).is_empty());
    }
}
