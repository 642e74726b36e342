use crate::config::DelayWindow;
use crate::types::ProbeRecord;

/// Keep records whose average delay lies in `(window.min, window.max]`.
///
/// Records with no successful attempt have no delay and are always dropped.
pub fn filter_delay(records: Vec<ProbeRecord>, window: &DelayWindow) -> Vec<ProbeRecord> {
    records
        .into_iter()
        .filter(|r| match r.average_delay() {
            Some(d) => d > window.min && d <= window.max,
            None => false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn record(last: u8, samples: &[u64], sent: u32) -> ProbeRecord {
        ProbeRecord::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)),
            sent,
            samples.iter().copied().map(Duration::from_millis).collect(),
        )
    }

    fn window(min: u64, max: u64) -> DelayWindow {
        DelayWindow {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    #[test]
    fn default_window_admits_reachable() {
        let a1 = record(1, &[10, 20, 30, 40], 4);
        let a2 = record(2, &[30, 50], 4);
        let dead = record(3, &[], 4);
        let out = filter_delay(vec![a1.clone(), a2.clone(), dead], &DelayWindow::default());
        assert_eq!(out, vec![a1, a2]);
    }

    #[test]
    fn tight_max_admits_neither() {
        let a1 = record(1, &[10, 20, 30, 40], 4);
        let a2 = record(2, &[30, 50], 4);
        assert!(filter_delay(vec![a1, a2], &window(0, 20)).is_empty());
    }

    #[test]
    fn bounds_are_exclusive_min_inclusive_max() {
        let at_min = record(1, &[50], 1);
        let at_max = record(2, &[100], 1);
        let out = filter_delay(vec![at_min, at_max.clone()], &window(50, 100));
        assert_eq!(out, vec![at_max]);
    }

    #[test]
    fn unreachable_dropped_even_with_wide_window() {
        let dead = record(1, &[], 4);
        assert!(filter_delay(vec![dead], &window(0, u64::MAX / 2)).is_empty());
    }
}
