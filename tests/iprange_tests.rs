use cdn_speed_rs::iprange::{expand_ranges, load_ranges_from_path, Expansion, Family};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::Write;
use std::net::IpAddr;

#[test]
fn loads_file_and_expands_every_ipv4_host() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# test ranges\n192.0.2.0/30\n198.51.100.7\n").unwrap();

    let ranges = load_ranges_from_path(file.path(), Family::V4).expect("parse ok");
    let ips = expand_ranges(&ranges, Expansion::All, &mut StdRng::seed_from_u64(0));
    let list: Vec<String> = ips.iter().map(|ip| ip.to_string()).collect();
    assert_eq!(list, vec!["192.0.2.1", "192.0.2.2", "198.51.100.7"]);
}

#[test]
fn ipv6_ranges_give_one_address_each() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "2606:4700::/32\n2400:cb00::/32").unwrap();

    let ranges = load_ranges_from_path(file.path(), Family::V6).unwrap();
    let ips = expand_ranges(&ranges, Expansion::RandomPerRange, &mut StdRng::seed_from_u64(42));
    assert_eq!(ips.len(), 2);
    assert!(ips.iter().all(IpAddr::is_ipv6));
    let first = match ips[0] {
        IpAddr::V6(v6) => v6,
        IpAddr::V4(_) => unreachable!(),
    };
    assert_eq!(&first.segments()[..2], &[0x2606, 0x4700]);
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_ranges_from_path(dir.path().join("nope.txt"), Family::V4).unwrap_err();
    assert!(err.to_string().contains("failed to read IP range file"));
}

#[test]
fn ipv4_file_in_ipv6_mode_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "104.16.0.0/13").unwrap();
    assert!(load_ranges_from_path(file.path(), Family::V6).is_err());
}
