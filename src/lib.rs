//! Library crate for cdn-speed-rs: latency probing, delay filtering and
//! download testing of candidate CDN addresses.
pub mod config;
pub mod download;
pub mod filter;
pub mod iprange;
pub mod output;
pub mod ping;
pub mod progress;
pub mod results;
pub mod types;
pub mod update;
