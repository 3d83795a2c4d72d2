//! Probe engine: sends ICMP echo requests and reports replies as events.

pub mod pending;
pub mod pinger;
pub mod receiver;
pub mod resolve;
pub mod source;
pub mod stats;

pub use pinger::Pinger;
pub use resolve::{extract_host, resolve_target};
pub use source::{ProbeEvent, ProbeSource, Reply, Summary};
pub use stats::{ProbeStats, SharedStats};
