//! Interface between a probe source and the session tracker.
//!
//! A source produces an arrival-ordered stream of [`ProbeEvent`]s and always
//! finishes with exactly one [`ProbeEvent::Summary`]. It can be stopped from
//! another task through its cancellation token and queried for a statistics
//! snapshot while it runs.

use anyhow::Result;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::stats::SharedStats;

/// A received echo reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// 64-bit running sequence number, starting at 0
    pub sequence: u64,
    pub rtt: Duration,
    /// TTL / hop limit of the reply, when the socket reports one
    pub ttl: Option<u8>,
    /// Echo payload bytes received
    pub bytes: usize,
    pub source: IpAddr,
}

/// Terminal statistics for a run
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub addr: IpAddr,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Loss percentage, 0.0 to 100.0
    pub packet_loss: f64,
    pub min_rtt: Duration,
    pub avg_rtt: Duration,
    pub max_rtt: Duration,
    pub stddev_rtt: Duration,
}

impl Summary {
    /// Statistics of a run that has not received anything yet
    pub fn empty(addr: IpAddr) -> Self {
        Self {
            addr,
            packets_sent: 0,
            packets_received: 0,
            packet_loss: 0.0,
            min_rtt: Duration::ZERO,
            avg_rtt: Duration::ZERO,
            max_rtt: Duration::ZERO,
            stddev_rtt: Duration::ZERO,
        }
    }
}

/// Events delivered by a probe source
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent {
    Reply(Reply),
    /// A reply whose sequence number was already answered
    Duplicate(Reply),
    /// Last event of every run
    Summary(Summary),
}

/// Something that sends probes and reports replies
pub trait ProbeSource: Send + 'static {
    /// Host as given by the user
    fn host(&self) -> &str;

    /// Resolved address being probed
    fn target(&self) -> IpAddr;

    /// Cancelling the returned token asks the source to stop sending and
    /// emit its summary
    fn stop_handle(&self) -> CancellationToken;

    /// Live statistics, readable while `run` is active
    fn statistics(&self) -> SharedStats;

    /// Probe until done or stopped; the last event sent is a `Summary`
    fn run(self, events: mpsc::Sender<ProbeEvent>) -> impl Future<Output = Result<()>> + Send;
}
