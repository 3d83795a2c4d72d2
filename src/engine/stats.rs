use parking_lot::RwLock;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::source::Summary;

/// Running counters and RTT statistics for one target
#[derive(Debug, Clone)]
pub struct ProbeStats {
    pub addr: IpAddr,
    pub sent: u64,
    pub received: u64,

    // Latency stats (Welford's online algorithm)
    pub min_rtt: Duration,
    pub max_rtt: Duration,
    pub mean_rtt: f64, // microseconds
    pub m2: f64,       // for stddev calculation
}

impl ProbeStats {
    pub fn new(addr: IpAddr) -> Self {
        Self {
            addr,
            sent: 0,
            received: 0,
            min_rtt: Duration::MAX,
            max_rtt: Duration::ZERO,
            mean_rtt: 0.0,
            m2: 0.0,
        }
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    /// Update stats with a new RTT sample
    pub fn record_reply(&mut self, rtt: Duration) {
        self.received += 1;

        let rtt_micros = rtt.as_micros() as f64;

        if rtt < self.min_rtt {
            self.min_rtt = rtt;
        }
        if rtt > self.max_rtt {
            self.max_rtt = rtt;
        }

        let delta = rtt_micros - self.mean_rtt;
        self.mean_rtt += delta / self.received as f64;
        let delta2 = rtt_micros - self.mean_rtt;
        self.m2 += delta * delta2;
    }

    /// Loss percentage
    pub fn loss_pct(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            (1.0 - (self.received.min(self.sent) as f64 / self.sent as f64)) * 100.0
        }
    }

    /// Average RTT
    pub fn avg_rtt(&self) -> Duration {
        Duration::from_micros(self.mean_rtt as u64)
    }

    /// Population standard deviation
    pub fn stddev(&self) -> Duration {
        if self.received < 2 {
            return Duration::ZERO;
        }
        let variance = self.m2 / self.received as f64;
        Duration::from_micros(variance.sqrt() as u64)
    }

    pub fn summary(&self) -> Summary {
        if self.received == 0 {
            return Summary {
                packets_sent: self.sent,
                packet_loss: self.loss_pct(),
                ..Summary::empty(self.addr)
            };
        }

        Summary {
            addr: self.addr,
            packets_sent: self.sent,
            packets_received: self.received,
            packet_loss: self.loss_pct(),
            min_rtt: self.min_rtt,
            avg_rtt: self.avg_rtt(),
            max_rtt: self.max_rtt,
            stddev_rtt: self.stddev(),
        }
    }
}

/// Statistics shared between a running source and its readers
#[derive(Debug, Clone)]
pub struct SharedStats(Arc<RwLock<ProbeStats>>);

impl SharedStats {
    pub fn new(addr: IpAddr) -> Self {
        Self(Arc::new(RwLock::new(ProbeStats::new(addr))))
    }

    /// Consistent point-in-time summary
    pub fn snapshot(&self) -> Summary {
        self.0.read().summary()
    }

    pub fn record_sent(&self) {
        self.0.write().record_sent();
    }

    pub fn record_reply(&self, rtt: Duration) {
        self.0.write().record_reply(rtt);
    }
}
