use anyhow::{Context, Result, bail};
use socket2::Socket;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::pending::{PendingTable, Resolution, wire_sequence};
use crate::engine::receiver::{Received, ReceiverConfig, spawn_receiver};
use crate::engine::resolve::{extract_host, resolve_target};
use crate::engine::source::{ProbeEvent, ProbeSource, Reply};
use crate::engine::stats::SharedStats;
use crate::probe::{build_echo_request, enable_recv_ttl, get_identifier, open_icmp_socket, send_icmp, set_ttl};

/// Shortest interval the send loop accepts
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// ICMP echo probe source for a single target
pub struct Pinger {
    host: String,
    target: IpAddr,
    config: Config,
    identifier: u16,
    stats: SharedStats,
    cancel: CancellationToken,
}

impl Pinger {
    /// Resolve `host` (IP literal, hostname, or URL) and prepare a pinger
    pub fn new(host: &str, config: &Config) -> Result<Self> {
        let target = resolve_target(host, config.family)?;
        Ok(Self::with_target(extract_host(host), target, config))
    }

    /// Prepare a pinger for an already resolved address
    pub fn with_target(host: &str, target: IpAddr, config: &Config) -> Self {
        Self {
            host: host.to_string(),
            target,
            config: config.clone(),
            identifier: get_identifier(),
            stats: SharedStats::new(target),
            cancel: CancellationToken::new(),
        }
    }

    /// Send probes and match replies until done, stopped, or timed out
    async fn probe_loop(
        &self,
        socket: &Socket,
        replies: &mut mpsc::UnboundedReceiver<Received>,
        events: &mpsc::Sender<ProbeEvent>,
    ) -> Result<()> {
        let ipv6 = self.target.is_ipv6();
        let deadline = self.config.timeout.and_then(deadline_after);

        let mut interval = tokio::time::interval(self.config.interval.max(MIN_INTERVAL));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut pending = PendingTable::new();
        let mut sequence: u64 = 0;
        let mut received: u64 = 0;
        let mut sending = true;
        // Set once the last probe of a bounded run is out
        let mut linger_until: Option<tokio::time::Instant> = None;

        loop {
            let wake = match (deadline, linger_until) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    break;
                }
                _ = sleep_until(wake) => {
                    break;
                }
                _ = interval.tick(), if sending => {
                    let packet = build_echo_request(
                        self.identifier,
                        wire_sequence(sequence),
                        self.config.size,
                        ipv6,
                    );

                    // Register pending BEFORE sending to prevent race with fast responses
                    pending.insert(sequence, Instant::now());
                    self.stats.record_sent();

                    if let Err(e) = send_icmp(socket, &packet, self.target) {
                        log::warn!("Failed to send probe {}: {}", sequence, e);
                        pending.remove(sequence);
                    }

                    sequence += 1;
                    if self.config.count.is_some_and(|count| sequence >= count) {
                        sending = false;
                        linger_until = deadline_after(self.config.linger);
                    }
                }
                reply = replies.recv() => {
                    // Receiver exited; its result is collected by the caller
                    let Some(reply) = reply else { break };

                    match pending.resolve(reply.wire_sequence, reply.received_at) {
                        Some(Resolution::First { sequence, rtt }) => {
                            self.stats.record_reply(rtt);
                            received += 1;
                            events
                                .send(ProbeEvent::Reply(to_reply(sequence, rtt, &reply)))
                                .await
                                .context("event consumer stopped")?;

                            if self.config.count.is_some_and(|count| received >= count) {
                                break;
                            }
                        }
                        Some(Resolution::Duplicate { sequence, rtt }) => {
                            events
                                .send(ProbeEvent::Duplicate(to_reply(sequence, rtt, &reply)))
                                .await
                                .context("event consumer stopped")?;
                        }
                        None => {
                            log::debug!("Ignoring reply with unknown sequence {}", reply.wire_sequence);
                        }
                    }
                }
            }
        }

        log::debug!(
            "Probe loop finished: {} sent, {} received, {} outstanding",
            sequence,
            received,
            pending.outstanding()
        );
        Ok(())
    }
}

fn to_reply(sequence: u64, rtt: Duration, received: &Received) -> Reply {
    Reply {
        sequence,
        rtt,
        ttl: received.ttl,
        bytes: received.bytes,
        source: received.source,
    }
}

/// Instant `after` from now; `None` when it lies beyond what the clock can represent
fn deadline_after(after: Duration) -> Option<tokio::time::Instant> {
    tokio::time::Instant::now().checked_add(after)
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl ProbeSource for Pinger {
    fn host(&self) -> &str {
        &self.host
    }

    fn target(&self) -> IpAddr {
        self.target
    }

    fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn statistics(&self) -> SharedStats {
        self.stats.clone()
    }

    async fn run(self, events: mpsc::Sender<ProbeEvent>) -> Result<()> {
        let ipv6 = self.target.is_ipv6();
        let socket_info = open_icmp_socket(ipv6)?;
        let socket = socket_info.socket;

        set_ttl(&socket, self.config.ttl, ipv6)?;
        // Best-effort: replies just lack a TTL without it
        if let Err(e) = enable_recv_ttl(&socket, ipv6) {
            log::debug!("Could not enable TTL reception: {}", e);
        }

        let recv_socket = socket
            .try_clone()
            .context("failed to share ICMP socket with receiver")?;
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        let recv_cancel = CancellationToken::new();
        let receiver = spawn_receiver(
            recv_socket,
            ReceiverConfig {
                target: self.target,
                identifier: self.identifier,
                is_dgram: socket_info.is_dgram,
            },
            reply_tx,
            recv_cancel.clone(),
        );

        let loop_result = self.probe_loop(&socket, &mut reply_rx, &events).await;

        recv_cancel.cancel();
        let receiver_result = match tokio::task::spawn_blocking(move || receiver.join()).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(anyhow::anyhow!("Receiver thread panicked")),
            Err(e) => Err(e.into()),
        };

        loop_result?;
        receiver_result?;

        if events
            .send(ProbeEvent::Summary(self.stats.snapshot()))
            .await
            .is_err()
        {
            bail!("event consumer stopped before the summary");
        }
        Ok(())
    }
}
