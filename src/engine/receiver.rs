use anyhow::Result;
use socket2::Socket;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::probe::{is_poll_timeout, parse_echo_reply, recv_icmp_with_ttl, set_poll_timeout};

/// Maximum consecutive errors before stopping the receiver
const MAX_CONSECUTIVE_ERRORS: u32 = 50;

/// How long a blocking read waits before re-checking cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An echo reply from the target, not yet matched to a probe
#[derive(Debug, Clone, Copy)]
pub struct Received {
    pub wire_sequence: u16,
    /// Echo payload bytes
    pub bytes: usize,
    pub ttl: Option<u8>,
    pub source: IpAddr,
    pub received_at: Instant,
}

/// Configuration for the ICMP receiver
#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    pub target: IpAddr,
    /// Identifier our requests carry; ignored on DGRAM sockets where the
    /// kernel owns it
    pub identifier: u16,
    pub is_dgram: bool,
}

/// The receiver reads echo replies on a dedicated thread and forwards them
pub struct Receiver {
    socket: Socket,
    config: ReceiverConfig,
    replies: mpsc::UnboundedSender<Received>,
    cancel: CancellationToken,
    consecutive_errors: u32,
}

impl Receiver {
    pub fn new(
        socket: Socket,
        config: ReceiverConfig,
        replies: mpsc::UnboundedSender<Received>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            socket,
            config,
            replies,
            cancel,
            consecutive_errors: 0,
        }
    }

    /// Run the receiver on a dedicated thread (blocking I/O)
    pub fn run_blocking(mut self) -> Result<()> {
        set_poll_timeout(&self.socket, POLL_INTERVAL)?;
        let ipv6 = self.config.target.is_ipv6();
        let mut buffer = vec![0u8; 65536];

        while !self.cancel.is_cancelled() {
            let recv_result = match recv_icmp_with_ttl(&self.socket, &mut buffer, ipv6) {
                Ok(result) => {
                    self.consecutive_errors = 0;
                    result
                }
                Err(e) if is_poll_timeout(&e) => {
                    self.consecutive_errors = 0;
                    continue;
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    log::warn!(
                        "Receive error ({}/{}): {}",
                        self.consecutive_errors,
                        MAX_CONSECUTIVE_ERRORS,
                        e
                    );

                    if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return Err(anyhow::anyhow!(
                            "Receiver stopped: {} consecutive errors (last: {})",
                            self.consecutive_errors,
                            e
                        ));
                    }
                    continue;
                }
            };
            let received_at = Instant::now();

            if recv_result.source != self.config.target {
                continue;
            }

            let Some(reply) = parse_echo_reply(
                &buffer[..recv_result.len],
                ipv6,
                self.config.is_dgram,
            ) else {
                continue;
            };

            if !self.config.is_dgram && reply.identifier != self.config.identifier {
                continue;
            }

            let received = Received {
                wire_sequence: reply.sequence,
                bytes: reply.payload_len,
                ttl: reply.ttl.or(recv_result.response_ttl),
                source: recv_result.source,
                received_at,
            };

            if self.replies.send(received).is_err() {
                // Engine is gone
                break;
            }
        }

        Ok(())
    }
}

/// Spawn the receiver on a dedicated OS thread
pub fn spawn_receiver(
    socket: Socket,
    config: ReceiverConfig,
    replies: mpsc::UnboundedSender<Received>,
    cancel: CancellationToken,
) -> std::thread::JoinHandle<Result<()>> {
    std::thread::spawn(move || {
        let receiver = Receiver::new(socket, config, replies, cancel);

        // Catch panics and convert to error with details
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| receiver.run_blocking())) {
            Ok(result) => result,
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                Err(anyhow::anyhow!("Receiver panicked: {}", msg))
            }
        }
    })
}
