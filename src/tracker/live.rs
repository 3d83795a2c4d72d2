use parking_lot::RwLock;
use std::io::{self, Write};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::{Reply, Summary};
use crate::probe::{ICMP_HEADER_SIZE, IPV4_HEADER_SIZE};
use crate::state::SessionState;
use crate::tracker::palette::{BELL, Palette, format_elapsed, format_rtt, human_size};
use crate::transcript::{LOSS_MARKER, Timestamp};

/// Renders a live session and keeps its sequence bookkeeping
///
/// The event consumer is the only writer of the session state; the
/// interactive statistics handler reads it concurrently.
pub struct Tracker {
    config: Config,
    palette: Palette,
    state: Arc<RwLock<SessionState>>,
    stop: CancellationToken,
    started_at: Instant,
    interrupted: AtomicBool,
}

impl Tracker {
    /// `stop` is the probe source's stop handle
    pub fn new(config: Config, stop: CancellationToken) -> Self {
        Self {
            palette: Palette::new(config.color),
            config,
            state: Arc::new(RwLock::new(SessionState::new())),
            stop,
            started_at: Instant::now(),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Point-in-time copy of the sequence bookkeeping
    pub fn session(&self) -> SessionState {
        *self.state.read()
    }

    /// Handle a first reply: report skipped sequences, print it, and stop
    /// the source once the last probe is answered
    pub fn on_reply<W: Write>(&self, out: &mut W, reply: &Reply) -> io::Result<()> {
        let (gap, current) = {
            let mut state = self.state.write();
            let gap = state.observe(reply.sequence);
            (gap, state.current_sequence())
        };

        if self.config.log_dropped {
            for sequence in gap {
                writeln!(out, "{}", self.loss_line(sequence))?;
            }
        }

        if !self.config.quiet {
            writeln!(out, "{}", self.reply_line(reply, false))?;
        }

        if self.config.final_sequence() == Some(current) {
            log::debug!("Reply for final probe {} received, stopping", current);
            self.stop.cancel();
        }
        Ok(())
    }

    /// Print a duplicate reply; the session state is untouched
    pub fn on_duplicate<W: Write>(&self, out: &mut W, reply: &Reply) -> io::Result<()> {
        if self.config.quiet {
            return Ok(());
        }
        writeln!(out, "{}", self.reply_line(reply, true))
    }

    /// Mark the session interrupted and ask the source to stop
    ///
    /// Safe to call repeatedly.
    pub fn interrupt(&self) {
        if !self.interrupted.swap(true, Ordering::SeqCst) {
            log::debug!("Interrupted, stopping probe source");
        }
        self.stop.cancel();
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn prefix(&self) -> String {
        if self.config.timestamp {
            format!("{} | ", self.palette.grey(&Timestamp::now().to_string()))
        } else {
            String::new()
        }
    }

    /// `Packet N lost or arrived out of order.` with the current timestamp
    pub fn loss_line(&self, sequence: u64) -> String {
        let message = format!("Packet {} {}.", sequence, LOSS_MARKER);
        format!("{}{}", self.prefix(), self.palette.red(&message))
    }

    pub fn reply_line(&self, reply: &Reply, duplicate: bool) -> String {
        let ttl = reply.ttl.map_or_else(|| "?".to_string(), |ttl| ttl.to_string());
        let mut line = format!(
            "{}{} from {}: icmp_seq={} ttl={} time={}",
            self.prefix(),
            self.palette.blue(&format!("{} bytes", reply.bytes)),
            self.palette.blue(&reply.source.to_string()),
            self.palette.blue(&reply.sequence.to_string()),
            self.palette.blue(&ttl),
            self.highlight_rtt(reply.rtt, false),
        );
        if duplicate {
            line.push(' ');
            line.push_str(&self.palette.red("(DUP!)"));
        }
        line
    }

    /// Color an RTT against the threshold; slow replies ring the bell unless
    /// rendered in a summary
    pub fn highlight_rtt(&self, rtt: Duration, is_ending: bool) -> String {
        let text = format_rtt(rtt);
        if !self.config.is_slow(rtt) {
            return self.palette.blue(&text);
        }

        if self.config.beep && !is_ending {
            self.palette.red(&format!("{}{}", BELL, text))
        } else {
            self.palette.red(&text)
        }
    }

    /// `PING HOST (IP) SIZE(TOTAL) bytes of data.`
    pub fn render_start(&self, host: &str, addr: IpAddr) -> String {
        let size = self.config.size;
        format!(
            "PING {} ({}) {}({}) bytes of data.",
            self.palette.green(host),
            self.palette.blue(&addr.to_string()),
            self.palette.blue(&size.to_string()),
            self.palette.blue(&(size + IPV4_HEADER_SIZE + ICMP_HEADER_SIZE).to_string()),
        )
    }

    /// Render the statistics block
    ///
    /// A final rendering of a bounded, uninterrupted session first reports
    /// every probe after the last reply as lost. The returned text starts
    /// with a blank line and ends with a newline.
    pub fn render_statistics(&self, summary: &Summary, interrupted: bool, is_final: bool) -> String {
        let mut text = String::new();

        if is_final
            && !interrupted
            && self.config.log_dropped
            && let Some(count) = self.config.count
        {
            let gap = self.state.read().trailing_gap(count);
            for sequence in gap {
                text.push_str(&self.loss_line(sequence));
                text.push('\n');
            }
        }

        let size = self.config.size as u64;
        let loss = format!("{:.3}%", summary.packet_loss);
        let loss = if summary.packet_loss > 0.0 {
            self.palette.red(&loss)
        } else {
            self.palette.blue(&loss)
        };

        text.push_str(&format!(
            "\n--- {} ping statistics ---\n",
            self.palette.green(&summary.addr.to_string())
        ));
        text.push_str(&format!(
            "{} packets transmitted ({}), {} packets received ({}), {} packet loss, time {}\n",
            self.palette.blue(&summary.packets_sent.to_string()),
            human_size(summary.packets_sent.saturating_mul(size)),
            self.palette.blue(&summary.packets_received.to_string()),
            human_size(summary.packets_received.saturating_mul(size)),
            loss,
            format_elapsed(self.started_at.elapsed()),
        ));
        text.push_str(&format!(
            "round-trip min/avg/max/stddev = {}/{}/{}/{}\n",
            self.highlight_rtt(summary.min_rtt, true),
            self.highlight_rtt(summary.avg_rtt, true),
            self.highlight_rtt(summary.max_rtt, true),
            self.palette.blue(&format_rtt(summary.stddev_rtt)),
        ));
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

    fn plain_config() -> Config {
        Config {
            color: false,
            timestamp: false,
            ..Config::default()
        }
    }

    fn reply(sequence: u64, rtt_ms: u64) -> Reply {
        Reply {
            sequence,
            rtt: Duration::from_millis(rtt_ms),
            ttl: Some(57),
            bytes: 56,
            source: ADDR,
        }
    }

    fn feed(tracker: &Tracker, sequences: &[u64]) -> String {
        let mut out = Vec::new();
        for &seq in sequences {
            tracker.on_reply(&mut out, &reply(seq, 10)).unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    fn loss_lines(text: &str) -> Vec<&str> {
        text.lines().filter(|l| l.contains(LOSS_MARKER)).collect()
    }

    #[test]
    fn test_reply_line_format() {
        let tracker = Tracker::new(plain_config(), CancellationToken::new());
        assert_eq!(
            tracker.reply_line(&reply(3, 12), false),
            "56 bytes from 192.0.2.1: icmp_seq=3 ttl=57 time=12.000ms"
        );
        assert_eq!(
            tracker.reply_line(&reply(3, 12), true),
            "56 bytes from 192.0.2.1: icmp_seq=3 ttl=57 time=12.000ms (DUP!)"
        );
    }

    #[test]
    fn test_unknown_ttl_rendered() {
        let tracker = Tracker::new(plain_config(), CancellationToken::new());
        let mut r = reply(0, 1);
        r.ttl = None;
        assert!(tracker.reply_line(&r, false).contains("ttl=?"));
    }

    #[test]
    fn test_timestamp_prefix_parses_back() {
        let config = Config { timestamp: true, ..plain_config() };
        let tracker = Tracker::new(config, CancellationToken::new());
        let line = tracker.loss_line(4);
        assert!(line.contains(" | Packet 4 lost or arrived out of order."));
        assert!(Timestamp::parse_line(&line).is_ok());
    }

    #[test]
    fn test_contiguous_replies_no_loss() {
        let tracker = Tracker::new(plain_config(), CancellationToken::new());
        let out = feed(&tracker, &[0, 1, 2, 3, 4]);
        assert!(loss_lines(&out).is_empty());
        assert_eq!(out.lines().count(), 5);
        assert_eq!(tracker.session().expected_sequence(), 5);
        assert_eq!(tracker.session().current_sequence(), 4);
    }

    #[test]
    fn test_gap_reported_in_order() {
        let tracker = Tracker::new(plain_config(), CancellationToken::new());
        let out = feed(&tracker, &[0, 1, 4, 5]);
        assert_eq!(
            loss_lines(&out),
            vec![
                "Packet 2 lost or arrived out of order.",
                "Packet 3 lost or arrived out of order.",
            ]
        );
        // Loss lines precede the reply that revealed them
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[2].starts_with("Packet 2"));
        assert!(lines[4].contains("icmp_seq=4"));
    }

    #[test]
    fn test_no_dropped_hides_loss_lines() {
        let config = Config { log_dropped: false, ..plain_config() };
        let tracker = Tracker::new(config, CancellationToken::new());
        let out = feed(&tracker, &[0, 3]);
        assert!(loss_lines(&out).is_empty());
        assert_eq!(tracker.session().expected_sequence(), 4);
    }

    #[test]
    fn test_quiet_hides_replies_and_duplicates() {
        let config = Config { quiet: true, ..plain_config() };
        let tracker = Tracker::new(config, CancellationToken::new());
        let out = feed(&tracker, &[0, 2]);
        assert_eq!(out.lines().count(), 1);
        assert_eq!(loss_lines(&out).len(), 1);

        let mut dup = Vec::new();
        tracker.on_duplicate(&mut dup, &reply(2, 1)).unwrap();
        assert!(dup.is_empty());
    }

    #[test]
    fn test_duplicate_leaves_state() {
        let tracker = Tracker::new(plain_config(), CancellationToken::new());
        feed(&tracker, &[0, 1]);
        let before = tracker.session();

        let mut out = Vec::new();
        tracker.on_duplicate(&mut out, &reply(0, 30)).unwrap();
        assert_eq!(tracker.session(), before);
        assert!(String::from_utf8(out).unwrap().ends_with("(DUP!)\n"));
    }

    #[test]
    fn test_final_reply_stops_source() {
        let stop = CancellationToken::new();
        let config = Config { count: Some(3), ..plain_config() };
        let tracker = Tracker::new(config, stop.clone());

        feed(&tracker, &[0, 1]);
        assert!(!stop.is_cancelled());
        feed(&tracker, &[2]);
        assert!(stop.is_cancelled());
    }

    #[test]
    fn test_slow_rtt_rings_bell_once() {
        let config = Config {
            max_rtt: Some(Duration::from_millis(10)),
            ..plain_config()
        };
        let tracker = Tracker::new(config, CancellationToken::new());

        let slow = tracker.highlight_rtt(Duration::from_millis(20), false);
        assert_eq!(slow.matches(BELL).count(), 1);
        assert!(!tracker.highlight_rtt(Duration::from_millis(20), true).contains(BELL));
        assert!(!tracker.highlight_rtt(Duration::from_millis(5), false).contains(BELL));
    }

    #[test]
    fn test_no_beep_silences_bell() {
        let config = Config {
            max_rtt: Some(Duration::from_millis(10)),
            beep: false,
            ..plain_config()
        };
        let tracker = Tracker::new(config, CancellationToken::new());
        assert_eq!(tracker.highlight_rtt(Duration::from_millis(20), false), "20.000ms");
    }

    #[test]
    fn test_render_start() {
        let tracker = Tracker::new(plain_config(), CancellationToken::new());
        assert_eq!(
            tracker.render_start("example.com", ADDR),
            "PING example.com (192.0.2.1) 56(84) bytes of data."
        );
    }

    fn summary(sent: u64, received: u64) -> Summary {
        Summary {
            packets_sent: sent,
            packets_received: received,
            packet_loss: if sent == 0 {
                0.0
            } else {
                (sent - received) as f64 * 100.0 / sent as f64
            },
            min_rtt: Duration::from_millis(1),
            avg_rtt: Duration::from_millis(2),
            max_rtt: Duration::from_millis(3),
            stddev_rtt: Duration::from_micros(816),
            ..Summary::empty(ADDR)
        }
    }

    #[test]
    fn test_statistics_block() {
        let tracker = Tracker::new(plain_config(), CancellationToken::new());
        let text = tracker.render_statistics(&summary(3, 2), false, true);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "--- 192.0.2.1 ping statistics ---");
        assert!(lines[2].starts_with(
            "3 packets transmitted (168 B), 2 packets received (112 B), 33.333% packet loss, time "
        ));
        assert_eq!(lines[3], "round-trip min/avg/max/stddev = 1.000ms/2.000ms/3.000ms/0.816ms");
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_trailing_gap_reconciled_on_final() {
        let config = Config { count: Some(5), ..plain_config() };
        let tracker = Tracker::new(config, CancellationToken::new());
        feed(&tracker, &[0, 1]);

        let text = tracker.render_statistics(&summary(5, 2), false, true);
        assert_eq!(
            loss_lines(&text),
            vec![
                "Packet 2 lost or arrived out of order.",
                "Packet 3 lost or arrived out of order.",
                "Packet 4 lost or arrived out of order.",
            ]
        );
    }

    #[test]
    fn test_no_reconciliation_when_interrupted_or_interactive() {
        let config = Config { count: Some(5), ..plain_config() };
        let tracker = Tracker::new(config, CancellationToken::new());
        feed(&tracker, &[0]);

        assert!(loss_lines(&tracker.render_statistics(&summary(2, 1), true, true)).is_empty());
        assert!(loss_lines(&tracker.render_statistics(&summary(2, 1), false, false)).is_empty());
    }

    #[test]
    fn test_no_reconciliation_when_complete_or_unbounded() {
        let config = Config { count: Some(2), ..plain_config() };
        let tracker = Tracker::new(config, CancellationToken::new());
        feed(&tracker, &[0, 1]);
        assert!(loss_lines(&tracker.render_statistics(&summary(2, 2), false, true)).is_empty());

        let tracker = Tracker::new(plain_config(), CancellationToken::new());
        feed(&tracker, &[0]);
        assert!(loss_lines(&tracker.render_statistics(&summary(4, 1), false, true)).is_empty());
    }

    #[test]
    fn test_interrupt_is_idempotent() {
        let stop = CancellationToken::new();
        let tracker = Tracker::new(plain_config(), stop.clone());
        assert!(!tracker.was_interrupted());
        tracker.interrupt();
        tracker.interrupt();
        assert!(tracker.was_interrupted());
        assert!(stop.is_cancelled());
    }
}
