use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigError;
use crate::probe::MAX_PAYLOAD_SIZE;

/// Ping with timestamps, loss and duplicate detection, and offline loss reconstruction
#[derive(Parser, Debug, Clone)]
#[command(name = "pinglog")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Host to ping (IP address, hostname, or URL)
    #[arg(required = true)]
    pub host: Option<String>,

    /// Number of probes to send (0 = until interrupted)
    #[arg(short = 'c', long = "count", default_value = "0", env = "PINGLOG_COUNT")]
    pub count: u64,

    /// Payload size in bytes
    #[arg(short = 's', long = "size", default_value = "56", env = "PINGLOG_SIZE")]
    pub size: usize,

    /// Probe interval in seconds
    #[arg(short = 'i', long = "interval", default_value = "1.0", env = "PINGLOG_INTERVAL")]
    pub interval: f64,

    /// Stop the whole session after this many seconds
    #[arg(short = 'w', long = "timeout", env = "PINGLOG_TIMEOUT")]
    pub timeout: Option<f64>,

    /// Seconds to wait for outstanding replies after the last probe
    #[arg(short = 'W', long = "linger", default_value = "1.0", env = "PINGLOG_LINGER")]
    pub linger: f64,

    /// Outgoing TTL / hop limit
    #[arg(short = 'T', long = "ttl", default_value = "128", env = "PINGLOG_TTL")]
    pub ttl: u8,

    /// Force IPv4
    #[arg(short = '4', long = "ipv4", conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Force IPv6
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// Highlight replies slower than this many milliseconds
    #[arg(short = 'm', long = "max-rtt", env = "PINGLOG_MAX_RTT")]
    pub max_rtt: Option<f64>,

    /// Disable colored output
    #[arg(long = "no-color", env = "PINGLOG_NO_COLOR")]
    pub no_color: bool,

    /// Don't ring the terminal bell on slow replies
    #[arg(long = "no-beep", env = "PINGLOG_NO_BEEP")]
    pub no_beep: bool,

    /// Don't log lost or out-of-order packets
    #[arg(long = "no-dropped", env = "PINGLOG_NO_DROPPED")]
    pub no_dropped: bool,

    /// Only print the summary at the end
    #[arg(short = 'q', long = "quiet", env = "PINGLOG_QUIET")]
    pub quiet: bool,

    /// Don't prefix lines with timestamps
    #[arg(long = "no-timestamp", env = "PINGLOG_NO_TIMESTAMP")]
    pub no_timestamp: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reconstruct periods of packet loss from saved session logs
    Loss {
        /// Log files to scan, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print a saved session log with color codes removed
    Strip {
        /// Log file to strip
        file: PathBuf,
    },
}

impl Args {
    /// Get probe interval as Duration
    pub fn interval_duration(&self) -> Result<Duration, ConfigError> {
        seconds(self.interval)
            .filter(|d| !d.is_zero())
            .ok_or(ConfigError::Interval(self.interval))
    }

    /// Get overall session timeout as Duration
    pub fn timeout_duration(&self) -> Result<Option<Duration>, ConfigError> {
        self.timeout
            .map(|timeout| {
                seconds(timeout)
                    .filter(|d| !d.is_zero())
                    .ok_or(ConfigError::Timeout(timeout))
            })
            .transpose()
    }

    /// Get linger as Duration
    pub fn linger_duration(&self) -> Result<Duration, ConfigError> {
        seconds(self.linger).ok_or(ConfigError::Linger(self.linger))
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.is_some() {
            return Ok(());
        }

        if self.ipv4 && self.ipv6 {
            return Err(ConfigError::ConflictingFamilies);
        }

        if self.size == 0 || self.size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::Size(self.size));
        }

        if self.ttl == 0 {
            return Err(ConfigError::Ttl);
        }

        self.interval_duration()?;
        self.timeout_duration()?;
        self.linger_duration()?;

        if let Some(max_rtt) = self.max_rtt {
            crate::config::validate_max_rtt(max_rtt)?;
        }

        Ok(())
    }
}

/// Non-negative seconds that fit in a `Duration`
fn seconds(value: f64) -> Option<Duration> {
    if value < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("pinglog").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["example.com"]);
        assert_eq!(args.host.as_deref(), Some("example.com"));
        assert_eq!(args.count, 0);
        assert_eq!(args.size, 56);
        assert_eq!(args.ttl, 128);
        assert_eq!(args.interval_duration(), Ok(Duration::from_secs(1)));
        assert_eq!(args.linger_duration(), Ok(Duration::from_secs(1)));
        assert_eq!(args.timeout_duration(), Ok(None));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_host_required_without_subcommand() {
        assert!(Args::try_parse_from(["pinglog"]).is_err());
    }

    #[test]
    fn test_loss_subcommand() {
        let args = parse(&["loss", "a.log", "b.log"]);
        match args.command {
            Some(Command::Loss { files }) => {
                assert_eq!(files, vec![PathBuf::from("a.log"), PathBuf::from("b.log")]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(args.host.is_none());
    }

    #[test]
    fn test_loss_requires_files() {
        assert!(Args::try_parse_from(["pinglog", "loss"]).is_err());
    }

    #[test]
    fn test_strip_subcommand() {
        let args = parse(&["strip", "session.log"]);
        assert!(matches!(args.command, Some(Command::Strip { .. })));
    }

    #[test]
    fn test_families_conflict() {
        assert!(Args::try_parse_from(["pinglog", "-4", "-6", "example.com"]).is_err());
    }

    #[test]
    fn test_validate_ranges() {
        assert!(matches!(
            parse(&["-s", "0", "host"]).validate(),
            Err(ConfigError::Size(0))
        ));
        assert!(matches!(
            parse(&["-s", "70000", "host"]).validate(),
            Err(ConfigError::Size(70000))
        ));
        assert!(matches!(parse(&["-T", "0", "host"]).validate(), Err(ConfigError::Ttl)));
        assert!(matches!(
            parse(&["-i", "0", "host"]).validate(),
            Err(ConfigError::Interval(_))
        ));
        assert!(matches!(
            parse(&["-w", "0", "host"]).validate(),
            Err(ConfigError::Timeout(_))
        ));
        assert!(matches!(
            parse(&["-m", "0", "host"]).validate(),
            Err(ConfigError::MaxRtt(_))
        ));
    }

    #[test]
    fn test_out_of_range_durations_rejected() {
        assert!(matches!(
            parse(&["-i", "1e300", "host"]).validate(),
            Err(ConfigError::Interval(_))
        ));
        assert!(matches!(
            parse(&["-i", "NaN", "host"]).validate(),
            Err(ConfigError::Interval(_))
        ));
        assert!(matches!(
            parse(&["-w", "1e300", "host"]).validate(),
            Err(ConfigError::Timeout(_))
        ));
        assert!(matches!(
            parse(&["-W", "1e300", "host"]).validate(),
            Err(ConfigError::Linger(_))
        ));
        assert!(matches!(
            parse(&["-m", "1e300", "host"]).validate(),
            Err(ConfigError::MaxRtt(_))
        ));
        assert_eq!(parse(&["-W", "0", "host"]).linger_duration(), Ok(Duration::ZERO));
    }

    #[test]
    fn test_switches() {
        let args = parse(&["-q", "--no-color", "--no-beep", "--no-dropped", "--no-timestamp", "host"]);
        assert!(args.quiet);
        assert!(args.no_color);
        assert!(args.no_beep);
        assert!(args.no_dropped);
        assert!(args.no_timestamp);
    }
}
