use std::time::Duration;

use crate::cli::Args;
use crate::prefs::Prefs;
use crate::probe::DEFAULT_PAYLOAD_SIZE;

/// Address family restriction for host resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    /// Prefer IPv4, fall back to IPv6
    #[default]
    Any,
    V4,
    V6,
}

/// Rejected configuration values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot specify both -4 and -6")]
    ConflictingFamilies,
    #[error("payload size must be between 1 and 65527 bytes, got {0}")]
    Size(usize),
    #[error("TTL must be between 1 and 255")]
    Ttl,
    #[error("interval must be a positive number of seconds, got {0}")]
    Interval(f64),
    #[error("timeout must be a positive number of seconds, got {0}")]
    Timeout(f64),
    #[error("linger must be zero or a positive number of seconds, got {0}")]
    Linger(f64),
    #[error("max RTT must be a positive number of milliseconds, got {0}")]
    MaxRtt(f64),
}

/// Check a max-RTT threshold given in milliseconds
pub fn validate_max_rtt(ms: f64) -> Result<Duration, ConfigError> {
    if ms <= 0.0 {
        return Err(ConfigError::MaxRtt(ms));
    }
    Duration::try_from_secs_f64(ms / 1000.0).map_err(|_| ConfigError::MaxRtt(ms))
}

/// Runtime configuration derived from CLI args and preferences
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of probes to send (None = until interrupted)
    pub count: Option<u64>,
    /// ICMP payload size in bytes
    pub size: usize,
    /// Interval between probes
    pub interval: Duration,
    /// Overall session deadline
    pub timeout: Option<Duration>,
    /// Grace period for replies after the last probe
    pub linger: Duration,
    /// Outgoing TTL / hop limit
    pub ttl: u8,
    pub family: AddressFamily,
    /// Replies slower than this are highlighted (None = never)
    pub max_rtt: Option<Duration>,
    pub color: bool,
    pub beep: bool,
    /// Print a line for each lost or out-of-order probe
    pub log_dropped: bool,
    /// Only print the summary
    pub quiet: bool,
    /// Prefix lines with a timestamp
    pub timestamp: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            count: None,
            size: DEFAULT_PAYLOAD_SIZE,
            interval: Duration::from_secs(1),
            timeout: None,
            linger: Duration::from_secs(1),
            ttl: 128,
            family: AddressFamily::Any,
            max_rtt: None,
            color: true,
            beep: true,
            log_dropped: true,
            quiet: false,
            timestamp: true,
        }
    }
}

impl Config {
    /// Merge validated arguments over preferences; explicit flags win
    pub fn new(args: &Args, prefs: &Prefs) -> Result<Self, ConfigError> {
        let family = match (args.ipv4, args.ipv6) {
            (true, true) => return Err(ConfigError::ConflictingFamilies),
            (true, false) => AddressFamily::V4,
            (false, true) => AddressFamily::V6,
            (false, false) => AddressFamily::Any,
        };

        let max_rtt = match args.max_rtt.or(prefs.max_rtt_ms) {
            Some(ms) => Some(validate_max_rtt(ms)?),
            None => None,
        };

        Ok(Self {
            count: if args.count == 0 { None } else { Some(args.count) },
            size: args.size,
            interval: args.interval_duration()?,
            timeout: args.timeout_duration()?,
            linger: args.linger_duration()?,
            ttl: args.ttl,
            family,
            max_rtt,
            color: !args.no_color && prefs.color.unwrap_or(true),
            beep: !args.no_beep && prefs.beep.unwrap_or(true),
            log_dropped: !args.no_dropped && prefs.dropped.unwrap_or(true),
            quiet: args.quiet,
            timestamp: !args.no_timestamp && prefs.timestamp.unwrap_or(true),
        })
    }

    /// Sequence number of the last probe of a bounded session
    pub fn final_sequence(&self) -> Option<u64> {
        self.count.map(|count| count - 1)
    }

    /// Whether a round-trip time exceeds the highlight threshold
    pub fn is_slow(&self, rtt: Duration) -> bool {
        self.max_rtt.is_some_and(|max| rtt > max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("pinglog").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_config_from_defaults() {
        let config = Config::new(&args(&["example.com"]), &Prefs::default()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.final_sequence(), None);
    }

    #[test]
    fn test_count_and_final_sequence() {
        let config = Config::new(&args(&["-c", "5", "example.com"]), &Prefs::default()).unwrap();
        assert_eq!(config.count, Some(5));
        assert_eq!(config.final_sequence(), Some(4));
    }

    #[test]
    fn test_family_selection() {
        let v4 = Config::new(&args(&["-4", "host"]), &Prefs::default()).unwrap();
        assert_eq!(v4.family, AddressFamily::V4);
        let v6 = Config::new(&args(&["-6", "host"]), &Prefs::default()).unwrap();
        assert_eq!(v6.family, AddressFamily::V6);
    }

    #[test]
    fn test_prefs_supply_defaults() {
        let prefs = Prefs {
            color: Some(false),
            beep: Some(false),
            timestamp: Some(false),
            dropped: None,
            max_rtt_ms: Some(250.0),
        };
        let config = Config::new(&args(&["host"]), &prefs).unwrap();
        assert!(!config.color);
        assert!(!config.beep);
        assert!(!config.timestamp);
        assert!(config.log_dropped);
        assert_eq!(config.max_rtt, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_flags_override_prefs() {
        let prefs = Prefs {
            max_rtt_ms: Some(250.0),
            ..Prefs::default()
        };
        let config = Config::new(&args(&["-m", "100", "--no-color", "host"]), &prefs).unwrap();
        assert_eq!(config.max_rtt, Some(Duration::from_millis(100)));
        assert!(!config.color);
    }

    #[test]
    fn test_invalid_prefs_threshold_rejected() {
        let prefs = Prefs {
            max_rtt_ms: Some(-5.0),
            ..Prefs::default()
        };
        assert_eq!(
            Config::new(&args(&["host"]), &prefs),
            Err(ConfigError::MaxRtt(-5.0))
        );
    }

    #[test]
    fn test_huge_values_are_config_errors() {
        assert_eq!(
            Config::new(&args(&["-i", "1e300", "host"]), &Prefs::default()),
            Err(ConfigError::Interval(1e300))
        );
        assert_eq!(
            Config::new(&args(&["-w", "1e300", "host"]), &Prefs::default()),
            Err(ConfigError::Timeout(1e300))
        );
        assert_eq!(validate_max_rtt(1e300), Err(ConfigError::MaxRtt(1e300)));
        assert!(matches!(validate_max_rtt(f64::NAN), Err(ConfigError::MaxRtt(_))));
    }

    #[test]
    fn test_is_slow() {
        let mut config = Config::default();
        assert!(!config.is_slow(Duration::from_secs(10)));
        config.max_rtt = Some(Duration::from_millis(50));
        assert!(config.is_slow(Duration::from_millis(51)));
        assert!(!config.is_slow(Duration::from_millis(50)));
    }
}
