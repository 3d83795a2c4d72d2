use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

/// Date and time layout of the first two timestamp tokens when rendering
const RENDER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Accepts any fractional precision, including none
const PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Error returned when a transcript line does not start with a timestamp
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    /// Fewer than three whitespace-delimited tokens on the line
    #[error("expected `DATE TIME ZONE`, found {0} field(s)")]
    MissingFields(usize),
    /// The date or time token did not parse
    #[error("invalid date/time `{0}`")]
    Malformed(String),
}

/// Wall-clock instant as written at the head of every transcript line
///
/// Rendered as `YYYY-MM-DD HH:MM:SS.mmm ZONE`. The zone token is carried
/// verbatim so a parsed timestamp re-renders exactly as it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    local: NaiveDateTime,
    zone: String,
}

impl Timestamp {
    pub fn new(local: NaiveDateTime, zone: impl Into<String>) -> Self {
        Self {
            local,
            zone: zone.into(),
        }
    }

    /// Current local time
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            local: now.naive_local(),
            zone: now.format("%Z").to_string(),
        }
    }

    /// Parse the timestamp from the first three tokens of a transcript line
    pub fn parse_line(line: &str) -> Result<Self, TimestampError> {
        let mut tokens = line.split_whitespace();
        let (Some(date), Some(time), Some(zone)) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(TimestampError::MissingFields(line.split_whitespace().count()));
        };

        let stamp = format!("{date} {time}");
        let local = NaiveDateTime::parse_from_str(&stamp, PARSE_FORMAT)
            .map_err(|_| TimestampError::Malformed(stamp))?;

        Ok(Self::new(local, zone))
    }

    pub fn local(&self) -> NaiveDateTime {
        self.local
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_line(s)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.local.format(RENDER_FORMAT), self.zone)
    }
}
