//! Terminal colors and number formatting for session output.

use crossterm::style::Stylize;
use std::time::Duration;

/// Terminal bell, emitted in front of a slow round-trip time
pub const BELL: &str = "\x07";

/// Applies ANSI colors when enabled, passes text through otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn red(&self, text: &str) -> String {
        if self.enabled { text.red().to_string() } else { text.to_string() }
    }

    pub fn blue(&self, text: &str) -> String {
        if self.enabled { text.blue().to_string() } else { text.to_string() }
    }

    pub fn green(&self, text: &str) -> String {
        if self.enabled { text.green().to_string() } else { text.to_string() }
    }

    /// Used for timestamps
    pub fn grey(&self, text: &str) -> String {
        if self.enabled { text.dark_grey().to_string() } else { text.to_string() }
    }
}

/// Format a byte count with SI units (`512 B`, `1.5 kB`, `2.0 MB`)
pub fn human_size(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    const PREFIXES: [char; 6] = ['k', 'M', 'G', 'T', 'P', 'E'];

    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < PREFIXES.len() - 1 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!("{:.1} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}

/// Round-trip time in milliseconds with microsecond precision
pub fn format_rtt(rtt: Duration) -> String {
    format!("{:.3}ms", rtt.as_secs_f64() * 1000.0)
}

/// Session wall time with millisecond precision
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}
