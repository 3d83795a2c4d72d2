//! Escape-sequence stripping for saved transcripts.
//!
//! Live output decorates text with SGR color sequences (`ESC [ ... m`) and the
//! terminal bell. Both are removed before a transcript line is classified.

use regex::Regex;
use std::borrow::Cow;
use std::io::{self, BufRead, Write};
use std::sync::LazyLock;

static ESCAPE_SEQUENCES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m|\x07").expect("escape pattern is valid"));

/// Remove color sequences and bells from `text`
pub fn strip(text: &str) -> Cow<'_, str> {
    ESCAPE_SEQUENCES.replace_all(text, "")
}

/// Lines of a terminal capture; invalid UTF-8 is replaced, not rejected
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

/// Split `reader` into lines, dropping `\n` or `\r\n` terminators
pub fn lossy_lines<R: BufRead>(reader: R) -> LossyLines<R> {
    LossyLines {
        reader,
        buf: Vec::new(),
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Copy every line of `reader` to `out` with escape sequences removed
pub fn strip_reader<R: BufRead, W: Write>(reader: R, out: &mut W) -> io::Result<()> {
    for line in lossy_lines(reader) {
        writeln!(out, "{}", strip(&line?))?;
    }
    out.flush()
}
