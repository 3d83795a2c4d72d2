pub mod ansi;
pub mod loss;
pub mod timestamp;

pub use ansi::{strip, strip_reader};
pub use loss::*;
pub use timestamp::*;
