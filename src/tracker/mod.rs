//! Live session tracking: turns probe events into annotated output.

pub mod live;
pub mod palette;
pub mod supervisor;

pub use live::Tracker;
pub use palette::{Palette, human_size};
pub use supervisor::Supervisor;
