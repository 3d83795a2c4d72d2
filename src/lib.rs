// Public API - session tracking, transcript tools, and the probe engine
pub mod config;
pub mod engine;
pub mod state;
pub mod tracker;
pub mod transcript;

// Command-line surface and socket plumbing
pub mod cli;
pub mod prefs;
pub mod probe;
