//! Host-side plumbing for the `tutor` binary: the TOML settings file, the
//! inbound command API, and the snapshot-directory scan loop.

pub mod config;
pub mod server;
pub mod watch;
