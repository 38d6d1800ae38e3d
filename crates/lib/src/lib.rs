//! Marquee core library: LINE webhook relay, dialogue store, and upcoming-release digest
//! used by the `marquee` binary.

pub mod channels;
pub mod config;
pub mod init;
pub mod releases;
pub mod store;
pub mod webhook;
