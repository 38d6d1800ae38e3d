//! Upcoming-release digest: one fetch of the calendar page, rendered as a short text reply.
//!
//! Fetch failures never reach the caller; they produce a digest with the failure notice instead
//! of entries.

mod client;
mod parse;

pub use client::DigestClient;
pub use parse::{decode_entities, extract_releases, ReleaseEntry, RELEASE_ANCHOR_CLASS};

use async_trait::async_trait;
use std::fmt;

/// At most this many releases are listed.
pub const MAX_ENTRIES: usize = 10;

/// Region used when the command carries none (or an unusable one).
pub const DEFAULT_REGION: &str = "US";

const FAILURE_NOTICE: &str = "There is something went wrong...";

/// Produces the digest text for a region.
#[async_trait]
pub trait DigestSource: Send + Sync {
    async fn digest(&self, region: &str) -> String;
}

/// Digest for one region. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDigest {
    pub region: String,
    pub entries: Vec<ReleaseEntry>,
    /// True when the fetch failed; rendered as header + failure notice.
    pub failed: bool,
    /// Command shown in the region-switch footer (e.g. `@Fl Movie`).
    pub command: String,
}

impl ReleaseDigest {
    pub fn failure(region: &str, command: &str) -> Self {
        Self {
            region: region.to_string(),
            entries: Vec::new(),
            failed: true,
            command: command.to_string(),
        }
    }
}

impl fmt::Display for ReleaseDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "From IMDb.\nUpcoming releases {}.\n", self.region)?;
        if self.failed {
            return f.write_str(FAILURE_NOTICE);
        }
        for e in &self.entries {
            writeln!(f, "{} {}", e.title, e.url)?;
        }
        write!(
            f,
            "Of course, You can switch countries, such as {} US,TW,CN etc...",
            self.command
        )
    }
}

/// Normalize a requested region: 2–3 ASCII letters, uppercased; anything else falls back to
/// [`DEFAULT_REGION`].
pub fn normalize_region(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(r) if (2..=3).contains(&r.len()) && r.chars().all(|c| c.is_ascii_alphabetic()) => {
            r.to_ascii_uppercase()
        }
        _ => DEFAULT_REGION.to_string(),
    }
}
