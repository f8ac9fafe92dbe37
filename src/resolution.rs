//! Dependency resolution maps.
//!
//! A resolution map records which exact version satisfies each dependency
//! name for a given consumer. On disk an entry carries the resolved
//! version plus a flag for the dependency section it came from:
//!
//! ```json
//! { "foo": { "resolved": "1.1.0", "prod": true } }
//! ```
//!
//! Entries created in memory by a wildcard match carry no section and are
//! never persisted.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

pub type ResolutionMap = HashMap<String, ResolutionEntry>;

/// Dependency section a resolution entry was recorded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencySection {
    Prod,
    Dev,
    Peer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEntry", into = "RawEntry")]
pub struct ResolutionEntry {
    pub resolved: String,
    pub section: Option<DependencySection>,
}

impl ResolutionEntry {
    /// An in-memory entry produced by a wildcard match.
    pub fn unsectioned(resolved: impl Into<String>) -> Self {
        ResolutionEntry {
            resolved: resolved.into(),
            section: None,
        }
    }
}

/// On-disk shape of a resolution entry.
#[derive(Serialize, Deserialize, Clone)]
struct RawEntry {
    resolved: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    prod: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    dev: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    peer: bool,
}

impl From<RawEntry> for ResolutionEntry {
    fn from(raw: RawEntry) -> Self {
        let section = if raw.prod {
            Some(DependencySection::Prod)
        } else if raw.dev {
            Some(DependencySection::Dev)
        } else if raw.peer {
            Some(DependencySection::Peer)
        } else {
            None
        };
        ResolutionEntry {
            resolved: raw.resolved,
            section,
        }
    }
}

impl From<ResolutionEntry> for RawEntry {
    fn from(entry: ResolutionEntry) -> Self {
        RawEntry {
            resolved: entry.resolved,
            prod: entry.section == Some(DependencySection::Prod),
            dev: entry.section == Some(DependencySection::Dev),
            peer: entry.section == Some(DependencySection::Peer),
        }
    }
}

/// Parse a resolution-map file's content. `path` is only used to report
/// parse failures.
pub fn parse_resolution_map(content: &str, path: &Path) -> Result<ResolutionMap> {
    serde_json::from_str(content).map_err(|source| ResolveError::Descriptor {
        path: path.to_path_buf(),
        source,
    })
}
