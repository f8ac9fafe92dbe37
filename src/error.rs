//! Error taxonomy for flat-store resolution.
//!
//! Only genuinely terminal conditions are errors here. A missing
//! descriptor file and a stale resolution entry are ordinary signals
//! handled inside the resolver (`Option` / re-resolve) and never appear
//! as variants.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    /// No version of the module could be resolved and no legacy fallback
    /// applied.
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// Flat mode for a store root was asked to go from enabled back to
    /// disabled. The store under that root is structurally inconsistent
    /// (partially flattened tree); resolution cannot continue.
    #[error("Flat mode disabled after being enabled for store root {root:?}: {reason}")]
    InvariantViolation { root: PathBuf, reason: String },

    /// A descriptor or marker file exists on disk but could not be parsed.
    #[error("Failed to parse {path:?}: {source}")]
    Descriptor {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An underlying filesystem operation failed for a reason other than
    /// the target being absent.
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ResolveError>;
