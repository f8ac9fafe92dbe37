//! Request parsing and bypass classification.
//!
//! A request may carry an explicit version constraint after a `@` that is
//! not at position 0, so namespaced names keep their leading `@`:
//!
//! - `foo@1.0.0`         -> name `foo`, constraint `1.0.0`
//! - `foo@1.0.0/lib/a`   -> name `foo/lib/a`, constraint `1.0.0`
//! - `@scope/pkg@2.0.0`  -> name `@scope/pkg`, constraint `2.0.0`
//! - `@scope/pkg`        -> name `@scope/pkg`, no constraint

use std::path::Path;

/// Reserved request for interactive-session loads; always bypasses flat
/// resolution.
pub const REPL_REQUEST: &str = "<repl>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    pub name: String,
    pub version_constraint: Option<String>,
}

impl ModuleRequest {
    /// Split a raw request into base name and optional version constraint.
    ///
    /// The constraint runs from the first `@` after position 0 to the next
    /// `/` (or end of string); a sub-path after that `/` is reattached to
    /// the name. An empty constraint (`foo@`) normalizes to `None`.
    pub fn parse(raw: &str) -> Self {
        let at = raw.get(1..).and_then(|s| s.find('@')).map(|i| i + 1);
        let Some(at) = at else {
            return ModuleRequest {
                name: raw.to_string(),
                version_constraint: None,
            };
        };

        let head = &raw[..at];
        let rest = &raw[at + 1..];
        let (constraint, tail) = match rest.find('/') {
            Some(sep) => (&rest[..sep], &rest[sep..]),
            None => (rest, ""),
        };

        ModuleRequest {
            name: format!("{}{}", head, tail),
            version_constraint: (!constraint.is_empty()).then(|| constraint.to_string()),
        }
    }
}

/// Strip any version constraint from a raw request, keeping a sub-path.
pub fn strip_constraint(raw: &str) -> String {
    ModuleRequest::parse(raw).name
}

/// Whether the request is a relative path (".", "..", "./...", "../...").
pub fn is_relative_request(request: &str) -> bool {
    if request == "." || request == ".." {
        return true;
    }

    if request.starts_with("./") || request.starts_with("../") {
        return true;
    }

    #[cfg(windows)]
    if request.starts_with(".\\") || request.starts_with("..\\") {
        return true;
    }

    false
}

/// Whether the request must bypass flat resolution entirely: relative
/// paths, absolute paths, and the interactive-session marker.
pub fn is_bypass_request(request: &str) -> bool {
    request == REPL_REQUEST || Path::new(request).is_absolute() || is_relative_request(request)
}
