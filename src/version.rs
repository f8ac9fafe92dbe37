//! Version ordering, constraint matching, and the per-module registry.
//!
//! Versions are directory names. Most are plain semantic versions, but
//! modules installed from symlinks, files, or URLs use reserved names
//! (`v_symlink_<digest>` and friends) that still need a total order, so
//! comparison extracts a semantic-version core where one exists and falls
//! back to plain string ordering otherwise.
//!
//! Constraints support positional wildcards only: a component that is
//! `x`, `X`, `*`, or absent matches anything. Range operators are not
//! interpreted.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::descriptor::DescriptorCache;
use crate::error::Result;
use crate::runtime::Runtime;
use crate::store;

/// Compare two version strings.
///
/// Equal strings compare equal. Otherwise, if both contain a semantic
/// version core, the numeric `(major, minor, patch)` tuples decide;
/// pre-release and build suffixes do not participate. If either side has
/// no core, plain string ordering applies.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (semver_core(a), semver_core(b)) {
        (Some(ca), Some(cb)) => ca.cmp(&cb),
        _ => a.cmp(b),
    }
}

/// Extract the first semantic-version-shaped substring as a numeric
/// tuple. A leading `v` is tolerated; components may not carry leading
/// zeros; the match must sit on word boundaries.
fn semver_core(s: &str) -> Option<(u64, u64, u64)> {
    let bytes = s.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    for i in 0..bytes.len() {
        if i > 0 && is_word(bytes[i - 1]) {
            continue;
        }
        let mut j = i;
        if matches!(bytes.get(j), Some(b'v') | Some(b'V')) {
            j += 1;
        }
        if let Some((core, end)) = parse_core(bytes, j)
            && (end >= bytes.len() || !is_word(bytes[end]))
        {
            return Some(core);
        }
    }
    None
}

fn parse_core(bytes: &[u8], start: usize) -> Option<((u64, u64, u64), usize)> {
    let (major, p) = parse_numeric(bytes, start)?;
    let p = expect_dot(bytes, p)?;
    let (minor, p) = parse_numeric(bytes, p)?;
    let p = expect_dot(bytes, p)?;
    let (patch, p) = parse_numeric(bytes, p)?;
    Some(((major, minor, patch), p))
}

fn expect_dot(bytes: &[u8], at: usize) -> Option<usize> {
    (bytes.get(at) == Some(&b'.')).then_some(at + 1)
}

fn parse_numeric(bytes: &[u8], start: usize) -> Option<(u64, usize)> {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == start || (bytes[start] == b'0' && end - start > 1) {
        return None;
    }
    let value = std::str::from_utf8(&bytes[start..end]).ok()?.parse().ok()?;
    Some((value, end))
}

fn is_any_component(c: &str) -> bool {
    c.is_empty() || c == "x" || c == "X" || c == "*"
}

/// Whether a positional-wildcard constraint accepts a version.
///
/// Compared component-wise on `.`: a wildcard or absent constraint
/// component matches anything, everything else must be string-equal.
/// A constraint longer than the version matches on the shared prefix.
pub fn constraint_matches(constraint: &str, version: &str) -> bool {
    if is_any_component(constraint) {
        return true;
    }
    let parts: Vec<&str> = constraint.split('.').collect();
    for (i, vc) in version.split('.').enumerate() {
        match parts.get(i) {
            None => return true,
            Some(c) if is_any_component(c) || *c == vc => {}
            _ => return false,
        }
    }
    true
}

/// The versions available for one module, ascending by [`compare_versions`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionSet {
    pub all: Vec<String>,
    /// Version occupying the module's unversioned store location.
    pub default: Option<String>,
}

impl VersionSet {
    pub fn contains(&self, version: &str) -> bool {
        self.all.iter().any(|v| v == version)
    }

    /// Greatest version satisfying the constraint, if any.
    pub fn latest_matching(&self, constraint: &str) -> Option<&str> {
        self.all
            .iter()
            .rev()
            .find(|v| constraint_matches(constraint, v))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Per-module-directory version enumeration, memoized.
pub struct VersionRegistry<'a, R: Runtime> {
    runtime: &'a R,
    sets: RefCell<HashMap<PathBuf, Rc<VersionSet>>>,
}

impl<'a, R: Runtime> VersionRegistry<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        VersionRegistry {
            runtime,
            sets: RefCell::new(HashMap::new()),
        }
    }

    /// Enumerate the versions installed under a module directory: the
    /// entries of its version container plus the declared default
    /// version, deduplicated and sorted ascending. A missing module
    /// directory yields an empty set.
    pub fn versions_of(
        &self,
        descriptors: &DescriptorCache<'a, R>,
        module_dir: &Path,
    ) -> Result<Rc<VersionSet>> {
        if let Some(set) = self.sets.borrow().get(module_dir) {
            return Ok(set.clone());
        }

        let set = if self.runtime.exists(module_dir) {
            self.load(descriptors, module_dir)?
        } else {
            VersionSet::default()
        };

        let set = Rc::new(set);
        self.sets
            .borrow_mut()
            .insert(module_dir.to_path_buf(), set.clone());
        Ok(set)
    }

    fn load(
        &self,
        descriptors: &DescriptorCache<'a, R>,
        module_dir: &Path,
    ) -> Result<VersionSet> {
        let mut all = Vec::new();
        let vdir = store::versions_dir(module_dir);
        if self.runtime.exists(&vdir) {
            for entry in self.runtime.read_dir(&vdir)? {
                if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
                    all.push(name.to_string());
                }
            }
        }

        let default = descriptors
            .read(module_dir)?
            .and_then(|pkg| pkg.flat_version.clone());
        if let Some(v) = &default
            && !all.iter().any(|x| x == v)
        {
            all.push(v.clone());
        }

        all.sort_by(|a, b| compare_versions(a, b));
        Ok(VersionSet { all, default })
    }
}
