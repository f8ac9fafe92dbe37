//! Seam to the host's own module resolution.
//!
//! Flat resolution layers over an existing resolver: bypass-shaped
//! requests, disabled roots, and final path lookups all drop through
//! this trait. [`NestedResolver`] supplies classic nested-store behavior
//! for hosts and tests that have no resolver of their own.

use std::path::{Path, PathBuf};

use crate::runtime::{Runtime, search_up};
use crate::store;

/// The resolver flat resolution defers to.
#[cfg_attr(test, mockall::automock)]
pub trait LegacyResolver {
    /// Candidate directories for a request originating in `origin_dir`,
    /// nearest first.
    fn lookup_paths(&self, request: &str, origin_dir: &Path) -> Vec<PathBuf>;

    /// Concrete target for a request among candidate directories, or
    /// `None` when no candidate holds it.
    fn find_path(&self, request: &str, paths: &[PathBuf], is_entry: bool) -> Option<PathBuf>;
}

/// Classic nested-store resolution: one candidate store per ancestor.
pub struct NestedResolver<'a, R: Runtime> {
    runtime: &'a R,
}

impl<'a, R: Runtime> NestedResolver<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        NestedResolver { runtime }
    }

    /// Join a request onto a candidate directory. A candidate already
    /// ending with the request's leading components is the module's own
    /// home; only the remaining components are appended then.
    fn join_request(&self, candidate: &Path, request: &str) -> PathBuf {
        let segments: Vec<&str> = request.split('/').collect();
        let components: Vec<&str> = candidate
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();

        let max = segments.len().min(components.len());
        for overlap in (1..=max).rev() {
            if components[components.len() - overlap..] == segments[..overlap] {
                return if overlap == segments.len() {
                    candidate.to_path_buf()
                } else {
                    candidate.join(segments[overlap..].join("/"))
                };
            }
        }
        candidate.join(request)
    }
}

impl<'a, R: Runtime> LegacyResolver for NestedResolver<'a, R> {
    fn lookup_paths(&self, _request: &str, origin_dir: &Path) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        search_up::<()>(origin_dir, None, &[], |dir| {
            let candidate = store::store_dir(dir);
            if self.runtime.is_dir(&candidate) {
                paths.push(candidate);
            }
            None
        });
        paths
    }

    fn find_path(&self, request: &str, paths: &[PathBuf], _is_entry: bool) -> Option<PathBuf> {
        for candidate in paths {
            let target = self.join_request(candidate, request);
            if self.runtime.is_file(&target) || self.runtime.is_dir(&target) {
                return Some(target);
            }
        }
        None
    }
}
