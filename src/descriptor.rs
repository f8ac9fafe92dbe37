//! Descriptor file projection and cache.
//!
//! Only the handful of fields the resolver consumes is projected out of
//! `package.json`; everything else is ignored. Reads are memoized per
//! directory for the life of the resolver, with "no descriptor here"
//! cached as its own value so the probe is never repeated.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;
use serde::Deserialize;

use crate::error::{ResolveError, Result};
use crate::resolution::ResolutionMap;
use crate::runtime::Runtime;
use crate::store;

#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    pub name: Option<String>,
    pub version: Option<String>,
    pub dependencies: HashMap<String, String>,
    pub bundled_dependencies: Vec<String>,
    /// Explicit per-package resolution map. Shared so in-memory wildcard
    /// matches recorded by the resolver stay visible across lookups.
    pub dep_resolutions: Option<Rc<RefCell<ResolutionMap>>>,
    /// Version occupying the module's unversioned store location.
    pub flat_version: Option<String>,
    /// Opt-in to falling back to the declared default version when no
    /// resolution entry names this module.
    pub flat_fallback: bool,
}

impl PackageDescriptor {
    /// Whether `name` is declared a bundled (private) dependency,
    /// excluding it from flat resolution.
    pub fn is_bundled(&self, name: &str) -> bool {
        self.bundled_dependencies.iter().any(|b| b == name)
    }
}

/// On-disk shape of the projected descriptor fields.
#[derive(Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: Option<HashMap<String, String>>,
    #[serde(default, rename = "bundledDependencies")]
    bundled_dependencies: Option<Vec<String>>,
    #[serde(default, rename = "bundleDependencies")]
    bundle_dependencies: Option<Vec<String>>,
    #[serde(default, rename = "_depResolutions")]
    dep_resolutions: Option<ResolutionMap>,
    #[serde(default, rename = "_flatVersion")]
    flat_version: Option<String>,
    #[serde(default, rename = "_flatFallback")]
    flat_fallback: bool,
}

impl From<RawDescriptor> for PackageDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        PackageDescriptor {
            name: raw.name,
            version: raw.version,
            dependencies: raw.dependencies.unwrap_or_default(),
            bundled_dependencies: raw
                .bundled_dependencies
                .or(raw.bundle_dependencies)
                .unwrap_or_default(),
            dep_resolutions: raw
                .dep_resolutions
                .map(|map| Rc::new(RefCell::new(map))),
            flat_version: raw.flat_version,
            flat_fallback: raw.flat_fallback,
        }
    }
}

/// Memoized descriptor reads, keyed by directory.
pub struct DescriptorCache<'a, R: Runtime> {
    runtime: &'a R,
    entries: RefCell<HashMap<PathBuf, Option<Rc<PackageDescriptor>>>>,
}

impl<'a, R: Runtime> DescriptorCache<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        DescriptorCache {
            runtime,
            entries: RefCell::new(HashMap::new()),
        }
    }

    /// Read the descriptor of `dir`, or `None` if the directory has none.
    /// A file that exists but does not parse is an error, not a negative
    /// cache entry.
    pub fn read(&self, dir: &Path) -> Result<Option<Rc<PackageDescriptor>>> {
        if let Some(cached) = self.entries.borrow().get(dir) {
            return Ok(cached.clone());
        }

        let file = store::descriptor_file(dir);
        let descriptor = if self.runtime.exists(&file) {
            let content = self.runtime.read_to_string(&file)?;
            let raw: RawDescriptor =
                serde_json::from_str(&content).map_err(|source| ResolveError::Descriptor {
                    path: file.clone(),
                    source,
                })?;
            debug!("Loaded descriptor at {:?}", file);
            Some(Rc::new(PackageDescriptor::from(raw)))
        } else {
            None
        };

        self.entries
            .borrow_mut()
            .insert(dir.to_path_buf(), descriptor.clone());
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    #[test]
    fn test_read_projects_fields() {
        let mut runtime = MockRuntime::new();
        let file = PathBuf::from("/app/package.json");

        runtime
            .expect_exists()
            .with(eq(file.clone()))
            .returning(|_| true);
        runtime
            .expect_read_to_string()
            .with(eq(file))
            .returning(|_| {
                Ok(r#"{
                    "name": "my-app",
                    "version": "1.0.0",
                    "description": "ignored",
                    "dependencies": { "foo": "^1.0.0" },
                    "bundledDependencies": ["secret"],
                    "_depResolutions": { "foo": { "resolved": "1.1.0", "prod": true } },
                    "_flatVersion": "1.0.0",
                    "_flatFallback": true
                }"#
                .into())
            });

        let cache = DescriptorCache::new(&runtime);
        let pkg = cache.read(Path::new("/app")).unwrap().unwrap();

        assert_eq!(pkg.name.as_deref(), Some("my-app"));
        assert_eq!(pkg.version.as_deref(), Some("1.0.0"));
        assert_eq!(pkg.dependencies["foo"], "^1.0.0");
        assert!(pkg.is_bundled("secret"));
        assert!(!pkg.is_bundled("foo"));
        assert_eq!(pkg.flat_version.as_deref(), Some("1.0.0"));
        assert!(pkg.flat_fallback);
        let res = pkg.dep_resolutions.as_ref().unwrap().borrow();
        assert_eq!(res["foo"].resolved, "1.1.0");
    }

    #[test]
    fn test_read_accepts_bundle_dependencies_alias() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime.expect_read_to_string().returning(|_| {
            Ok(r#"{"name": "m", "version": "1.0.0", "bundleDependencies": ["x"]}"#.into())
        });

        let cache = DescriptorCache::new(&runtime);
        let pkg = cache.read(Path::new("/app")).unwrap().unwrap();
        assert!(pkg.is_bundled("x"));
    }

    #[test]
    fn test_read_minimal_descriptor() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("{}".into()));

        let cache = DescriptorCache::new(&runtime);
        let pkg = cache.read(Path::new("/app")).unwrap().unwrap();
        assert_eq!(pkg.name, None);
        assert!(pkg.dependencies.is_empty());
        assert!(pkg.dep_resolutions.is_none());
        assert!(!pkg.flat_fallback);
    }

    #[test]
    fn test_read_missing_is_cached_negative() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/app/package.json")))
            .times(1)
            .returning(|_| false);

        let cache = DescriptorCache::new(&runtime);
        assert!(cache.read(Path::new("/app")).unwrap().is_none());
        // Second read is served from the cache; exists() is not called again
        assert!(cache.read(Path::new("/app")).unwrap().is_none());
    }

    #[test]
    fn test_read_is_memoized() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().times(1).returning(|_| true);
        runtime
            .expect_read_to_string()
            .times(1)
            .returning(|_| Ok(r#"{"name": "m", "version": "1.0.0"}"#.into()));

        let cache = DescriptorCache::new(&runtime);
        let first = cache.read(Path::new("/app")).unwrap().unwrap();
        let second = cache.read(Path::new("/app")).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_read_malformed_is_error() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("{ not json".into()));

        let cache = DescriptorCache::new(&runtime);
        let err = cache.read(Path::new("/app")).unwrap_err();
        match err {
            ResolveError::Descriptor { path, .. } => {
                assert_eq!(path, PathBuf::from("/app/package.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
