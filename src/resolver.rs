//! The flat resolution pipeline and the host dispatch layer.
//!
//! [`Resolver`] turns a module request into the lookup path of the
//! module's resolved location inside a flat store: the module's
//! unversioned home for its default version, the version container for
//! any other version. Requests the flat store cannot or must not serve
//! drop through to the [`LegacyResolver`] the host supplies.
//!
//! [`ResolverHost`] is the stable entry point an embedding runtime
//! routes requests through; installing and uninstalling it toggles flat
//! resolution for the whole process.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;

use crate::descriptor::{DescriptorCache, PackageDescriptor};
use crate::error::{ResolveError, Result};
use crate::legacy::LegacyResolver;
use crate::request::{self, ModuleRequest};
use crate::resolution::{ResolutionEntry, ResolutionMap};
use crate::runtime::{Runtime, search_up};
use crate::store;
use crate::topdir::{FlatMode, TopDirContext, TopDirLocator};
use crate::version::{VersionRegistry, VersionSet};

/// Directory the request originates from: the requester's parent, or
/// the working directory for requesters without a location.
fn origin_dir(requester: Option<&Path>, cwd: &Path) -> PathBuf {
    requester
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.to_path_buf())
}

/// One flat resolution pipeline with its caches.
///
/// Caches are lazily filled and never evicted; the store is assumed
/// immutable while the resolver lives.
pub struct Resolver<'a, R: Runtime, L: LegacyResolver> {
    runtime: &'a R,
    legacy: &'a L,
    descriptors: DescriptorCache<'a, R>,
    registry: VersionRegistry<'a, R>,
    locator: TopDirLocator<'a, R>,
    nearest: RefCell<HashMap<PathBuf, Option<Rc<PackageDescriptor>>>>,
}

impl<'a, R: Runtime, L: LegacyResolver> Resolver<'a, R, L> {
    pub fn new(runtime: &'a R, legacy: &'a L) -> Self {
        Resolver {
            runtime,
            legacy,
            descriptors: DescriptorCache::new(runtime),
            registry: VersionRegistry::new(runtime),
            locator: TopDirLocator::new(runtime),
            nearest: RefCell::new(HashMap::new()),
        }
    }

    /// Resolve a request to its lookup paths.
    ///
    /// Absolute, relative, and interactive-session requests bypass the
    /// flat store entirely. Everything else resolves against the store
    /// root governing the requester; requests a root cannot serve defer
    /// to the legacy resolver once the root is disabled, and fail with
    /// [`ResolveError::ModuleNotFound`] otherwise.
    #[tracing::instrument(skip(self))]
    pub fn resolve(&self, raw: &str, requester: Option<&Path>) -> Result<Vec<PathBuf>> {
        let cwd = self.runtime.current_dir()?;
        let origin = origin_dir(requester, &cwd);

        if request::is_bypass_request(raw) {
            return Ok(self.legacy.lookup_paths(raw, &origin));
        }
        let parsed = ModuleRequest::parse(raw);

        let Some(ctx) = self.locator.locate(&origin, &cwd)? else {
            return Err(ResolveError::ModuleNotFound(parsed.name));
        };
        if ctx.state.mode() == FlatMode::Disabled {
            return Ok(self.legacy.lookup_paths(&parsed.name, &origin));
        }

        let canonical = self.canonical_module_name(&ctx.root, &parsed.name);
        let nearest = self.nearest_descriptor(&origin, &ctx.root)?;

        if let Some(pkg) = &nearest
            && pkg.is_bundled(&canonical)
        {
            ctx.state
                .disable(&ctx.root, &format!("{} is a bundled dependency", canonical))?;
            return Ok(self.legacy.lookup_paths(&parsed.name, &origin));
        }

        let module_dir = store::module_dir(&ctx.root, &canonical);
        let versions = self.registry.versions_of(&self.descriptors, &module_dir)?;

        let version = match &parsed.version_constraint {
            Some(constraint) => versions.latest_matching(constraint).map(str::to_string),
            None => self.recorded_version(&ctx, nearest.as_deref(), &canonical, &versions)?,
        };
        let version = match version {
            Some(version) => version,
            None => {
                if ctx.state.mode() == FlatMode::Disabled {
                    return Ok(self.legacy.lookup_paths(&parsed.name, &origin));
                }
                match self.default_fallback(nearest.as_deref(), &module_dir, &versions)? {
                    Some(version) => version,
                    None => return Err(ResolveError::ModuleNotFound(parsed.name)),
                }
            }
        };

        ctx.state.enable(&ctx.root);

        let target = if versions.default.as_deref() == Some(version.as_str()) {
            module_dir
        } else {
            store::version_dir(&module_dir, &version)
        };
        debug!("Resolved {} to {:?}", raw, target);
        Ok(vec![target])
    }

    /// Exact-path lookup at file-load time. Flat-eligible requests still
    /// carry their version constraint in the name; the legacy resolver
    /// must never see it.
    #[tracing::instrument(skip(self))]
    pub fn resolve_final_path(
        &self,
        raw: &str,
        paths: &[PathBuf],
        is_entry: bool,
    ) -> Result<PathBuf> {
        let target = if request::is_bypass_request(raw) {
            self.legacy.find_path(raw, paths, is_entry)
        } else {
            let stripped = request::strip_constraint(raw);
            self.legacy.find_path(&stripped, paths, is_entry)
        };
        target.ok_or_else(|| ResolveError::ModuleNotFound(raw.to_string()))
    }

    /// Name of the installed module owning a possibly deep or namespaced
    /// request: the shortest leading run of segments whose directory
    /// under the store is a module boundary, or the full name when none
    /// qualifies.
    fn canonical_module_name(&self, root: &Path, name: &str) -> String {
        if !name.contains('/') {
            return name.to_string();
        }

        let segments: Vec<&str> = name.split('/').collect();
        let mut dir = store::store_dir(root);
        for (i, segment) in segments.iter().enumerate() {
            dir.push(segment);
            if store::is_module_boundary(self.runtime, &dir) {
                return segments[..=i].join("/");
            }
        }
        name.to_string()
    }

    /// Nearest descriptor governing the requester, walking from the
    /// origin up to the store root. Directories named like a store stop
    /// the walk: an installed dependency owns its descriptor and must
    /// not inherit one across a store boundary.
    fn nearest_descriptor(
        &self,
        origin_dir: &Path,
        root: &Path,
    ) -> Result<Option<Rc<PackageDescriptor>>> {
        if let Some(found) = self.nearest.borrow().get(origin_dir) {
            return Ok(found.clone());
        }

        let found = search_up(origin_dir, Some(root), &[store::STORE_DIR], |dir| {
            match self.descriptors.read(dir) {
                Ok(Some(pkg)) => Some(Ok(pkg)),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            }
        })
        .transpose()?;

        self.nearest
            .borrow_mut()
            .insert(origin_dir.to_path_buf(), found.clone());
        Ok(found)
    }

    /// Resolution map governing the requester: the descriptor's own map,
    /// then the linked-origin map, then the root's shared file. Having a
    /// descriptor but no source at all opts the root out of flat
    /// resolution; having no descriptor yields nothing and leaves the
    /// mode untouched.
    fn resolutions_for(
        &self,
        ctx: &TopDirContext,
        nearest: Option<&PackageDescriptor>,
    ) -> Result<Option<Rc<RefCell<ResolutionMap>>>> {
        let Some(pkg) = nearest else {
            return Ok(None);
        };

        if let Some(map) = &pkg.dep_resolutions {
            return Ok(Some(map.clone()));
        }
        if let Some(linked) = &ctx.linked
            && let Some(map) = &linked.dep_resolutions
        {
            debug!("Using resolutions recorded by linking consumer {:?}", ctx.root);
            return Ok(Some(map.clone()));
        }
        if let Some(map) = ctx.state.shared_resolutions(self.runtime, &ctx.root)? {
            return Ok(Some(map));
        }

        ctx.state.disable(&ctx.root, "no dependency resolution source")?;
        Ok(None)
    }

    /// Version pinned for `canonical` by the governing resolution map.
    /// An absent or stale entry re-resolves as a wildcard match against
    /// the registry and memoizes the outcome into the map.
    fn recorded_version(
        &self,
        ctx: &TopDirContext,
        nearest: Option<&PackageDescriptor>,
        canonical: &str,
        versions: &VersionSet,
    ) -> Result<Option<String>> {
        let map = self.resolutions_for(ctx, nearest)?;

        if let Some(map) = &map
            && let Some(entry) = map.borrow().get(canonical)
            && versions.contains(&entry.resolved)
        {
            return Ok(Some(entry.resolved.clone()));
        }

        if nearest.is_some()
            && ctx.state.mode() != FlatMode::Disabled
            && let Some(latest) = versions.latest_matching("*")
        {
            let latest = latest.to_string();
            if let Some(map) = &map {
                map.borrow_mut().insert(
                    canonical.to_string(),
                    ResolutionEntry::unsectioned(latest.clone()),
                );
                debug!("Memoized {} -> {} after wildcard match", canonical, latest);
            }
            return Ok(Some(latest));
        }
        Ok(None)
    }

    /// Default version of a module whose descriptor (or whose consumer)
    /// opted into falling back when nothing else resolved.
    fn default_fallback(
        &self,
        nearest: Option<&PackageDescriptor>,
        module_dir: &Path,
        versions: &VersionSet,
    ) -> Result<Option<String>> {
        let Some(default) = &versions.default else {
            return Ok(None);
        };

        let opted = nearest.is_some_and(|pkg| pkg.flat_fallback)
            || self
                .descriptors
                .read(module_dir)?
                .is_some_and(|pkg| pkg.flat_fallback);
        if opted {
            debug!("Falling back to default version {} for {:?}", default, module_dir);
            return Ok(Some(default.clone()));
        }
        Ok(None)
    }
}

/// Dispatch layer the embedding host routes module requests through.
///
/// While uninstalled every request goes straight to the legacy
/// resolver; installing activates flat resolution with fresh caches.
pub struct ResolverHost<'a, R: Runtime, L: LegacyResolver> {
    runtime: &'a R,
    legacy: &'a L,
    active: RefCell<Option<Resolver<'a, R, L>>>,
}

impl<'a, R: Runtime, L: LegacyResolver> ResolverHost<'a, R, L> {
    pub fn new(runtime: &'a R, legacy: &'a L) -> Self {
        ResolverHost {
            runtime,
            legacy,
            active: RefCell::new(None),
        }
    }

    /// Activate flat resolution.
    ///
    /// # Panics
    ///
    /// Panics if a resolver is already installed.
    pub fn install(&self) {
        let mut active = self.active.borrow_mut();
        assert!(active.is_none(), "flat resolver is already installed");
        *active = Some(Resolver::new(self.runtime, self.legacy));
        debug!("Flat resolver installed");
    }

    /// Deactivate flat resolution, dropping the resolver and its caches.
    /// Uninstalling an inactive host is a no-op.
    pub fn uninstall(&self) {
        if self.active.borrow_mut().take().is_some() {
            debug!("Flat resolver uninstalled");
        }
    }

    pub fn is_installed(&self) -> bool {
        self.active.borrow().is_some()
    }

    /// Lookup paths for a request, through the flat pipeline when
    /// installed.
    #[tracing::instrument(skip(self))]
    pub fn resolve_lookup_paths(
        &self,
        raw: &str,
        requester: Option<&Path>,
    ) -> Result<Vec<PathBuf>> {
        if let Some(resolver) = &*self.active.borrow() {
            return resolver.resolve(raw, requester);
        }
        let cwd = self.runtime.current_dir()?;
        let origin = origin_dir(requester, &cwd);
        Ok(self.legacy.lookup_paths(raw, &origin))
    }

    /// Exact target for a request among candidate directories. Version
    /// constraints are stripped only while the flat pipeline is active.
    #[tracing::instrument(skip(self))]
    pub fn resolve_final_path(
        &self,
        raw: &str,
        paths: &[PathBuf],
        is_entry: bool,
    ) -> Result<PathBuf> {
        if let Some(resolver) = &*self.active.borrow() {
            return resolver.resolve_final_path(raw, paths, is_entry);
        }
        self.legacy
            .find_path(raw, paths, is_entry)
            .ok_or_else(|| ResolveError::ModuleNotFound(raw.to_string()))
    }
}
