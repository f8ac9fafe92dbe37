//! Store root location and per-root flat-mode state.
//!
//! Every resolution starts by finding the top directory that governs the
//! requesting file: the nearest directory owning a `node_modules` store.
//! Each distinct root carries state shared by every request under it,
//! the flat-mode tri-state and the lazily loaded shared resolution file.
//!
//! A store reached by walking up from a linked module can redirect
//! resolution back to the consuming project: the store's
//! `__linked_from.json` marker names each consumer working directory and
//! optionally carries the resolution map to apply on its behalf.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, warn};
use serde::Deserialize;

use crate::error::{ResolveError, Result};
use crate::resolution::{ResolutionMap, parse_resolution_map};
use crate::runtime::{Runtime, is_path_under, search_up};
use crate::store;

/// Flat-mode tri-state for one store root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatMode {
    /// No resolution under this root has committed either way yet.
    Unknown,
    /// At least one module resolved through the flat store.
    Enabled,
    /// The root opted out; its requests defer to the legacy resolver.
    Disabled,
}

/// Mutable state shared by every request under one store root.
pub struct RootState {
    mode: Cell<FlatMode>,
    /// Outer `Option`: whether the shared file has been looked for yet.
    shared: RefCell<Option<Option<Rc<RefCell<ResolutionMap>>>>>,
}

impl RootState {
    fn new() -> Self {
        RootState {
            mode: Cell::new(FlatMode::Unknown),
            shared: RefCell::new(None),
        }
    }

    pub fn mode(&self) -> FlatMode {
        self.mode.get()
    }

    /// Commit the root to flat resolution. Only moves the state out of
    /// [`FlatMode::Unknown`]; later calls are no-ops.
    pub fn enable(&self, root: &Path) {
        if self.mode.get() == FlatMode::Unknown {
            debug!("Flat resolution enabled for store root {:?}", root);
            self.mode.set(FlatMode::Enabled);
        }
    }

    /// Opt the root out of flat resolution. Disabling a root that already
    /// resolved a module flat would change module identities mid-run, so
    /// that direction is refused and the mode is left untouched.
    pub fn disable(&self, root: &Path, reason: &str) -> Result<()> {
        match self.mode.get() {
            FlatMode::Enabled => Err(ResolveError::InvariantViolation {
                root: root.to_path_buf(),
                reason: reason.to_string(),
            }),
            FlatMode::Disabled => Ok(()),
            FlatMode::Unknown => {
                warn!("Flat resolution disabled for store root {:?}: {}", root, reason);
                self.mode.set(FlatMode::Disabled);
                Ok(())
            }
        }
    }

    /// Resolution map from the root's shared `__dep_resolutions.json`,
    /// loaded at most once. `None` when the file is absent.
    pub fn shared_resolutions<R: Runtime>(
        &self,
        runtime: &R,
        root: &Path,
    ) -> Result<Option<Rc<RefCell<ResolutionMap>>>> {
        if let Some(loaded) = &*self.shared.borrow() {
            return Ok(loaded.clone());
        }

        let file = store::resolutions_file(root);
        let loaded = if runtime.exists(&file) {
            let content = runtime.read_to_string(&file)?;
            let map = parse_resolution_map(&content, &file)?;
            debug!("Loaded shared resolutions from {:?}", file);
            Some(Rc::new(RefCell::new(map)))
        } else {
            None
        };

        *self.shared.borrow_mut() = Some(loaded.clone());
        Ok(loaded)
    }
}

/// Record naming one consumer of a linked module's store.
#[derive(Debug, Clone)]
pub struct LinkedOrigin {
    /// Resolution map the consumer pinned for the linked module, when the
    /// marker carries one.
    pub dep_resolutions: Option<Rc<RefCell<ResolutionMap>>>,
}

#[derive(Deserialize)]
struct RawLinkedRecord {
    #[serde(rename = "_depResolutions", default)]
    dep_resolutions: Option<ResolutionMap>,
}

/// The governing root resolved for one origin directory.
pub struct TopDirContext {
    /// Store root path, the directory containing `node_modules`.
    pub root: PathBuf,
    /// State shared with every other origin under the same root.
    pub state: Rc<RootState>,
    /// Present when the origin reached its root through a linked store
    /// that redirects back to the consumer.
    pub linked: Option<LinkedOrigin>,
}

/// Locates the store root governing an origin directory, memoized per
/// origin. Distinct origins under the same root share one [`RootState`].
pub struct TopDirLocator<'a, R: Runtime> {
    runtime: &'a R,
    contexts: RefCell<HashMap<PathBuf, Option<Rc<TopDirContext>>>>,
    roots: RefCell<HashMap<PathBuf, Rc<RootState>>>,
    /// Parsed linked marker per store directory. Inner `None`: no marker.
    linked: RefCell<HashMap<PathBuf, Option<Rc<HashMap<String, LinkedOrigin>>>>>,
}

impl<'a, R: Runtime> TopDirLocator<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        TopDirLocator {
            runtime,
            contexts: RefCell::new(HashMap::new()),
            roots: RefCell::new(HashMap::new()),
            linked: RefCell::new(HashMap::new()),
        }
    }

    /// Find the store root governing `origin_dir`.
    ///
    /// Origins inside the current working directory take two shortcuts:
    /// a store directly under the origin wins, then the last store
    /// segment in the path decides. Everything else walks ancestor
    /// directories probing for a store; a store whose linked marker
    /// names `cwd` redirects the root back to `cwd`.
    pub fn locate(&self, origin_dir: &Path, cwd: &Path) -> Result<Option<Rc<TopDirContext>>> {
        if let Some(ctx) = self.contexts.borrow().get(origin_dir) {
            return Ok(ctx.clone());
        }

        let ctx = match self.find_root(origin_dir, cwd)? {
            Some((root, linked)) => {
                let state = self
                    .roots
                    .borrow_mut()
                    .entry(root.clone())
                    .or_insert_with(|| Rc::new(RootState::new()))
                    .clone();
                Some(Rc::new(TopDirContext { root, state, linked }))
            }
            None => None,
        };

        self.contexts
            .borrow_mut()
            .insert(origin_dir.to_path_buf(), ctx.clone());
        Ok(ctx)
    }

    fn find_root(
        &self,
        origin_dir: &Path,
        cwd: &Path,
    ) -> Result<Option<(PathBuf, Option<LinkedOrigin>)>> {
        if is_path_under(origin_dir, cwd) {
            if store::has_store_marker(self.runtime, origin_dir) {
                return Ok(Some((origin_dir.to_path_buf(), None)));
            }
            if let Some(root) = store::root_above_last_store_segment(origin_dir) {
                return Ok(Some((root, None)));
            }
        }

        let found = search_up(origin_dir, None, &[], |dir| {
            store::has_store_marker(self.runtime, dir).then(|| dir.to_path_buf())
        });
        let Some(found) = found else {
            return Ok(None);
        };

        if let Some(linked) = self.linked_origin(&store::store_dir(&found), cwd)? {
            debug!("Store at {:?} is linked from {:?}, resolving on its behalf", found, cwd);
            return Ok(Some((cwd.to_path_buf(), Some(linked))));
        }
        Ok(Some((found, None)))
    }

    /// Consumer record for `cwd` in the linked marker of a store
    /// directory, if the marker names it.
    fn linked_origin(&self, store_dir: &Path, cwd: &Path) -> Result<Option<LinkedOrigin>> {
        let cached = self.linked.borrow().get(store_dir).cloned();
        let records = match cached {
            Some(records) => records,
            None => {
                let records = self.load_linked_records(store_dir)?;
                self.linked
                    .borrow_mut()
                    .insert(store_dir.to_path_buf(), records.clone());
                records
            }
        };

        Ok(records
            .as_ref()
            .and_then(|map| cwd.to_str().and_then(|key| map.get(key).cloned())))
    }

    fn load_linked_records(
        &self,
        store_dir: &Path,
    ) -> Result<Option<Rc<HashMap<String, LinkedOrigin>>>> {
        let file = store::linked_marker_file(store_dir);
        if !self.runtime.exists(&file) {
            return Ok(None);
        }

        let content = self.runtime.read_to_string(&file)?;
        let raw: HashMap<String, RawLinkedRecord> =
            serde_json::from_str(&content).map_err(|source| ResolveError::Descriptor {
                path: file.clone(),
                source,
            })?;
        let records = raw
            .into_iter()
            .map(|(consumer, record)| {
                let origin = LinkedOrigin {
                    dep_resolutions: record.dep_resolutions.map(|map| Rc::new(RefCell::new(map))),
                };
                (consumer, origin)
            })
            .collect();
        debug!("Loaded linked marker from {:?}", file);
        Ok(Some(Rc::new(records)))
    }
}
