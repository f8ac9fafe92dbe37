//! Canonical flat-store layout.
//!
//! One store format is recognized. Every distinct version of every module
//! lives once under a shared store directory:
//!
//! - default version of module `M`: `<root>/node_modules/M/`
//! - non-default version `V`:       `<root>/node_modules/M/__fv_/V/M/`
//!
//! The store also carries a shared resolution file and, for linked
//! modules, a marker file naming the consumer projects linking to them.

use std::path::{Component, Path, PathBuf};

use crate::runtime::Runtime;

/// Directory name marking a dependency store.
pub const STORE_DIR: &str = "node_modules";

/// Subdirectory of a module holding its non-default versions.
pub const VERSIONS_DIR: &str = "__fv_";

/// Shared resolution file inside a store.
pub const RESOLUTIONS_FILE: &str = "__dep_resolutions.json";

/// Marker file inside a linked module's own store.
pub const LINKED_MARKER_FILE: &str = "__linked_from.json";

/// Per-package descriptor file.
pub const DESCRIPTOR_FILE: &str = "package.json";

/// Store directory under a root: `<root>/node_modules`.
pub fn store_dir(root: &Path) -> PathBuf {
    root.join(STORE_DIR)
}

/// Unversioned home of a module: `<root>/node_modules/<name>`.
/// Namespaced names ("@scope/pkg") map to nested directories.
pub fn module_dir(root: &Path, name: &str) -> PathBuf {
    store_dir(root).join(name)
}

/// Version container of a module: `<module_dir>/__fv_`.
pub fn versions_dir(module_dir: &Path) -> PathBuf {
    module_dir.join(VERSIONS_DIR)
}

/// Install directory for a non-default version: `<module_dir>/__fv_/<version>`.
/// The module's own content lives one `<name>` level below.
pub fn version_dir(module_dir: &Path, version: &str) -> PathBuf {
    versions_dir(module_dir).join(version)
}

/// Shared resolution file: `<root>/node_modules/__dep_resolutions.json`.
pub fn resolutions_file(root: &Path) -> PathBuf {
    store_dir(root).join(RESOLUTIONS_FILE)
}

/// Linked-module marker file inside a store directory.
pub fn linked_marker_file(store_dir: &Path) -> PathBuf {
    store_dir.join(LINKED_MARKER_FILE)
}

/// Descriptor file of a directory: `<dir>/package.json`.
pub fn descriptor_file(dir: &Path) -> PathBuf {
    dir.join(DESCRIPTOR_FILE)
}

/// Whether a directory carries a store, i.e. `<dir>/node_modules` exists.
pub fn has_store_marker<R: Runtime>(runtime: &R, dir: &Path) -> bool {
    runtime.exists(&store_dir(dir))
}

/// Whether a directory is an installed module boundary: it has either a
/// version container or a descriptor file. Used when mapping a deep
/// request ("pkg/lib/file") back to the module that owns it.
pub fn is_module_boundary<R: Runtime>(runtime: &R, dir: &Path) -> bool {
    runtime.exists(&versions_dir(dir)) || runtime.exists(&descriptor_file(dir))
}

/// If `path` contains a store-marker component, return the directory one
/// level above the last such component. The check is component-wise, so
/// a directory merely named with the marker as a prefix does not count.
pub fn root_above_last_store_segment(path: &Path) -> Option<PathBuf> {
    let components: Vec<Component> = path.components().collect();
    let last = components
        .iter()
        .rposition(|c| c.as_os_str() == STORE_DIR)?;
    Some(components[..last].iter().collect())
}
