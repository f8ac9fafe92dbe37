//! Upward directory traversal.

use std::path::Path;

/// Walk from `start` upward one directory level at a time, invoking `probe`
/// at each level. The probe returns `Some` to stop early with a result.
///
/// The probe runs before the stop checks, so `stop_dir` and a directory
/// whose name is in `stop_names` are themselves probed before the walk
/// ends. The walk also ends at the filesystem root.
pub fn search_up<T>(
    start: &Path,
    stop_dir: Option<&Path>,
    stop_names: &[&str],
    mut probe: impl FnMut(&Path) -> Option<T>,
) -> Option<T> {
    let mut dir = start;
    loop {
        if let Some(result) = probe(dir) {
            return Some(result);
        }
        if let Some(stop) = stop_dir
            && dir == stop
        {
            return None;
        }
        if let Some(name) = dir.file_name().and_then(|n| n.to_str())
            && stop_names.contains(&name)
        {
            return None;
        }
        match dir.parent() {
            Some(parent) if parent != dir => dir = parent,
            _ => return None,
        }
    }
}
