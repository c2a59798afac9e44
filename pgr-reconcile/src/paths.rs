//! §4.C.1: resolve every manifest target to an absolute filesystem path.
//!
//! A target's `path` field means two different things depending on kind: for
//! a `Path` target it is a virtual, pg_data-relative prefix (equal to `name`
//! for the base target); for a `Link` target it is the link's destination,
//! already absolute once the projector (D) has run. File names elsewhere in
//! the manifest are always rooted at a target's `name`, never its `path`.

use std::path::{Path, PathBuf};

use pgr_api_types::{Target, TargetKind};
use pgr_manifest::manifest::BASE_TARGET_NAME;

/// Where a `Path`-kind target's directory actually lives on disk.
pub fn dir_path(target: &Target, data_dir: &Path) -> PathBuf {
    if target.name == BASE_TARGET_NAME {
        return data_dir.to_path_buf();
    }
    let declared = Path::new(&target.path);
    if declared.is_absolute() {
        declared.to_path_buf()
    } else {
        data_dir.join(declared)
    }
}

/// Where a `Link`-kind target's symlink itself is created (always named by
/// its virtual `name`, rooted at the data directory).
pub fn symlink_path(target: &Target, data_dir: &Path) -> PathBuf {
    data_dir.join(&target.name)
}

/// What a `Link`-kind target's symlink should point at.
pub fn symlink_destination(target: &Target) -> PathBuf {
    match &target.file {
        Some(file) => Path::new(&target.path).join(file),
        None => PathBuf::from(&target.path),
    }
}

/// The absolute filesystem root a file rooted under `target.name` resolves
/// against: the target's directory for `Path`/directory-`Link` targets, or
/// the link destination's parent for file-link targets.
pub fn target_root(target: &Target, data_dir: &Path) -> PathBuf {
    match target.kind {
        TargetKind::Path => dir_path(target, data_dir),
        TargetKind::Link => symlink_destination(target),
    }
}

/// Map a manifest file name (rooted at some target's `name`) to its absolute
/// filesystem path, given the target it belongs to.
pub fn file_path(target: &Target, data_dir: &Path, file_name: &str) -> PathBuf {
    let root = target_root(target, data_dir);
    match file_name.strip_prefix(&target.name) {
        Some(rest) => {
            let rest = rest.trim_start_matches('/');
            if rest.is_empty() {
                root
            } else {
                root.join(rest)
            }
        }
        None => root,
    }
}
