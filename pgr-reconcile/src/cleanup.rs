//! §4.C.3/§4.C.4: non-delta strictness and the delta cleanup walk.
//!
//! Grounded on `pbs-client::pxar::extract`'s directory-stack style recursive
//! walk, adapted from pxar-archive-driven extraction to filesystem-vs-manifest
//! reconciliation, using a hand-written recursive descent rather than the
//! `walkdir` crate: this walk needs to delete-or-recurse per entry as it goes
//! (and knows when to stop descending into a to-be-deleted subtree), finer
//! control than `walkdir`'s flat iterator gives for free. `pbs-client` reads
//! its own archive format instead of a real directory tree, so the walk
//! primitive itself has no direct analogue there.

use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use pgr_api_types::error::RestoreErrorKind;
use pgr_manifest::manifest::{Manifest, MANIFEST_COPY_FILE_NAME, MANIFEST_FILE_NAME};
use pgr_tools::fs::apply_ownership;

use crate::paths::dir_path;

/// Recovery-config file PostgreSQL expects at the data directory root when
/// `type=preserve` is requested (§4.C.3/§4.C.4's base-directory exemptions).
const RECOVERY_CONF_NAME: &str = "recovery.signal";

/// §4.C.3: when neither `delta` nor `force` is set, every existing target
/// directory must be empty (the base directory excepted for the manifest
/// copy and, under `type=preserve`, the recovery-config file).
pub fn check_non_delta_strictness(
    manifest: &Manifest,
    data_dir: &Path,
    preserve: bool,
) -> Result<(), Error> {
    for target in &manifest.targets {
        if target.kind != pgr_api_types::TargetKind::Path {
            continue;
        }
        let path = dir_path(target, data_dir);
        if !path.exists() {
            continue;
        }

        let is_base = target.name == pgr_manifest::manifest::BASE_TARGET_NAME;
        let mut entries = std::fs::read_dir(&path)
            .with_context(|| format!("failed to list {path:?}"))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("failed to list {path:?}"))?;

        if is_base {
            entries.retain(|e| {
                let name = e.file_name();
                name != MANIFEST_FILE_NAME
                    && name != MANIFEST_COPY_FILE_NAME
                    && !(preserve && name == RECOVERY_CONF_NAME)
            });
        }

        if !entries.is_empty() {
            return Err(RestoreErrorKind::PathNotEmpty(path.display().to_string()).into());
        }
    }
    Ok(())
}

/// §4.C.4: depth-first walk over every existing target, reconciling entries
/// against the manifest. Returns the absolute paths deleted, for logging.
pub fn cleanup_walk(
    manifest: &Manifest,
    data_dir: &Path,
    preserve: bool,
) -> Result<Vec<PathBuf>, Error> {
    let mut deleted = Vec::new();

    for target in &manifest.targets {
        if target.kind != pgr_api_types::TargetKind::Path {
            continue;
        }
        let root = dir_path(target, data_dir);
        if !root.exists() {
            continue;
        }
        let is_base = target.name == pgr_manifest::manifest::BASE_TARGET_NAME;
        walk_dir(manifest, &root, &target.name, is_base, preserve, &mut deleted)?;
    }

    Ok(deleted)
}

/// `prefix` is the manifest-relative name `dir` corresponds to (the owning
/// target's `name`, plus one path component per level of recursion), so every
/// entry can be matched against the manifest by its full name rather than by
/// basename alone -- a stray file elsewhere in the tree that happens to share
/// a basename with a real manifest entry must not be mistaken for it.
fn walk_dir(
    manifest: &Manifest,
    dir: &Path,
    prefix: &str,
    is_base: bool,
    preserve: bool,
    deleted: &mut Vec<PathBuf>,
) -> Result<(), Error> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {dir:?}"))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to list {dir:?}"))?;
    names.sort_by_key(|e| e.file_name());

    for entry in names {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if is_base
            && (name == MANIFEST_FILE_NAME
                || name == MANIFEST_COPY_FILE_NAME
                || (preserve && name == RECOVERY_CONF_NAME))
        {
            continue;
        }

        let full_name = format!("{prefix}/{name}");

        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {path:?}"))?;

        if file_type.is_symlink() {
            match find_link_for_path(manifest, &full_name) {
                Some(link) if link_destination_matches(&path, &link.destination)? => {
                    apply_ownership(
                        &path,
                        pgr_tools::ident::lookup_user(&link.user)?,
                        pgr_tools::ident::lookup_group(&link.group)?,
                    )?;
                }
                _ => {
                    std::fs::remove_file(&path)
                        .with_context(|| format!("failed to remove stale link {path:?}"))?;
                    deleted.push(path);
                }
            }
            continue;
        }

        if file_type.is_dir() {
            match find_manifest_dir_name(manifest, &full_name) {
                Some(_) => {
                    walk_dir(manifest, &path, &full_name, false, preserve, deleted)?;
                    let meta = std::fs::metadata(&path)?;
                    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(meta.mode() & 0o777))
                        .with_context(|| format!("failed to fix mode of {path:?}"))?;
                }
                None => {
                    std::fs::remove_dir_all(&path)
                        .with_context(|| format!("failed to remove stale directory {path:?}"))?;
                    deleted.push(path);
                }
            }
            continue;
        }

        if file_type.is_file() {
            match find_manifest_file(manifest, &full_name) {
                Some(file) => {
                    let meta = std::fs::metadata(&path)?;
                    if meta.mode() & 0o7777 != file.mode {
                        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(file.mode))
                            .with_context(|| format!("failed to chmod {path:?}"))?;
                    }
                    apply_ownership(
                        &path,
                        pgr_tools::ident::lookup_user(&file.user)?,
                        pgr_tools::ident::lookup_group(&file.group)?,
                    )?;
                }
                None => {
                    std::fs::remove_file(&path)
                        .with_context(|| format!("failed to remove stale file {path:?}"))?;
                    deleted.push(path);
                }
            }
            continue;
        }

        // device, fifo, socket: always removed (§4.C.4).
        debug_assert!(
            file_type.is_block_device() || file_type.is_char_device() || file_type.is_fifo() || file_type.is_socket()
        );
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove special file {path:?}"))?;
        deleted.push(path);
    }

    pgr_tools::fs::fsync_dir(dir)?;
    Ok(())
}

fn link_destination_matches(path: &Path, expected: &str) -> Result<bool, Error> {
    let actual = std::fs::read_link(path).with_context(|| format!("failed to read link {path:?}"))?;
    Ok(actual == Path::new(expected))
}

fn find_link_for_path<'a>(manifest: &'a Manifest, full_name: &str) -> Option<&'a pgr_api_types::LinkEntry> {
    manifest.links.iter().find(|l| l.name == full_name)
}

fn find_manifest_dir_name(manifest: &Manifest, full_name: &str) -> Option<()> {
    manifest.paths.iter().any(|p| p.name == full_name).then_some(())
}

fn find_manifest_file<'a>(manifest: &'a Manifest, full_name: &str) -> Option<&'a pgr_api_types::FileEntry> {
    manifest.files.iter().find(|f| f.name == full_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgr_manifest::manifest::tests_support::manifest_with_tablespace;

    fn tmp_dir(name: &str) -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("pgr-reconcile-cleanup-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn non_delta_rejects_non_empty_target() {
        let manifest = manifest_with_tablespace(16384, "ts1", "/orig/ts1");
        let dir = tmp_dir("strict");
        std::fs::write(dir.join("stray"), b"x").unwrap();
        assert!(check_non_delta_strictness(&manifest, &dir, false).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn non_delta_allows_manifest_copy_in_base() {
        let manifest = manifest_with_tablespace(16384, "ts1", "/orig/ts1");
        let dir = tmp_dir("allowed");
        std::fs::write(dir.join(MANIFEST_FILE_NAME), b"{}").unwrap();
        assert!(check_non_delta_strictness(&manifest, &dir, false).is_ok());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn cleanup_removes_stray_file_not_in_manifest() {
        let manifest = manifest_with_tablespace(16384, "ts1", "/orig/ts1");
        let dir = tmp_dir("delta");
        std::fs::write(dir.join("stray.dat"), b"x").unwrap();
        let deleted = cleanup_walk(&manifest, &dir, false).unwrap();
        assert_eq!(deleted.len(), 1);
        assert!(!dir.join("stray.dat").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
