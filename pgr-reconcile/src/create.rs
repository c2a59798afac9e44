//! §4.C.5: create every manifest path/link not already present, with its
//! declared ownership and mode.

use std::path::Path;

use anyhow::{Context, Error};
use pgr_api_types::error::RestoreErrorKind;
use pgr_manifest::manifest::Manifest;
use pgr_tools::fs::{create_path_to, fsync_dir, Ownership};
use pgr_tools::ident::{lookup_group, lookup_user};

use crate::paths::{symlink_destination, symlink_path};

pub fn create_missing_targets(manifest: &Manifest, data_dir: &Path) -> Result<(), Error> {
    for path_entry in &manifest.paths {
        let full = data_dir.join(&path_entry.name);
        if full.exists() {
            continue;
        }
        let ownership = Ownership {
            uid: lookup_user(&path_entry.user)?,
            gid: lookup_group(&path_entry.group)?,
            mode: path_entry.mode,
        };
        create_path_to(&full, ownership)
            .with_context(|| format!("failed to create path '{}'", path_entry.name))?;
        if let Some(parent) = full.parent() {
            fsync_dir(parent)?;
        }
        fsync_dir(&full)?;
    }

    for target in &manifest.targets {
        if target.kind != pgr_api_types::TargetKind::Link {
            continue;
        }
        let link_path = symlink_path(target, data_dir);
        if link_path.exists() || link_path.symlink_metadata().is_ok() {
            continue;
        }
        let destination = symlink_destination(target);
        if let Some(parent) = link_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent of link '{}'", target.name))?;
        }
        std::os::unix::fs::symlink(&destination, &link_path).map_err(|e| RestoreErrorKind::FileOpen {
            path: link_path.display().to_string(),
            reason: format!("symlink to {destination:?}: {e}"),
        })?;

        if let Some(link) = manifest.find_link(&target.name) {
            let uid = lookup_user(&link.user)?;
            let gid = lookup_group(&link.group)?;
            if uid.is_some() || gid.is_some() {
                nix::unistd::fchownat(
                    None,
                    &link_path,
                    uid,
                    gid,
                    nix::unistd::FchownatFlags::NoFollowSymlink,
                )
                .with_context(|| format!("failed to chown link '{}'", target.name))?;
            }
        }
        if let Some(parent) = link_path.parent() {
            fsync_dir(parent)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgr_manifest::manifest::tests_support::manifest_with_tablespace;

    fn tmp_dir(name: &str) -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("pgr-reconcile-create-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn creates_missing_tablespace_link() {
        let manifest = manifest_with_tablespace(16384, "ts1", "/orig/ts1");
        let dir = tmp_dir("link");
        create_missing_targets(&manifest, &dir).unwrap();
        let link = dir.join("pg_tblspc/16384");
        assert!(link.symlink_metadata().is_ok());
        assert_eq!(std::fs::read_link(&link).unwrap(), Path::new("/orig/ts1"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn existing_link_is_left_alone() {
        let manifest = manifest_with_tablespace(16384, "ts1", "/orig/ts1");
        let dir = tmp_dir("existing");
        std::fs::create_dir_all(dir.join("pg_tblspc")).unwrap();
        std::os::unix::fs::symlink("/already/there", dir.join("pg_tblspc/16384")).unwrap();
        create_missing_targets(&manifest, &dir).unwrap();
        assert_eq!(
            std::fs::read_link(dir.join("pg_tblspc/16384")).unwrap(),
            Path::new("/already/there")
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
