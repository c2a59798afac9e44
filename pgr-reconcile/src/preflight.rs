//! §4.C.2: before any cleanup or block fetch, every existing target path must
//! be owned by the current user (unless root) and grant the owner rwx.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use anyhow::{Context, Error};
use pgr_api_types::error::RestoreErrorKind;
use pgr_api_types::Target;
use pgr_tools::{env::RestoreEnv, fs::mode_has_owner_rwx, ident};

use crate::paths::{dir_path, symlink_destination};

/// §4.C.2: the data directory itself must exist, and must not already hold a
/// running server's lock file, before any other pre-flight check runs.
pub fn check_data_dir(data_dir: &Path) -> Result<(), Error> {
    if !data_dir.exists() {
        return Err(RestoreErrorKind::PathMissing(data_dir.display().to_string()).into());
    }
    let postmaster_pid = data_dir.join("postmaster.pid");
    if postmaster_pid.exists() {
        return Err(RestoreErrorKind::PostmasterRunning(postmaster_pid.display().to_string()).into());
    }
    Ok(())
}

pub fn preflight(targets: &[Target], data_dir: &Path, env: &RestoreEnv) -> Result<(), Error> {
    check_data_dir(data_dir)?;

    for target in targets {
        let path = match target.kind {
            pgr_api_types::TargetKind::Path => dir_path(target, data_dir),
            pgr_api_types::TargetKind::Link => symlink_destination(target),
        };
        check_path(&path, env)
            .with_context(|| format!("pre-flight check failed for '{}'", target.name))?;
    }
    Ok(())
}

fn check_path(path: &Path, env: &RestoreEnv) -> Result<(), Error> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("failed to stat {path:?}")),
    };

    if !env.is_root {
        let (owner_user, _) = ident::path_owner(path)?;
        if owner_user != env.current_user {
            return Err(RestoreErrorKind::PathOpen {
                path: path.display().to_string(),
                reason: format!("owned by '{owner_user}', not the current user '{}'", env.current_user),
            }
            .into());
        }
    } else {
        // As root, ownership is irrelevant -- root may write anywhere -- but
        // the mode check below still applies per §4.C.2.
        let _ = meta.uid();
    }

    if !mode_has_owner_rwx(meta.permissions().mode()) {
        return Err(RestoreErrorKind::PathOpen {
            path: path.display().to_string(),
            reason: "does not grant the owner read/write/execute".into(),
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgr_api_types::TargetKind;

    fn tmp_dir(name: &str, mode: u32) -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("pgr-reconcile-preflight-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(mode)).unwrap();
        dir
    }

    #[test]
    fn missing_non_base_target_passes() {
        let data_dir = tmp_dir("missing-target-base", 0o700);
        let target = Target {
            name: "pg_tblspc/16384".into(),
            kind: TargetKind::Path,
            path: "/does/not/exist/yet".into(),
            file: None,
            tablespace_id: Some(16384),
            tablespace_name: None,
        };
        let env = RestoreEnv::fake(false, "alice", "alice");
        assert!(preflight(&[target], &data_dir, &env).is_ok());
        std::fs::remove_dir_all(&data_dir).unwrap();
    }

    #[test]
    fn missing_data_dir_is_fatal() {
        let data_dir = std::env::temp_dir().join("pgr-reconcile-preflight-missing-does-not-exist");
        let _ = std::fs::remove_dir_all(&data_dir);
        let err = check_data_dir(&data_dir).unwrap_err();
        assert!(err.to_string().contains("path missing"));
    }

    #[test]
    fn postmaster_pid_present_is_fatal() {
        let data_dir = tmp_dir("postmaster", 0o700);
        std::fs::write(data_dir.join("postmaster.pid"), b"12345\n").unwrap();
        let err = check_data_dir(&data_dir).unwrap_err();
        assert!(err.to_string().contains("postmaster.pid"));
        std::fs::remove_dir_all(&data_dir).unwrap();
    }

    #[test]
    fn narrow_mode_fails_preflight() {
        let dir = tmp_dir("narrow", 0o400);
        let target = Target {
            name: "pg_data".into(),
            kind: TargetKind::Path,
            path: "pg_data".into(),
            file: None,
            tablespace_id: None,
            tablespace_name: None,
        };
        let env = RestoreEnv::fake(true, "root", "root");
        assert!(preflight(&[target], &dir, &env).is_err());
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700)).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
