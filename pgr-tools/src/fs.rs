//! Filesystem primitives: directory creation with declared ownership/mode,
//! and applying a file's declared owner/group/mode/mtime, in the style of
//! `pbs-client::pxar::metadata` (syscalls via `nix`/`libc`, not higher-level
//! wrappers).

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Error};
use nix::sys::stat::Mode;
use nix::unistd::{Gid, Uid};
use pgr_api_types::error::RestoreErrorKind;

/// Declared ownership/mode for a directory or file about to be created or
/// brought in line with the manifest.
#[derive(Clone, Copy, Debug)]
pub struct Ownership {
    pub uid: Option<Uid>,
    pub gid: Option<Gid>,
    pub mode: u32,
}

/// Create `path` as a directory if it does not already exist, and apply the
/// declared mode. Ownership, if given, is applied unconditionally (§4.C.5).
pub fn create_dir_with(path: &Path, owner: Ownership) -> Result<(), Error> {
    match std::fs::create_dir(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(err) => return Err(err).context(format!("failed to create directory {path:?}")),
    }
    apply_mode(path, owner.mode)?;
    apply_ownership(path, owner.uid, owner.gid)?;
    Ok(())
}

/// Recursively create every missing ancestor of `path` with the default
/// 0700 permission, mirroring `proxmox_sys::fs::create_path`'s behaviour for
/// intermediate directories (only the leaf gets the caller's declared mode).
pub fn create_path_to(path: &Path, leaf: Ownership) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent directories of {path:?}"))?;
        }
    }
    create_dir_with(path, leaf)
}

pub fn apply_mode(path: &Path, mode: u32) -> Result<(), Error> {
    let perms = std::fs::Permissions::from_mode(mode);
    std::fs::set_permissions(path, perms).map_err(|e| {
        RestoreErrorKind::FileOpen {
            path: path.display().to_string(),
            reason: format!("chmod to {mode:o}: {e}"),
        }
        .into()
    })
}

pub fn apply_ownership(path: &Path, uid: Option<Uid>, gid: Option<Gid>) -> Result<(), Error> {
    if uid.is_none() && gid.is_none() {
        return Ok(());
    }
    nix::unistd::chown(path, uid, gid).map_err(|e| {
        RestoreErrorKind::FileOwner {
            path: path.display().to_string(),
            reason: format!("chown to {uid:?}:{gid:?}: {e}"),
        }
        .into()
    })
}

/// Set a file's mtime, leaving atime untouched (`UTIME_OMIT` for atime,
/// mirroring `pbs-client::pxar::metadata::timestamp_to_update_timespec`).
pub fn set_mtime(path: &Path, mtime_secs: i64) -> Result<(), Error> {
    use std::ffi::CString;

    const UTIME_OMIT: i64 = (1 << 30) - 2;
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .with_context(|| format!("invalid path for utimensat: {path:?}"))?;

    let times = [
        libc::timespec {
            tv_sec: 0,
            tv_nsec: UTIME_OMIT,
        },
        libc::timespec {
            tv_sec: mtime_secs as libc::time_t,
            tv_nsec: 0,
        },
    ];

    let res = unsafe {
        libc::utimensat(
            libc::AT_FDCWD,
            c_path.as_ptr(),
            times.as_ptr(),
            0,
        )
    };
    if res != 0 {
        return Err(RestoreErrorKind::FileOpen {
            path: path.display().to_string(),
            reason: format!("utimensat: {}", std::io::Error::last_os_error()),
        }
        .into());
    }
    Ok(())
}

/// Owner-rwx check used by the reconciler's pre-flight (§4.C.2): the mode bits
/// must grant the owner read, write and execute.
pub fn mode_has_owner_rwx(mode: u32) -> bool {
    const OWNER_RWX: u32 = Mode::S_IRUSR.bits() | Mode::S_IWUSR.bits() | Mode::S_IXUSR.bits();
    mode & OWNER_RWX == OWNER_RWX
}

/// fsync a directory (open it read-only and sync), per the decision recorded
/// for the "directory fsync ordering" open question: every directory the
/// reconciler creates or touches is fsynced before the restore is declared
/// done, not just the files inside it.
pub fn fsync_dir(path: &Path) -> Result<(), Error> {
    let dir = std::fs::File::open(path).with_context(|| format!("failed to open {path:?} for fsync"))?;
    dir.sync_all()
        .with_context(|| format!("failed to fsync directory {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;

    fn tmp_dir(name: &str) -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("pgr-tools-test-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn create_dir_with_applies_mode() {
        let base = tmp_dir("create-dir");
        let child = base.join("sub");
        create_dir_with(
            &child,
            Ownership {
                uid: None,
                gid: None,
                mode: 0o750,
            },
        )
        .unwrap();
        let meta = std::fs::metadata(&child).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o750);
        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn set_mtime_round_trips() {
        let base = tmp_dir("mtime");
        let file = base.join("f");
        std::fs::write(&file, b"hi").unwrap();
        set_mtime(&file, 1_700_000_000).unwrap();
        let meta = std::fs::metadata(&file).unwrap();
        assert_eq!(meta.mtime(), 1_700_000_000);
        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn owner_rwx_check() {
        assert!(mode_has_owner_rwx(0o700));
        assert!(mode_has_owner_rwx(0o755));
        assert!(!mode_has_owner_rwx(0o644));
    }
}
