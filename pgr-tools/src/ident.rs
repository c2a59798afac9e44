//! Local user/group resolution, used by the manifest projector's ownership
//! normalisation (§4.D.5) and the directory reconciler's pre-flight (§4.C.2).

use anyhow::{bail, Error};
use nix::unistd::{Gid, Group, Uid, User};

/// Resolve a user name to a local uid, or `None` if unknown on this host.
pub fn lookup_user(name: &str) -> Result<Option<Uid>, Error> {
    match User::from_name(name) {
        Ok(Some(user)) => Ok(Some(user.uid)),
        Ok(None) => Ok(None),
        Err(err) => bail!("failed to look up user '{name}': {err}"),
    }
}

/// Resolve a group name to a local gid, or `None` if unknown on this host.
pub fn lookup_group(name: &str) -> Result<Option<Gid>, Error> {
    match Group::from_name(name) {
        Ok(Some(group)) => Ok(Some(group.gid)),
        Ok(None) => Ok(None),
        Err(err) => bail!("failed to look up group '{name}': {err}"),
    }
}

/// The user/group name pair of the current process, for non-root ownership
/// substitution (§4.D.5).
pub fn current_user_group() -> Result<(String, String), Error> {
    let uid = Uid::current();
    let gid = Gid::current();

    let user = User::from_uid(uid)?
        .map(|u| u.name)
        .unwrap_or_else(|| uid.to_string());
    let group = Group::from_gid(gid)?
        .map(|g| g.name)
        .unwrap_or_else(|| gid.to_string());

    Ok((user, group))
}

/// Whether the current process is running as root.
pub fn is_root() -> bool {
    Uid::current().is_root()
}

/// Owning user/group name pair of an existing path, used by the reconciler's
/// substitution fallback when running as root (§4.D.5).
pub fn path_owner(path: &std::path::Path) -> Result<(String, String), Error> {
    let meta = std::fs::metadata(path)?;
    use std::os::unix::fs::MetadataExt;
    let uid = Uid::from_raw(meta.uid());
    let gid = Gid::from_raw(meta.gid());
    let user = User::from_uid(uid)?
        .map(|u| u.name)
        .unwrap_or_else(|| uid.to_string());
    let group = Group::from_gid(gid)?
        .map(|g| g.name)
        .unwrap_or_else(|| gid.to_string());
    Ok((user, group))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_user_group_resolves() {
        let (user, group) = current_user_group().unwrap();
        assert!(!user.is_empty());
        assert!(!group.is_empty());
    }

    #[test]
    fn unknown_user_resolves_to_none() {
        let result = lookup_user("__pgr_definitely_not_a_real_user__").unwrap();
        assert!(result.is_none());
    }
}
