//! Manifest projector (component D, §4.D): applies tablespace/link remaps,
//! validates user-supplied maps, drops unmapped links when `link-all=false`,
//! and normalises ownership for the local host.
//!
//! Proxmox Backup Server has no concept of tablespace remapping, so this is
//! built directly in the corpus's own idiom of `anyhow::bail!` per validation
//! failure and `log::warn!` once per warning class.

use std::collections::{HashMap, HashSet};

use anyhow::Error;
use pgr_api_types::error::RestoreErrorKind;
use pgr_api_types::TargetKind;
use pgr_tools::env::RestoreEnv;

use crate::manifest::{Manifest, BASE_TARGET_NAME};

#[derive(Clone, Debug, Default)]
pub struct ProjectionOptions<'a> {
    pub data_dir: &'a str,
    pub tablespace_map: &'a HashMap<String, String>,
    pub tablespace_map_all: Option<&'a str>,
    pub link_map: &'a HashMap<String, String>,
    pub link_all: bool,
}

/// Run all of §4.D's steps in order, mutating `manifest` in place.
pub fn project(
    manifest: &mut Manifest,
    opts: &ProjectionOptions,
    env: &RestoreEnv,
) -> Result<(), Error> {
    remap_base(manifest, opts.data_dir);
    remap_tablespaces(manifest, opts)?;
    remap_links(manifest, opts)?;
    check_link_sanity(manifest)?;
    normalize_ownership(manifest, env);
    manifest.reindex_after_mutation();
    Ok(())
}

/// §4.D.1: if the user-supplied data directory differs from the manifest's
/// base target path, rewrite it.
fn remap_base(manifest: &mut Manifest, data_dir: &str) {
    if let Some(base) = manifest
        .targets
        .iter_mut()
        .find(|t| t.name == BASE_TARGET_NAME)
    {
        if base.path != data_dir {
            log::info!(
                "remapping base directory '{}' -> '{}'",
                base.path,
                data_dir
            );
            base.path = data_dir.to_string();
        }
    }
}

/// §4.D.2: explicit id/name mapping takes precedence over `tablespace-map-all`;
/// a tablespace mapped by both id and name with differing paths is fatal, and
/// so is any `tablespace-map` entry that matches no tablespace.
fn remap_tablespaces(manifest: &mut Manifest, opts: &ProjectionOptions) -> Result<(), Error> {
    let mut referenced: HashSet<String> = HashSet::new();

    for target in manifest.targets.iter_mut() {
        if !target.is_tablespace() {
            continue;
        }

        let id_key = target.tablespace_id.map(|id| id.to_string());
        let name_key = target.tablespace_name.clone();

        let by_id = id_key.as_ref().and_then(|k| opts.tablespace_map.get(k));
        let by_name = name_key.as_ref().and_then(|k| opts.tablespace_map.get(k));

        let resolved = match (by_id, by_name) {
            (Some(a), Some(b)) if a != b => {
                return Err(RestoreErrorKind::TablespaceMap(format!(
                    "tablespace '{}' remapped by name and id with different paths",
                    target.name
                ))
                .into());
            }
            (Some(a), _) => {
                if let Some(k) = &id_key {
                    referenced.insert(k.clone());
                }
                if let Some(k) = &name_key {
                    referenced.insert(k.clone());
                }
                Some(a.clone())
            }
            (None, Some(b)) => {
                if let Some(k) = &name_key {
                    referenced.insert(k.clone());
                }
                Some(b.clone())
            }
            (None, None) => opts
                .tablespace_map_all
                .map(|prefix| format!("{}/{}", prefix.trim_end_matches('/'), target.name)),
        };

        if let Some(path) = resolved {
            if target.path != path {
                log::info!("remapping tablespace '{}' -> '{}'", target.name, path);
            }
            target.path = path;
        }
    }

    for key in opts.tablespace_map.keys() {
        if !referenced.contains(key) {
            return Err(RestoreErrorKind::TablespaceMap(format!(
                "tablespace-map entry '{key}' does not match any tablespace in the backup"
            ))
            .into());
        }
    }

    Ok(())
}

/// §4.D.3: remap named links; drop unmapped links when `link-all=false`.
fn remap_links(manifest: &mut Manifest, opts: &ProjectionOptions) -> Result<(), Error> {
    let mut referenced: HashSet<String> = HashSet::new();
    let mut dropped_targets: Vec<String> = Vec::new();

    for target in manifest.targets.iter_mut() {
        if target.kind != TargetKind::Link {
            continue;
        }

        if let Some(mapped) = opts.link_map.get(&target.name) {
            referenced.insert(target.name.clone());
            if let Some(file) = &target.file {
                let path = std::path::Path::new(mapped);
                let dir = path
                    .parent()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default();
                let base = path
                    .file_name()
                    .map(|f| f.to_string_lossy().to_string())
                    .unwrap_or_default();
                target.path = dir;
                target.file = Some(base);
                let _ = file;
            } else {
                target.path = mapped.clone();
            }
            log::info!("remapping link '{}' -> '{}'", target.name, mapped);
        } else if !opts.link_all {
            if target.file.is_some() {
                log::warn!(
                    "link '{}' has no mapping and link-all=false: will be restored as a plain file at its original location",
                    target.name
                );
            } else {
                log::warn!(
                    "link '{}' has no mapping and link-all=false: will be restored as a plain directory at its original location",
                    target.name
                );
            }
            dropped_targets.push(target.name.clone());
            target.kind = TargetKind::Path;
        }
    }

    manifest
        .links
        .retain(|link| !dropped_targets.contains(&link.name));

    for key in opts.link_map.keys() {
        if !referenced.contains(key) {
            return Err(RestoreErrorKind::LinkMap(format!(
                "link-map entry '{key}' does not match any link in the backup"
            ))
            .into());
        }
    }

    Ok(())
}

/// §4.D.4: no two links may resolve to the same destination, and no link may
/// live inside another link's destination.
fn check_link_sanity(manifest: &Manifest) -> Result<(), Error> {
    let links: Vec<&Target> = manifest
        .targets
        .iter()
        .filter(|t| t.kind == TargetKind::Link)
        .collect();

    for (i, a) in links.iter().enumerate() {
        for b in links.iter().skip(i + 1) {
            if a.path == b.path {
                return Err(RestoreErrorKind::LinkMap(format!(
                    "links '{}' and '{}' resolve to the same destination '{}'",
                    a.name, b.name, a.path
                ))
                .into());
            }
            if b.path.starts_with(&format!("{}/", a.path)) || a.path.starts_with(&format!("{}/", b.path)) {
                return Err(RestoreErrorKind::LinkMap(format!(
                    "link '{}' destination lives inside link '{}' destination",
                    b.name, a.name
                ))
                .into());
            }
        }
    }

    Ok(())
}

/// §4.D.5: collect distinct users/groups; substitute unresolvable ones when
/// root, or everything when not root, warning once per distinct name.
fn normalize_ownership(manifest: &mut Manifest, env: &RestoreEnv) {
    let mut warned_users: HashSet<String> = HashSet::new();
    let mut warned_groups: HashSet<String> = HashSet::new();

    if env.is_root {
        let (fallback_user, fallback_group) = (env.current_user.clone(), env.current_group.clone());

        for user in user_fields_mut(manifest) {
            if pgr_tools::ident::lookup_user(user).ok().flatten().is_none() && *user != fallback_user {
                if warned_users.insert(user.clone()) {
                    log::warn!(
                        "user '{user}' does not exist locally, substituting data directory owner '{fallback_user}'"
                    );
                }
                *user = fallback_user.clone();
            }
        }
        for group in group_fields_mut(manifest) {
            if pgr_tools::ident::lookup_group(group).ok().flatten().is_none() && *group != fallback_group {
                if warned_groups.insert(group.clone()) {
                    log::warn!(
                        "group '{group}' does not exist locally, substituting data directory owner '{fallback_group}'"
                    );
                }
                *group = fallback_group.clone();
            }
        }
    } else {
        for user in user_fields_mut(manifest) {
            if *user != env.current_user && warned_users.insert(user.clone()) {
                log::warn!(
                    "not running as root: restoring '{user}'-owned entries as '{}'",
                    env.current_user
                );
            }
            *user = env.current_user.clone();
        }
        for group in group_fields_mut(manifest) {
            if *group != env.current_group && warned_groups.insert(group.clone()) {
                log::warn!(
                    "not running as root: restoring '{group}'-owned entries as '{}'",
                    env.current_group
                );
            }
            *group = env.current_group.clone();
        }
    }
}

fn user_fields_mut(manifest: &mut Manifest) -> impl Iterator<Item = &mut String> {
    manifest
        .files
        .iter_mut()
        .map(|f| &mut f.user)
        .chain(manifest.paths.iter_mut().map(|p| &mut p.user))
        .chain(manifest.links.iter_mut().map(|l| &mut l.user))
}

fn group_fields_mut(manifest: &mut Manifest) -> impl Iterator<Item = &mut String> {
    manifest
        .files
        .iter_mut()
        .map(|f| &mut f.group)
        .chain(manifest.paths.iter_mut().map(|p| &mut p.group))
        .chain(manifest.links.iter_mut().map(|l| &mut l.group))
}
