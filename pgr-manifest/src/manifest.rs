//! The backup manifest (§3): a declarative inventory of every target, path,
//! link, file and database a backup contains, loaded once and (save for
//! projection, §4.D) treated as immutable thereafter.
//!
//! Grounded on `pbs-datastore::manifest::BackupManifest`: the same
//! `lookup_file_info`/`verify_file`/`from_data`/`to_string` shape, minus the
//! HMAC signature mechanism, which this manifest format has no field for.

use std::collections::HashMap;

use anyhow::{bail, Context, Error};
use serde::{Deserialize, Serialize};

use pgr_api_types::{DbEntry, FileEntry, LinkEntry, ManifestMeta, PathEntry, Target, TargetKind};

pub const MANIFEST_FILE_NAME: &str = "backup.manifest";
pub const MANIFEST_COPY_FILE_NAME: &str = "backup.manifest.copy";
pub const BASE_TARGET_NAME: &str = "pg_data";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ManifestWire {
    targets: Vec<Target>,
    paths: Vec<PathEntry>,
    links: Vec<LinkEntry>,
    files: Vec<FileEntry>,
    #[serde(default)]
    dbs: Vec<DbEntry>,
    meta: ManifestMeta,
}

/// The loaded manifest plus indices for O(1) lookup by name, built once after
/// load (§9: "index-based back-references into a string pool rather than
/// owning-pointer cycles").
pub struct Manifest {
    pub targets: Vec<Target>,
    pub paths: Vec<PathEntry>,
    pub links: Vec<LinkEntry>,
    pub files: Vec<FileEntry>,
    pub dbs: Vec<DbEntry>,
    pub meta: ManifestMeta,

    file_index: HashMap<String, usize>,
    target_index: HashMap<String, usize>,
    link_index: HashMap<String, usize>,
}

impl Manifest {
    fn reindex(&mut self) {
        self.file_index = self
            .files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        self.target_index = self
            .targets
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        self.link_index = self
            .links
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.clone(), i))
            .collect();
    }

    fn from_wire(wire: ManifestWire) -> Result<Self, Error> {
        let mut manifest = Self {
            targets: wire.targets,
            paths: wire.paths,
            links: wire.links,
            files: wire.files,
            dbs: wire.dbs,
            meta: wire.meta,
            file_index: HashMap::new(),
            target_index: HashMap::new(),
            link_index: HashMap::new(),
        };
        manifest.reindex();
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a manifest from its JSON wire representation.
    pub fn from_json(data: &[u8]) -> Result<Self, Error> {
        let wire: ManifestWire =
            serde_json::from_slice(data).context("failed to parse backup manifest json")?;
        Self::from_wire(wire)
    }

    /// Render the manifest back to its canonical JSON wire representation
    /// (written as `backup.manifest` per §6, after cleaning and before block
    /// fetch).
    pub fn to_json(&self) -> Result<String, Error> {
        let wire = ManifestWire {
            targets: self.targets.clone(),
            paths: self.paths.clone(),
            links: self.links.clone(),
            files: self.files.clone(),
            dbs: self.dbs.clone(),
            meta: self.meta.clone(),
        };
        serde_json::to_string_pretty(&wire).context("failed to serialize backup manifest")
    }

    /// Re-derive the lookup indices after in-place mutation (the projector,
    /// §4.D, edits `targets`/`links`/`files` and must call this afterwards).
    pub fn reindex_after_mutation(&mut self) {
        self.reindex();
    }

    /// §3 invariants that do not depend on block-level decoding (those are
    /// checked by the planner, `pgr-planner`, per file as it builds a plan).
    fn validate(&self) -> Result<(), Error> {
        if self.find_target(BASE_TARGET_NAME).is_none() {
            bail!("manifest is missing the base target '{BASE_TARGET_NAME}'");
        }

        for file in &self.files {
            // Files are named by the *virtual* target prefix (`target.name`,
            // stable across projection), never by `target.path` (the mutable
            // filesystem destination) -- except for the base target, where
            // the two coincide by convention.
            let owned_by_path = self
                .targets
                .iter()
                .any(|t| t.kind == TargetKind::Path && file.name.starts_with(&t.path));
            let owned_by_tablespace_dir = self.targets.iter().any(|t| {
                t.kind == TargetKind::Link
                    && t.file.is_none()
                    && (file.name == t.name || file.name.starts_with(&format!("{}/", t.name)))
            });
            let owned_by_file_link = self
                .targets
                .iter()
                .any(|t| t.file.as_deref() == Some(file.name.as_str()));
            if !owned_by_path && !owned_by_tablespace_dir && !owned_by_file_link {
                bail!(
                    "file '{}' is not rooted under any path or tablespace target and is not a file-link target",
                    file.name
                );
            }

            if let Some(incr) = &file.block_incr {
                let total: u64 = incr.block_map.iter().map(|b| b.size as u64).sum();
                // NOTE: block_map.size here is the super-block's compressed
                // size on the wire, not the decoded block size; the decoded
                // total is checked once blocks are actually decoded in the
                // planner. We only sanity-check non-emptiness here.
                if incr.block_map.is_empty() && file.size > 0 {
                    bail!("file '{}' has a block map but no blocks", file.name);
                }
                let _ = total;
            }
        }

        Ok(())
    }

    pub fn find_file(&self, name: &str) -> Option<&FileEntry> {
        self.file_index.get(name).map(|&i| &self.files[i])
    }

    pub fn find_target(&self, name: &str) -> Option<&Target> {
        self.target_index.get(name).map(|&i| &self.targets[i])
    }

    pub fn find_link(&self, name: &str) -> Option<&LinkEntry> {
        self.link_index.get(name).map(|&i| &self.links[i])
    }

    pub fn base_target(&self) -> &Target {
        self.find_target(BASE_TARGET_NAME)
            .expect("validated at load time")
    }

    pub fn tablespaces(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(|t| t.is_tablespace())
    }

    /// §8: verify a restored file's declared size/checksum against the manifest.
    pub fn verify_file(&self, name: &str, checksum: &[u8; 20], size: u64) -> Result<(), Error> {
        let info = self
            .find_file(name)
            .with_context(|| format!("manifest does not contain file '{name}'"))?;

        if size != info.size {
            bail!(
                "wrong size for file '{name}' ({} != {size})",
                info.size
            );
        }
        if checksum != &info.checksum_sha1 {
            bail!("wrong checksum for file '{name}'");
        }
        Ok(())
    }
}

/// Manifest builders for tests, shared across this crate's and downstream
/// crates' test modules. Not behind `#[cfg(test)]` since a dependent crate's
/// own test build only sees this crate's non-test code.
pub mod tests_support {
    use super::*;
    use pgr_api_types::TargetKind;

    /// Contents staged at `backups/1/bundle.7` by callers that actually drive
    /// a restore against this fixture (its checksum/size match this exactly).
    pub const PG_VERSION_FIXTURE_CONTENTS: &[u8] = b"15\n";

    pub fn manifest_with_tablespace(id: u32, name: &str, path: &str) -> Manifest {
        let wire = ManifestWire {
            targets: vec![
                Target {
                    name: BASE_TARGET_NAME.into(),
                    kind: TargetKind::Path,
                    path: "pg_data".into(),
                    file: None,
                    tablespace_id: None,
                    tablespace_name: None,
                },
                Target {
                    name: format!("pg_tblspc/{id}"),
                    kind: TargetKind::Link,
                    path: path.into(),
                    file: None,
                    tablespace_id: Some(id),
                    tablespace_name: Some(name.into()),
                },
            ],
            paths: vec![],
            links: vec![LinkEntry {
                name: format!("pg_tblspc/{id}"),
                destination: path.into(),
                user: "postgres".into(),
                group: "postgres".into(),
            }],
            files: vec![FileEntry {
                name: "pg_data/PG_VERSION".into(),
                size: PG_VERSION_FIXTURE_CONTENTS.len() as u64,
                mode: 0o600,
                user: "postgres".into(),
                group: "postgres".into(),
                timestamp: 1_700_000_000,
                checksum_sha1: pgr_tools::checksum::sha1_block(PG_VERSION_FIXTURE_CONTENTS),
                reference: Some(1),
                bundle_id: Some(7),
                bundle_offset: Some(0),
                block_incr: None,
                page_checksum_error: false,
            }],
            dbs: vec![],
            meta: ManifestMeta {
                backup_label: "20260101-000000F".into(),
                pg_version: 150000,
                backup_timestamp_copy_start: 1_700_000_000,
                cipher_sub_pass: None,
            },
        };
        Manifest::from_wire(wire).unwrap()
    }
}
