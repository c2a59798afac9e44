//! §4.E: one job queue per partition (the base data directory, plus one per
//! tablespace), each sorted size-descending so the largest files start first.

use pgr_api_types::{Target, TargetKind};
use pgr_manifest::manifest::{Manifest, BASE_TARGET_NAME};

/// The target owning a given manifest file name: the longest target-name
/// prefix match, shared between queue-building and per-job path resolution.
pub fn owning_target<'a>(targets: &'a [Target], file_name: &str) -> Option<&'a Target> {
    targets
        .iter()
        .filter(|t| t.kind == TargetKind::Path || (t.kind == TargetKind::Link && t.file.is_none()))
        .filter(|t| file_name == t.name || file_name.starts_with(&format!("{}/", t.name)))
        .max_by_key(|t| t.name.len())
}

/// The PostgreSQL tablespace-map control file, omitted from the queues for
/// pgVersion >= 12 (§4.E) since the reconciler has already materialised the
/// tablespace symlinks directly.
const TABLESPACE_MAP_FILE: &str = "pg_data/tablespace_map";
const TABLESPACE_MAP_MIN_VERSION: u32 = 120000;

pub struct Partition {
    /// The owning target's virtual name (matches `Target::name`).
    pub name: String,
    pub file_indices: Vec<usize>,
}

pub struct JobQueues {
    pub partitions: Vec<Partition>,
    pub total_size: u64,
}

impl JobQueues {
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

pub fn build_queues(manifest: &Manifest) -> JobQueues {
    let mut partitions: Vec<Partition> = manifest
        .targets
        .iter()
        .filter(|t| t.kind == TargetKind::Path || (t.kind == TargetKind::Link && t.file.is_none()))
        .map(|t| Partition {
            name: t.name.clone(),
            file_indices: Vec::new(),
        })
        .collect();

    let skip_tablespace_map = manifest.meta.pg_version >= TABLESPACE_MAP_MIN_VERSION;
    let mut total_size = 0u64;

    for (i, file) in manifest.files.iter().enumerate() {
        if skip_tablespace_map && file.name == TABLESPACE_MAP_FILE {
            continue;
        }

        // Longest matching target-name prefix owns the file (a tablespace's
        // name, e.g. "pg_tblspc/16384", is always longer than the base
        // target's "pg_data" when both could match, so ties never arise).
        let owner = partitions
            .iter_mut()
            .filter(|p| file.name == p.name || file.name.starts_with(&format!("{}/", p.name)))
            .max_by_key(|p| p.name.len());

        if let Some(partition) = owner {
            partition.file_indices.push(i);
            total_size += file.size;
        } else if file.name.starts_with(&format!("{BASE_TARGET_NAME}/")) {
            total_size += file.size;
        }
    }

    for partition in &mut partitions {
        partition.file_indices.sort_by(|&a, &b| {
            let fa = &manifest.files[a];
            let fb = &manifest.files[b];
            fb.size.cmp(&fa.size).then_with(|| fa.name.cmp(&fb.name))
        });
        // `pop_next` below pulls from the back of each partition; reverse so the
        // largest-size-first, name-ascending-on-ties order above is the pop order.
        partition.file_indices.reverse();
    }

    JobQueues { partitions, total_size }
}

/// §4.F dispatch policy: scan starting from `home`, wrapping, return the
/// index of the first non-empty partition and the file index at its head.
pub fn pop_next(queues: &mut JobQueues, home: usize) -> Option<usize> {
    let count = queues.partition_count();
    if count == 0 {
        return None;
    }
    for offset in 0..count {
        let idx = (home + offset) % count;
        if let Some(file_index) = queues.partitions[idx].file_indices.pop() {
            return Some(file_index);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgr_manifest::manifest::tests_support::manifest_with_tablespace;

    #[test]
    fn partitions_one_per_target() {
        let manifest = manifest_with_tablespace(16384, "ts1", "/orig/ts1");
        let queues = build_queues(&manifest);
        assert_eq!(queues.partition_count(), 2);
    }

    #[test]
    fn files_sorted_size_descending() {
        let mut manifest = manifest_with_tablespace(16384, "ts1", "/orig/ts1");
        manifest.files.push(pgr_api_types::FileEntry {
            name: "pg_data/big".into(),
            size: 999,
            mode: 0o600,
            user: "postgres".into(),
            group: "postgres".into(),
            timestamp: 0,
            checksum_sha1: [0u8; 20],
            reference: None,
            bundle_id: None,
            bundle_offset: None,
            block_incr: None,
            page_checksum_error: false,
        });
        manifest.reindex_after_mutation();

        let mut queues = build_queues(&manifest);
        let home = queues.partitions.iter().position(|p| p.name == "pg_data").unwrap();
        let first = pop_next(&mut queues, home).map(|i| manifest.files[i].name.clone());
        let second = pop_next(&mut queues, home).map(|i| manifest.files[i].name.clone());
        // Largest size dispatches first; "pg_data/big" (999 bytes) precedes the
        // fixture's "pg_data/PG_VERSION" (3 bytes).
        assert_eq!(first.as_deref(), Some("pg_data/big"));
        assert_eq!(second.as_deref(), Some("pg_data/PG_VERSION"));
    }

    #[test]
    fn pop_next_wraps_from_home_partition() {
        let manifest = manifest_with_tablespace(16384, "ts1", "/orig/ts1");
        let mut queues = build_queues(&manifest);
        // Only the base partition ("pg_data") has the fixture's one file; a
        // worker whose home is the tablespace partition should still drain it.
        let home = queues
            .partitions
            .iter()
            .position(|p| p.name == "pg_tblspc/16384")
            .unwrap();
        assert!(pop_next(&mut queues, home).is_some());
    }
}
