//! §4.B: the six ordered fast-path decisions, then final metadata
//! application. Grounded on `pbs-client::pxar::extract`'s per-entry dispatch
//! (decide, then apply metadata) and `pbs-client::pxar::metadata::apply_at`
//! for the owner/group/mode/mtime application step.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use anyhow::{Context, Error};

use pgr_api_types::error::RestoreErrorKind;
use pgr_api_types::FileEntry;
use pgr_planner::{apply_block_size, build_plan, hash_existing_file, PlanCursor};
use pgr_repository::cipher::CipherFilter;
use pgr_repository::compression::Decompressor;
use pgr_repository::Repository;
use pgr_tools::checksum::sha1_block;
use pgr_tools::fs::{apply_mode, apply_ownership, set_mtime};
use pgr_tools::ident::{lookup_group, lookup_user};

use crate::atomic::AtomicFile;

/// One file restore job, resolved against its target path.
pub struct JobSpec<'a> {
    pub file: &'a FileEntry,
    pub target_path: std::path::PathBuf,
    /// §4.C.5/selective restore: restore this file as sparse zeroes instead
    /// of fetching any bytes.
    pub zeroed: bool,
    pub force: bool,
    pub delta: bool,
    pub apply_owner: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Zeroed,
    SkippedSizeMtimeMatch,
    SkippedChecksumMatch,
    ZeroLength,
    BlockRestore,
    WholeFileCopy,
}

#[derive(Clone, Debug)]
pub struct Outcome {
    pub copied: bool,
    pub decision: Decision,
    pub size: u64,
    pub checksum: Option<[u8; 20]>,
}

pub struct RestoreContext<'a> {
    pub repo: &'a dyn Repository,
    pub cipher: &'a dyn CipherFilter,
    pub compressor: &'a dyn Decompressor,
    pub block_size: u32,
}

pub fn restore_file(job: &JobSpec, ctx: &RestoreContext) -> Result<Outcome, Error> {
    if job.zeroed {
        return finish(job, zero_file(job)?);
    }

    if job.force {
        if let Ok(meta) = std::fs::metadata(&job.target_path) {
            if meta.size() == job.file.size && meta.mtime() == job.file.timestamp {
                log::info!(
                    "'{}': size and mtime match, skipping",
                    job.target_path.display()
                );
                return finish(
                    job,
                    Outcome {
                        copied: false,
                        decision: Decision::SkippedSizeMtimeMatch,
                        size: job.file.size,
                        checksum: None,
                    },
                );
            }
        }
    }

    if job.delta {
        if let Ok(meta) = std::fs::metadata(&job.target_path) {
            if meta.size() == job.file.size {
                let data = std::fs::read(&job.target_path)
                    .with_context(|| format!("failed to read {:?} for delta check", job.target_path))?;
                let checksum = sha1_block(&data);
                if checksum == job.file.checksum_sha1 {
                    return finish(
                        job,
                        Outcome {
                            copied: false,
                            decision: Decision::SkippedChecksumMatch,
                            size: job.file.size,
                            checksum: Some(checksum),
                        },
                    );
                }
            }
        }
    }

    if job.file.size == 0 {
        let mut atomic = AtomicFile::create(&job.target_path)?;
        atomic.set_len(0)?;
        atomic.commit()?;
        return finish(
            job,
            Outcome {
                copied: false,
                decision: Decision::ZeroLength,
                size: 0,
                checksum: None,
            },
        );
    }

    if let Some(incr) = &job.file.block_incr {
        let hashes = if job.delta {
            hash_existing_file(&job.target_path, incr.block_size)?
        } else {
            None
        };
        let mut plan = build_plan(&incr.block_map, hashes.as_deref());
        apply_block_size(&mut plan, incr.block_size);

        let mut atomic = AtomicFile::create(&job.target_path)?;
        atomic.set_len(job.file.size)?;
        for write in PlanCursor::new(plan, incr.block_size, ctx.repo, ctx.cipher, ctx.compressor) {
            let write = write?;
            atomic.write_at(write.offset, &write.buffer)?;
        }
        atomic.commit()?;

        return finish(
            job,
            Outcome {
                copied: true,
                decision: Decision::BlockRestore,
                size: job.file.size,
                checksum: None,
            },
        );
    }

    whole_file_copy(job, ctx)
}

fn zero_file(job: &JobSpec) -> Result<Outcome, Error> {
    let mut atomic = AtomicFile::create(&job.target_path)?;
    atomic.set_len(job.file.size)?;
    atomic.commit()?;
    Ok(Outcome {
        copied: false,
        decision: Decision::Zeroed,
        size: job.file.size,
        checksum: None,
    })
}

fn whole_file_copy(job: &JobSpec, ctx: &RestoreContext) -> Result<Outcome, Error> {
    let reference = job.file.reference.context("file has no reference/bundle to copy from")?;
    let bundle_id = job.file.bundle_id.context("file has no bundle_id to copy from")?;
    let path = format!("backups/{reference}/bundle.{bundle_id}");

    let raw = ctx
        .repo
        .read(&path, job.file.bundle_offset, None)
        .with_context(|| format!("failed to read '{path}' for whole-file copy"))?;
    let decrypted = ctx.cipher.decrypt(&raw).context("decryption failed")?;
    let decoded = ctx.compressor.decompress(&decrypted).context("decompression failed")?;

    if decoded.len() as u64 != job.file.size {
        return Err(RestoreErrorKind::Format(format!(
            "'{}': decoded size {} does not match manifest size {}",
            job.target_path.display(),
            decoded.len(),
            job.file.size
        ))
        .into());
    }
    let checksum = sha1_block(&decoded);
    if checksum != job.file.checksum_sha1 {
        return Err(RestoreErrorKind::Format(format!(
            "'{}': checksum mismatch after restore",
            job.target_path.display()
        ))
        .into());
    }

    let mut atomic = AtomicFile::create(&job.target_path)?;
    atomic.write_at(0, &decoded)?;
    atomic.commit()?;

    finish(
        job,
        Outcome {
            copied: true,
            decision: Decision::WholeFileCopy,
            size: job.file.size,
            checksum: Some(checksum),
        },
    )
}

/// Apply final owner/group/mode/mtime (§4.B's closing step) before returning.
fn finish(job: &JobSpec, outcome: Outcome) -> Result<Outcome, Error> {
    apply_metadata(&job.target_path, job.file, job.apply_owner)?;
    Ok(outcome)
}

fn apply_metadata(path: &Path, file: &FileEntry, apply_owner: bool) -> Result<(), Error> {
    if apply_owner {
        apply_ownership(path, lookup_user(&file.user)?, lookup_group(&file.group)?)?;
    }
    apply_mode(path, file.mode)?;
    set_mtime(path, file.timestamp)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgr_api_types::{CipherKind, CompressionKind};
    use pgr_repository::{cipher::new_cipher, compression::new_decompressor, LocalRepository};

    fn tmp_dir(name: &str) -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("pgr-worker-restore-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("backups/1")).unwrap();
        dir
    }

    fn sample_file(size: u64, checksum: [u8; 20]) -> FileEntry {
        FileEntry {
            name: "pg_data/base/1/1234".into(),
            size,
            mode: 0o600,
            user: "nobody".into(),
            group: "nobody".into(),
            timestamp: 1_700_000_000,
            checksum_sha1: checksum,
            reference: Some(1),
            bundle_id: Some(7),
            bundle_offset: Some(0),
            block_incr: None,
            page_checksum_error: false,
        }
    }

    #[test]
    fn zeroed_file_is_sparse_and_not_copied() {
        let dir = tmp_dir("zeroed");
        let file = sample_file(4096, [0u8; 20]);
        let target = dir.join("target");
        let job = JobSpec {
            file: &file,
            target_path: target.clone(),
            zeroed: true,
            force: false,
            delta: false,
            apply_owner: false,
        };
        let repo = LocalRepository::new(dir.clone());
        let cipher = new_cipher(CipherKind::None, None).unwrap();
        let compressor = new_decompressor(CompressionKind::None);
        let ctx = RestoreContext {
            repo: &repo,
            cipher: cipher.as_ref(),
            compressor: compressor.as_ref(),
            block_size: 8192,
        };
        let outcome = restore_file(&job, &ctx).unwrap();
        assert!(!outcome.copied);
        assert_eq!(outcome.decision, Decision::Zeroed);
        assert_eq!(std::fs::metadata(&target).unwrap().len(), 4096);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn whole_file_copy_verifies_checksum() {
        let dir = tmp_dir("whole");
        let payload = b"postgres data payload".to_vec();
        std::fs::write(dir.join("backups/1/bundle.7"), &payload).unwrap();
        let checksum = sha1_block(&payload);
        let file = sample_file(payload.len() as u64, checksum);
        let target = dir.join("target");
        let job = JobSpec {
            file: &file,
            target_path: target.clone(),
            zeroed: false,
            force: false,
            delta: false,
            apply_owner: false,
        };
        let repo = LocalRepository::new(dir.clone());
        let cipher = new_cipher(CipherKind::None, None).unwrap();
        let compressor = new_decompressor(CompressionKind::None);
        let ctx = RestoreContext {
            repo: &repo,
            cipher: cipher.as_ref(),
            compressor: compressor.as_ref(),
            block_size: 8192,
        };
        let outcome = restore_file(&job, &ctx).unwrap();
        assert!(outcome.copied);
        assert_eq!(outcome.decision, Decision::WholeFileCopy);
        assert_eq!(std::fs::read(&target).unwrap(), payload);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn delta_skips_when_on_disk_checksum_matches() {
        let dir = tmp_dir("delta-skip");
        let payload = b"same contents on disk and in the backup".to_vec();
        let checksum = sha1_block(&payload);
        let file = sample_file(payload.len() as u64, checksum);
        let target = dir.join("target");
        std::fs::write(&target, &payload).unwrap();
        let job = JobSpec {
            file: &file,
            target_path: target.clone(),
            zeroed: false,
            force: false,
            delta: true,
            apply_owner: false,
        };
        let repo = LocalRepository::new(dir.clone());
        let cipher = new_cipher(CipherKind::None, None).unwrap();
        let compressor = new_decompressor(CompressionKind::None);
        let ctx = RestoreContext {
            repo: &repo,
            cipher: cipher.as_ref(),
            compressor: compressor.as_ref(),
            block_size: 8192,
        };
        let outcome = restore_file(&job, &ctx).unwrap();
        assert!(!outcome.copied);
        assert_eq!(outcome.decision, Decision::SkippedChecksumMatch);
        assert_eq!(std::fs::read(&target).unwrap(), payload);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn force_skips_on_size_and_mtime_match_even_if_checksum_differs() {
        let dir = tmp_dir("force-skip");
        let mut file = sample_file(200, [7u8; 20]);
        file.timestamp = 1_700_000_000;
        let target = dir.join("target");
        std::fs::write(&target, vec![0u8; 200]).unwrap();
        set_mtime(&target, file.timestamp).unwrap();
        let job = JobSpec {
            file: &file,
            target_path: target.clone(),
            zeroed: false,
            force: true,
            delta: false,
            apply_owner: false,
        };
        let repo = LocalRepository::new(dir.clone());
        let cipher = new_cipher(CipherKind::None, None).unwrap();
        let compressor = new_decompressor(CompressionKind::None);
        let ctx = RestoreContext {
            repo: &repo,
            cipher: cipher.as_ref(),
            compressor: compressor.as_ref(),
            block_size: 8192,
        };
        let outcome = restore_file(&job, &ctx).unwrap();
        assert!(!outcome.copied);
        assert_eq!(outcome.decision, Decision::SkippedSizeMtimeMatch);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn whole_file_copy_rejects_checksum_mismatch() {
        let dir = tmp_dir("bad-checksum");
        let payload = b"postgres data payload".to_vec();
        std::fs::write(dir.join("backups/1/bundle.7"), &payload).unwrap();
        let file = sample_file(payload.len() as u64, [0xffu8; 20]);
        let target = dir.join("target");
        let job = JobSpec {
            file: &file,
            target_path: target.clone(),
            zeroed: false,
            force: false,
            delta: false,
            apply_owner: false,
        };
        let repo = LocalRepository::new(dir.clone());
        let cipher = new_cipher(CipherKind::None, None).unwrap();
        let compressor = new_decompressor(CompressionKind::None);
        let ctx = RestoreContext {
            repo: &repo,
            cipher: cipher.as_ref(),
            compressor: compressor.as_ref(),
            block_size: 8192,
        };
        let err = restore_file(&job, &ctx).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn zero_length_file_short_circuits() {
        let dir = tmp_dir("zero-length");
        let file = sample_file(0, [0u8; 20]);
        let target = dir.join("target");
        let job = JobSpec {
            file: &file,
            target_path: target.clone(),
            zeroed: false,
            force: false,
            delta: false,
            apply_owner: false,
        };
        let repo = LocalRepository::new(dir.clone());
        let cipher = new_cipher(CipherKind::None, None).unwrap();
        let compressor = new_decompressor(CompressionKind::None);
        let ctx = RestoreContext {
            repo: &repo,
            cipher: cipher.as_ref(),
            compressor: compressor.as_ref(),
            block_size: 8192,
        };
        let outcome = restore_file(&job, &ctx).unwrap();
        assert_eq!(outcome.decision, Decision::ZeroLength);
        assert_eq!(std::fs::metadata(&target).unwrap().len(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
