//! §4.F: the parallel scheduler. One controller thread, N worker threads
//! (standing in for the real product's worker processes, per SPEC_FULL.md
//! §4.F/§5), dispatched with a home-partition bias and an inflight set
//! guaranteeing each file is retired exactly once.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Error};
use crossbeam_channel::{bounded, Receiver, Sender};

use pgr_api_types::error::RestoreErrorKind;
use pgr_api_types::FileEntry;
use pgr_manifest::manifest::Manifest;
use pgr_reconcile::is_masked;
use pgr_repository::cipher::{new_cipher, CipherFilter};
use pgr_repository::compression::new_decompressor;
use pgr_repository::Repository;
use pgr_restore_worker::{restore_file, JobSpec, RestoreContext};
use regex::Regex;

use crate::queues::{build_queues, owning_target, pop_next};
use crate::protocol::{JobError, JobOutcome, JobRequest, JobResult};

pub struct SchedulerConfig {
    pub process_max: usize,
    pub job_timeout: Duration,
    pub cipher_kind: pgr_api_types::CipherKind,
    pub passphrase: Option<Vec<u8>>,
    pub compression_kind: pgr_api_types::CompressionKind,
    pub apply_owner: bool,
    /// §4.B decisions 2/3: `force`/`delta` as carried by `RestoreOptions`.
    pub force: bool,
    pub delta: bool,
}

pub struct RestoreProgress {
    pub size_restored: u64,
    pub size_total: u64,
}

pub fn run(
    manifest: &Manifest,
    data_dir: &Path,
    mask: Option<&Regex>,
    config: &SchedulerConfig,
    repo: Arc<dyn Repository>,
) -> Result<RestoreProgress, Error> {
    let mut queues = build_queues(manifest);
    let partition_count = queues.partition_count().max(1);
    let worker_count = config.process_max.max(1);

    let (result_tx, result_rx) = bounded::<JobResult>(worker_count * 2);
    let mut job_txs: Vec<Sender<JobRequest>> = Vec::with_capacity(worker_count);
    let mut handles = Vec::with_capacity(worker_count);

    for worker_id in 0..worker_count {
        let (job_tx, job_rx) = bounded::<JobRequest>(1);
        job_txs.push(job_tx);

        let manifest_files: Vec<FileEntry> = manifest.files.clone();
        let result_tx = result_tx.clone();
        let repo = Arc::clone(&repo);
        let cipher_kind = config.cipher_kind;
        let passphrase = config.passphrase.clone();
        let compression_kind = config.compression_kind;
        let apply_owner = config.apply_owner;
        let force = config.force;
        let delta = config.delta;

        let handle = std::thread::Builder::new()
            .name(format!("pgr-worker-{worker_id}"))
            .spawn(move || {
                worker_loop(
                    worker_id,
                    job_rx,
                    result_tx,
                    &manifest_files,
                    repo.as_ref(),
                    cipher_kind,
                    passphrase.as_deref(),
                    compression_kind,
                    apply_owner,
                    force,
                    delta,
                )
            })
            .expect("failed to spawn worker thread");
        handles.push(handle);
    }
    drop(result_tx);

    // Each file index lives in exactly one partition, so `pop_next` already
    // guarantees at-most-once dispatch; this set only catches a result
    // arriving for a file we never sent (a worker-side protocol bug).
    let mut inflight: HashSet<usize> = HashSet::new();
    let mut idle_workers: Vec<usize> = (0..worker_count).collect();
    let mut size_restored = 0u64;
    let mut first_error: Option<Error> = None;

    let total_jobs: usize = queues.partitions.iter().map(|p| p.file_indices.len()).sum();
    let mut completed = 0usize;

    loop {
        // Stop issuing new jobs once a worker has reported a hard error;
        // outstanding responses still need draining below.
        if first_error.is_none() {
            idle_workers.retain(|&worker_id| {
                let home = worker_id % partition_count;
                match pop_next(&mut queues, home) {
                    Some(file_index) => {
                        let file = &manifest.files[file_index];
                        let target = owning_target(&manifest.targets, &file.name);
                        let target_path = target
                            .map(|t| pgr_reconcile::paths::file_path(t, data_dir, &file.name))
                            .unwrap_or_else(|| data_dir.join(&file.name));
                        let zeroed = is_masked(mask, &file.name);

                        inflight.insert(file_index);
                        let _ = job_txs[worker_id].send(JobRequest {
                            file_index,
                            target_path,
                            zeroed,
                        });
                        false
                    }
                    None => true,
                }
            });
        }

        if completed >= total_jobs || (first_error.is_some() && inflight.is_empty()) {
            break;
        }

        match result_rx.recv_timeout(config.job_timeout) {
            Ok(result) => {
                if !inflight.remove(&result.file_index) {
                    bail!("received a result for file index {} that was never dispatched", result.file_index);
                }
                completed += 1;
                idle_workers.push(result.worker_id);

                match result.outcome {
                    Ok(outcome) => {
                        size_restored += outcome.size;
                        log::info!(
                            "{:.1}%: '{}' {:?} ({} bytes)",
                            size_restored as f64 * 100.0 / queues.total_size.max(1) as f64,
                            manifest.files[result.file_index].name,
                            outcome.decision,
                            outcome.size
                        );
                    }
                    Err(err) => {
                        log::error!(
                            "'{}': {} ({})",
                            manifest.files[result.file_index].name,
                            err.message,
                            err.code
                        );
                        first_error.get_or_insert_with(|| anyhow::anyhow!("{}: {}", err.code, err.message));
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                return Err(RestoreErrorKind::Timeout { worker_id: usize::MAX }.into());
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(job_txs);
    for handle in handles {
        let _ = handle.join();
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    Ok(RestoreProgress {
        size_restored,
        size_total: queues.total_size,
    })
}

/// Recover the stable §7 code for a worker-side failure when the underlying
/// error is one of `RestoreErrorKind`'s variants; anything else (a channel
/// hiccup, an unexpected panic payload turned into an error) is a protocol
/// failure by definition.
fn error_to_job_error(err: Error) -> JobError {
    match err.downcast_ref::<RestoreErrorKind>() {
        Some(kind) => JobError { code: kind.code(), message: err.to_string() },
        None => JobError { code: "Protocol", message: err.to_string() },
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    worker_id: usize,
    job_rx: Receiver<JobRequest>,
    result_tx: Sender<JobResult>,
    files: &[FileEntry],
    repo: &dyn Repository,
    cipher_kind: pgr_api_types::CipherKind,
    passphrase: Option<&[u8]>,
    compression_kind: pgr_api_types::CompressionKind,
    apply_owner: bool,
    force: bool,
    delta: bool,
) {
    let cipher: Box<dyn CipherFilter> = match new_cipher(cipher_kind, passphrase) {
        Ok(c) => c,
        Err(e) => {
            let _ = result_tx.send(JobResult {
                worker_id,
                file_index: usize::MAX,
                outcome: Err(error_to_job_error(e)),
            });
            return;
        }
    };
    let compressor = new_decompressor(compression_kind);

    while let Ok(request) = job_rx.recv() {
        let file = &files[request.file_index];
        let block_size = file.block_incr.as_ref().map(|b| b.block_size).unwrap_or(8192);
        let ctx = RestoreContext {
            repo,
            cipher: cipher.as_ref(),
            compressor: compressor.as_ref(),
            block_size,
        };
        let job = JobSpec {
            file,
            target_path: request.target_path,
            zeroed: request.zeroed,
            force,
            delta,
            apply_owner,
        };

        let outcome = restore_file(&job, &ctx).map(|o| JobOutcome {
            copied: o.copied,
            decision: o.decision,
            size: o.size,
            checksum: o.checksum,
        });

        let result = JobResult {
            worker_id,
            file_index: request.file_index,
            outcome: outcome.map_err(|e| error_to_job_error(e)),
        };
        if result_tx.send(result).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgr_manifest::manifest::tests_support::{manifest_with_tablespace, PG_VERSION_FIXTURE_CONTENTS};
    use pgr_repository::LocalRepository;

    #[test]
    fn run_restores_every_file_and_reports_progress() {
        let manifest = manifest_with_tablespace(16384, "ts1", "/orig/ts1");
        let mut dir = std::env::temp_dir();
        dir.push(format!("pgr-scheduler-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("data")).unwrap();
        std::fs::create_dir_all(dir.join("repo/backups/1")).unwrap();
        std::fs::write(dir.join("repo/backups/1/bundle.7"), PG_VERSION_FIXTURE_CONTENTS).unwrap();

        let config = SchedulerConfig {
            process_max: 2,
            job_timeout: Duration::from_secs(5),
            cipher_kind: pgr_api_types::CipherKind::None,
            passphrase: None,
            compression_kind: pgr_api_types::CompressionKind::None,
            apply_owner: false,
            force: false,
            delta: true,
        };
        let repo: Arc<dyn Repository> = Arc::new(LocalRepository::new(dir.join("repo")));

        let progress = run(&manifest, &dir.join("data"), None, &config, repo).unwrap();
        assert_eq!(progress.size_total, 3);
        assert!(dir.join("data/PG_VERSION").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
