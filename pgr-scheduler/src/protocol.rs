//! The duplex worker channel (§4.F): in this core, a `crossbeam-channel` pair
//! per worker handle standing in for the real product's per-worker-process
//! pipe, per SPEC_FULL.md §4.F/§5's documented redesign.

use std::path::PathBuf;

/// One unit of work handed to a worker.
#[derive(Clone, Debug)]
pub struct JobRequest {
    pub file_index: usize,
    pub target_path: PathBuf,
    pub zeroed: bool,
}

/// §4.F's result contract: `{copied, error?}`, plus the telemetry the
/// controller logs (§4.F "Progress reporting").
#[derive(Clone, Debug)]
pub struct JobResult {
    pub worker_id: usize,
    pub file_index: usize,
    pub outcome: Result<JobOutcome, JobError>,
}

#[derive(Clone, Debug)]
pub struct JobOutcome {
    pub copied: bool,
    pub decision: pgr_restore_worker::Decision,
    pub size: u64,
    pub checksum: Option<[u8; 20]>,
}

#[derive(Clone, Debug)]
pub struct JobError {
    pub code: &'static str,
    pub message: String,
}
