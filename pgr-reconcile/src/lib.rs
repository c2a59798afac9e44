//! The directory reconciler (component C, §4.C): runs once before job
//! dispatch to bring the target filesystem in line with the manifest.

pub mod cleanup;
pub mod create;
pub mod mask;
pub mod paths;
pub mod preflight;

use std::path::Path;

use anyhow::Error;
use pgr_manifest::manifest::Manifest;
use pgr_tools::env::RestoreEnv;
use regex::Regex;

pub use mask::{build_mask, is_masked};

#[derive(Clone, Copy, Debug)]
pub struct ReconcileOptions<'a> {
    pub data_dir: &'a Path,
    pub delta: bool,
    pub force: bool,
    pub preserve: bool,
}

/// Run §4.C's steps 2-5 in order against an already-projected manifest.
/// Step 1 (path resolution) and step 6 (masking) are exposed separately
/// (`paths`/`mask`) since callers need them independently of this sequence.
pub fn reconcile(
    manifest: &Manifest,
    opts: &ReconcileOptions,
    env: &RestoreEnv,
) -> Result<(), Error> {
    preflight::preflight(&manifest.targets, opts.data_dir, env)?;

    if !opts.delta && !opts.force {
        cleanup::check_non_delta_strictness(manifest, opts.data_dir, opts.preserve)?;
    } else {
        cleanup::cleanup_walk(manifest, opts.data_dir, opts.preserve)?;
    }

    create::create_missing_targets(manifest, opts.data_dir)?;

    Ok(())
}

/// §4.C.6 helper bound to a manifest's own database list and the caller's
/// `db-include` option.
pub fn build_selective_restore_mask(
    manifest: &Manifest,
    db_include: Option<&[String]>,
) -> Result<Option<Regex>, Error> {
    mask::build_mask(&manifest.dbs, db_include)
}
