//! Thin binary wiring the restore core end to end (§6), grounded on
//! `proxmox-file-restore/src/main.rs`'s overall shape: parse options, open
//! the repository, load the manifest, drive the restore, report via `log`.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use clap::Parser;
use regex::Regex;

use pgr_api_types::error::RestoreErrorKind;
use pgr_api_types::options::RestoreOptions;
use pgr_manifest::manifest::{Manifest, MANIFEST_FILE_NAME};
use pgr_manifest::projector::{project, ProjectionOptions};
use pgr_reconcile::{build_selective_restore_mask, reconcile, ReconcileOptions};
use pgr_repository::{LocalRepository, Repository};
use pgr_scheduler::{run, SchedulerConfig};
use pgr_tools::env::RestoreEnv;

fn main() {
    let args = cli::Cli::parse();

    if args.syslog {
        if let Err(err) = syslog::init(syslog::Facility::LOG_DAEMON, log::LevelFilter::Info, Some("pgr-restore")) {
            eprintln!("unable to initialize syslog: {err}");
            std::process::exit(1);
        }
    } else {
        env_logger::init();
    }

    if let Err(err) = run_cli(args) {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run_cli(args: cli::Cli) -> Result<(), Error> {
    let repo = LocalRepository::new(args.repository.clone());

    let label = match &args.set {
        Some(label) => {
            if !repo.exists(&format!("backups/{label}"))? {
                return Err(RestoreErrorKind::BackupSetInvalid(label.clone()).into());
            }
            label.clone()
        }
        None => latest_backup_label(&repo)?,
    };

    let manifest_path = format!("backups/{label}/{MANIFEST_FILE_NAME}");
    if !repo.exists(&manifest_path)? {
        return Err(RestoreErrorKind::FileMissing(manifest_path).into());
    }
    let raw = repo
        .read(&manifest_path, None, None)
        .with_context(|| format!("failed to read manifest at '{manifest_path}'"))?;
    let mut manifest = Manifest::from_json(&raw)?;

    let env = RestoreEnv::discover()?;

    let options = RestoreOptions {
        delta: args.delta,
        force: args.force,
        target_action: args.target_action.into(),
        tablespace_map: cli::to_map(args.tablespace_map.clone()),
        tablespace_map_all: args.tablespace_map_all.clone(),
        link_map: cli::to_map(args.link_map.clone()),
        link_all: !args.no_link_all,
        db_include: if args.db_include.is_empty() { None } else { Some(args.db_include.clone()) },
        set: args.set.clone(),
        process_max: args.process_max,
        protocol_timeout: args.protocol_timeout,
    };

    let data_dir_str = args
        .data_dir
        .to_str()
        .context("data directory path is not valid UTF-8")?
        .to_string();

    let projection = ProjectionOptions {
        data_dir: &data_dir_str,
        tablespace_map: &options.tablespace_map,
        tablespace_map_all: options.tablespace_map_all.as_deref(),
        link_map: &options.link_map,
        link_all: options.link_all,
    };
    project(&mut manifest, &projection, &env)?;

    let preserve = matches!(options.target_action, pgr_api_types::RestoreTargetAction::Preserve);
    let reconcile_opts = ReconcileOptions {
        data_dir: &args.data_dir,
        delta: options.delta,
        force: options.force,
        preserve,
    };
    reconcile(&manifest, &reconcile_opts, &env)?;

    let mask: Option<Regex> = build_selective_restore_mask(&manifest, options.db_include.as_deref())?;

    // §6: the manifest is persisted after cleaning and before block fetch, so
    // a restart of a delta restore succeeds even if PG_VERSION is missing.
    std::fs::write(args.data_dir.join(MANIFEST_FILE_NAME), manifest.to_json()?)
        .context("failed to persist backup.manifest before block fetch")?;

    // §5 pg_control sentinel: remove it before dispatch so a partially
    // completed restore can never be started by PostgreSQL; the worker
    // rewrites it last among the base partition's files once restored.
    let pg_control = args.data_dir.join("global/pg_control");
    if pg_control.exists() {
        std::fs::remove_file(&pg_control)
            .with_context(|| format!("failed to remove stale sentinel {pg_control:?}"))?;
    }

    let passphrase = match &args.passphrase_file {
        Some(path) => Some(std::fs::read(path).with_context(|| format!("failed to read passphrase file {path:?}"))?),
        None => None,
    };

    let config = SchedulerConfig {
        process_max: options.process_max.max(1),
        job_timeout: Duration::from_secs(options.job_timeout_secs().max(1)),
        cipher_kind: args.cipher.into(),
        passphrase,
        compression_kind: args.compression.into(),
        apply_owner: env.is_root,
        force: options.force,
        delta: options.delta,
    };

    let repo: Arc<dyn Repository> = Arc::new(repo);
    let progress = run(&manifest, &args.data_dir, mask.as_ref(), &config, repo)?;

    pgr_tools::fs::fsync_dir(&args.data_dir).context("failed to fsync data directory root")?;

    log::info!(
        "restore complete: {} of {} bytes restored",
        progress.size_restored,
        progress.size_total
    );

    Ok(())
}

/// §6 scopes backup selection out of the core; this lists the repository's
/// `backups/` entries and takes the lexicographically last one, which holds
/// for the timestamp-prefixed labels this reference repository driver uses.
fn latest_backup_label(repo: &LocalRepository) -> Result<String, Error> {
    let mut labels = repo.list("backups", None)?;
    labels.sort();
    labels
        .pop()
        .ok_or_else(|| RestoreErrorKind::BackupSetInvalid("no backups found under 'backups/'".into()).into())
}
