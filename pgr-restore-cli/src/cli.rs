//! Command-line surface (§6): the options the core's behavior depends on,
//! parsed with `clap::Parser` rather than Proxmox Backup Server's own
//! `proxmox-router` `api!`/`cli!` macro system, since that machinery exists
//! to generate a full REST API surface this thin front-end does not have.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use pgr_api_types::{CipherKind, CompressionKind, RestoreTargetAction};

#[derive(Parser, Debug)]
#[command(name = "pgr-restore", about = "Restore a PostgreSQL cluster data directory from a backup manifest")]
pub struct Cli {
    /// Path to the local repository root.
    pub repository: PathBuf,

    /// Target cluster data directory.
    pub data_dir: PathBuf,

    /// Requested backup label; latest backup under the repository if omitted.
    #[arg(long)]
    pub set: Option<String>,

    /// Resume/merge into a pre-existing, possibly partially-populated target.
    #[arg(long)]
    pub delta: bool,

    /// Skip checksumming files whose size and mtime already match.
    #[arg(long)]
    pub force: bool,

    #[arg(long = "type", value_enum, default_value = "default")]
    pub target_action: CliTargetAction,

    /// `id-or-name=path`, repeatable.
    #[arg(long = "tablespace-map", value_parser = parse_key_value)]
    pub tablespace_map: Vec<(String, String)>,

    /// Prefix applied to every tablespace not named by `--tablespace-map`.
    #[arg(long = "tablespace-map-all")]
    pub tablespace_map_all: Option<String>,

    /// `link-name=path`, repeatable.
    #[arg(long = "link-map", value_parser = parse_key_value)]
    pub link_map: Vec<(String, String)>,

    /// Drop links not named by `--link-map` instead of restoring them verbatim.
    #[arg(long = "no-link-all")]
    pub no_link_all: bool,

    /// Database OIDs/names to materialise; repeatable. Others are zeroed.
    #[arg(long = "db-include")]
    pub db_include: Vec<String>,

    #[arg(long = "process-max", default_value_t = 1)]
    pub process_max: usize,

    #[arg(long = "protocol-timeout", default_value_t = 60)]
    pub protocol_timeout: u64,

    #[arg(long, value_enum, default_value = "none")]
    pub cipher: CliCipherKind,

    /// Path to a file holding the raw decryption passphrase.
    #[arg(long = "passphrase-file")]
    pub passphrase_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "none")]
    pub compression: CliCompressionKind,

    /// Log to syslog (`LOG_DAEMON`) instead of stderr, for long-running/unattended runs.
    #[arg(long)]
    pub syslog: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CliTargetAction {
    Default,
    Preserve,
    Immediate,
    Recovery,
    Time,
    Xid,
    Name,
    None,
}

impl From<CliTargetAction> for RestoreTargetAction {
    fn from(value: CliTargetAction) -> Self {
        match value {
            CliTargetAction::Default => RestoreTargetAction::Default,
            CliTargetAction::Preserve => RestoreTargetAction::Preserve,
            CliTargetAction::Immediate => RestoreTargetAction::Immediate,
            CliTargetAction::Recovery => RestoreTargetAction::Recovery,
            CliTargetAction::Time => RestoreTargetAction::Time,
            CliTargetAction::Xid => RestoreTargetAction::Xid,
            CliTargetAction::Name => RestoreTargetAction::Name,
            CliTargetAction::None => RestoreTargetAction::None,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CliCipherKind {
    None,
    #[value(name = "aes-256-cbc")]
    Aes256Cbc,
}

impl From<CliCipherKind> for CipherKind {
    fn from(value: CliCipherKind) -> Self {
        match value {
            CliCipherKind::None => CipherKind::None,
            CliCipherKind::Aes256Cbc => CipherKind::Aes256Cbc,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CliCompressionKind {
    None,
    Gzip,
    Lz4,
    Zstd,
    #[value(name = "bz2")]
    Bz2,
}

impl From<CliCompressionKind> for CompressionKind {
    fn from(value: CliCompressionKind) -> Self {
        match value {
            CliCompressionKind::None => CompressionKind::None,
            CliCompressionKind::Gzip => CompressionKind::Gzip,
            CliCompressionKind::Lz4 => CompressionKind::Lz4,
            CliCompressionKind::Zstd => CompressionKind::Zstd,
            CliCompressionKind::Bz2 => CompressionKind::Bz2,
        }
    }
}

pub fn to_map(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_pair() {
        assert_eq!(
            parse_key_value("16384=/mnt/ts1").unwrap(),
            ("16384".to_string(), "/mnt/ts1".to_string())
        );
    }

    #[test]
    fn rejects_missing_equals() {
        assert!(parse_key_value("no-equals-here").is_err());
    }

    #[test]
    fn parses_cli_invocation() {
        let cli = Cli::parse_from([
            "pgr-restore",
            "/repo",
            "/var/lib/pgsql/data",
            "--delta",
            "--tablespace-map",
            "16384=/mnt/ts1",
            "--process-max",
            "4",
        ]);
        assert!(cli.delta);
        assert_eq!(cli.process_max, 4);
        assert_eq!(cli.tablespace_map, vec![("16384".to_string(), "/mnt/ts1".to_string())]);
    }
}
