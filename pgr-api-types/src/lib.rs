//! Value types shared across the restore core: the manifest's declarative
//! vocabulary, restore options, and the stable error-kind enum of the design.

pub mod error;
pub mod options;

use serde::{Deserialize, Serialize};

/// A target in the manifest: either a directory (`Path`) or a symlink (`Link`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    Path,
    Link,
}

/// One entry of `manifest.targets`: `pg_data` itself, or a tablespace link/path.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Target {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub path: String,
    /// Set when this target is a link pointing at a single file rather than a directory.
    #[serde(default)]
    pub file: Option<String>,
    pub tablespace_id: Option<u32>,
    pub tablespace_name: Option<String>,
}

impl Target {
    pub fn is_tablespace(&self) -> bool {
        self.tablespace_id.is_some()
    }
}

/// `manifest.paths` entry: a plain directory with declared ownership/mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathEntry {
    pub name: String,
    pub user: String,
    pub group: String,
    pub mode: u32,
}

/// `manifest.links` entry: a symlink with declared destination/ownership.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkEntry {
    pub name: String,
    pub destination: String,
    pub user: String,
    pub group: String,
}

/// A single block reference inside a file's block map (§3, §4.A).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Backup id (label) this block's super-block was stored under.
    pub reference: u32,
    pub bundle_id: u64,
    /// Offset of the enclosing super-block within the bundle/repository object.
    pub offset: u64,
    /// Compressed size of the enclosing super-block.
    pub size: u32,
    /// Position of this block within the file, in block units.
    pub block_no: u32,
    /// Recorded fingerprint of the decoded block, used for delta matching.
    #[serde(with = "hex::serde")]
    pub checksum: [u8; 20],
}

/// Incremental-backup metadata attached to a file carrying a block map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockIncr {
    pub block_size: u32,
    pub block_map: Vec<BlockRef>,
}

/// `manifest.files` entry (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub user: String,
    pub group: String,
    pub timestamp: i64,
    #[serde(with = "hex::serde")]
    pub checksum_sha1: [u8; 20],
    /// Earlier backup id this unchanged file can be drawn from whole.
    #[serde(default)]
    pub reference: Option<u32>,
    /// Bundle this file's whole-object bytes live in, when not block-mapped.
    #[serde(default)]
    pub bundle_id: Option<u64>,
    #[serde(default)]
    pub bundle_offset: Option<u64>,
    #[serde(default)]
    pub block_incr: Option<BlockIncr>,
    #[serde(default)]
    pub page_checksum_error: bool,
}

impl FileEntry {
    pub fn has_block_map(&self) -> bool {
        self.block_incr.is_some()
    }
}

/// `manifest.dbs` entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbEntry {
    pub id: u32,
    pub name: String,
    pub last_system_id: u32,
}

/// Manifest-wide metadata (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestMeta {
    pub backup_label: String,
    pub pg_version: u32,
    pub backup_timestamp_copy_start: i64,
    #[serde(default)]
    pub cipher_sub_pass: Option<String>,
}

/// Cipher kinds named in §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CipherKind {
    None,
    Aes256Cbc,
}

/// Compression kinds named in §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionKind {
    None,
    Gzip,
    Lz4,
    Zstd,
    Bz2,
}

/// `type` CLI option (§6): what PostgreSQL should do once bytes are in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestoreTargetAction {
    Default,
    Preserve,
    Immediate,
    Recovery,
    Time,
    Xid,
    Name,
    None,
}
