//! Stable, matchable error kinds (§7).
//!
//! Ordinary fallible plumbing elsewhere in the core uses `anyhow::Error`; this
//! enum exists only for the handful of error classes a caller (or a test) needs
//! to match on by discriminant rather than by message text.

/// One of the stable error kinds from §7, each raised at a well-defined point.
#[derive(thiserror::Error, Debug)]
pub enum RestoreErrorKind {
    #[error("path missing: {0}")]
    PathMissing(String),

    #[error("postmaster.pid present in target: {0}")]
    PostmasterRunning(String),

    #[error("path not empty, use --delta to restore over existing data: {0}")]
    PathNotEmpty(String),

    #[error("unable to open path '{path}': {reason}")]
    PathOpen { path: String, reason: String },

    #[error("tablespace-map: {0}")]
    TablespaceMap(String),

    #[error("link-map: {0}")]
    LinkMap(String),

    #[error("backup set invalid: {0}")]
    BackupSetInvalid(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("file missing: {0}")]
    FileMissing(String),

    #[error("database missing: {0}")]
    DbMissing(String),

    #[error("database invalid: {0}")]
    DbInvalid(String),

    #[error("option invalid: {0}")]
    OptionInvalid(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("failed to set ownership on '{path}': {reason}")]
    FileOwner { path: String, reason: String },

    #[error("failed to open/create '{path}': {reason}")]
    FileOpen { path: String, reason: String },

    #[error("worker protocol error: {0}")]
    Protocol(String),

    #[error("timeout waiting for worker {worker_id}")]
    Timeout { worker_id: usize },
}

impl RestoreErrorKind {
    /// The stable machine-readable code named in each row of the §7 table.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathMissing(_) => "PathMissing",
            Self::PostmasterRunning(_) => "PostmasterRunning",
            Self::PathNotEmpty(_) => "PathNotEmpty",
            Self::PathOpen { .. } => "PathOpen",
            Self::TablespaceMap(_) => "TablespaceMap",
            Self::LinkMap(_) => "LinkMap",
            Self::BackupSetInvalid(_) => "BackupSetInvalid",
            Self::Format(_) => "Format",
            Self::FileMissing(_) => "FileMissing",
            Self::DbMissing(_) => "DbMissing",
            Self::DbInvalid(_) => "DbInvalid",
            Self::OptionInvalid(_) => "OptionInvalid",
            Self::Crypto(_) => "Crypto",
            Self::FileOwner { .. } => "FileOwner",
            Self::FileOpen { .. } => "FileOpen",
            Self::Protocol(_) => "Protocol",
            Self::Timeout { .. } => "Timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_per_variant() {
        let err = RestoreErrorKind::PathNotEmpty("/var/lib/pgsql/data".into());
        assert_eq!(err.code(), "PathNotEmpty");
    }
}
