//! `RestoreOptions`: the CLI-visible surface named in §6, carried as a plain
//! struct rather than a section-config/profile layering, since configuration
//! loading proper is out of scope for this core (§1).

use std::collections::HashMap;

use crate::RestoreTargetAction;

/// Every CLI-visible option the core depends on (§6), independent of how it
/// was produced (parsed from argv by `pgr-restore-cli`, or built directly by a
/// library caller/test).
#[derive(Clone, Debug)]
pub struct RestoreOptions {
    /// Resume/merge into a pre-existing, possibly partially-populated target.
    pub delta: bool,
    /// Allow skipping files whose size+mtime already match without checksumming.
    pub force: bool,
    pub target_action: RestoreTargetAction,
    /// `tablespace-map`: id-or-name -> path.
    pub tablespace_map: HashMap<String, String>,
    /// `tablespace-map-all`: a single prefix path applied to every unmapped tablespace.
    pub tablespace_map_all: Option<String>,
    /// `link-map`: link name -> path.
    pub link_map: HashMap<String, String>,
    /// Whether unmapped links are still restored (`true`) or dropped (`false`).
    pub link_all: bool,
    /// Selective restore: database OIDs/names to materialise; others are zeroed.
    pub db_include: Option<Vec<String>>,
    /// Requested backup label (`set`); `None` means "latest".
    pub set: Option<String>,
    /// Number of parallel worker units (`process-max`), N >= 1.
    pub process_max: usize,
    /// Per-job inactivity timeout in seconds; the planner enforces half of this.
    pub protocol_timeout: u64,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            delta: false,
            force: false,
            target_action: RestoreTargetAction::Default,
            tablespace_map: HashMap::new(),
            tablespace_map_all: None,
            link_map: HashMap::new(),
            link_all: true,
            db_include: None,
            set: None,
            process_max: 1,
            protocol_timeout: 60,
        }
    }
}

impl RestoreOptions {
    /// §4.F: a per-job inactivity timeout of `protocol-timeout / 2`.
    pub fn job_timeout_secs(&self) -> u64 {
        self.protocol_timeout / 2
    }
}
