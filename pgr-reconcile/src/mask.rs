//! §4.C.6: selective-restore masking. Given `db-include`, build a regex that
//! matches every file path that must be produced as sparse zeroes rather than
//! restored from the backup.
//!
//! Proxmox Backup Server has no concept of selective per-database restore;
//! built directly from the manifest's own `dbs` list using the corpus's
//! `regex` crate.

use anyhow::Error;
use pgr_api_types::error::RestoreErrorKind;
use pgr_api_types::DbEntry;
use regex::Regex;

/// OIDs below this threshold are PostgreSQL's built-in catalog databases
/// (`template0`, `template1`, `postgres` in a fresh cluster all land above
/// it in practice, but the *built-in object* threshold proper is what never
/// gets zeroed -- shared catalogs must always be present).
const FIRST_NORMAL_OBJECT_ID: u32 = 16384;

/// The PostgreSQL version-sentinel file name within a database directory;
/// never zeroed so the database still looks valid to the server (§4.C.6).
const PG_VERSION_SENTINEL: &str = "PG_VERSION";

/// Build the regex matching every `base/<oid>/...` or `<tablespace>/<oid>/...`
/// path that selective restore must zero, or `None` if every database is
/// included (no masking needed).
pub fn build_mask(dbs: &[DbEntry], include: Option<&[String]>) -> Result<Option<Regex>, Error> {
    let Some(include) = include else {
        return Ok(None);
    };

    for name in include {
        let matched = dbs.iter().find(|db| &db.name == name || db.id.to_string() == *name);
        match matched {
            None => return Err(RestoreErrorKind::DbMissing(name.clone()).into()),
            Some(db) if db.id < FIRST_NORMAL_OBJECT_ID => {
                return Err(RestoreErrorKind::DbInvalid(format!(
                    "'{name}' names the built-in database '{}', which is always included",
                    db.name
                ))
                .into());
            }
            Some(_) => {}
        }
    }

    let included_ids: Vec<u32> = dbs
        .iter()
        .filter(|db| db.id < FIRST_NORMAL_OBJECT_ID || include.iter().any(|i| i == &db.name || i == &db.id.to_string()))
        .map(|db| db.id)
        .collect();

    let excluded_ids: Vec<u32> = dbs
        .iter()
        .map(|db| db.id)
        .filter(|id| !included_ids.contains(id))
        .collect();

    if excluded_ids.is_empty() {
        return Ok(None);
    }

    let alternation = excluded_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("|");
    // Matches any path under an excluded oid's directory; the regex crate has
    // no look-around, so the version-sentinel exemption is applied separately
    // by `is_masked` instead of being baked into the pattern.
    let pattern = format!(r"(^|/)(?:{alternation})/.+$");
    Ok(Some(Regex::new(&pattern)?))
}

/// Whether `file_name` falls under the selective-restore mask and should be
/// materialised as sparse zeroes instead of restored. The per-database
/// version-sentinel file is always exempt, even inside an excluded database.
pub fn is_masked(mask: Option<&Regex>, file_name: &str) -> bool {
    if file_name.rsplit('/').next() == Some(PG_VERSION_SENTINEL) {
        return false;
    }
    mask.map(|re| re.is_match(file_name)).unwrap_or(false)
}
