//! The delta-map filter (§4.B's sibling to the planner): fingerprints an
//! existing local file in fixed-size blocks so the planner can skip blocks
//! that already match on disk.
//!
//! Grounded on `pbs-datastore::fixed_index`'s fixed-size chunking with a
//! shorter final chunk, using the same SHA-1 helper the manifest's own
//! checksum field uses (`pgr_tools::checksum`).

use std::io::Read;

use anyhow::{Context, Error};

/// Read `path` and return one SHA-1 fingerprint per `block_size`-byte block,
/// the last block possibly shorter. Returns `Ok(None)` if the file doesn't
/// exist — callers treat that the same as "no hash list" (§4.A).
pub fn hash_existing_file(path: &std::path::Path, block_size: u32) -> Result<Option<Vec<[u8; 20]>>, Error> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to open {path:?} for delta hashing")),
    };

    let mut hashes = Vec::new();
    let mut buf = vec![0u8; block_size as usize];
    loop {
        let mut filled = 0;
        while filled < buf.len() {
            let n = file
                .read(&mut buf[filled..])
                .with_context(|| format!("failed to read {path:?} for delta hashing"))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }
        hashes.push(pgr_tools::checksum::sha1_block(&buf[..filled]));
        if filled < buf.len() {
            break;
        }
    }

    Ok(Some(hashes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("pgr-planner-delta-{name}-{}", std::process::id()));
        p
    }

    #[test]
    fn missing_file_yields_none() {
        let path = tmp_path("missing");
        let _ = std::fs::remove_file(&path);
        assert!(hash_existing_file(&path, 8).unwrap().is_none());
    }

    #[test]
    fn hashes_one_block_per_block_size_with_short_final_block() {
        let path = tmp_path("present");
        std::fs::write(&path, b"AAAAAAAABBBBB").unwrap(); // 8 + 5 bytes
        let hashes = hash_existing_file(&path, 8).unwrap().unwrap();
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[0], pgr_tools::checksum::sha1_block(b"AAAAAAAA"));
        assert_eq!(hashes[1], pgr_tools::checksum::sha1_block(b"BBBBB"));
        std::fs::remove_file(&path).unwrap();
    }
}
