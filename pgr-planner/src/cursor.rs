//! Drives a `Plan` through a repository, emitting `Write`s (§4.A's `Next()`
//! contract) as a plain `Iterator` rather than a coroutine, per the design's
//! redesign note against hidden suspended-stack state.

use anyhow::{Context, Error};

use pgr_api_types::error::RestoreErrorKind;
use pgr_repository::cipher::CipherFilter;
use pgr_repository::compression::Decompressor;
use pgr_repository::Repository;
use pgr_tools::checksum::sha1_block;

use crate::plan::Plan;

/// One contiguous range to apply to the target file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Write {
    pub offset: u64,
    pub buffer: Vec<u8>,
}

/// Iterates a plan's reads in order, decoding each super-block exactly once
/// and yielding one `Write` per block it contains.
pub struct PlanCursor<'a> {
    repo: &'a dyn Repository,
    cipher: &'a dyn CipherFilter,
    compressor: &'a dyn Decompressor,
    block_size: u32,
    reads: std::vec::IntoIter<crate::plan::Read>,
    current: Option<(crate::plan::Read, Vec<u8>, usize)>,
}

impl<'a> PlanCursor<'a> {
    pub fn new(
        plan: Plan,
        block_size: u32,
        repo: &'a dyn Repository,
        cipher: &'a dyn CipherFilter,
        compressor: &'a dyn Decompressor,
    ) -> Self {
        Self {
            repo,
            cipher,
            compressor,
            block_size,
            reads: plan.reads.into_iter(),
            current: None,
        }
    }

    fn load_next_read(&mut self) -> Result<bool, Error> {
        let Some(read) = self.reads.next() else {
            return Ok(false);
        };

        let path = format!("backups/{}/bundle.{}", read.reference, read.bundle_id);
        let raw = self
            .repo
            .read(&path, Some(read.offset), Some(read.size as u64))
            .with_context(|| format!("failed to read super-block at {path}:{}", read.offset))?;

        let decrypted = self
            .cipher
            .decrypt(&raw)
            .context("super-block decryption failed")?;
        let decoded = self
            .compressor
            .decompress(&decrypted)
            .context("super-block decompression failed")?;

        self.current = Some((read, decoded, 0));
        Ok(true)
    }
}

impl<'a> Iterator for PlanCursor<'a> {
    type Item = Result<Write, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                match self.load_next_read() {
                    Ok(true) => {}
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                }
            }

            let (read, decoded, cursor) = self.current.as_mut().unwrap();
            if *cursor >= read.blocks.len() {
                self.current = None;
                continue;
            }

            let block = read.blocks[*cursor];
            *cursor += 1;

            let start = block.offset_in_superblock as usize;
            let want = self.block_size as usize;
            let end = (start + want).min(decoded.len());
            if start > decoded.len() {
                return Some(Err(anyhow::anyhow!(
                    "decoded super-block too short for block {}",
                    block.block_no
                )));
            }
            let buffer = decoded[start..end].to_vec();
            if buffer.is_empty() {
                return Some(Err(anyhow::anyhow!(
                    "decoded super-block yielded no bytes for block {}",
                    block.block_no
                )));
            }

            if sha1_block(&buffer) != block.checksum {
                return Some(Err(RestoreErrorKind::Format(format!(
                    "decoded block {} fails its recorded checksum",
                    block.block_no
                ))
                .into()));
            }

            return Some(Ok(Write {
                offset: block.block_no as u64 * self.block_size as u64,
                buffer,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgr_api_types::BlockRef;
    use pgr_repository::cipher::new_cipher;
    use pgr_repository::compression::new_decompressor;
    use pgr_repository::LocalRepository;
    use std::path::PathBuf;

    fn tmp_repo(name: &str) -> (LocalRepository, PathBuf) {
        let mut dir = std::env::temp_dir();
        dir.push(format!("pgr-planner-test-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("backups/1")).unwrap();
        let repo = LocalRepository::new(dir.clone());
        (repo, dir)
    }

    #[test]
    fn cursor_emits_writes_for_each_block_in_order() {
        let (repo, dir) = tmp_repo("cursor");
        // Two 8-byte blocks concatenated as one "decoded" super-block, stored
        // uncompressed/unencrypted so the plumbing can be exercised directly.
        let payload = b"AAAAAAAABBBBBBBB".to_vec();
        std::fs::write(dir.join("backups/1/bundle.7"), &payload).unwrap();

        let map = vec![
            BlockRef {
                reference: 1,
                bundle_id: 7,
                offset: 0,
                size: payload.len() as u32,
                block_no: 0,
                checksum: sha1_block(b"AAAAAAAA"),
            },
            BlockRef {
                reference: 1,
                bundle_id: 7,
                offset: 0,
                size: payload.len() as u32,
                block_no: 1,
                checksum: sha1_block(b"BBBBBBBB"),
            },
        ];
        let mut plan = crate::plan::build_plan(&map, None);
        crate::plan::apply_block_size(&mut plan, 8);

        let cipher = new_cipher(pgr_api_types::CipherKind::None, None).unwrap();
        let compressor = new_decompressor(pgr_api_types::CompressionKind::None);

        let writes: Vec<Write> = PlanCursor::new(plan, 8, &repo, cipher.as_ref(), compressor.as_ref())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], Write { offset: 0, buffer: b"AAAAAAAA".to_vec() });
        assert_eq!(writes[1], Write { offset: 8, buffer: b"BBBBBBBB".to_vec() });

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn mismatched_block_checksum_is_fatal() {
        let (repo, dir) = tmp_repo("bad-checksum");
        let payload = b"AAAAAAAA".to_vec();
        std::fs::write(dir.join("backups/1/bundle.7"), &payload).unwrap();

        let map = vec![BlockRef {
            reference: 1,
            bundle_id: 7,
            offset: 0,
            size: payload.len() as u32,
            block_no: 0,
            checksum: [0xffu8; 20],
        }];
        let mut plan = crate::plan::build_plan(&map, None);
        crate::plan::apply_block_size(&mut plan, 8);

        let cipher = new_cipher(pgr_api_types::CipherKind::None, None).unwrap();
        let compressor = new_decompressor(pgr_api_types::CompressionKind::None);
        let err = PlanCursor::new(plan, 8, &repo, cipher.as_ref(), compressor.as_ref())
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        assert!(err.to_string().contains("checksum"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_plan_yields_no_writes() {
        let (repo, dir) = tmp_repo("empty");
        let plan = crate::plan::Plan::default();
        let cipher = new_cipher(pgr_api_types::CipherKind::None, None).unwrap();
        let compressor = new_decompressor(pgr_api_types::CompressionKind::None);
        let writes: Vec<_> = PlanCursor::new(plan, 8, &repo, cipher.as_ref(), compressor.as_ref()).collect();
        assert!(writes.is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
