//! The planning algorithm itself (§4.A, steps 1-4): pure, deterministic, and
//! IO-free so it can be tested without a repository.
//!
//! Grounded on `pbs-client::merge_known_chunks::MergeKnownChunksQueue`'s
//! "known vs. new" partitioning of a chunk stream, adapted from an async
//! `Stream` combinator to a plain `Vec`-builder since the planner here always
//! has the whole block map in hand up front.

use pgr_api_types::BlockRef;

/// One output block to carve out of a decoded super-block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockOut {
    pub block_no: u32,
    /// Byte offset of this block inside the decoded super-block. Blocks are
    /// laid out back-to-back in `blockNo` order starting at the first
    /// `blockNo` the super-block covers.
    pub offset_in_superblock: u64,
    /// Recorded fingerprint of the decoded block (§4.A: a mismatch here is a
    /// fatal `Format` error, the same as a whole-file checksum mismatch).
    pub checksum: [u8; 20],
}

/// One repository object fetch: the bytes covering a single super-block, plus
/// the blocks to extract from it once decrypted and decompressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Read {
    pub reference: u32,
    pub bundle_id: u64,
    pub offset: u64,
    pub size: u32,
    pub blocks: Vec<BlockOut>,
}

/// A restore plan for one file: the reads to perform, in the order they were
/// first referenced by the block map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub reads: Vec<Read>,
}

/// Build a plan from a file's block map and an optional delta hash list.
///
/// `block_hash[i]` is the current on-disk fingerprint of block `i`
/// (`None` when the file doesn't exist locally, or delta restore is off); a
/// match against `block_map[i].checksum` marks the block local-satisfied and
/// it contributes no Read.
pub fn build_plan(block_map: &[BlockRef], block_hash: Option<&[[u8; 20]]>) -> Plan {
    let mut reads: Vec<Read> = Vec::new();
    use std::collections::HashMap;
    let mut index: HashMap<(u32, u64, u64), usize> = HashMap::new();

    for (i, block) in block_map.iter().enumerate() {
        if let Some(hashes) = block_hash {
            if let Some(local) = hashes.get(i) {
                if *local == block.checksum {
                    continue;
                }
            }
        }

        let key = (block.reference, block.bundle_id, block.offset);
        let read_idx = *index.entry(key).or_insert_with(|| {
            reads.push(Read {
                reference: block.reference,
                bundle_id: block.bundle_id,
                offset: block.offset,
                size: block.size,
                blocks: Vec::new(),
            });
            reads.len() - 1
        });

        let read = &mut reads[read_idx];
        // Coalesce duplicate (reference, bundle_id, offset, block_no) entries:
        // one decode, but writes are still emitted once per distinct block_no.
        if !read.blocks.iter().any(|b| b.block_no == block.block_no) {
            read.blocks.push(BlockOut {
                block_no: block.block_no,
                offset_in_superblock: 0, // set by apply_block_size
                checksum: block.checksum,
            });
        }
    }

    // §4.A: within a read, blocks are ordered by original block_no.
    for read in &mut reads {
        read.blocks.sort_by_key(|b| b.block_no);
    }

    Plan { reads }
}

/// Recompute `offset_in_superblock` for every block in every read once
/// `block_size` is known (the pure planner above is block-size agnostic so
/// it can be unit-tested with arbitrary checksums).
pub fn apply_block_size(plan: &mut Plan, block_size: u32) {
    for read in &mut plan.reads {
        let base = read.blocks.iter().map(|b| b.block_no).min().unwrap_or(0);
        for block in &mut read.blocks {
            block.offset_in_superblock = (block.block_no - base) as u64 * block_size as u64;
        }
    }
}
