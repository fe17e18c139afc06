//! Bounded traversal of the block-indexed directory tree.
//!
//! This is the only place untrusted, potentially cyclic structure is walked.
//! Two independent defenses are both load-bearing: a recursion depth cap and
//! a visited-block budget. Either one alone terminates an adversarial
//! pointer graph; together they also bound work on pathological fan-out.
//! Exceeding a cap silently stops descent into that branch; it never fails
//! the parse. Any computed offset outside the buffer likewise ends the
//! branch.

use tracing::{debug, trace};

use crate::error::ParseError;
use crate::reader::SliceReader;
use crate::record::{decode_record, RecordStore};
use crate::scan::MIN_ENTRY_STEP;
use crate::types::VolumeGeometry;

pub const MAX_TREE_DEPTH: usize = 10;
pub const MAX_LEAF_ENTRIES: usize = 100;
pub const MAX_CHILD_POINTERS: usize = 50;
pub const MAX_VISITED_BLOCKS: usize = 10_000;
/// Largest credible leaf entry; larger claims are treated as corrupt.
pub const MAX_ENTRY_SIZE: usize = 4096;
/// Cooperative checkpoint cadence, in visited blocks.
pub const YIELD_INTERVAL: usize = 64;

/// Node header: level (0 = leaf), flags, key count, reserved.
const NODE_HEADER_SIZE: usize = 8;

/// Called at cooperative checkpoints with the visited-block count.
/// Returning `false` cancels the walk.
pub type Checkpoint<'h> = &'h mut dyn FnMut(usize) -> bool;

pub struct TreeWalker<'a, 'h> {
    buffer: &'a [u8],
    geometry: &'a VolumeGeometry,
    visited: usize,
    checkpoint: Option<Checkpoint<'h>>,
}

impl<'a, 'h> TreeWalker<'a, 'h> {
    pub fn new(buffer: &'a [u8], geometry: &'a VolumeGeometry) -> Self {
        Self {
            buffer,
            geometry,
            visited: 0,
            checkpoint: None,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: Checkpoint<'h>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Walks from the root directory block, inserting decoded leaf records
    /// into `store`. The only error is cooperative cancellation; structural
    /// corruption is absorbed.
    pub fn walk(mut self, store: &mut RecordStore) -> Result<usize, ParseError> {
        let before = store.len();
        self.visit_block(self.geometry.root_dir_block, 0, store)?;
        let inserted = store.len() - before;
        debug!(
            visited = self.visited,
            inserted, "directory tree walk finished"
        );
        Ok(inserted)
    }

    fn visit_block(
        &mut self,
        block: u64,
        depth: usize,
        store: &mut RecordStore,
    ) -> Result<(), ParseError> {
        if depth > MAX_TREE_DEPTH || self.visited >= MAX_VISITED_BLOCKS {
            trace!(block, depth, "descent stopped at traversal budget");
            return Ok(());
        }
        self.visited += 1;
        if self.visited % YIELD_INTERVAL == 0 {
            if let Some(checkpoint) = self.checkpoint.as_mut() {
                if !checkpoint(self.visited) {
                    return Err(ParseError::Cancelled);
                }
            }
        }

        let Some(offset) = self.geometry.block_offset(block).map(|o| o as usize) else {
            return Ok(());
        };
        if offset >= self.buffer.len() {
            return Ok(());
        }

        let mut r = SliceReader::at(self.buffer, offset);
        let Ok(level) = r.read_u8() else { return Ok(()) };
        let Ok(_flags) = r.read_u8() else { return Ok(()) };
        let Ok(key_count) = r.read_u16() else {
            return Ok(());
        };
        let Ok(_reserved) = r.read_u32() else {
            return Ok(());
        };

        if level == 0 {
            self.visit_leaf(block, offset, key_count as usize, store);
            Ok(())
        } else {
            self.visit_internal(offset, key_count as usize, depth, store)
        }
    }

    fn visit_leaf(&mut self, block: u64, offset: usize, key_count: usize, store: &mut RecordStore) {
        let mut cursor = offset + NODE_HEADER_SIZE;
        for entry_index in 0..key_count.min(MAX_LEAF_ENTRIES) {
            let mut r = SliceReader::at(self.buffer, cursor);
            let Ok(entry_size) = r.read_u32() else { break };
            let entry_size = entry_size as usize;

            if entry_size == 0
                || entry_size > MAX_ENTRY_SIZE
                || cursor + 4 + entry_size > self.buffer.len()
            {
                // Corrupt size field: skip defensively, keep moving.
                cursor += MIN_ENTRY_STEP;
                continue;
            }

            match decode_record(self.buffer, cursor + 4, block, entry_index as u32) {
                Ok(record) => store.insert(record),
                Err(err) => trace!(offset = cursor, %err, "dropped leaf record"),
            }
            cursor += 4 + entry_size;
        }
    }

    fn visit_internal(
        &mut self,
        offset: usize,
        key_count: usize,
        depth: usize,
        store: &mut RecordStore,
    ) -> Result<(), ParseError> {
        // Child pointers sit immediately after the key array.
        let pointer_base = offset + NODE_HEADER_SIZE + key_count * 8;
        let children = (key_count + 1).min(MAX_CHILD_POINTERS);

        for i in 0..children {
            let mut r = SliceReader::at(self.buffer, pointer_base + i * 8);
            let Ok(child) = r.read_u64() else { break };
            if child < self.geometry.total_blocks {
                self.visit_block(child, depth + 1, store)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode_record;
    use crate::superblock::synthesize_geometry;
    use crate::types::{ATTR_DIRECTORY, TICKS_PER_SEC};
    use byteorder::{ByteOrder, LittleEndian};

    const TICKS: u64 = 13_000_000_000 * TICKS_PER_SEC;

    fn geometry(blocks: u64, root: u64) -> VolumeGeometry {
        let mut g = synthesize_geometry(0);
        g.total_blocks = blocks;
        g.root_dir_block = root;
        g.synthesized = false;
        g
    }

    fn write_leaf(buf: &mut [u8], block: u64, records: &[Vec<u8>]) {
        let base = block as usize * 4096;
        buf[base] = 0; // leaf
        LittleEndian::write_u16(&mut buf[base + 2..], records.len() as u16);
        let mut cursor = base + 8;
        for rec in records {
            LittleEndian::write_u32(&mut buf[cursor..], rec.len() as u32);
            buf[cursor + 4..cursor + 4 + rec.len()].copy_from_slice(rec);
            cursor += 4 + rec.len();
        }
    }

    fn write_internal(buf: &mut [u8], block: u64, keys: &[u64], children: &[u64]) {
        let base = block as usize * 4096;
        buf[base] = 1; // internal
        LittleEndian::write_u16(&mut buf[base + 2..], keys.len() as u16);
        let mut cursor = base + 8;
        for key in keys {
            LittleEndian::write_u64(&mut buf[cursor..], *key);
            cursor += 8;
        }
        for child in children {
            LittleEndian::write_u64(&mut buf[cursor..], *child);
            cursor += 8;
        }
    }

    #[test]
    fn walks_internal_to_leaves() {
        let mut buf = vec![0u8; 8 * 4096];
        write_internal(&mut buf, 1, &[100], &[2, 3]);
        write_leaf(
            &mut buf,
            2,
            &[
                encode_record(1, 0, ATTR_DIRECTORY, 0, TICKS, "root"),
                encode_record(2, 1, 0, 64, TICKS, "a.txt"),
            ],
        );
        write_leaf(&mut buf, 3, &[encode_record(3, 1, 0, 96, TICKS, "b.txt")]);

        let mut store = RecordStore::new();
        let g = geometry(8, 1);
        let inserted = TreeWalker::new(&buf, &g).walk(&mut store).unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(store.get(2).unwrap().name, "a.txt");
        assert_eq!(store.get(3).unwrap().name, "b.txt");
    }

    #[test]
    fn cyclic_pointers_terminate_within_depth_cap() {
        let mut buf = vec![0u8; 4 * 4096];
        // 1 -> 2 -> 1 -> ... with a leaf hanging off block 2.
        write_internal(&mut buf, 1, &[5], &[2]);
        write_internal(&mut buf, 2, &[5], &[1, 3]);
        write_leaf(&mut buf, 3, &[encode_record(9, 0, 0, 1, TICKS, "leaf.bin")]);

        let mut store = RecordStore::new();
        let g = geometry(4, 1);
        TreeWalker::new(&buf, &g).walk(&mut store).unwrap();
        // The leaf is reached despite the cycle, and exactly once logically:
        // repeated decodes of the same offset are identical and first-wins.
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(9).unwrap().name, "leaf.bin");
    }

    #[test]
    fn self_pointing_root_terminates() {
        let mut buf = vec![0u8; 2 * 4096];
        write_internal(&mut buf, 1, &[1], &[1, 1]);
        let mut store = RecordStore::new();
        let g = geometry(2, 1);
        assert!(TreeWalker::new(&buf, &g).walk(&mut store).is_ok());
        assert!(store.is_empty());
    }

    #[test]
    fn out_of_buffer_pointer_ends_branch() {
        let mut buf = vec![0u8; 2 * 4096];
        // total_blocks claims 100 but the buffer only holds 2 blocks.
        write_internal(&mut buf, 1, &[7], &[50, 90]);
        let mut store = RecordStore::new();
        let g = geometry(100, 1);
        assert!(TreeWalker::new(&buf, &g).walk(&mut store).is_ok());
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_leaf_entry_sizes_are_skipped() {
        let mut buf = vec![0u8; 2 * 4096];
        let base = 4096;
        buf[base] = 0;
        LittleEndian::write_u16(&mut buf[base + 2..], 3);
        // entry 0: size 0 (invalid), entry 1: huge (invalid); both skipped
        // by the minimum step. A valid record follows at base+8+256.
        let rec = encode_record(4, 0, 0, 8, TICKS, "ok.dat");
        let valid_at = base + 8 + 2 * MIN_ENTRY_STEP;
        LittleEndian::write_u32(&mut buf[base + 8 + MIN_ENTRY_STEP..], 0xFFFF_0000);
        LittleEndian::write_u32(&mut buf[valid_at..], rec.len() as u32);
        buf[valid_at + 4..valid_at + 4 + rec.len()].copy_from_slice(&rec);

        let mut store = RecordStore::new();
        let g = geometry(2, 1);
        TreeWalker::new(&buf, &g).walk(&mut store).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains(4));
    }

    #[test]
    fn checkpoint_false_cancels_walk() {
        // A three-level tree wide enough to cross YIELD_INTERVAL:
        // root -> two internals -> 49 leaves each (101 visited blocks).
        let blocks = 104u64;
        let mut buf = vec![0u8; blocks as usize * 4096];
        write_internal(&mut buf, 1, &[0], &[2, 3]);
        let left: Vec<u64> = (4..53).collect();
        let right: Vec<u64> = (53..102).collect();
        write_internal(&mut buf, 2, &vec![0u64; left.len() - 1], &left);
        write_internal(&mut buf, 3, &vec![0u64; right.len() - 1], &right);
        for b in 4..102 {
            write_leaf(&mut buf, b, &[encode_record(b as u32, 0, 0, 1, TICKS, "x")]);
        }

        let mut store = RecordStore::new();
        let g = geometry(blocks, 1);
        let mut cancel = |_visited: usize| false;
        let result = TreeWalker::new(&buf, &g)
            .with_checkpoint(&mut cancel)
            .walk(&mut store);
        assert!(matches!(result, Err(ParseError::Cancelled)));
    }

    #[test]
    fn checkpoint_does_not_change_results() {
        let mut buf = vec![0u8; 8 * 4096];
        write_internal(&mut buf, 1, &[9], &[2, 3]);
        write_leaf(&mut buf, 2, &[encode_record(1, 0, 0, 4, TICKS, "p")]);
        write_leaf(&mut buf, 3, &[encode_record(2, 0, 0, 4, TICKS, "q")]);
        let g = geometry(8, 1);

        let mut plain = RecordStore::new();
        TreeWalker::new(&buf, &g).walk(&mut plain).unwrap();

        let mut with_yield = RecordStore::new();
        let mut seen = 0usize;
        let mut hook = |visited: usize| {
            seen = visited;
            true
        };
        TreeWalker::new(&buf, &g)
            .with_checkpoint(&mut hook)
            .walk(&mut with_yield)
            .unwrap();

        let a: Vec<_> = plain.iter().map(|r| r.id).collect();
        let b: Vec<_> = with_yield.iter().map(|r| r.id).collect();
        assert_eq!(a, b);
    }
}
