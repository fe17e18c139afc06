//! Fixed-layout file record decoding and the identifier-keyed store.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::DecodeResult;
use crate::reader::SliceReader;
use crate::types::{FileRecord, ATTR_DELETED, ATTR_DIRECTORY};

/// Fixed portion of a record before the variable-length name:
/// id u32, parent u32, attributes u32, size u64, three FILETIME u64,
/// name length u16.
pub const RECORD_FIXED_SIZE: usize = 4 + 4 + 4 + 8 + 8 * 3 + 2;

/// Decodes one file record at `offset`.
///
/// Pure function of (buffer, offset): decoding the same offset twice yields
/// identical records. A name length that would read past the buffer fails
/// with `OutOfBounds`; the caller drops the record and continues.
pub fn decode_record(
    buffer: &[u8],
    offset: usize,
    source_block: u64,
    entry_index: u32,
) -> DecodeResult<FileRecord> {
    let mut r = SliceReader::at(buffer, offset);

    let id = r.read_u32()? as u64;
    let parent_id = r.read_u32()? as u64;
    let attributes = r.read_u32()?;
    let size = r.read_u64()?;
    let created = r.read_filetime()?;
    let modified = r.read_filetime()?;
    let accessed = r.read_filetime()?;
    let name = r.read_utf16_prefixed()?;

    Ok(FileRecord {
        id,
        parent_id,
        name,
        size,
        attributes,
        is_directory: attributes & ATTR_DIRECTORY != 0,
        is_deleted: attributes & ATTR_DELETED != 0,
        created,
        modified,
        accessed,
        md5: None,
        sha1: None,
        source_block,
        entry_index,
    })
}

/// Owns every record produced by the scan and traversal phases, keyed by
/// identifier. Iteration order is ascending by id, which keeps everything
/// downstream deterministic regardless of arrival order.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: BTreeMap<u64, FileRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record unless the id is already present. First decode wins,
    /// so re-visiting a block (bounded by the walker's caps) cannot corrupt
    /// the store.
    pub fn insert(&mut self, record: FileRecord) {
        match self.records.entry(record.id) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
            }
            std::collections::btree_map::Entry::Occupied(_) => {
                trace!(id = record.id, "duplicate record id ignored");
            }
        }
    }

    pub fn get(&self, id: u64) -> Option<&FileRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileRecord> {
        self.records.values_mut()
    }
}

#[cfg(test)]
pub(crate) fn encode_record(
    id: u32,
    parent: u32,
    attributes: u32,
    size: u64,
    ticks: u64,
    name: &str,
) -> Vec<u8> {
    use byteorder::{LittleEndian, WriteBytesExt};

    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(id).unwrap();
    out.write_u32::<LittleEndian>(parent).unwrap();
    out.write_u32::<LittleEndian>(attributes).unwrap();
    out.write_u64::<LittleEndian>(size).unwrap();
    for _ in 0..3 {
        out.write_u64::<LittleEndian>(ticks).unwrap();
    }
    let units: Vec<u16> = name.encode_utf16().collect();
    out.write_u16::<LittleEndian>(units.len() as u16).unwrap();
    for unit in units {
        out.write_u16::<LittleEndian>(unit).unwrap();
    }
    out
}
