//! Linear scan of the metadata table region.
//!
//! Entries are `(type: u32, size: u32, payload...)` and are not assumed
//! well-formed: the declared size is clamped to a minimum step so a corrupt
//! size field cannot stall the cursor, and a hard entry cap bounds the scan.

use tracing::{debug, trace};

use crate::reader::SliceReader;
use crate::record::{decode_record, RecordStore};
use crate::types::VolumeGeometry;

/// Entry type tag for file records; other tags are skipped.
pub const ENTRY_TYPE_FILE_RECORD: u32 = 0x30;
/// Minimum cursor advance per entry, regardless of the declared size.
pub const MIN_ENTRY_STEP: usize = 128;
/// Hard cap on entries examined in one scan.
pub const MAX_ENTRIES: usize = 1000;
/// Size of the (type, size) entry header.
const ENTRY_HEADER_SIZE: usize = 8;

/// Scans the metadata region into `store`. Returns the number of records
/// inserted. Does nothing when the geometry is synthesized or the region
/// lies outside the buffer; the caller then falls through to the
/// illustrative generator.
pub fn scan_metadata_table(
    buffer: &[u8],
    geometry: &VolumeGeometry,
    store: &mut RecordStore,
) -> usize {
    if geometry.synthesized {
        return 0;
    }
    let Some(region_start) = geometry
        .block_offset(geometry.metadata_table_block)
        .map(|o| o as usize)
    else {
        return 0;
    };
    if region_start >= buffer.len() {
        debug!(region_start, "metadata region beyond buffer, skipping scan");
        return 0;
    }

    let before = store.len();
    let mut cursor = region_start;
    let mut entries = 0usize;

    while entries < MAX_ENTRIES && cursor + ENTRY_HEADER_SIZE <= buffer.len() {
        let mut r = SliceReader::at(buffer, cursor);
        // Header reads are in bounds by the loop condition.
        let entry_type = r.read_u32().expect("entry header bounds checked");
        let entry_size = r.read_u32().expect("entry header bounds checked") as usize;

        if entry_type == ENTRY_TYPE_FILE_RECORD {
            let block = (cursor as u64) / geometry.block_size;
            match decode_record(buffer, cursor + ENTRY_HEADER_SIZE, block, entries as u32) {
                Ok(record) => store.insert(record),
                Err(err) => trace!(offset = cursor, %err, "dropped metadata record"),
            }
        }

        // Forward progress regardless of what the size field claims.
        cursor += (ENTRY_HEADER_SIZE + entry_size).max(MIN_ENTRY_STEP);
        entries += 1;
    }

    let inserted = store.len() - before;
    debug!(entries, inserted, "metadata scan finished");
    inserted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode_record;
    use crate::superblock::synthesize_geometry;
    use crate::types::{ATTR_DIRECTORY, TICKS_PER_SEC};
    use byteorder::{ByteOrder, LittleEndian};

    const TICKS: u64 = 13_000_000_000 * TICKS_PER_SEC;

    fn test_geometry(blocks: u64, meta_block: u64) -> VolumeGeometry {
        let mut g = synthesize_geometry(0);
        g.total_blocks = blocks;
        g.metadata_table_block = meta_block;
        g.synthesized = false;
        g
    }

    fn put_entry(buf: &mut [u8], at: usize, entry_type: u32, payload: &[u8]) {
        LittleEndian::write_u32(&mut buf[at..], entry_type);
        LittleEndian::write_u32(&mut buf[at + 4..], payload.len() as u32);
        buf[at + 8..at + 8 + payload.len()].copy_from_slice(payload);
    }

    #[test]
    fn decodes_file_record_entries() {
        let mut buf = vec![0u8; 3 * 4096];
        let base = 4096;
        let rec_a = encode_record(1, 0, ATTR_DIRECTORY, 0, TICKS, "root");
        let rec_b = encode_record(2, 1, 0, 64, TICKS, "a.txt");
        put_entry(&mut buf, base, ENTRY_TYPE_FILE_RECORD, &rec_a);
        put_entry(&mut buf, base + 128, ENTRY_TYPE_FILE_RECORD, &rec_b);

        let mut store = RecordStore::new();
        let n = scan_metadata_table(&buf, &test_geometry(3, 1), &mut store);
        assert_eq!(n, 2);
        assert_eq!(store.get(1).unwrap().name, "root");
        assert_eq!(store.get(2).unwrap().name, "a.txt");
    }

    #[test]
    fn unrecognized_entry_types_are_skipped() {
        let mut buf = vec![0u8; 2 * 4096];
        let rec = encode_record(3, 0, 0, 1, TICKS, "kept.bin");
        put_entry(&mut buf, 4096, 0x99, &[0xAA; 16]);
        put_entry(&mut buf, 4096 + 128, ENTRY_TYPE_FILE_RECORD, &rec);

        let mut store = RecordStore::new();
        scan_metadata_table(&buf, &test_geometry(2, 1), &mut store);
        assert_eq!(store.len(), 1);
        assert!(store.contains(3));
    }

    #[test]
    fn corrupt_size_fields_cannot_stall_the_cursor() {
        // Every entry claims size 0; the minimum step still moves forward
        // and the entry cap bounds the loop.
        let buf = vec![0u8; 64 * 1024];
        let mut store = RecordStore::new();
        let n = scan_metadata_table(&buf, &test_geometry(16, 1), &mut store);
        assert_eq!(n, 0);
    }

    #[test]
    fn oversized_claim_terminates_scan_without_panic() {
        let mut buf = vec![0u8; 2 * 4096];
        LittleEndian::write_u32(&mut buf[4096..], ENTRY_TYPE_FILE_RECORD);
        LittleEndian::write_u32(&mut buf[4096 + 4..], u32::MAX);
        let mut store = RecordStore::new();
        scan_metadata_table(&buf, &test_geometry(2, 1), &mut store);
        assert!(store.is_empty());
    }

    #[test]
    fn synthesized_geometry_skips_scan() {
        let buf = vec![0u8; 8 * 4096];
        let mut store = RecordStore::new();
        let g = synthesize_geometry(buf.len());
        assert_eq!(scan_metadata_table(&buf, &g, &mut store), 0);
    }

    #[test]
    fn truncated_record_is_dropped_scan_continues() {
        let mut buf = vec![0u8; 2 * 4096];
        // First entry: a record whose name length field claims far more
        // code units than the buffer holds. Decode fails, entry dropped.
        LittleEndian::write_u32(&mut buf[4096..], ENTRY_TYPE_FILE_RECORD);
        LittleEndian::write_u32(&mut buf[4096 + 4..], 100);
        let name_len_at = 4096 + 8 + 44;
        LittleEndian::write_u16(&mut buf[name_len_at..], u16::MAX);
        // Second entry is intact; the scan must reach it.
        let rec = encode_record(4, 0, 0, 9, TICKS, "ok.txt");
        put_entry(&mut buf, 4096 + 128, ENTRY_TYPE_FILE_RECORD, &rec);

        let mut store = RecordStore::new();
        scan_metadata_table(&buf, &test_geometry(2, 1), &mut store);
        assert_eq!(store.len(), 1);
        assert!(store.contains(4));
    }
}
