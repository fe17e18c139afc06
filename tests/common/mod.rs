//! Shared builders for crafting synthetic image buffers.
#![allow(dead_code)]

use byteorder::{ByteOrder, LittleEndian};

/// Routes engine logs through the test harness; safe to call repeatedly.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub const BLOCK_SIZE: usize = 4096;
pub const ENTRY_TYPE_FILE_RECORD: u32 = 0x30;

/// Ticks for 2021-01-01T00:00:00Z.
pub const TICKS_2021: u64 = (11_644_473_600 + 1_609_459_200) * 10_000_000;

/// Encodes one fixed-layout file record.
pub fn encode_record(
    id: u32,
    parent: u32,
    attributes: u32,
    size: u64,
    ticks: u64,
    name: &str,
) -> Vec<u8> {
    let mut out = Vec::new();
    let mut scratch = [0u8; 8];

    LittleEndian::write_u32(&mut scratch[..4], id);
    out.extend_from_slice(&scratch[..4]);
    LittleEndian::write_u32(&mut scratch[..4], parent);
    out.extend_from_slice(&scratch[..4]);
    LittleEndian::write_u32(&mut scratch[..4], attributes);
    out.extend_from_slice(&scratch[..4]);
    LittleEndian::write_u64(&mut scratch, size);
    out.extend_from_slice(&scratch);
    for _ in 0..3 {
        LittleEndian::write_u64(&mut scratch, ticks);
        out.extend_from_slice(&scratch);
    }
    let units: Vec<u16> = name.encode_utf16().collect();
    LittleEndian::write_u16(&mut scratch[..2], units.len() as u16);
    out.extend_from_slice(&scratch[..2]);
    for unit in units {
        LittleEndian::write_u16(&mut scratch[..2], unit);
        out.extend_from_slice(&scratch[..2]);
    }
    out
}

/// Writes a valid volume header at offset 0 (512 bytes/sector, 8
/// sectors/block).
pub fn write_header(buf: &mut [u8], total_blocks: u64, root_block: u64, meta_block: u64) {
    buf[0..4].copy_from_slice(b"ReFS");
    LittleEndian::write_u16(&mut buf[0x08..], 1);
    LittleEndian::write_u16(&mut buf[0x0A..], 0);
    LittleEndian::write_u32(&mut buf[0x0C..], 512);
    LittleEndian::write_u32(&mut buf[0x10..], 8);
    LittleEndian::write_u64(&mut buf[0x14..], total_blocks);
    LittleEndian::write_u64(&mut buf[0x1C..], root_block);
    LittleEndian::write_u64(&mut buf[0x24..], meta_block);
    LittleEndian::write_u64(&mut buf[0x2C..], 1);
    LittleEndian::write_u128(&mut buf[0x34..], 0x1234_5678_9ABC_DEF0);
    LittleEndian::write_u64(&mut buf[0x44..], TICKS_2021);
    LittleEndian::write_u64(&mut buf[0x4C..], TICKS_2021);
    let crc = crc32fast::hash(&buf[0..0x54]);
    LittleEndian::write_u32(&mut buf[0x54..], crc);
}

/// Writes a leaf node (level 0) holding the given records.
pub fn write_leaf(buf: &mut [u8], block: u64, records: &[Vec<u8>]) {
    let base = block as usize * BLOCK_SIZE;
    buf[base] = 0;
    LittleEndian::write_u16(&mut buf[base + 2..], records.len() as u16);
    let mut cursor = base + 8;
    for rec in records {
        LittleEndian::write_u32(&mut buf[cursor..], rec.len() as u32);
        buf[cursor + 4..cursor + 4 + rec.len()].copy_from_slice(rec);
        cursor += 4 + rec.len();
    }
}

/// Writes an internal node (level 1) with child block pointers after the
/// key array.
pub fn write_internal(buf: &mut [u8], block: u64, keys: &[u64], children: &[u64]) {
    let base = block as usize * BLOCK_SIZE;
    buf[base] = 1;
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

/// Writes one metadata-table entry at `at`.
pub fn write_meta_entry(buf: &mut [u8], at: usize, entry_type: u32, payload: &[u8]) {
    LittleEndian::write_u32(&mut buf[at..], entry_type);
    LittleEndian::write_u32(&mut buf[at + 4..], payload.len() as u32);
    buf[at + 8..at + 8 + payload.len()].copy_from_slice(payload);
}
