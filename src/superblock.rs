//! Volume header location and validation.
//!
//! The header lives at a fixed offset; an unreadable or unrecognized header
//! is not a failure. The locator degrades to a synthesized geometry so the
//! rest of the pipeline always has a volume layout to work against, and the
//! degradation is surfaced through the stage label and log.

use chrono::{TimeZone, Utc};
use tracing::{debug, warn};

use crate::detect::probe_format;
use crate::reader::SliceReader;
use crate::types::VolumeGeometry;

/// Expected head of the 8-byte signature field.
pub const VOLUME_SIGNATURE: &[u8; 4] = b"ReFS";
/// Absolute offset of the volume header.
pub const VOLUME_HEADER_OFFSET: usize = 0;
/// Bytes reserved for the header.
pub const VOLUME_HEADER_SIZE: usize = 512;
/// Extent of the header covered by the advisory CRC.
const CRC_COVERED_BYTES: usize = 0x54;

/// Block size used when the geometry is synthesized.
pub const SYNTHETIC_BLOCK_SIZE: u64 = 4096;
/// Floor on the synthesized block count.
pub const SYNTHETIC_MIN_BLOCKS: u64 = 1000;
pub const SYNTHETIC_CHECKPOINT_BLOCK: u64 = 8;
pub const SYNTHETIC_METADATA_BLOCK: u64 = 16;
pub const SYNTHETIC_ROOT_BLOCK: u64 = 32;
/// Placeholder volume id for synthesized geometries.
pub const SYNTHETIC_VOLUME_ID: u128 = 0x5354_5241_5441_0000_0000_0000_0000_0001;

/// Outcome of locating the volume header.
pub struct LocateOutcome {
    pub geometry: VolumeGeometry,
    /// Best-guess format label when the header was not recognized.
    pub detected_hint: Option<&'static str>,
}

/// Reads the geometry header, or synthesizes one when the buffer is too
/// short, the signature does not match, or the header violates its own
/// invariants. The caller must have rejected empty input already.
pub fn locate_geometry(buffer: &[u8]) -> LocateOutcome {
    debug_assert!(!buffer.is_empty());

    match read_header(buffer) {
        Some(geometry) => {
            debug!(
                total_blocks = geometry.total_blocks,
                block_size = geometry.block_size,
                "volume header validated"
            );
            LocateOutcome {
                geometry,
                detected_hint: None,
            }
        }
        None => {
            let hint = probe_format(buffer);
            match hint {
                Some(label) => debug!(resembles = label, "volume header not recognized"),
                None => debug!("volume header not recognized"),
            }
            LocateOutcome {
                geometry: synthesize_geometry(buffer.len()),
                detected_hint: hint,
            }
        }
    }
}

fn read_header(buffer: &[u8]) -> Option<VolumeGeometry> {
    if buffer.len() < VOLUME_HEADER_OFFSET + VOLUME_HEADER_SIZE {
        return None;
    }

    let mut r = SliceReader::at(buffer, VOLUME_HEADER_OFFSET);
    let signature: [u8; 8] = r.read_array().ok()?;
    if &signature[..4] != VOLUME_SIGNATURE {
        return None;
    }

    let version_major = r.read_u16().ok()?;
    let version_minor = r.read_u16().ok()?;
    let bytes_per_sector = r.read_u32().ok()?;
    let sectors_per_block = r.read_u32().ok()?;
    let total_blocks = r.read_u64().ok()?;
    let root_dir_block = r.read_u64().ok()?;
    let metadata_table_block = r.read_u64().ok()?;
    let checkpoint_block = r.read_u64().ok()?;
    let volume_id = r.read_u128().ok()?;
    let created = r.read_filetime().ok()?;
    let mounted = r.read_filetime().ok()?;
    let header_crc = r.read_u32().ok()?;

    let block_size = bytes_per_sector as u64 * sectors_per_block as u64;
    let geometry = VolumeGeometry {
        signature,
        version_major,
        version_minor,
        bytes_per_sector,
        sectors_per_block,
        block_size,
        total_blocks,
        root_dir_block,
        metadata_table_block,
        checkpoint_block,
        volume_id,
        created,
        mounted,
        synthesized: false,
    };

    if !geometry.is_valid() {
        return None;
    }

    // Advisory only: a stale CRC is worth a warning, not a rejection.
    let computed = crc32fast::hash(&buffer[VOLUME_HEADER_OFFSET..VOLUME_HEADER_OFFSET + CRC_COVERED_BYTES]);
    if header_crc != 0 && header_crc != computed {
        warn!(
            stored = header_crc,
            computed, "volume header checksum mismatch"
        );
    }

    Some(geometry)
}

/// Fixed stand-in geometry for non-conforming input. Deterministic apart
/// from the mount time, which is the moment of the parse.
pub fn synthesize_geometry(buffer_len: usize) -> VolumeGeometry {
    let total_blocks = (buffer_len as u64 / SYNTHETIC_BLOCK_SIZE).max(SYNTHETIC_MIN_BLOCKS);
    VolumeGeometry {
        signature: [0; 8],
        version_major: 1,
        version_minor: 0,
        bytes_per_sector: 512,
        sectors_per_block: (SYNTHETIC_BLOCK_SIZE / 512) as u32,
        block_size: SYNTHETIC_BLOCK_SIZE,
        total_blocks,
        root_dir_block: SYNTHETIC_ROOT_BLOCK,
        metadata_table_block: SYNTHETIC_METADATA_BLOCK,
        checkpoint_block: SYNTHETIC_CHECKPOINT_BLOCK,
        volume_id: SYNTHETIC_VOLUME_ID,
        created: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        mounted: Utc::now(),
        synthesized: true,
    }
}

#[cfg(test)]
pub(crate) fn write_test_header(buffer: &mut [u8], total_blocks: u64, root: u64, meta: u64) {
    use byteorder::{ByteOrder, LittleEndian};

    buffer[0..4].copy_from_slice(VOLUME_SIGNATURE);
    LittleEndian::write_u16(&mut buffer[0x08..], 1); // version major
    LittleEndian::write_u16(&mut buffer[0x0A..], 2); // version minor
    LittleEndian::write_u32(&mut buffer[0x0C..], 512); // bytes/sector
    LittleEndian::write_u32(&mut buffer[0x10..], 8); // sectors/block -> 4096
    LittleEndian::write_u64(&mut buffer[0x14..], total_blocks);
    LittleEndian::write_u64(&mut buffer[0x1C..], root);
    LittleEndian::write_u64(&mut buffer[0x24..], meta);
    LittleEndian::write_u64(&mut buffer[0x2C..], 1);
    LittleEndian::write_u128(&mut buffer[0x34..], 0xDEAD_BEEF);
    LittleEndian::write_u64(&mut buffer[0x44..], 132_223_104_000_000_000); // 2020-01-01
    LittleEndian::write_u64(&mut buffer[0x4C..], 132_223_104_000_000_000);
    let crc = crc32fast::hash(&buffer[0..0x54]);
    LittleEndian::write_u32(&mut buffer[0x54..], crc);
}
