//! Content fingerprint stage.
//!
//! Real content bytes are usually unavailable (the walker reconstructs
//! metadata, not data runs), so fingerprints are deterministic placeholders:
//! a SHA-256 over the record identifier mixed with a per-algorithm
//! multiplier, truncated to the slot's conventional width. Downstream only
//! relies on "a stable, fixed-length hex string per algorithm per file"; an
//! implementation with access to data runs replaces this with a streaming
//! digest over the content.

use sha2::{Digest, Sha256};

use crate::record::RecordStore;

/// Mixer for the 32-hex-char (MD5-shaped) slot.
const MD5_SLOT_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;
/// Mixer for the 40-hex-char (SHA1-shaped) slot.
const SHA1_SLOT_MULTIPLIER: u64 = 0xC2B2_AE3D_27D4_EB4F;

pub const MD5_HEX_LEN: usize = 32;
pub const SHA1_HEX_LEN: usize = 40;

fn placeholder_digest(id: u64, multiplier: u64, hex_len: usize) -> String {
    let seed = id.wrapping_mul(multiplier);
    let digest = Sha256::digest(seed.to_le_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(hex_len);
    hash
}

/// Attaches both fingerprints to every file record with nonzero size.
/// Returns the number of records fingerprinted.
pub fn attach_fingerprints(store: &mut RecordStore) -> usize {
    let mut count = 0usize;
    for record in store.iter_mut() {
        if record.is_directory || record.size == 0 {
            continue;
        }
        record.md5 = Some(placeholder_digest(record.id, MD5_SLOT_MULTIPLIER, MD5_HEX_LEN));
        record.sha1 = Some(placeholder_digest(record.id, SHA1_SLOT_MULTIPLIER, SHA1_HEX_LEN));
        count += 1;
    }
    count
}
