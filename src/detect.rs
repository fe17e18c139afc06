//! Best-guess format probe for unrecognized inputs.
//!
//! When the volume header does not validate, a multi-pattern scan over the
//! head of the buffer looks for magics of common on-disk formats. The result
//! only feeds the stage label and log line accompanying geometry synthesis;
//! it never changes how the image is parsed.

use aho_corasick::AhoCorasick;
use std::sync::LazyLock;

/// How far into the buffer the probe looks.
const PROBE_WINDOW: usize = 64 * 1024;

const PATTERNS: [&[u8]; 4] = [
    b"NTFS    ",   // NTFS boot sector OEM id
    b"ReFS",       // ReFS volume signature
    b"_BHRfS_M",   // btrfs superblock magic
    b"\x53\xEF",   // ext2/3/4 superblock magic (little-endian 0xEF53)
];

const LABELS: [&str; 4] = ["ntfs", "refs", "btrfs", "ext4"];

static PROBE: LazyLock<AhoCorasick> =
    LazyLock::new(|| AhoCorasick::new(PATTERNS).expect("static patterns are valid"));

/// Returns a label for the first known magic found in the buffer head.
pub fn probe_format(buffer: &[u8]) -> Option<&'static str> {
    let window = &buffer[..buffer.len().min(PROBE_WINDOW)];
    PROBE
        .find(window)
        .map(|m| LABELS[m.pattern().as_usize()])
}
