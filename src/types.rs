use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Directory flag in the on-disk attribute bitmask.
pub const ATTR_DIRECTORY: u32 = 0x10;
/// Deleted flag: the sign bit of the 32-bit attribute field. Independent of
/// the directory bit; a deleted directory carries both.
pub const ATTR_DELETED: u32 = 0x8000_0000;

/// Seconds between the FILETIME epoch (1601-01-01) and the Unix epoch.
pub const FILETIME_EPOCH_DELTA_SECS: i64 = 11_644_473_600;
/// FILETIME ticks per second (100 ns resolution).
pub const TICKS_PER_SEC: u64 = 10_000_000;

/// Converts a FILETIME tick count to calendar time.
///
/// Out-of-range tick values clamp to the FILETIME epoch rather than panic;
/// corrupt timestamps are a fact of life in carved metadata.
pub fn filetime_to_datetime(ticks: u64) -> DateTime<Utc> {
    let secs = (ticks / TICKS_PER_SEC) as i64 - FILETIME_EPOCH_DELTA_SECS;
    let nanos = (ticks % TICKS_PER_SEC) * 100;
    match Utc.timestamp_opt(secs, nanos as u32) {
        chrono::LocalResult::Single(dt) => dt,
        _ => filetime_epoch(),
    }
}

/// 1601-01-01T00:00:00Z, the zero point of on-disk timestamps.
pub fn filetime_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(-FILETIME_EPOCH_DELTA_SECS, 0).unwrap()
}

/// Volume layout as read from the header block, or synthesized when the
/// header is absent or unrecognized. Created once per parse; immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct VolumeGeometry {
    pub signature: [u8; 8],
    pub version_major: u16,
    pub version_minor: u16,
    pub bytes_per_sector: u32,
    pub sectors_per_block: u32,
    pub block_size: u64,
    pub total_blocks: u64,
    pub root_dir_block: u64,
    pub metadata_table_block: u64,
    pub checkpoint_block: u64,
    pub volume_id: u128,
    pub created: DateTime<Utc>,
    pub mounted: DateTime<Utc>,
    /// True when the header could not be read and the geometry is a
    /// stand-in. Downstream stages branch on this exactly once each.
    pub synthesized: bool,
}

impl VolumeGeometry {
    /// Checks the structural invariants a readable header must satisfy.
    pub fn is_valid(&self) -> bool {
        self.block_size > 0
            && self.block_size.is_power_of_two()
            && self.total_blocks > 0
            && self.root_dir_block < self.total_blocks
            && self.metadata_table_block < self.total_blocks
            && self.checkpoint_block < self.total_blocks
    }

    /// Byte offset of a block, or None past the addressable range.
    pub fn block_offset(&self, block: u64) -> Option<u64> {
        if block < self.total_blocks {
            block.checked_mul(self.block_size)
        } else {
            None
        }
    }
}

/// Flat, fixed-layout descriptor of one file or directory as decoded from
/// the metadata table or a tree leaf. Keyed by `id` in the record store.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: u64,
    /// 0 is the root/orphan sentinel.
    pub parent_id: u64,
    pub name: String,
    pub size: u64,
    pub attributes: u32,
    pub is_directory: bool,
    pub is_deleted: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    /// Block the record was decoded from (0 for illustrative data).
    pub source_block: u64,
    /// Entry index within that block.
    pub entry_index: u32,
}

/// Node kind in the reconstructed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
    Partition,
    Image,
}

impl NodeKind {
    /// Container kinds carry a children sequence; leaf kinds do not.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Directory | NodeKind::Partition | NodeKind::Image
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
            NodeKind::Partition => "partition",
            NodeKind::Image => "image",
        }
    }
}

/// Metadata block attached to a node for detail views and export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub record_id: u64,
    pub parent_id: u64,
    pub attributes: u32,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    pub source_block: u64,
    pub entry_index: u32,
}

/// Externally visible tree node.
///
/// `children` is `Some` (possibly empty) for container kinds and `None` for
/// files; the distinction is meaningful and preserved through export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemNode {
    pub id: u64,
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    /// Absolute path: "/" + name for roots, parent path joined below.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileSystemNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NodeMetadata>,
}

impl FileSystemNode {
    pub fn is_deleted(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.deleted)
    }

    pub fn md5(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.md5.as_deref())
    }

    pub fn sha1(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.sha1.as_deref())
    }

    /// Lowercased extension of the name, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Number of nodes in this subtree, including self.
    pub fn count_recursive(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(FileSystemNode::count_recursive)
            .sum::<usize>()
    }
}

/// Joins a parent path and a child name. A parent path of exactly "/" (the
/// root record named "") must not double the separator.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Pre-order flat view over a forest; every visited node regardless of kind.
pub fn collect_nodes(forest: &[FileSystemNode]) -> Vec<&FileSystemNode> {
    fn visit<'a>(node: &'a FileSystemNode, out: &mut Vec<&'a FileSystemNode>) {
        out.push(node);
        for child in node.children.iter().flatten() {
            visit(child, out);
        }
    }
    let mut out = Vec::new();
    for node in forest {
        visit(node, &mut out);
    }
    out
}
