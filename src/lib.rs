//! Strata reconstructs a hierarchical file/directory model from a raw disk
//! image buffer and exposes it to a search engine and a multi-format export
//! serializer.
//!
//! The parse pipeline locates a volume header (or synthesizes a stand-in),
//! scans the metadata table, walks the block-indexed directory tree under
//! adversarial-input defenses, promotes orphans, attaches placeholder
//! fingerprints, and returns an immutable forest. Non-conforming input
//! degrades to a fixed illustrative sample rather than an empty result; the
//! only hard parse failure is an empty buffer.

pub mod btree;
pub mod detect;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod hierarchy;
pub mod io;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod sample;
pub mod scan;
pub mod search;
pub mod superblock;
pub mod types;

pub use error::{DecodeError, ExportError, ParseError};
pub use export::{export, ExportArtifact, ExportFormat, ExportOptions};
pub use io::ImageBuffer;
pub use pipeline::{ImageParser, ParseOutcome, ParseProgress, ProgressCallback};
pub use search::{SearchEngine, SearchOptions, SearchResult};
pub use types::{collect_nodes, FileRecord, FileSystemNode, NodeKind, VolumeGeometry};
