//! Illustrative-mode dataset.
//!
//! When the image yields no usable records the pipeline must still hand the
//! caller a non-empty, explorable tree; presenting nothing merely because
//! the input was not a recognized format is the one thing the engine is not
//! allowed to do. This module is that named fallback: a fixed,
//! version-pinned sample hierarchy, generated behind a single explicit
//! decision point in the pipeline and surfaced through the stage label.

use chrono::{DateTime, TimeZone, Utc};

use crate::record::RecordStore;
use crate::types::{FileRecord, ATTR_DELETED, ATTR_DIRECTORY};

/// Number of records in the sample; pinned so tests and consumers can rely
/// on it.
pub const SAMPLE_RECORD_COUNT: usize = 12;

/// Name of the sample's one deleted file, under the recycle directory.
pub const SAMPLE_DELETED_NAME: &str = "quarterly_budget.xlsx";

struct SampleRow {
    id: u64,
    parent: u64,
    name: &'static str,
    directory: bool,
    deleted: bool,
    size: u64,
}

const ROWS: [SampleRow; SAMPLE_RECORD_COUNT] = [
    SampleRow { id: 1, parent: 0, name: "", directory: true, deleted: false, size: 0 },
    SampleRow { id: 2, parent: 1, name: "Windows", directory: true, deleted: false, size: 0 },
    SampleRow { id: 3, parent: 1, name: "Users", directory: true, deleted: false, size: 0 },
    SampleRow { id: 4, parent: 1, name: "Program Files", directory: true, deleted: false, size: 0 },
    SampleRow { id: 5, parent: 1, name: "$Recycle.Bin", directory: true, deleted: false, size: 0 },
    SampleRow { id: 6, parent: 1, name: "pagefile.sys", directory: false, deleted: false, size: 2_147_483_648 },
    SampleRow { id: 7, parent: 2, name: "System32", directory: true, deleted: false, size: 0 },
    SampleRow { id: 8, parent: 7, name: "ntoskrnl.exe", directory: false, deleted: false, size: 11_264_000 },
    SampleRow { id: 9, parent: 2, name: "notepad.exe", directory: false, deleted: false, size: 360_448 },
    SampleRow { id: 10, parent: 3, name: "alice", directory: true, deleted: false, size: 0 },
    SampleRow { id: 11, parent: 10, name: "quarterly_report.docx", directory: false, deleted: false, size: 48_128 },
    SampleRow { id: 12, parent: 5, name: SAMPLE_DELETED_NAME, directory: false, deleted: true, size: 23_040 },
];

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 15, 9, 30, 0).unwrap()
}

/// Fills `store` with the pinned sample hierarchy. Timestamps are fixed
/// constants staggered per record so sorted views are deterministic.
pub fn populate_sample_records(store: &mut RecordStore) {
    let base = base_time();
    for row in &ROWS {
        let mut attributes = 0u32;
        if row.directory {
            attributes |= ATTR_DIRECTORY;
        }
        if row.deleted {
            attributes |= ATTR_DELETED;
        }
        let stamp = base + chrono::Duration::hours(row.id as i64);
        store.insert(FileRecord {
            id: row.id,
            parent_id: row.parent,
            name: row.name.to_string(),
            size: row.size,
            attributes,
            is_directory: row.directory,
            is_deleted: row.deleted,
            created: stamp,
            modified: stamp,
            accessed: stamp,
            md5: None,
            sha1: None,
            source_block: 0,
            entry_index: row.id as u32,
        });
    }
}
