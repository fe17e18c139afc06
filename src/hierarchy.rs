//! Builds the externally visible forest from the flat record store.
//!
//! Arena style per the traversal contract: every node is materialized
//! before any edge is resolved, edges are id pairs rather than pointers,
//! and paths are assigned in parent-first order so nothing depends on the
//! order records arrived in.

use std::collections::BTreeMap;

use tracing::debug;

use crate::record::RecordStore;
use crate::types::{join_path, FileRecord, FileSystemNode, NodeKind, NodeMetadata};

/// Converts the store into a forest. A record is a root when its parent id
/// is 0 or refers to an id the store never saw; orphans are promoted, not
/// dropped. Children are ordered by record id.
pub fn build_forest(store: &RecordStore) -> Vec<FileSystemNode> {
    let mut children_of: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    let mut roots: Vec<u64> = Vec::new();
    let mut orphans = 0usize;

    for record in store.iter() {
        if record.parent_id == 0 || !store.contains(record.parent_id) {
            if record.parent_id != 0 {
                orphans += 1;
            }
            roots.push(record.id);
        } else {
            children_of.entry(record.parent_id).or_default().push(record.id);
        }
    }
    if orphans > 0 {
        debug!(orphans, "promoted records with unresolved parents to roots");
    }

    roots
        .iter()
        .map(|&id| {
            let record = store.get(id).expect("root ids come from the store");
            let path = format!("/{}", record.name);
            materialize(record, path, store, &children_of)
        })
        .collect()
}

fn materialize(
    record: &FileRecord,
    path: String,
    store: &RecordStore,
    children_of: &BTreeMap<u64, Vec<u64>>,
) -> FileSystemNode {
    let kind = if record.is_directory {
        NodeKind::Directory
    } else {
        NodeKind::File
    };

    // Parent paths are final before any child path is computed.
    let children = if kind.is_container() {
        let child_nodes = children_of
            .get(&record.id)
            .map(|ids| {
                ids.iter()
                    .map(|&child_id| {
                        let child = store.get(child_id).expect("edges come from the store");
                        let child_path = join_path(&path, &child.name);
                        materialize(child, child_path, store, children_of)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(child_nodes)
    } else {
        None
    };

    FileSystemNode {
        id: record.id,
        name: record.name.clone(),
        kind,
        size: record.size,
        created: record.created,
        modified: record.modified,
        accessed: record.accessed,
        path,
        children,
        metadata: Some(NodeMetadata {
            record_id: record.id,
            parent_id: record.parent_id,
            attributes: record.attributes,
            deleted: record.is_deleted,
            md5: record.md5.clone(),
            sha1: record.sha1.clone(),
            source_block: record.source_block,
            entry_index: record.entry_index,
        }),
    }
}
