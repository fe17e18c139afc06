mod common;

use common::*;
use strata::pipeline::ImageParser;
use strata::search::{SearchEngine, SearchOptions, DEFAULT_LARGE_FILE_THRESHOLD};
use strata::types::{collect_nodes, ATTR_DIRECTORY};

#[test]
fn deleted_sample_file_found_with_exact_match_score() {
    // End-to-end: unrecognized input, sample tree, case-insensitive exact
    // search for the deleted file.
    let outcome = ImageParser::new().parse(&[0u8; 100]).unwrap();
    let engine = SearchEngine::new(&outcome.forest);

    let mut options = SearchOptions::query("QUARTERLY_BUDGET.XLSX");
    options.include_deleted = true;
    let results = engine.search(&options);

    assert_eq!(results.len(), 1);
    assert!(results[0].node.is_deleted());
    // 10 for the name match, 20 for the exact full-string bonus.
    assert!(results[0].score >= 30);
}

#[test]
fn exact_match_outranks_substring_only_match() {
    let blocks = 4u64;
    let mut buf = vec![0u8; blocks as usize * BLOCK_SIZE];
    write_header(&mut buf, blocks, 1, 3);
    write_leaf(
        &mut buf,
        1,
        &[
            encode_record(1, 0, ATTR_DIRECTORY, 0, TICKS_2021, "bin"),
            encode_record(2, 1, 0, 100, TICKS_2021, "notepad.exe"),
            encode_record(3, 1, 0, 100, TICKS_2021, "notepad.exe.bak"),
        ],
    );

    let outcome = ImageParser::new().parse(&buf).unwrap();
    let engine = SearchEngine::new(&outcome.forest);
    let results = engine.search(&SearchOptions::query("notepad.exe"));

    assert!(results.len() >= 2);
    assert_eq!(results[0].node.name, "notepad.exe");
    assert_eq!(results[1].node.name, "notepad.exe.bak");
    assert!(results[0].score > results[1].score);
}

#[test]
fn duplicate_detection_groups_shared_hashes_only() {
    // Three files where two share a hash and one is distinct must produce
    // exactly one group with exactly the two matching nodes.
    let outcome = ImageParser::new().parse(&[0u8; 100]).unwrap();
    let mut forest = outcome.forest;

    // Graft: give two existing files the same MD5-shaped hash.
    fn set_md5(nodes: &mut [strata::FileSystemNode], name: &str, hash: &str) {
        for node in nodes {
            if node.name == name {
                if let Some(meta) = node.metadata.as_mut() {
                    meta.md5 = Some(hash.to_string());
                }
            }
            if let Some(children) = node.children.as_mut() {
                set_md5(children, name, hash);
            }
        }
    }
    let shared = "f".repeat(32);
    set_md5(&mut forest, "notepad.exe", &shared);
    set_md5(&mut forest, "ntoskrnl.exe", &shared);

    let engine = SearchEngine::new(&forest);
    let groups = engine.find_duplicate_files();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
    let names: Vec<&str> = groups[0].iter().map(|n| n.name.as_str()).collect();
    assert!(names.contains(&"notepad.exe"));
    assert!(names.contains(&"ntoskrnl.exe"));
}

#[test]
fn large_file_query_uses_default_threshold() {
    let outcome = ImageParser::new().parse(&[0u8; 100]).unwrap();
    let engine = SearchEngine::new(&outcome.forest);
    let hits = engine.find_large_files(DEFAULT_LARGE_FILE_THRESHOLD);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "pagefile.sys");
}

#[test]
fn deleted_listing_and_visibility_policy_agree() {
    let outcome = ImageParser::new().parse(&[0u8; 100]).unwrap();
    let engine = SearchEngine::new(&outcome.forest);

    let deleted = engine.find_deleted_files();
    assert_eq!(deleted.len(), 1);

    // The same node is invisible to a default search.
    let results = engine.search(&SearchOptions::query(deleted[0].name.clone()));
    assert!(results.is_empty());
}

#[test]
fn path_tokens_index_nodes_by_ancestor_names() {
    let outcome = ImageParser::new().parse(&[0u8; 100]).unwrap();
    let engine = SearchEngine::new(&outcome.forest);

    // "system32" appears only in paths of nodes under /Windows/System32
    // and in that directory's own name.
    let results = engine.search(&SearchOptions::query("system32"));
    let flat = collect_nodes(&outcome.forest);
    let expected = flat
        .iter()
        .filter(|n| !n.is_deleted() && n.path.to_lowercase().contains("system32"))
        .count();
    assert_eq!(results.len(), expected);
}

#[test]
fn regex_and_literal_agree_on_plain_queries() {
    let outcome = ImageParser::new().parse(&[0u8; 100]).unwrap();
    let engine = SearchEngine::new(&outcome.forest);

    let literal = engine.search(&SearchOptions::query("notepad"));
    let mut regex_options = SearchOptions::query("notepad");
    regex_options.use_regex = true;
    let regex = engine.search(&regex_options);

    let a: Vec<u64> = literal.iter().map(|r| r.node.id).collect();
    let b: Vec<u64> = regex.iter().map(|r| r.node.id).collect();
    assert_eq!(a, b);
}
