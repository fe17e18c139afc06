//! Inverted-index search and analytic queries over the reconstructed tree.
//!
//! The index is rebuilt wholesale per item set; the engine borrows the
//! forest read-only and never mutates it.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use regex::RegexBuilder;
use tracing::debug;

use crate::types::{collect_nodes, FileSystemNode, NodeKind};

/// Default threshold for [`SearchEngine::find_large_files`]: 100 MiB.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;
/// Default window for [`SearchEngine::find_recent_files`], in days.
pub const DEFAULT_RECENT_DAYS: i64 = 7;

const SCORE_NAME_MATCH: i32 = 10;
const SCORE_PATH_MATCH: i32 = 5;
const SCORE_HASH_MATCH: i32 = 15;
const SCORE_EXACT_BONUS: i32 = 20;
const SCORE_FILE_KIND: i32 = 2;
const SCORE_DELETED_PENALTY: i32 = -1;

/// Query parameters. [`SearchOptions::query`] gives a case-insensitive
/// literal search over names and paths that hides deleted items.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub query: String,
    pub case_sensitive: bool,
    pub use_regex: bool,
    pub search_in_path: bool,
    pub include_deleted: bool,
    /// Lowercase extension allow-list; None admits every type.
    pub file_types: Option<Vec<String>>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub modified_after: Option<DateTime<Utc>>,
    pub modified_before: Option<DateTime<Utc>>,
    /// Substring matched case-insensitively against both hash fields.
    pub hash: Option<String>,
}

impl SearchOptions {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_in_path: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Name,
    Path,
    Md5,
    Sha1,
}

/// One located occurrence of the query within a field.
#[derive(Debug, Clone, Copy)]
pub struct SearchMatch {
    pub field: MatchField,
    pub start: usize,
    pub len: usize,
}

#[derive(Debug)]
pub struct SearchResult<'a> {
    pub node: &'a FileSystemNode,
    pub score: i32,
    pub matches: Vec<SearchMatch>,
}

/// Splits on whitespace and the separator set `- _ . / \`, lowercases, and
/// drops empties.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '.' | '/' | '\\'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

pub struct SearchEngine<'a> {
    nodes: Vec<&'a FileSystemNode>,
    token_index: HashMap<String, Vec<usize>>,
    hash_index: HashMap<String, usize>,
}

impl<'a> SearchEngine<'a> {
    /// Indexes every node of the forest under every token of its name and
    /// path, plus exact lowercased hashes.
    pub fn new(forest: &'a [FileSystemNode]) -> Self {
        let nodes = collect_nodes(forest);
        let mut token_index: HashMap<String, Vec<usize>> = HashMap::new();
        let mut hash_index: HashMap<String, usize> = HashMap::new();

        for (idx, node) in nodes.iter().enumerate() {
            for token in tokenize(&node.name).into_iter().chain(tokenize(&node.path)) {
                let bucket = token_index.entry(token).or_default();
                if bucket.last() != Some(&idx) {
                    bucket.push(idx);
                }
            }
            if let Some(md5) = node.md5() {
                hash_index.insert(md5.to_lowercase(), idx);
            }
            if let Some(sha1) = node.sha1() {
                hash_index.insert(sha1.to_lowercase(), idx);
            }
        }
        debug!(
            nodes = nodes.len(),
            tokens = token_index.len(),
            "search index built"
        );

        Self {
            nodes,
            token_index,
            hash_index,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// O(1) exact hash lookup, case-insensitive.
    pub fn lookup_hash(&self, hash: &str) -> Option<&'a FileSystemNode> {
        self.hash_index
            .get(&hash.to_lowercase())
            .map(|&idx| self.nodes[idx])
    }

    /// Ranked search per the scoring contract. Ties keep tree order.
    pub fn search(&self, options: &SearchOptions) -> Vec<SearchResult<'a>> {
        let matcher = Matcher::compile(options);
        let mut results: Vec<SearchResult<'a>> = Vec::new();

        for idx in self.candidates(options) {
            let node = self.nodes[idx];
            if !self.passes_filters(node, options) {
                continue;
            }

            let mut matches = Vec::new();
            let mut score = 0i32;

            if let Some(matcher) = &matcher {
                matcher.find_into(&node.name, MatchField::Name, &mut matches);
                if options.search_in_path {
                    matcher.find_into(&node.path, MatchField::Path, &mut matches);
                }
            }
            let query_matched = matches.iter().any(|m| {
                matches!(m.field, MatchField::Name | MatchField::Path)
            });
            if matcher.is_some() && !query_matched {
                continue;
            }

            if let Some(needle) = &options.hash {
                let needle = needle.to_lowercase();
                let mut hash_hit = false;
                if node.md5().is_some_and(|h| h.to_lowercase().contains(&needle)) {
                    matches.push(SearchMatch {
                        field: MatchField::Md5,
                        start: 0,
                        len: needle.len(),
                    });
                    hash_hit = true;
                }
                if node.sha1().is_some_and(|h| h.to_lowercase().contains(&needle)) {
                    matches.push(SearchMatch {
                        field: MatchField::Sha1,
                        start: 0,
                        len: needle.len(),
                    });
                    hash_hit = true;
                }
                if !hash_hit {
                    continue;
                }
            }

            for m in &matches {
                score += match m.field {
                    MatchField::Name => SCORE_NAME_MATCH,
                    MatchField::Path => SCORE_PATH_MATCH,
                    MatchField::Md5 | MatchField::Sha1 => SCORE_HASH_MATCH,
                };
            }
            if !options.query.is_empty() && options.query.eq_ignore_ascii_case(&node.name) {
                score += SCORE_EXACT_BONUS;
            }
            if node.kind == NodeKind::File {
                score += SCORE_FILE_KIND;
            }
            if node.is_deleted() {
                score += SCORE_DELETED_PENALTY;
            }

            results.push(SearchResult {
                node,
                score,
                matches,
            });
        }

        // Stable sort: equal scores keep tree order.
        results.sort_by(|a, b| b.score.cmp(&a.score));
        results
    }

    /// Index-accelerated candidate set for literal queries; the full tree
    /// for regex, hash-only, and filter-only searches.
    fn candidates(&self, options: &SearchOptions) -> Vec<usize> {
        if options.query.is_empty() || options.use_regex {
            return (0..self.nodes.len()).collect();
        }
        let mut set = BTreeSet::new();
        for token in tokenize(&options.query) {
            if let Some(bucket) = self.token_index.get(&token) {
                set.extend(bucket.iter().copied());
            }
        }
        set.into_iter().collect()
    }

    fn passes_filters(&self, node: &FileSystemNode, options: &SearchOptions) -> bool {
        if !options.include_deleted && node.is_deleted() {
            return false;
        }
        if let Some(types) = &options.file_types {
            match node.extension() {
                Some(ext) if types.iter().any(|t| t == &ext) => {}
                _ => return false,
            }
        }
        if options.min_size.is_some_and(|min| node.size < min) {
            return false;
        }
        if options.max_size.is_some_and(|max| node.size > max) {
            return false;
        }
        if options
            .modified_after
            .is_some_and(|after| node.modified < after)
        {
            return false;
        }
        if options
            .modified_before
            .is_some_and(|before| node.modified > before)
        {
            return false;
        }
        true
    }

    /// Groups file nodes sharing an MD5-shaped hash; only groups of two or
    /// more survive. Groups and members keep tree order.
    pub fn find_duplicate_files(&self) -> Vec<Vec<&'a FileSystemNode>> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&'a FileSystemNode>> = HashMap::new();

        for &node in &self.nodes {
            if node.kind != NodeKind::File {
                continue;
            }
            let Some(hash) = node.md5() else { continue };
            let bucket = groups.entry(hash).or_default();
            if bucket.is_empty() {
                order.push(hash);
            }
            bucket.push(node);
        }

        order
            .into_iter()
            .filter_map(|hash| {
                let group = groups.remove(hash)?;
                (group.len() >= 2).then_some(group)
            })
            .collect()
    }

    /// File nodes at or above `threshold` bytes, largest first.
    pub fn find_large_files(&self, threshold: u64) -> Vec<&'a FileSystemNode> {
        let mut hits: Vec<&'a FileSystemNode> = self
            .nodes
            .iter()
            .copied()
            .filter(|n| n.kind == NodeKind::File && n.size >= threshold)
            .collect();
        hits.sort_by(|a, b| b.size.cmp(&a.size));
        hits
    }

    /// File nodes modified within the last `days` days, newest first.
    pub fn find_recent_files(&self, days: i64) -> Vec<&'a FileSystemNode> {
        self.find_files_modified_since(Utc::now() - Duration::days(days))
    }

    /// File nodes modified at or after `cutoff`, newest first.
    pub fn find_files_modified_since(&self, cutoff: DateTime<Utc>) -> Vec<&'a FileSystemNode> {
        let mut hits: Vec<&'a FileSystemNode> = self
            .nodes
            .iter()
            .copied()
            .filter(|n| n.kind == NodeKind::File && n.modified >= cutoff)
            .collect();
        hits.sort_by(|a, b| b.modified.cmp(&a.modified));
        hits
    }

    /// Every node carrying the deleted flag, in tree order.
    pub fn find_deleted_files(&self) -> Vec<&'a FileSystemNode> {
        self.nodes
            .iter()
            .copied()
            .filter(|n| n.is_deleted())
            .collect()
    }
}

/// Compiled query: a regex when requested and valid, otherwise a literal
/// needle. An invalid regex falls back to literal matching for that query
/// rather than failing the call.
enum Matcher {
    Literal { needle: String, case_sensitive: bool },
    Regex(regex::Regex),
}

impl Matcher {
    fn compile(options: &SearchOptions) -> Option<Self> {
        if options.query.is_empty() {
            return None;
        }
        if options.use_regex {
            match RegexBuilder::new(&options.query)
                .case_insensitive(!options.case_sensitive)
                .build()
            {
                Ok(re) => return Some(Matcher::Regex(re)),
                Err(err) => {
                    debug!(%err, "invalid regex, falling back to literal matching");
                }
            }
        }
        let needle = if options.case_sensitive {
            options.query.clone()
        } else {
            options.query.to_lowercase()
        };
        Some(Matcher::Literal {
            needle,
            case_sensitive: options.case_sensitive,
        })
    }

    /// Appends every occurrence of the query in `haystack` to `out`.
    fn find_into(&self, haystack: &str, field: MatchField, out: &mut Vec<SearchMatch>) {
        match self {
            Matcher::Regex(re) => {
                for m in re.find_iter(haystack) {
                    out.push(SearchMatch {
                        field,
                        start: m.start(),
                        len: m.len(),
                    });
                }
            }
            Matcher::Literal {
                needle,
                case_sensitive,
            } => {
                if needle.is_empty() {
                    return;
                }
                let hay = if *case_sensitive {
                    haystack.to_string()
                } else {
                    haystack.to_lowercase()
                };
                let mut from = 0usize;
                while let Some(pos) = hay[from..].find(needle.as_str()) {
                    out.push(SearchMatch {
                        field,
                        start: from + pos,
                        len: needle.len(),
                    });
                    from += pos + needle.len().max(1);
                }
            }
        }
    }
}
