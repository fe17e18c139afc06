//! Multi-format export of the reconstructed forest.
//!
//! Four encoders share two structural modes (hierarchical and flattened)
//! and three independent toggles (deleted visibility, metadata block,
//! hashes). Item counts are always full recursive node counts, and every
//! encoder produces well-formed output for zero items.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::ExportError;
use crate::types::{FileSystemNode, NodeKind};

/// Prefix of generated artifact filenames.
const FILENAME_PREFIX: &str = "filesystem-export";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Xml,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Xml => "xml",
            ExportFormat::Html => "html",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Xml => "application/xml",
            ExportFormat::Html => "text/html",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    /// Parses a format tag; unknown tags are the one hard export failure.
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "xml" => Ok(ExportFormat::Xml),
            "html" => Ok(ExportFormat::Html),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Pure configuration for one export call.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub include_metadata: bool,
    pub include_deleted: bool,
    pub include_hashes: bool,
    pub flatten: bool,
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            include_metadata: false,
            include_deleted: false,
            include_hashes: false,
            flatten: false,
        }
    }
}

/// A finished export: bytes plus the filename and mime type the UI hands to
/// the download.
#[derive(Debug)]
pub struct ExportArtifact {
    pub filename: String,
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

impl ExportArtifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_text(&self) -> &str {
        std::str::from_utf8(&self.data).unwrap_or_default()
    }
}

/// Item projection honoring the option toggles. Hashes and the metadata
/// block are independent; `children` is omitted (not null) for leaf kinds.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportItem {
    id: u64,
    name: String,
    kind: NodeKind,
    size: u64,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    accessed: DateTime<Utc>,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<ItemMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<ExportItem>>,
    #[serde(skip)]
    deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemMetadata {
    record_id: u64,
    parent_id: u64,
    attributes: u32,
    deleted: bool,
    source_block: u64,
    entry_index: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EchoedOptions {
    format: String,
    include_metadata: bool,
    include_deleted: bool,
    include_hashes: bool,
    flatten: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportEnvelope {
    exported_at: DateTime<Utc>,
    options: EchoedOptions,
    total_items: usize,
    items: Vec<ExportItem>,
}

/// Serializes the forest per `options`. The only failure is an unparseable
/// format tag upstream (via `ExportFormat::from_str`) or a serializer error.
pub fn export(
    forest: &[FileSystemNode],
    options: &ExportOptions,
) -> Result<ExportArtifact, ExportError> {
    let items = build_items(forest, options);
    let now = Utc::now();
    let total = count_items(&items);

    let text = match options.format {
        ExportFormat::Json => encode_json(items, options, total, now)?,
        ExportFormat::Csv => encode_csv(&items, options),
        ExportFormat::Xml => encode_xml(&items, options, total, now),
        ExportFormat::Html => encode_html(&items, options, total, now),
    };

    Ok(ExportArtifact {
        filename: artifact_filename(options.format, now),
        mime_type: options.format.mime_type(),
        data: text.into_bytes(),
    })
}

/// `<prefix>-<ISO timestamp with : and . replaced by ->.<ext>`
fn artifact_filename(format: ExportFormat, now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{FILENAME_PREFIX}-{stamp}.{}", format.extension())
}

/// Projects the forest into export items: deleted subtrees pruned unless
/// included, flattened to a pre-order list when requested.
fn build_items(forest: &[FileSystemNode], options: &ExportOptions) -> Vec<ExportItem> {
    fn project(node: &FileSystemNode, options: &ExportOptions, nested: bool) -> ExportItem {
        let children = if nested {
            node.children.as_ref().map(|kids| {
                kids.iter()
                    .filter(|c| options.include_deleted || !c.is_deleted())
                    .map(|c| project(c, options, true))
                    .collect()
            })
        } else {
            None
        };
        ExportItem {
            id: node.id,
            name: node.name.clone(),
            kind: node.kind,
            size: node.size,
            created: node.created,
            modified: node.modified,
            accessed: node.accessed,
            path: node.path.clone(),
            md5: if options.include_hashes {
                node.md5().map(str::to_string)
            } else {
                None
            },
            sha1: if options.include_hashes {
                node.sha1().map(str::to_string)
            } else {
                None
            },
            metadata: if options.include_metadata {
                node.metadata.as_ref().map(|m| ItemMetadata {
                    record_id: m.record_id,
                    parent_id: m.parent_id,
                    attributes: m.attributes,
                    deleted: m.deleted,
                    source_block: m.source_block,
                    entry_index: m.entry_index,
                })
            } else {
                None
            },
            children,
            deleted: node.is_deleted(),
        }
    }

    fn flatten_into(node: &FileSystemNode, options: &ExportOptions, out: &mut Vec<ExportItem>) {
        if !options.include_deleted && node.is_deleted() {
            return;
        }
        out.push(project(node, options, false));
        for child in node.children.iter().flatten() {
            flatten_into(child, options, out);
        }
    }

    // CSV has no nesting to preserve; it always takes the flat shape.
    if options.flatten || options.format == ExportFormat::Csv {
        let mut out = Vec::new();
        for node in forest {
            flatten_into(node, options, &mut out);
        }
        out
    } else {
        forest
            .iter()
            .filter(|n| options.include_deleted || !n.is_deleted())
            .map(|n| project(n, options, true))
            .collect()
    }
}

fn count_items(items: &[ExportItem]) -> usize {
    fn count(item: &ExportItem) -> usize {
        1 + item.children.iter().flatten().map(count).sum::<usize>()
    }
    items.iter().map(count).sum()
}

fn encode_json(
    items: Vec<ExportItem>,
    options: &ExportOptions,
    total: usize,
    now: DateTime<Utc>,
) -> Result<String, ExportError> {
    let envelope = ExportEnvelope {
        exported_at: now,
        options: EchoedOptions {
            format: options.format.to_string(),
            include_metadata: options.include_metadata,
            include_deleted: options.include_deleted,
            include_hashes: options.include_hashes,
            flatten: options.flatten,
        },
        total_items: total,
        items,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn encode_csv(items: &[ExportItem], options: &ExportOptions) -> String {
    let mut header = vec![
        "Id", "Name", "Kind", "Size", "Path", "Created", "Modified", "Accessed",
    ];
    if options.include_metadata {
        header.extend(["ParentId", "Attributes", "Deleted"]);
    }
    if options.include_hashes {
        header.extend(["Md5", "Sha1"]);
    }

    let mut out = String::new();
    out.push_str(&header.join(","));
    out.push('\n');

    for item in items {
        let mut row = vec![
            item.id.to_string(),
            csv_escape(&item.name),
            item.kind.name().to_string(),
            item.size.to_string(),
            csv_escape(&item.path),
            item.created.to_rfc3339(),
            item.modified.to_rfc3339(),
            item.accessed.to_rfc3339(),
        ];
        if options.include_metadata {
            let (parent, attrs) = item
                .metadata
                .as_ref()
                .map(|m| (m.parent_id, m.attributes))
                .unwrap_or_default();
            row.push(parent.to_string());
            row.push(format!("0x{attrs:08X}"));
            row.push(item.deleted.to_string());
        }
        if options.include_hashes {
            row.push(item.md5.clone().unwrap_or_default());
            row.push(item.sha1.clone().unwrap_or_default());
        }
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn cdata(text: &str) -> String {
    // A literal "]]>" inside CDATA must be split across sections.
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

fn encode_xml(
    items: &[ExportItem],
    options: &ExportOptions,
    total: usize,
    now: DateTime<Utc>,
) -> String {
    fn write_item(item: &ExportItem, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent);
        let deleted_attr = if item.deleted { " deleted=\"true\"" } else { "" };
        out.push_str(&format!(
            "{pad}<item id=\"{}\" kind=\"{}\" size=\"{}\" created=\"{}\" modified=\"{}\" accessed=\"{}\"{deleted_attr}>\n",
            item.id,
            item.kind.name(),
            item.size,
            item.created.to_rfc3339(),
            item.modified.to_rfc3339(),
            item.accessed.to_rfc3339(),
        ));
        out.push_str(&format!("{pad}  <name>{}</name>\n", cdata(&item.name)));
        out.push_str(&format!("{pad}  <path>{}</path>\n", cdata(&item.path)));
        if let Some(md5) = &item.md5 {
            out.push_str(&format!("{pad}  <md5>{}</md5>\n", xml_escape(md5)));
        }
        if let Some(sha1) = &item.sha1 {
            out.push_str(&format!("{pad}  <sha1>{}</sha1>\n", xml_escape(sha1)));
        }
        if let Some(meta) = &item.metadata {
            out.push_str(&format!(
                "{pad}  <metadata parentId=\"{}\" attributes=\"0x{:08X}\"/>\n",
                meta.parent_id, meta.attributes
            ));
        }
        for child in item.children.iter().flatten() {
            write_item(child, indent + 1, out);
        }
        out.push_str(&format!("{pad}</item>\n"));
    }

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<export timestamp=\"{}\" format=\"{}\" count=\"{total}\">\n",
        xml_escape(&now.to_rfc3339()),
        options.format,
    ));
    for item in items {
        write_item(item, 1, &mut out);
    }
    out.push_str("</export>\n");
    out
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[derive(Default)]
struct ReportStats {
    files: usize,
    directories: usize,
    deleted: usize,
    total_size: u64,
    largest_name: String,
    largest_size: u64,
}

fn gather_stats(items: &[ExportItem], stats: &mut ReportStats) {
    for item in items {
        match item.kind {
            NodeKind::File => {
                stats.files += 1;
                stats.total_size += item.size;
                if item.size > stats.largest_size {
                    stats.largest_size = item.size;
                    stats.largest_name = item.name.clone();
                }
            }
            _ => stats.directories += 1,
        }
        if item.deleted {
            stats.deleted += 1;
        }
        if let Some(children) = &item.children {
            gather_stats(children, stats);
        }
    }
}

fn encode_html(
    items: &[ExportItem],
    options: &ExportOptions,
    total: usize,
    now: DateTime<Utc>,
) -> String {
    let mut stats = ReportStats::default();
    gather_stats(items, &mut stats);
    let mean = if stats.files > 0 {
        stats.total_size / stats.files as u64
    } else {
        0
    };

    let mut out = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>File System Report</title>\n<style>\n\
         body{font-family:sans-serif;margin:2em}\n\
         table{border-collapse:collapse}td,th{border:1px solid #999;padding:4px 8px}\n\
         .deleted{color:#b00}\nul{list-style:none}\n</style>\n</head>\n<body>\n",
    );
    out.push_str(&format!(
        "<h1>File System Report</h1>\n<p>Generated {}</p>\n",
        html_escape(&now.to_rfc3339())
    ));
    out.push_str("<h2>Statistics</h2>\n<table>\n");
    out.push_str(&format!("<tr><th>Total items</th><td>{total}</td></tr>\n"));
    out.push_str(&format!("<tr><th>Files</th><td>{}</td></tr>\n", stats.files));
    out.push_str(&format!(
        "<tr><th>Directories</th><td>{}</td></tr>\n",
        stats.directories
    ));
    out.push_str(&format!(
        "<tr><th>Deleted</th><td>{}</td></tr>\n",
        stats.deleted
    ));
    out.push_str(&format!(
        "<tr><th>Total size</th><td>{}</td></tr>\n",
        format_size(stats.total_size)
    ));
    out.push_str(&format!(
        "<tr><th>Largest file</th><td>{} ({})</td></tr>\n",
        html_escape(&stats.largest_name),
        format_size(stats.largest_size)
    ));
    out.push_str(&format!(
        "<tr><th>Mean file size</th><td>{}</td></tr>\n",
        format_size(mean)
    ));
    out.push_str("</table>\n");

    if options.flatten {
        out.push_str("<h2>Items</h2>\n<table>\n<tr><th>Path</th><th>Kind</th><th>Size</th><th>Modified</th></tr>\n");
        for item in items {
            let class = if item.deleted { " class=\"deleted\"" } else { "" };
            out.push_str(&format!(
                "<tr{class}><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                html_escape(&item.path),
                item.kind.name(),
                format_size(item.size),
                html_escape(&item.modified.to_rfc3339()),
            ));
        }
        out.push_str("</table>\n");
    } else {
        fn write_tree(items: &[ExportItem], out: &mut String) {
            out.push_str("<ul>\n");
            for item in items {
                let class = if item.deleted { " class=\"deleted\"" } else { "" };
                out.push_str(&format!(
                    "<li{class}>{} <small>({})</small>",
                    html_escape(&item.name),
                    format_size(item.size)
                ));
                if let Some(children) = &item.children {
                    if !children.is_empty() {
                        out.push('\n');
                        write_tree(children, out);
                    }
                }
                out.push_str("</li>\n");
            }
            out.push_str("</ul>\n");
        }
        out.push_str("<h2>Tree</h2>\n");
        write_tree(items, &mut out);
    }

    out.push_str("</body>\n</html>\n");
    out
}
