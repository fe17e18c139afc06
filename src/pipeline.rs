//! Parse pipeline: superblock → metadata scan → tree walk → fingerprints →
//! hierarchy, with progress reported at every stage transition.
//!
//! Single-threaded and cooperative: stages run strictly in sequence, the
//! progress sink is decoupled from control flow (a no-op when absent), and
//! cancellation, when a flag is supplied, is checked only at stage
//! boundaries and tree-walker yield points.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::btree::TreeWalker;
use crate::error::ParseError;
use crate::fingerprint::attach_fingerprints;
use crate::hierarchy::build_forest;
use crate::record::RecordStore;
use crate::sample::populate_sample_records;
use crate::scan::scan_metadata_table;
use crate::superblock::locate_geometry;
use crate::types::{FileSystemNode, VolumeGeometry};

/// One progress notification: a human-readable stage label and an advisory,
/// non-decreasing percentage.
#[derive(Debug, Clone)]
pub struct ParseProgress {
    pub stage: String,
    pub percent: u8,
}

/// Progress sink type.
pub type ProgressCallback = Box<dyn Fn(&ParseProgress) + Send + Sync>;

/// Everything a parse produces. The forest is an immutable snapshot; search
/// and export borrow it read-only.
#[derive(Debug)]
pub struct ParseOutcome {
    pub geometry: VolumeGeometry,
    pub forest: Vec<FileSystemNode>,
    /// True when the tree is the illustrative sample rather than decoded
    /// structure.
    pub illustrative: bool,
    pub record_count: usize,
}

/// Reconstructs a file-system model from an opaque image buffer.
#[derive(Default)]
pub struct ImageParser {
    progress: Option<ProgressCallback>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ImageParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Supplies a cancellation flag; clearing it aborts the parse with
    /// [`ParseError::Cancelled`] at the next stage boundary or walker yield.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Runs the full pipeline. The only failures are an empty buffer and
    /// cooperative cancellation; everything else degrades to a partial or
    /// illustrative result.
    pub fn parse(&self, buffer: &[u8]) -> Result<ParseOutcome, ParseError> {
        if buffer.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        let reporter = ProgressReporter::new(self.progress.as_ref());

        reporter.report(0, "Reading volume header");
        let located = locate_geometry(buffer);
        let geometry = located.geometry;
        if geometry.synthesized {
            let label = match located.detected_hint {
                Some(hint) => format!(
                    "Volume header not recognized (input resembles {hint}); geometry synthesized"
                ),
                None => "Volume header not recognized; geometry synthesized".to_string(),
            };
            reporter.report(10, &label);
        } else {
            reporter.report(10, "Volume header validated");
        }
        self.check_cancelled()?;

        let mut store = RecordStore::new();

        if !geometry.synthesized {
            reporter.report(20, "Scanning metadata table");
            scan_metadata_table(buffer, &geometry, &mut store);
            self.check_cancelled()?;

            reporter.report(30, "Walking directory index");
            let cancel = self.cancel.clone();
            let mut checkpoint = |visited: usize| {
                // Climb toward the stage ceiling as blocks are visited; the
                // reporter clamps any wobble.
                let pct = 30 + ((visited / 64).min(25)) as u8;
                reporter.report(pct, "Walking directory index");
                cancel
                    .as_ref()
                    .is_none_or(|flag| flag.load(Ordering::Relaxed))
            };
            TreeWalker::new(buffer, &geometry)
                .with_checkpoint(&mut checkpoint)
                .walk(&mut store)?;
        }
        self.check_cancelled()?;

        let illustrative = store.is_empty();
        if illustrative {
            reporter.report(60, "Generating illustrative sample");
            info!("no usable records; generating illustrative sample");
            populate_sample_records(&mut store);
        }
        self.check_cancelled()?;

        reporter.report(70, "Computing content fingerprints");
        attach_fingerprints(&mut store);
        self.check_cancelled()?;

        reporter.report(85, "Building directory tree");
        let record_count = store.len();
        let forest = build_forest(&store);

        reporter.report(100, "Complete");
        Ok(ParseOutcome {
            geometry,
            forest,
            illustrative,
            record_count,
        })
    }

    fn check_cancelled(&self) -> Result<(), ParseError> {
        match &self.cancel {
            Some(flag) if !flag.load(Ordering::Relaxed) => Err(ParseError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Clamps reported percentages to be non-decreasing for the lifetime of one
/// parse.
struct ProgressReporter<'a> {
    callback: Option<&'a ProgressCallback>,
    last: Cell<u8>,
}

impl<'a> ProgressReporter<'a> {
    fn new(callback: Option<&'a ProgressCallback>) -> Self {
        Self {
            callback,
            last: Cell::new(0),
        }
    }

    fn report(&self, percent: u8, stage: &str) {
        let clamped = percent.max(self.last.get()).min(100);
        self.last.set(clamped);
        if let Some(callback) = self.callback {
            callback(&ParseProgress {
                stage: stage.to_string(),
                percent: clamped,
            });
        }
    }
}
