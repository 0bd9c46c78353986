//! Analysis host and per-snapshot analysis.
//!
//! [`AnalysisHost`] owns the project state and publishes one [`Snapshot`]
//! per open file. [`Analysis`] answers caret requests against a single
//! snapshot; it never sees later edits.
//!
//! ```ignore
//! let host = AnalysisHost::new();
//! let file = host.set_file_content("/src/User.php", text);
//!
//! let analysis = host.analysis(file)?;
//! let resolution = analysis.run(caret)?;
//! ```

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::goto::{GotoResult, Location, goto_declaration};
use super::occurrences::{Accuracy, Occurrence, OccurrenceKind, OccurrenceResolver};
use super::reference_span::ReferenceSpanFinder;
use crate::base::{FileId, LineCol, LineIndex, TextRange, TextSize};
use crate::config::AnalysisConfig;
use crate::hir::{
    DeprecatedMembers, Diagnostic, FileSet, MemberHighlight, ProjectIndex, ScopeModel, lower_file,
    member_diagnostics, member_highlights,
};
use crate::syntax::ast::SourceFile;
use crate::syntax::{Token, TokenCursor, lex, parse};

// ============================================================================
// SNAPSHOT
// ============================================================================

/// One parse of one file: text, tokens, syntax tree and scope model.
///
/// Immutable; a new parse produces a new snapshot.
#[derive(Debug)]
pub struct Snapshot {
    file: FileId,
    path: Arc<str>,
    text: Arc<str>,
    tokens: Vec<Token>,
    ast: Option<SourceFile>,
    model: ScopeModel,
    line_index: LineIndex,
}

impl Snapshot {
    /// Lex, parse and lower `text` against `project`.
    pub fn build(
        file: FileId,
        path: impl Into<Arc<str>>,
        text: impl Into<Arc<str>>,
        project: &ProjectIndex,
    ) -> Self {
        let path = path.into();
        let text = text.into();
        let tokens = lex(&text);
        let ast = parse(&tokens);
        let model = lower_file(file, path.clone(), &tokens, &ast, project);
        Self::from_parts(file, path, text, tokens, Some(ast), model)
    }

    /// A snapshot around a model built elsewhere. Without a syntax tree
    /// there are no member highlights.
    pub fn from_parts(
        file: FileId,
        path: impl Into<Arc<str>>,
        text: impl Into<Arc<str>>,
        tokens: Vec<Token>,
        ast: Option<SourceFile>,
        model: ScopeModel,
    ) -> Self {
        let text = text.into();
        let line_index = LineIndex::new(&text);
        Self {
            file,
            path: path.into(),
            text,
            tokens,
            ast,
            model,
            line_index,
        }
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn ast(&self) -> Option<&SourceFile> {
        self.ast.as_ref()
    }

    pub fn model(&self) -> &ScopeModel {
        &self.model
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }
}

// ============================================================================
// ANALYSIS HOST
// ============================================================================

#[derive(Debug, Default)]
struct Published {
    snapshots: IndexMap<FileId, Arc<Snapshot>>,
    /// Files whose next snapshot is being built.
    pending: FxHashSet<FileId>,
}

/// Owns file contents and the project index, and publishes snapshots.
#[derive(Debug, Default)]
pub struct AnalysisHost {
    config: AnalysisConfig,
    files: FileSet,
    project: RwLock<ProjectIndex>,
    published: Mutex<Published>,
    changed: Condvar,
}

impl AnalysisHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AnalysisConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn file_id(&self, path: &str) -> FileId {
        self.files.file_id(path)
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    /// Add or replace a project file that is not open; only its exported
    /// declarations matter.
    pub fn index_file(&self, path: &str, text: &str) -> FileId {
        let file = self.files.file_id(path);
        self.files.set_contents(file, text);
        self.project.write().index_file(file, path, text);
        file
    }

    /// Replace the contents of an open file and publish its new snapshot.
    pub fn set_file_content(&self, path: &str, text: &str) -> FileId {
        let file = self.index_file(path, text);
        self.invalidate(file);
        let project = self.project.read().clone();
        let snapshot = Snapshot::build(file, path, text, &project);
        self.set_snapshot(Arc::new(snapshot));
        file
    }

    pub fn remove_file(&self, path: &str) {
        let file = self.files.file_id(path);
        self.project.write().remove(file);
        self.files.remove(file);
        let mut published = self.published.lock();
        published.snapshots.swap_remove(&file);
        published.pending.remove(&file);
        self.changed.notify_all();
    }

    /// Mark the snapshot of `file` as out of date until the next
    /// [`set_snapshot`](Self::set_snapshot).
    pub fn invalidate(&self, file: FileId) {
        self.published.lock().pending.insert(file);
    }

    pub fn set_snapshot(&self, snapshot: Arc<Snapshot>) {
        let mut published = self.published.lock();
        published.pending.remove(&snapshot.file);
        published.snapshots.insert(snapshot.file, snapshot);
        self.changed.notify_all();
    }

    /// The latest snapshot of `file`, current or not.
    pub fn snapshot(&self, file: FileId) -> Option<Arc<Snapshot>> {
        self.published.lock().snapshots.get(&file).cloned()
    }

    /// The current snapshot of `file`, waiting at most the configured parse
    /// timeout for one being built. `None` on timeout.
    pub fn wait_for_snapshot(&self, file: FileId) -> Option<Arc<Snapshot>> {
        let deadline = Instant::now() + self.config.parse_timeout;
        let mut published = self.published.lock();
        loop {
            if !published.pending.contains(&file) {
                if let Some(snapshot) = published.snapshots.get(&file) {
                    return Some(snapshot.clone());
                }
            }
            if self.changed.wait_until(&mut published, deadline).timed_out() {
                debug!(?file, timeout = ?self.config.parse_timeout, "timed out waiting for snapshot");
                return None;
            }
        }
    }

    /// Analysis of the current snapshot of `file`.
    pub fn analysis(&self, file: FileId) -> Option<Analysis> {
        let snapshot = self.wait_for_snapshot(file)?;
        Some(Analysis::new(snapshot, self.config.clone()))
    }
}

// ============================================================================
// ANALYSIS
// ============================================================================

/// Everything known about the symbol under a caret.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CaretResolution {
    pub span: TextRange,
    pub kind: OccurrenceKind,
    pub accuracy: Accuracy,
    pub declarations: Vec<Location>,
    /// Mark-occurrences ranges, ordered by start.
    pub occurrences: Vec<TextRange>,
    pub goto: Option<GotoResult>,
}

/// Caret requests against one snapshot.
#[derive(Clone, Debug)]
pub struct Analysis {
    snapshot: Arc<Snapshot>,
    config: AnalysisConfig,
    cancel: CancellationToken,
}

impl Analysis {
    pub fn new(snapshot: Arc<Snapshot>, config: AnalysisConfig) -> Self {
        Self {
            snapshot,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Stop every request of this analysis; they return no result.
    pub fn cancel(&self) {
        debug!(file = ?self.snapshot.file, "analysis cancelled");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn offset_at(&self, position: LineCol) -> Option<TextSize> {
        self.snapshot.line_index.offset(position)
    }

    pub fn reference_span(&self, caret: i64) -> Option<TextRange> {
        if self.is_cancelled() {
            return None;
        }
        let mut cursor = TokenCursor::new(&self.snapshot.tokens);
        ReferenceSpanFinder::new(&self.config).find(&mut cursor, caret, &self.snapshot.model)
    }

    pub fn occurrence_at(&self, caret: i64) -> Option<Occurrence<'_>> {
        let span = self.reference_span(caret)?;
        OccurrenceResolver::new(&self.snapshot.model)
            .with_cancellation(self.cancel.clone())
            .occurrence_at(span)
    }

    pub fn goto_declaration(&self, caret: i64) -> Option<GotoResult> {
        let occurrence = self.occurrence_at(caret)?;
        goto_declaration(&occurrence, self.snapshot.file)
    }

    /// Ranges to highlight for the symbol at `caret`; empty when there is
    /// none.
    pub fn mark_occurrences(&self, caret: i64) -> Vec<TextRange> {
        self.occurrence_at(caret)
            .and_then(|occurrence| occurrence.mark_occurrences().map(<[_]>::to_vec))
            .unwrap_or_default()
    }

    /// Resolve the caret in one go. The same caret always gives the same
    /// answer.
    pub fn run(&self, caret: i64) -> Option<CaretResolution> {
        let occurrence = self.occurrence_at(caret)?;
        let occurrences = occurrence.mark_occurrences()?.to_vec();
        let goto = goto_declaration(&occurrence, self.snapshot.file);
        let declarations = occurrence
            .declarations()
            .filter_map(|decl| {
                Some(Location {
                    file: decl.file?,
                    range: decl.name_range,
                    name: SmolStr::new(decl.display_name()),
                })
            })
            .collect();
        if self.is_cancelled() {
            return None;
        }
        Some(CaretResolution {
            span: occurrence.range(),
            kind: occurrence.kind(),
            accuracy: occurrence.accuracy(),
            declarations,
            occurrences,
            goto,
        })
    }

    /// Used/unused/deprecated classification of every member site.
    pub fn highlights(&self) -> Option<Vec<MemberHighlight>> {
        let ast = self.snapshot.ast.as_ref()?;
        let deprecated = DeprecatedMembers::from_index(self.snapshot.model.index());
        member_highlights(ast, &deprecated, &self.cancel)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let Some(highlights) = self.highlights() else {
            return Vec::new();
        };
        member_diagnostics(self.snapshot.file, &self.snapshot.line_index, &highlights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn caret(text: &str, needle: &str) -> i64 {
        text.find(needle).unwrap() as i64
    }

    #[test]
    fn test_run_is_idempotent() {
        let host = AnalysisHost::new();
        let text = "<?php\nfunction f() { $x = 1; return $x; }\n";
        let file = host.set_file_content("/a.php", text);
        let analysis = host.analysis(file).unwrap();

        let first = analysis.run(caret(text, "$x")).unwrap();
        let second = analysis.run(caret(text, "$x")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.occurrences.len(), 2);
        assert_eq!(first.accuracy, Accuracy::Exact);
    }

    #[test]
    fn test_cancelled_analysis_returns_nothing() {
        let host = AnalysisHost::new();
        let text = "<?php\n$x = 1;\n";
        let file = host.set_file_content("/a.php", text);
        let analysis = host.analysis(file).unwrap();
        analysis.cancel();
        assert!(analysis.run(caret(text, "$x")).is_none());
        assert!(analysis.mark_occurrences(caret(text, "$x")).is_empty());
    }

    #[test]
    fn test_pending_snapshot_times_out() {
        let host = AnalysisHost::with_config(
            AnalysisConfig::default().with_parse_timeout(Duration::from_millis(10)),
        );
        let file = host.set_file_content("/a.php", "<?php\n");
        host.invalidate(file);
        assert!(host.wait_for_snapshot(file).is_none());
        assert!(host.snapshot(file).is_some());
    }

    #[test]
    fn test_old_snapshot_is_isolated() {
        let host = AnalysisHost::new();
        let file = host.set_file_content("/a.php", "<?php\n$old = 1;\n");
        let before = host.analysis(file).unwrap();
        host.set_file_content("/a.php", "<?php\n$new = 1;\n");
        let after = host.analysis(file).unwrap();

        assert!(before.snapshot().text().contains("$old"));
        assert!(after.snapshot().text().contains("$new"));
        assert!(before.run(7).is_some());
    }

    #[test]
    fn test_offset_at_line_col() {
        let host = AnalysisHost::new();
        let file = host.set_file_content("/a.php", "<?php\n$x = 1;\n");
        let analysis = host.analysis(file).unwrap();
        assert_eq!(analysis.offset_at(LineCol { line: 1, col: 1 }), Some(TextSize::from(7)));
    }
}
