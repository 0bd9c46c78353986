//! Diagnostics for member highlights.
//!
//! Unused private members and uses of deprecated members become
//! [`Diagnostic`]s with line/column positions.

use std::sync::Arc;

use super::unused::{HighlightSite, MemberHighlight, MemberKind};
use crate::base::{FileId, LineIndex, TextRange};

// ============================================================================
// DIAGNOSTIC TYPES
// ============================================================================

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    /// Convert to LSP severity number.
    pub fn to_lsp(&self) -> u32 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
            Severity::Hint => 4,
        }
    }
}

/// A diagnostic message with location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: FileId,
    pub range: TextRange,
    /// Start line (0-indexed).
    pub start_line: u32,
    /// Start column (0-indexed).
    pub start_col: u32,
    /// End line (0-indexed).
    pub end_line: u32,
    /// End column (0-indexed).
    pub end_col: u32,
    pub severity: Severity,
    /// Warning code (e.g., "W0001").
    pub code: Option<Arc<str>>,
    pub message: Arc<str>,
}

impl Diagnostic {
    /// A diagnostic over `range`, positioned with `lines`.
    pub fn new(
        file: FileId,
        range: TextRange,
        lines: &LineIndex,
        severity: Severity,
        message: impl Into<Arc<str>>,
    ) -> Self {
        let start = lines.line_col(range.start());
        let end = lines.line_col(range.end());
        Self {
            file,
            range,
            start_line: start.line,
            start_col: start.col,
            end_line: end.line,
            end_col: end.col,
            severity,
            code: None,
            message: message.into(),
        }
    }

    /// Set the warning code.
    pub fn with_code(mut self, code: impl Into<Arc<str>>) -> Self {
        self.code = Some(code.into());
        self
    }
}

// ============================================================================
// DIAGNOSTIC CODES
// ============================================================================

pub mod codes {
    /// Private member never used inside its type.
    pub const UNUSED_SYMBOL: &str = "W0001";
    /// Use or declaration of a deprecated member.
    pub const DEPRECATED: &str = "W0002";
}

fn describe(kind: MemberKind) -> &'static str {
    match kind {
        MemberKind::Method => "method",
        MemberKind::Field => "field",
        MemberKind::Constant => "constant",
        MemberKind::EnumCase => "enum case",
    }
}

/// Diagnostics for the highlights of one file, in highlight order.
pub fn member_diagnostics(
    file: FileId,
    lines: &LineIndex,
    highlights: &[MemberHighlight],
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for highlight in highlights {
        if highlight.unused {
            diagnostics.push(
                Diagnostic::new(
                    file,
                    highlight.range,
                    lines,
                    Severity::Warning,
                    format!("unused private {}: '{}'", describe(highlight.kind), highlight.name),
                )
                .with_code(codes::UNUSED_SYMBOL),
            );
        }
        if highlight.deprecated && highlight.site == HighlightSite::Reference {
            diagnostics.push(
                Diagnostic::new(
                    file,
                    highlight.range,
                    lines,
                    Severity::Hint,
                    format!("'{}' is deprecated", highlight.name),
                )
                .with_code(codes::DEPRECATED),
            );
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol_str::SmolStr;

    fn highlight(name: &str, start: u32, site: HighlightSite) -> MemberHighlight {
        MemberHighlight {
            name: SmolStr::new(name),
            range: TextRange::at(start.into(), (name.len() as u32).into()),
            kind: MemberKind::Method,
            site,
            unused: false,
            is_static: false,
            deprecated: false,
        }
    }

    #[test]
    fn test_unused_member_is_a_warning() {
        let lines = LineIndex::new("<?php\nclass A { private function run() {} }\n");
        let mut run = highlight("run", 33, HighlightSite::Declaration);
        run.unused = true;

        let diagnostics = member_diagnostics(FileId::new(0), &lines, &[run]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[0].code.as_deref(), Some("W0001"));
        assert_eq!((diagnostics[0].start_line, diagnostics[0].start_col), (1, 27));
        assert!(diagnostics[0].message.contains("unused private method"));
    }

    #[test]
    fn test_deprecated_reference_is_a_hint() {
        let lines = LineIndex::new("<?php $x->old();");
        let mut old = highlight("old", 10, HighlightSite::Reference);
        old.deprecated = true;
        let mut declared = highlight("old", 0, HighlightSite::Declaration);
        declared.deprecated = true;

        let diagnostics = member_diagnostics(FileId::new(0), &lines, &[declared, old]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Hint);
        assert_eq!(diagnostics[0].code.as_deref(), Some(codes::DEPRECATED));
    }

    #[test]
    fn test_severity_to_lsp() {
        assert_eq!(Severity::Error.to_lsp(), 1);
        assert_eq!(Severity::Warning.to_lsp(), 2);
        assert_eq!(Severity::Info.to_lsp(), 3);
        assert_eq!(Severity::Hint.to_lsp(), 4);
    }
}
