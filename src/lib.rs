//! # pharos-base
//!
//! Caret-driven symbol resolution for PHP editor tooling: which token is the
//! reference, what it resolves to, where else it occurs, and which private
//! members are never used.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! ide     → Span finder, occurrences, goto-declaration, analysis host
//!   ↓
//! hir     → Scope model, declaration index, resolver, unused members
//!   ↓
//! syntax  → Lexer (logos), token cursor, doc comments, typed tree
//!   ↓
//! base    → Primitives (FileId, TextRange, LineIndex)
//! ```
//!
//! `config` sits beside the stack and is read by `ide`.

/// Foundation types: FileId, ranges, line index
pub mod base;

/// Limits for caret resolution
pub mod config;

/// Semantic model: scopes, declarations, resolution
pub mod hir;

/// IDE features: reference spans, occurrences, goto-declaration
pub mod ide;

/// Tokens, doc comments and the syntax tree
pub mod syntax;

pub use base::{FileId, LineCol, LineIndex, TextRange, TextSize};
pub use config::AnalysisConfig;
pub use ide::{Accuracy, Analysis, AnalysisHost, CaretResolution, Snapshot};
