//! Foundation types shared by every layer of the resolver.
//!
//! - [`FileId`] - identity of a source file inside one analysis session
//! - [`TextRange`], [`TextSize`] - byte offsets into a document
//! - [`LineCol`], [`LineIndex`] - line/column conversion for callers that
//!   speak editor positions
//!
//! This module has NO dependencies on other pharos modules.

mod file_id;
mod span;

pub use file_id::FileId;
pub use span::{LineCol, LineIndex, TextRange, TextSize, touches};

// Re-export text-size types for convenience
pub use text_size;
