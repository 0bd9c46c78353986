//! IDE features: caret-driven requests on top of the HIR.
//!
//! Each request takes a caret offset into one [`Snapshot`] and returns plain
//! values (ranges, ids, labels); nothing here knows about an editor or a
//! protocol.
//!
//! ## Usage
//!
//! The recommended way to use this module is through `AnalysisHost`:
//!
//! ```ignore
//! use pharos::ide::AnalysisHost;
//!
//! let host = AnalysisHost::new();
//! let file = host.set_file_content("/src/User.php", "<?php class User {}");
//!
//! let analysis = host.analysis(file)?;
//! let marks = analysis.mark_occurrences(caret);
//! let target = analysis.goto_declaration(caret);
//! ```

mod analysis;
mod goto;
mod occurrences;
mod reference_span;

pub use analysis::{Analysis, AnalysisHost, CaretResolution, Snapshot};
pub use goto::{AlternativeLocation, GotoResult, Location, goto_declaration};
pub use occurrences::{Accuracy, Occurrence, OccurrenceKind, OccurrenceResolver};
pub use reference_span::ReferenceSpanFinder;
