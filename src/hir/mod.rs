//! HIR: the semantic model of one parse snapshot.
//!
//! Lowering turns a syntax tree into a [`ScopeModel`]: a tree of scopes,
//! the declarations visible from the file (its own plus those other project
//! files export) and every reference site. Everything here is immutable once
//! built; a new parse builds a new model.
//!
//! ## Usage
//!
//! ```ignore
//! use pharos::hir::{lower_file, ProjectIndex, Resolver};
//!
//! let tokens = pharos::syntax::lex(text);
//! let ast = pharos::syntax::parse(&tokens);
//! let model = lower_file(file, "/src/User.php", &tokens, &ast, &ProjectIndex::new());
//!
//! let site = model.reference_at(range)?;
//! let resolution = Resolver::new(&model).resolve_reference(site)?;
//! ```

mod diagnostics;
mod ids;
mod index;
mod input;
mod lower;
mod resolve;
mod scope;
mod source;
mod unused;

pub use diagnostics::{Diagnostic, Severity, codes, member_diagnostics};
pub use ids::{DeclId, RefId, ScopeId};
pub use index::{
    DeclFamily, DeclKind, Declaration, DeclarationIndex, DeprecationFilter, NewDeclaration,
};
pub use input::SourceRoot;
pub use lower::{anonymous_class_name, export_declarations, lower_file};
pub use resolve::{Accuracy, BUILTIN_TYPES, Resolution, Resolver, is_builtin_type};
pub use scope::{
    Ancestors, ModelError, NewReference, NewScope, Receiver, ReferenceKind, ReferenceSite, Scope,
    ScopeKind, ScopeModel, ScopeModelBuilder,
};
pub use source::{FileSet, IndexedFile, ProjectIndex};
pub use unused::{
    DeprecatedMembers, HighlightSite, MemberHighlight, MemberKind, TypeInfo, UnusedKey,
    UnusedMemberTracker, member_highlights,
};
