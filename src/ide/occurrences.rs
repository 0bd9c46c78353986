//! Occurrence resolution.
//!
//! An [`Occurrence`] is the symbol under a reference span: its kind, the
//! candidate declarations with their [`Accuracy`], and, computed on first
//! request, every other site of the same symbol in the document.

use once_cell::sync::OnceCell;
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::base::TextRange;
use crate::hir::{
    DeclFamily, DeclId, DeclKind, Declaration, ReferenceKind, Resolution, Resolver, ScopeId,
    ScopeModel,
};

pub use crate::hir::Accuracy;

/// What the caret is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OccurrenceKind {
    Reference(ReferenceKind),
    Declaration(DeclKind),
}

impl OccurrenceKind {
    pub fn family(self) -> DeclFamily {
        match self {
            OccurrenceKind::Reference(kind) => kind.family(),
            OccurrenceKind::Declaration(kind) => kind.family(),
        }
    }

    pub fn is_include_path(self) -> bool {
        self == OccurrenceKind::Reference(ReferenceKind::IncludePath)
    }
}

/// The resolved symbol at one reference span.
#[derive(Debug)]
pub struct Occurrence<'m> {
    model: &'m ScopeModel,
    kind: OccurrenceKind,
    /// Simple name, without namespace.
    name: SmolStr,
    range: TextRange,
    scope: ScopeId,
    resolution: Resolution,
    cancel: CancellationToken,
    all: OnceCell<Vec<TextRange>>,
}

impl<'m> Occurrence<'m> {
    /// The model this occurrence was resolved against.
    pub fn model(&self) -> &'m ScopeModel {
        self.model
    }

    pub fn kind(&self) -> OccurrenceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    /// Scope the occurrence was resolved from.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn accuracy(&self) -> Accuracy {
        self.resolution.accuracy
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn declaration_ids(&self) -> &[DeclId] {
        &self.resolution.declarations
    }

    pub fn declarations(&self) -> impl Iterator<Item = &'m Declaration> + '_ {
        let model = self.model;
        self.resolution
            .declarations
            .iter()
            .filter_map(move |&id| model.declaration(id))
    }

    /// Every site of this symbol, ordered by start offset.
    ///
    /// Ambiguous occurrences only report themselves. `None` when the
    /// traversal was cancelled; a later call retries.
    pub fn all_occurrences(&self) -> Option<&[TextRange]> {
        if !self.accuracy().is_actionable() {
            return Some(std::slice::from_ref(&self.range));
        }
        self.all
            .get_or_try_init(|| self.collect().ok_or(()))
            .ok()
            .map(Vec::as_slice)
    }

    /// Like [`all_occurrences`](Self::all_occurrences), but walks the
    /// document whatever the accuracy. Not cached.
    pub fn all_occurrences_forced(&self) -> Option<Vec<TextRange>> {
        match self.all.get() {
            Some(all) => Some(all.clone()),
            None => self.collect(),
        }
    }

    /// Occurrences for highlighting; include paths never take part.
    pub fn mark_occurrences(&self) -> Option<&[TextRange]> {
        if self.kind.is_include_path() {
            return Some(&[]);
        }
        self.all_occurrences()
    }

    fn resolver(&self) -> Resolver<'m> {
        Resolver::new(self.model)
    }

    fn names_match(&self, name: &str) -> bool {
        let family = self.kind.family();
        family == DeclFamily::File || family.names_match(simple_name(name), &self.name)
    }

    /// Types whose instance creations count as constructor calls.
    fn constructed_types(&self) -> Vec<DeclId> {
        if self.kind.family() != DeclFamily::Method || !self.name.eq_ignore_ascii_case("__construct") {
            return Vec::new();
        }
        let resolver = self.resolver();
        self.declarations()
            .filter(|decl| decl.kind == DeclKind::Method)
            .filter_map(|decl| resolver.owner_type(decl))
            .map(|owner| owner.id)
            .collect()
    }

    fn collect(&self) -> Option<Vec<TextRange>> {
        let resolver = self.resolver().with_cancellation(&self.cancel);
        let family = self.kind.family();
        let constructed = self.constructed_types();
        let mut ranges = vec![self.range];

        let mut stack = vec![self.model.root()];
        while let Some(id) = stack.pop() {
            if self.cancel.is_cancelled() {
                debug!(name = %self.name, "occurrence search cancelled");
                return None;
            }
            let Some(scope) = self.model.scope(id) else { continue };
            stack.extend(scope.children.iter().rev());

            for site in scope.references.iter().filter_map(|&r| self.model.reference(r)) {
                let creation = site.kind == ReferenceKind::InstanceCreation && !constructed.is_empty();
                let same_symbol = site.kind.family() == family && self.names_match(&site.name);
                if !same_symbol && !creation {
                    continue;
                }
                let Some(resolved) = resolver.resolve_reference(site) else { continue };
                let hits = if same_symbol {
                    resolved.intersects(&self.resolution)
                } else {
                    resolved.declarations.iter().any(|d| constructed.contains(d))
                };
                if hits {
                    ranges.push(site.range);
                }
            }

            for decl in scope.declarations.iter().filter_map(|&d| self.model.declaration(d)) {
                if decl.family() != family || !self.names_match(&decl.name) {
                    continue;
                }
                let declared = self.resolution.declarations.contains(&decl.id)
                    || resolver
                        .clone()
                        .with_scope(id)
                        .resolve_declaration(decl)
                        .is_some_and(|r| r.intersects(&self.resolution));
                if declared {
                    ranges.push(decl.name_range);
                }
            }
        }
        if self.cancel.is_cancelled() {
            return None;
        }

        ranges.sort_by_key(|r| (r.start(), r.end()));
        ranges.dedup();
        trace!(name = %self.name, count = ranges.len(), "collected occurrences");
        Some(ranges)
    }
}

/// Name without namespace or leading `\`.
fn simple_name(name: &str) -> &str {
    name.rsplit('\\').next().unwrap_or(name)
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Builds [`Occurrence`]s from reference spans of one model.
#[derive(Clone, Debug)]
pub struct OccurrenceResolver<'m> {
    model: &'m ScopeModel,
    cancel: CancellationToken,
}

impl<'m> OccurrenceResolver<'m> {
    pub fn new(model: &'m ScopeModel) -> Self {
        Self {
            model,
            cancel: CancellationToken::new(),
        }
    }

    /// Occurrences created from here poll `token`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The occurrence at `span`, or `None` when nothing there resolves.
    pub fn occurrence_at(&self, span: TextRange) -> Option<Occurrence<'m>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let resolver = Resolver::new(self.model).with_cancellation(&self.cancel);
        let site = self.model.reference_at(span);
        let decl = self.model.declaration_at(span);
        let prefer_declaration = match (site, decl) {
            (Some(site), Some(decl)) => site.range != span && decl.name_range == span,
            (None, Some(_)) => true,
            _ => false,
        };

        let (kind, name, range, scope, resolution) = match (prefer_declaration, site, decl) {
            (true, _, Some(decl)) => {
                let scope = decl.scope.unwrap_or(self.model.root());
                let resolution = resolver.clone().with_scope(scope).resolve_declaration(decl)?;
                (
                    OccurrenceKind::Declaration(decl.kind),
                    decl.name.clone(),
                    decl.name_range,
                    scope,
                    resolution,
                )
            }
            (false, Some(site), _) => {
                let resolution = resolver.resolve_reference(site)?;
                let name = if site.kind == ReferenceKind::IncludePath {
                    site.name.clone()
                } else {
                    SmolStr::new(simple_name(&site.name))
                };
                (OccurrenceKind::Reference(site.kind), name, site.range, site.scope, resolution)
            }
            _ => return None,
        };
        trace!(%name, ?kind, accuracy = ?resolution.accuracy, "occurrence");
        Some(Occurrence {
            model: self.model,
            kind,
            name,
            range,
            scope,
            resolution,
            cancel: self.cancel.clone(),
            all: OnceCell::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{FileId, TextSize};
    use crate::hir::{ProjectIndex, lower_file};
    use crate::syntax::{lex, parse};

    fn model(text: &str) -> ScopeModel {
        let tokens = lex(text);
        let ast = parse(&tokens);
        lower_file(FileId::new(0), "/t.php", &tokens, &ast, &ProjectIndex::new())
    }

    fn span(text: &str, needle: &str, nth: usize) -> TextRange {
        let start = text.match_indices(needle).nth(nth).unwrap().0;
        TextRange::at(TextSize::from(start as u32), TextSize::of(needle))
    }

    fn texts<'t>(text: &'t str, ranges: &[TextRange]) -> Vec<&'t str> {
        ranges
            .iter()
            .map(|r| &text[usize::from(r.start())..usize::from(r.end())])
            .collect()
    }

    #[test]
    fn test_variable_occurrences_are_sorted() {
        let text = "<?php\nfunction f() {\n    $a = 1;\n    echo $a + $a;\n}\n$a = 2;\n";
        let model = model(text);
        let occurrence = OccurrenceResolver::new(&model)
            .occurrence_at(span(text, "$a", 1))
            .unwrap();
        assert_eq!(occurrence.accuracy(), Accuracy::Exact);
        let all = occurrence.all_occurrences().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].start() < w[1].start()));
    }

    #[test]
    fn test_method_occurrences_include_declaration() {
        let text = "<?php\nclass A {\n    function run() {}\n    function go() { $this->run(); $this->run(); }\n}\n";
        let model = model(text);
        let occurrence = OccurrenceResolver::new(&model)
            .occurrence_at(span(text, "run", 2))
            .unwrap();
        let all = occurrence.all_occurrences().unwrap();
        assert_eq!(texts(text, all), vec!["run", "run", "run"]);
        assert_eq!(all[0], span(text, "run", 0));
    }

    #[test]
    fn test_constructor_occurrences_include_instance_creations() {
        let text = "<?php\nclass A {\n    function __construct() {}\n}\nnew A();\n";
        let model = model(text);
        let occurrence = OccurrenceResolver::new(&model)
            .occurrence_at(span(text, "__construct", 0))
            .unwrap();
        let all = occurrence.all_occurrences().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], span(text, "A", 1));
    }

    #[test]
    fn test_ambiguous_occurrence_reports_only_itself() {
        let text = "<?php\nclass A { function x() {} }\nclass B { function x() {} }\n$o->x();\n";
        let model = model(text);
        let occurrence = OccurrenceResolver::new(&model)
            .occurrence_at(span(text, "x", 2))
            .unwrap();
        assert_eq!(occurrence.accuracy(), Accuracy::More);
        assert_eq!(occurrence.all_occurrences().unwrap(), &[occurrence.range()]);
        // both declarations of `x` share the candidates once accuracy is ignored
        assert_eq!(occurrence.all_occurrences_forced().unwrap().len(), 3);
    }

    #[test]
    fn test_unresolved_include_has_no_occurrence() {
        let text = "<?php\nrequire 'a.php';\n";
        let model = model(text);
        let site = model.references().iter().find(|s| s.kind == ReferenceKind::IncludePath);
        assert!(site.is_some());
        // nothing to resolve against, so there is no occurrence at all
        assert!(OccurrenceResolver::new(&model).occurrence_at(span(text, "a.php", 0)).is_none());
    }

    #[test]
    fn test_cancellation_does_not_poison_cache() {
        let text = "<?php\n$a = 1;\necho $a;\n";
        let model = model(text);
        let token = CancellationToken::new();
        let resolver = OccurrenceResolver::new(&model).with_cancellation(token.clone());
        let occurrence = resolver.occurrence_at(span(text, "$a", 0)).unwrap();
        token.cancel();
        assert!(occurrence.all_occurrences().is_none());
        assert!(occurrence.all.get().is_none());
    }
}
