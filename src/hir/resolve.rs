//! Name resolution: reference sites and declaration sites to declarations.
//!
//! Resolution is query-time and read-only. A [`Resolver`] is positioned at a
//! scope of one [`ScopeModel`] and answers PHP name lookups from there:
//!
//! 1. **Qualification** - relative names are expanded through `use` aliases
//!    and the enclosing namespace ([`Resolver::qualify`])
//! 2. **Hierarchy walks** - member lookups follow parents, interfaces, traits
//!    and mixins, most-derived first ([`Resolver::members_in_hierarchy`])
//! 3. **Classification** - every resolution carries an [`Accuracy`] telling
//!    how ambiguous the candidate set is
//!
//! Names stored on declarations of the current file (supertypes, variable
//! types) are kept as written and qualified lazily against the declaring
//! scope; names on indexed declarations of other files are already fully
//! qualified.

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::ids::{DeclId, ScopeId};
use super::index::{DeclFamily, DeclKind, Declaration, DeprecationFilter};
use super::scope::{ReferenceKind, ReferenceSite, Receiver, ScopeKind, ScopeModel};
use crate::syntax::ast::{TypeKind, UseKind};

// ============================================================================
// ACCURACY
// ============================================================================

/// Confidence of a resolution, weakest first so that `Ord` follows
/// confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Accuracy {
    /// Several unrelated declarations share the name.
    More,
    /// The receiver has several possible types, none declaring the member.
    MoreTypes,
    /// Several members of the receiver's type hierarchy match.
    MoreMembers,
    /// The receiver type is known but does not declare the member.
    ExactType,
    Exact,
    /// The name is declared exactly once in the whole project.
    Unique,
}

impl Accuracy {
    /// Whether collecting all occurrences is worth it.
    pub fn is_actionable(self) -> bool {
        self >= Accuracy::MoreMembers
    }

    /// Ambiguous between unrelated candidates.
    pub fn is_ambiguous(self) -> bool {
        matches!(self, Accuracy::More | Accuracy::MoreTypes)
    }
}

/// Candidate declarations of a site together with their accuracy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub accuracy: Accuracy,
    /// Candidates in discovery order, without duplicates.
    pub declarations: Vec<DeclId>,
}

impl Resolution {
    fn from_candidates(accuracy: Accuracy, decls: impl IntoIterator<Item = DeclId>) -> Option<Self> {
        let mut seen = FxHashSet::default();
        let declarations: Vec<_> = decls.into_iter().filter(|id| seen.insert(*id)).collect();
        if declarations.is_empty() {
            None
        } else {
            Some(Self {
                accuracy,
                declarations,
            })
        }
    }

    pub fn intersects(&self, other: &Resolution) -> bool {
        self.declarations.iter().any(|id| other.declarations.contains(id))
    }
}

/// Names that never denote a user type.
pub const BUILTIN_TYPES: &[&str] = &[
    "array", "bool", "boolean", "callable", "double", "false", "float", "int", "integer",
    "iterable", "mixed", "never", "null", "numeric", "object", "parent", "resource", "self",
    "static", "string", "true", "void", "$this",
];

pub fn is_builtin_type(name: &str) -> bool {
    BUILTIN_TYPES.iter().any(|b| b.eq_ignore_ascii_case(name))
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Resolver for lookups from one scope of a [`ScopeModel`].
#[derive(Clone, Debug)]
pub struct Resolver<'a> {
    model: &'a ScopeModel,
    scope: ScopeId,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver positioned at the file scope.
    pub fn new(model: &'a ScopeModel) -> Self {
        Self {
            model,
            scope: model.root(),
            cancel: None,
        }
    }

    /// Set the current scope.
    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = scope;
        self
    }

    /// Poll `token` during hierarchy walks; a cancelled resolver resolves
    /// nothing.
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(CancellationToken::is_cancelled)
    }

    fn at(&self, scope: Option<ScopeId>) -> Self {
        Self {
            model: self.model,
            scope: scope.unwrap_or(self.model.root()),
            cancel: self.cancel,
        }
    }

    // ------------------------------------------------------------------------
    // Namespaces and aliases
    // ------------------------------------------------------------------------

    /// The namespace or file scope that owns `use` statements for the
    /// current scope.
    fn container(&self) -> Option<ScopeId> {
        self.model
            .ancestors(self.scope)
            .find(|scope| matches!(scope.kind, ScopeKind::Namespace | ScopeKind::File))
            .map(|scope| scope.id)
    }

    /// Name of the enclosing namespace; empty for the global namespace.
    pub fn namespace(&self) -> &'a str {
        self.model
            .ancestors(self.scope)
            .find(|scope| scope.kind == ScopeKind::Namespace)
            .map(|scope| scope.name.as_str())
            .unwrap_or("")
    }

    /// The alias declaration `name` refers to in the current namespace.
    pub fn use_alias(&self, name: &str, kind: UseKind) -> Option<&'a Declaration> {
        let container = self.model.scope(self.container()?)?;
        container
            .children
            .iter()
            .filter_map(|&child| self.model.scope(child))
            .filter(|scope| scope.kind == ScopeKind::Use)
            .flat_map(|scope| scope.declarations.iter())
            .filter_map(|&id| self.model.declaration(id))
            .find(|decl| {
                decl.kind == DeclKind::UseAlias(kind)
                    && DeclFamily::UseAlias.names_match(&decl.name, name)
            })
    }

    fn alias_target(&self, name: &str, kind: UseKind) -> Option<&'a str> {
        self.use_alias(name, kind)
            .and_then(|decl| decl.alias_target.as_deref())
    }

    /// Candidate fully qualified names for `name` as written, in lookup
    /// order.
    pub fn qualify(&self, name: &str, family: DeclFamily) -> Vec<SmolStr> {
        if let Some(absolute) = name.strip_prefix('\\') {
            return vec![SmolStr::new(absolute)];
        }
        if name.is_empty() {
            return Vec::new();
        }
        let namespace = self.namespace();
        let prefixed = |name: &str| {
            if namespace.is_empty() {
                SmolStr::new(name)
            } else {
                SmolStr::new(format!("{}\\{}", namespace, name))
            }
        };

        if let Some((first, rest)) = name.split_once('\\') {
            if first.eq_ignore_ascii_case("namespace") {
                return vec![prefixed(rest)];
            }
            return match self.alias_target(first, UseKind::Type) {
                Some(target) => vec![SmolStr::new(format!("{}\\{}", target, rest))],
                None => vec![prefixed(name)],
            };
        }

        match family {
            DeclFamily::Function | DeclFamily::Constant => {
                let kind = if family == DeclFamily::Function {
                    UseKind::Function
                } else {
                    UseKind::Constant
                };
                if let Some(target) = self.alias_target(name, kind) {
                    return vec![SmolStr::new(target)];
                }
                let mut candidates = vec![prefixed(name)];
                if !namespace.is_empty() {
                    candidates.push(SmolStr::new(name));
                }
                candidates
            }
            _ => match self.alias_target(name, UseKind::Type) {
                Some(target) => vec![SmolStr::new(target)],
                None => vec![prefixed(name)],
            },
        }
    }

    /// First non-empty lookup over the qualified candidates of `name`.
    fn find_qualified(&self, name: &str, family: DeclFamily) -> Vec<&'a Declaration> {
        for candidate in self.qualify(name, family) {
            let found = self.model.index().find(family, &candidate, DeprecationFilter::All);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    /// The type declaration whose body holds the current scope.
    pub fn enclosing_type(&self) -> Option<&'a Declaration> {
        self.model
            .ancestors(self.scope)
            .find(|scope| scope.kind.is_type())
            .and_then(|scope| scope.declaration)
            .and_then(|id| self.model.declaration(id))
    }

    /// Type declarations `name` denotes here; handles `self`, `static` and
    /// `parent`.
    pub fn resolve_type_name(&self, name: &str) -> Vec<&'a Declaration> {
        if name.eq_ignore_ascii_case("self") || name.eq_ignore_ascii_case("static") {
            return self.enclosing_type().into_iter().collect();
        }
        if name.eq_ignore_ascii_case("parent") {
            return self
                .enclosing_type()
                .and_then(|ty| self.parent_class(ty))
                .into_iter()
                .collect();
        }
        if is_builtin_type(name) {
            return Vec::new();
        }
        self.find_qualified(name, DeclFamily::Type)
    }

    /// Resolve a name stored on `owner` (a supertype or a value type).
    fn resolve_stored_type(&self, owner: &Declaration, name: &str) -> Vec<&'a Declaration> {
        if owner.scope.is_some() {
            self.at(owner.scope).resolve_type_name(name)
        } else {
            self.model
                .index()
                .find(DeclFamily::Type, name, DeprecationFilter::All)
        }
    }

    /// Direct supertypes of `ty` that resolve to known declarations.
    pub fn supertypes(&self, ty: &Declaration) -> Vec<&'a Declaration> {
        ty.supertypes
            .iter()
            .flat_map(|name| self.resolve_stored_type(ty, name))
            .collect()
    }

    /// The class `ty` extends.
    pub fn parent_class(&self, ty: &Declaration) -> Option<&'a Declaration> {
        self.supertypes(ty)
            .into_iter()
            .find(|decl| decl.kind == DeclKind::Type(TypeKind::Class))
    }

    /// Types a member access on `receiver` may dispatch on.
    pub fn receiver_types(&self, receiver: &Receiver) -> Vec<&'a Declaration> {
        match receiver {
            Receiver::This | Receiver::SelfType | Receiver::Static => {
                self.enclosing_type().into_iter().collect()
            }
            Receiver::Parent => self
                .enclosing_type()
                .and_then(|ty| self.parent_class(ty))
                .into_iter()
                .collect(),
            Receiver::Named(name) => self.resolve_type_name(name),
            Receiver::Variable(name) => {
                let Some(var) = self.variable(name) else {
                    return Vec::new();
                };
                let mut types: Vec<&Declaration> = Vec::new();
                for ty in &var.types {
                    for decl in self.resolve_stored_type(var, ty) {
                        if !types.iter().any(|t| t.id == decl.id) {
                            types.push(decl);
                        }
                    }
                }
                types
            }
            Receiver::None | Receiver::Unknown => Vec::new(),
        }
    }

    /// Members named `name` visible on `ty`: its own declarations, else the
    /// closest ones up each branch of the hierarchy. Cycle-safe.
    pub fn members_in_hierarchy(
        &self,
        ty: &'a Declaration,
        family: DeclFamily,
        name: &str,
    ) -> Vec<&'a Declaration> {
        let mut found: Vec<&Declaration> = Vec::new();
        let mut visited = FxHashSet::default();
        let mut queue = std::collections::VecDeque::from([ty]);

        while let Some(current) = queue.pop_front() {
            if self.cancelled() {
                return Vec::new();
            }
            if !visited.insert(current.id) {
                continue;
            }
            let own = self
                .model
                .index()
                .member(&current.qualified_name, family, name);
            if own.is_empty() {
                queue.extend(self.supertypes(current));
            } else {
                for member in own {
                    if !found.iter().any(|f| f.id == member.id) {
                        found.push(member);
                    }
                }
            }
        }
        found
    }

    // ------------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------------

    /// The declaration of variable `name` visible from the current scope.
    pub fn variable(&self, name: &str) -> Option<&'a Declaration> {
        self.model
            .variable(self.scope, name)
            .and_then(|id| self.model.declaration(id))
    }

    // ------------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------------

    /// Resolve a reference site of the model.
    pub fn resolve_reference(&self, site: &ReferenceSite) -> Option<Resolution> {
        if self.cancelled() {
            return None;
        }
        let here = self.at(Some(site.scope));
        let index = self.model.index();
        let ids = |decls: Vec<&Declaration>| decls.into_iter().map(|d| d.id).collect::<Vec<_>>();

        let resolution = match site.kind {
            ReferenceKind::Variable => {
                Resolution::from_candidates(Accuracy::Exact, here.variable(&site.name).map(|d| d.id))
            }
            ReferenceKind::Function => Resolution::from_candidates(
                Accuracy::Exact,
                ids(here.find_qualified(&site.name, DeclFamily::Function)),
            ),
            ReferenceKind::Constant => Resolution::from_candidates(
                Accuracy::Exact,
                ids(here.find_qualified(&site.name, DeclFamily::Constant)),
            ),
            ReferenceKind::TypeName | ReferenceKind::InstanceCreation | ReferenceKind::DocType => {
                Resolution::from_candidates(Accuracy::Exact, ids(here.resolve_type_name(&site.name)))
            }
            ReferenceKind::Namespace => {
                let found = here
                    .qualify(&site.name, DeclFamily::Namespace)
                    .into_iter()
                    .flat_map(|q| index.find(DeclFamily::Namespace, &q, DeprecationFilter::All))
                    .map(|d| d.id);
                Resolution::from_candidates(Accuracy::Exact, found)
            }
            ReferenceKind::UseAlias => Resolution::from_candidates(
                Accuracy::Exact,
                here.use_alias(&site.name, UseKind::Type).map(|d| d.id),
            ),
            ReferenceKind::IncludePath => {
                let files: Vec<_> = self.model.source_root().files_ending_with(&site.name).collect();
                let found = files.into_iter().flat_map(|file| {
                    index
                        .in_file(file)
                        .filter(|decl| decl.kind == DeclKind::File)
                        .map(|decl| decl.id)
                });
                Resolution::from_candidates(Accuracy::Exact, found)
            }
            ReferenceKind::Method | ReferenceKind::Field => {
                let types = here.receiver_types(&site.receiver);
                here.classify_member(site.kind.family(), &site.name, types)
            }
            ReferenceKind::StaticMethod | ReferenceKind::StaticField | ReferenceKind::ClassConstant => {
                let types = here.receiver_types(&site.receiver);
                let members = types
                    .into_iter()
                    .flat_map(|ty| here.members_in_hierarchy(ty, site.kind.family(), &site.name))
                    .map(|d| d.id)
                    .collect::<Vec<_>>();
                Resolution::from_candidates(Accuracy::Exact, members)
            }
        };
        trace!(
            name = %site.name,
            kind = ?site.kind,
            accuracy = ?resolution.as_ref().map(|r| r.accuracy),
            candidates = resolution.as_ref().map_or(0, |r| r.declarations.len()),
            "resolved reference"
        );
        resolution
    }

    /// Resolve the name of a declaration (a caret on a declaration site).
    pub fn resolve_declaration(&self, decl: &'a Declaration) -> Option<Resolution> {
        if self.cancelled() {
            return None;
        }
        let index = self.model.index();
        let same_name = |family: DeclFamily| {
            let found = index.find(family, &decl.qualified_name, DeprecationFilter::All);
            let ids: Vec<_> = found.into_iter().map(|d| d.id).collect();
            if ids.is_empty() { vec![decl.id] } else { ids }
        };
        match decl.kind {
            DeclKind::File => None,
            DeclKind::Namespace => Resolution::from_candidates(Accuracy::Exact, same_name(DeclFamily::Namespace)),
            DeclKind::Type(_) => Resolution::from_candidates(Accuracy::Exact, same_name(DeclFamily::Type)),
            DeclKind::Function => Resolution::from_candidates(Accuracy::Exact, same_name(DeclFamily::Function)),
            DeclKind::Constant => Resolution::from_candidates(Accuracy::Exact, same_name(DeclFamily::Constant)),
            DeclKind::Method | DeclKind::Field => {
                let owner = self.owner_type(decl);
                self.classify_member(decl.family(), &decl.name, owner.into_iter().collect())
            }
            DeclKind::ClassConstant
            | DeclKind::EnumCase
            | DeclKind::Variable
            | DeclKind::UseAlias(_) => Resolution::from_candidates(Accuracy::Exact, [decl.id]),
        }
    }

    /// The type declaring member `decl`.
    pub fn owner_type(&self, decl: &Declaration) -> Option<&'a Declaration> {
        let from_scope = decl
            .scope
            .and_then(|id| self.model.scope(id))
            .and_then(|scope| scope.declaration)
            .and_then(|id| self.model.declaration(id))
            .filter(|owner| owner.family() == DeclFamily::Type);
        from_scope.or_else(|| {
            let owner = decl.owner.as_deref()?;
            self.model
                .index()
                .find(DeclFamily::Type, owner, DeprecationFilter::All)
                .into_iter()
                .next()
        })
    }

    /// Accuracy of an instance member lookup: a project-wide unique name
    /// wins outright, otherwise the receiver types narrow the candidates.
    fn classify_member(
        &self,
        family: DeclFamily,
        name: &str,
        types: Vec<&'a Declaration>,
    ) -> Option<Resolution> {
        let global = self.model.index().named(family, name);
        if global.len() == 1 {
            return Resolution::from_candidates(Accuracy::Unique, global.into_iter().map(|d| d.id));
        }
        if types.is_empty() {
            return Resolution::from_candidates(Accuracy::More, global.into_iter().map(|d| d.id));
        }

        let mut members: Vec<DeclId> = Vec::new();
        if !global.is_empty() {
            for ty in &types {
                if self.cancelled() {
                    return None;
                }
                for member in self.members_in_hierarchy(ty, family, name) {
                    if !members.contains(&member.id) {
                        members.push(member.id);
                    }
                }
            }
        }
        let type_ids = types.iter().map(|t| t.id);
        match (members.len(), types.len()) {
            (0, 1) => Resolution::from_candidates(Accuracy::ExactType, type_ids),
            (0, _) => Resolution::from_candidates(Accuracy::MoreTypes, type_ids),
            (1, _) => Resolution::from_candidates(Accuracy::Exact, members),
            _ => Resolution::from_candidates(Accuracy::MoreMembers, members),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{FileId, TextRange, TextSize};
    use crate::hir::index::NewDeclaration;
    use crate::hir::scope::{NewReference, NewScope, ScopeModelBuilder};

    fn range(start: u32, end: u32) -> TextRange {
        TextRange::new(start.into(), end.into())
    }

    struct Fixture {
        builder: ScopeModelBuilder,
        namespace: ScopeId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut builder = ScopeModelBuilder::new(FileId::new(0), "/app/a.php", TextSize::from(1000));
            let root = builder.root();
            let ns_decl = builder
                .declare(root, NewDeclaration::new(DeclKind::Namespace, "App", range(16, 19)))
                .unwrap();
            let namespace = builder
                .open_scope(
                    root,
                    NewScope::new(ScopeKind::Namespace, "App", range(16, 19))
                        .with_block(Some(range(6, 1000)))
                        .with_declaration(ns_decl),
                )
                .unwrap();
            Self { builder, namespace }
        }

        fn class(&mut self, name: &str, at: u32, supertypes: &[&str]) -> (DeclId, ScopeId) {
            let decl = self
                .builder
                .declare(
                    self.namespace,
                    NewDeclaration::new(DeclKind::Type(TypeKind::Class), name, range(at, at + 1))
                        .with_qualified_name(format!("App\\{}", name))
                        .with_supertypes(supertypes.iter().map(|s| SmolStr::new(*s)).collect()),
                )
                .unwrap();
            let scope = self
                .builder
                .open_scope(
                    self.namespace,
                    NewScope::new(ScopeKind::Type(TypeKind::Class), name, range(at, at + 1))
                        .with_block(Some(range(at + 2, at + 90)))
                        .with_declaration(decl),
                )
                .unwrap();
            (decl, scope)
        }

        fn method(&mut self, class: ScopeId, owner: &str, name: &str, at: u32) -> (DeclId, ScopeId) {
            let decl = self
                .builder
                .declare(
                    class,
                    NewDeclaration::new(DeclKind::Method, name, range(at, at + 1))
                        .with_owner(format!("App\\{}", owner)),
                )
                .unwrap();
            let scope = self
                .builder
                .open_scope(
                    class,
                    NewScope::new(ScopeKind::Method, name, range(at, at + 1))
                        .with_block(Some(range(at + 1, at + 20)))
                        .with_declaration(decl),
                )
                .unwrap();
            (decl, scope)
        }
    }

    #[test]
    fn test_qualify_uses_aliases_and_namespace() {
        let mut fx = Fixture::new();
        let use_scope = fx
            .builder
            .open_scope(fx.namespace, NewScope::new(ScopeKind::Use, "", range(30, 50)))
            .unwrap();
        fx.builder
            .declare(
                use_scope,
                NewDeclaration::new(DeclKind::UseAlias(UseKind::Type), "Db", range(44, 46))
                    .with_alias_target("Lib\\Database"),
            )
            .unwrap();
        let model = fx.builder.build();
        let resolver = Resolver::new(&model).with_scope(fx.namespace);

        assert_eq!(resolver.namespace(), "App");
        assert_eq!(resolver.qualify("Db", DeclFamily::Type), vec!["Lib\\Database"]);
        assert_eq!(resolver.qualify("db\\Conn", DeclFamily::Type), vec!["Lib\\Database\\Conn"]);
        assert_eq!(resolver.qualify("User", DeclFamily::Type), vec!["App\\User"]);
        assert_eq!(resolver.qualify("\\Other\\X", DeclFamily::Type), vec!["Other\\X"]);
        assert_eq!(
            resolver.qualify("strlen", DeclFamily::Function),
            vec!["App\\strlen", "strlen"]
        );
    }

    #[test]
    fn test_members_in_hierarchy_prefers_most_derived() {
        let mut fx = Fixture::new();
        let (_, base) = fx.class("Base", 100, &[]);
        let (base_m, _) = fx.method(base, "Base", "run", 110);
        fx.method(base, "Base", "only", 140);
        let (child, child_scope) = fx.class("Child", 300, &["Base"]);
        let (child_m, _) = fx.method(child_scope, "Child", "run", 310);
        let model = fx.builder.build();
        let resolver = Resolver::new(&model);
        let child = model.declaration(child).unwrap();

        let run: Vec<_> = resolver
            .members_in_hierarchy(child, DeclFamily::Method, "RUN")
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(run, vec![child_m]);
        assert_ne!(run, vec![base_m]);

        let only = resolver.members_in_hierarchy(child, DeclFamily::Method, "only");
        assert_eq!(only[0].qualified_name, "App\\Base::only");
    }

    #[test]
    fn test_cyclic_hierarchy_terminates() {
        let mut fx = Fixture::new();
        let (a, _) = fx.class("A", 100, &["B"]);
        fx.class("B", 300, &["A"]);
        let model = fx.builder.build();
        let resolver = Resolver::new(&model);
        let a = model.declaration(a).unwrap();
        assert!(resolver.members_in_hierarchy(a, DeclFamily::Method, "x").is_empty());
    }

    #[test]
    fn test_member_accuracy_classification() {
        let mut fx = Fixture::new();
        let (_, a) = fx.class("A", 100, &[]);
        let (a_go, a_body) = fx.method(a, "A", "go", 110);
        let (_, b) = fx.class("B", 300, &[]);
        fx.method(b, "B", "go", 310);
        fx.method(b, "B", "single", 340);
        let this_go = fx
            .builder
            .reference(
                a_body,
                NewReference::new(ReferenceKind::Method, "go", range(115, 117))
                    .with_receiver(Receiver::This),
            )
            .unwrap();
        let unknown_go = fx
            .builder
            .reference(
                a_body,
                NewReference::new(ReferenceKind::Method, "go", range(120, 122))
                    .with_receiver(Receiver::Unknown),
            )
            .unwrap();
        let single = fx
            .builder
            .reference(
                a_body,
                NewReference::new(ReferenceKind::Method, "single", range(124, 130))
                    .with_receiver(Receiver::Unknown),
            )
            .unwrap();
        let missing = fx
            .builder
            .reference(
                a_body,
                NewReference::new(ReferenceKind::Method, "go", range(124, 126))
                    .with_receiver(Receiver::Named("B".into())),
            )
            .unwrap();
        let model = fx.builder.build();
        let resolver = Resolver::new(&model);
        let resolve = |id| resolver.resolve_reference(model.reference(id).unwrap()).unwrap();

        let exact = resolve(this_go);
        assert_eq!(exact.accuracy, Accuracy::Exact);
        assert_eq!(exact.declarations, vec![a_go]);

        assert_eq!(resolve(unknown_go).accuracy, Accuracy::More);
        assert_eq!(resolve(unknown_go).declarations.len(), 2);
        assert_eq!(resolve(single).accuracy, Accuracy::Unique);
        assert_eq!(resolve(missing).accuracy, Accuracy::Exact);
    }

    #[test]
    fn test_receiver_type_without_member_is_exact_type() {
        let mut fx = Fixture::new();
        let (_, a) = fx.class("A", 100, &[]);
        fx.method(a, "A", "go", 110);
        let (_, b) = fx.class("B", 300, &[]);
        fx.method(b, "B", "go", 310);
        let (c, c_scope) = fx.class("C", 500, &[]);
        let site = fx
            .builder
            .reference(
                c_scope,
                NewReference::new(ReferenceKind::Method, "go", range(510, 512))
                    .with_receiver(Receiver::This),
            )
            .unwrap();
        let model = fx.builder.build();
        let resolution = Resolver::new(&model)
            .resolve_reference(model.reference(site).unwrap())
            .unwrap();
        assert_eq!(resolution.accuracy, Accuracy::ExactType);
        assert_eq!(resolution.declarations, vec![c]);
    }

    #[test]
    fn test_variable_lookup_stops_at_function_boundary() {
        let mut fx = Fixture::new();
        let root = fx.builder.root();
        let outer = fx
            .builder
            .declare(root, NewDeclaration::new(DeclKind::Variable, "$x", range(700, 702)))
            .unwrap();
        let function = fx
            .builder
            .open_scope(
                fx.namespace,
                NewScope::new(ScopeKind::Function, "f", range(710, 711))
                    .with_block(Some(range(711, 800))),
            )
            .unwrap();
        let arrow = fx
            .builder
            .open_scope(
                root,
                NewScope::new(ScopeKind::Variable, "", range(810, 812))
                    .with_block(Some(range(812, 840)))
                    .inheriting_variables(),
            )
            .unwrap();
        let closure = fx
            .builder
            .open_scope(
                root,
                NewScope::new(ScopeKind::Variable, "", range(850, 858))
                    .with_block(Some(range(858, 900)))
                    .capturing(vec!["$x".into()]),
            )
            .unwrap();
        let model = fx.builder.build();

        assert!(Resolver::new(&model).with_scope(function).variable("$x").is_none());
        assert_eq!(
            Resolver::new(&model).with_scope(arrow).variable("$x").map(|d| d.id),
            Some(outer)
        );
        assert_eq!(
            Resolver::new(&model).with_scope(closure).variable("$x").map(|d| d.id),
            Some(outer)
        );
    }

    #[test]
    fn test_cancelled_resolver_resolves_nothing() {
        let mut fx = Fixture::new();
        let (a, _) = fx.class("A", 100, &[]);
        let model = fx.builder.build();
        let token = CancellationToken::new();
        token.cancel();
        let resolver = Resolver::new(&model).with_cancellation(&token);
        assert!(resolver.resolve_declaration(model.declaration(a).unwrap()).is_none());
    }

    #[test]
    fn test_accuracy_order() {
        assert!(Accuracy::Unique > Accuracy::Exact);
        assert!(Accuracy::Exact > Accuracy::ExactType);
        assert!(Accuracy::ExactType > Accuracy::MoreMembers);
        assert!(Accuracy::MoreMembers > Accuracy::MoreTypes);
        assert!(Accuracy::MoreTypes > Accuracy::More);
        assert!(Accuracy::MoreMembers.is_actionable());
        assert!(!Accuracy::MoreTypes.is_actionable());
    }
}
