//! Scope model.
//!
//! An arena-allocated tree of scopes for one parsed document, the reference
//! sites found in it and the declaration index they resolve against.
//! Built once per snapshot through [`ScopeModelBuilder`], read-only after.

use std::sync::Arc;

use smol_str::SmolStr;
use thiserror::Error;

use super::ids::{DeclId, RefId, ScopeId};
use super::index::{DeclFamily, DeclKind, Declaration, DeclarationIndex, NewDeclaration};
use super::input::SourceRoot;
use crate::base::{FileId, TextRange, TextSize};
use crate::syntax::ast::TypeKind;

// ============================================================================
// SCOPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    File,
    Namespace,
    Type(TypeKind),
    Function,
    Method,
    /// Anonymous function body: introduces variables, declares nothing
    /// nameable.
    Variable,
    /// One `use` statement; holds its alias declarations.
    Use,
}

impl ScopeKind {
    /// Scopes that own the variables assigned inside them.
    pub fn is_variable_scope(self) -> bool {
        matches!(
            self,
            ScopeKind::File | ScopeKind::Function | ScopeKind::Method | ScopeKind::Variable
        )
    }

    pub fn is_type(self) -> bool {
        matches!(self, ScopeKind::Type(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: SmolStr,
    pub name_range: TextRange,
    /// Absent for incomplete syntax.
    pub block_range: Option<TextRange>,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// The declaration this scope belongs to (the class of a class body).
    pub declaration: Option<DeclId>,
    /// Declarations made directly in this scope.
    pub declarations: Vec<DeclId>,
    pub references: Vec<RefId>,
    /// Arrow functions see the variables of the enclosing scope.
    pub inherits_variables: bool,
    /// Variables bound by a closure's `use (...)` list.
    pub captured: Vec<SmolStr>,
}

impl Scope {
    /// Whether the block of this scope holds `offset`.
    pub fn contains(&self, offset: TextSize) -> bool {
        self.block_range.is_some_and(|range| range.contains(offset))
    }
}

/// Parameters for a new child scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScope {
    pub kind: ScopeKind,
    pub name: SmolStr,
    pub name_range: TextRange,
    pub block_range: Option<TextRange>,
    pub declaration: Option<DeclId>,
    pub inherits_variables: bool,
    pub captured: Vec<SmolStr>,
}

impl NewScope {
    pub fn new(kind: ScopeKind, name: impl Into<SmolStr>, name_range: TextRange) -> Self {
        Self {
            kind,
            name: name.into(),
            name_range,
            block_range: None,
            declaration: None,
            inherits_variables: false,
            captured: Vec::new(),
        }
    }

    pub fn with_block(mut self, block: Option<TextRange>) -> Self {
        self.block_range = block;
        self
    }

    pub fn with_declaration(mut self, decl: DeclId) -> Self {
        self.declaration = Some(decl);
        self
    }

    pub fn inheriting_variables(mut self) -> Self {
        self.inherits_variables = true;
        self
    }

    pub fn capturing(mut self, names: Vec<SmolStr>) -> Self {
        self.captured = names;
        self
    }
}

// ============================================================================
// REFERENCE SITES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReferenceKind {
    Variable,
    Function,
    Constant,
    Method,
    StaticMethod,
    Field,
    StaticField,
    ClassConstant,
    TypeName,
    InstanceCreation,
    DocType,
    Namespace,
    UseAlias,
    IncludePath,
}

impl ReferenceKind {
    pub fn family(self) -> DeclFamily {
        match self {
            ReferenceKind::Variable => DeclFamily::Variable,
            ReferenceKind::Function => DeclFamily::Function,
            ReferenceKind::Constant => DeclFamily::Constant,
            ReferenceKind::Method | ReferenceKind::StaticMethod => DeclFamily::Method,
            ReferenceKind::Field | ReferenceKind::StaticField => DeclFamily::Field,
            ReferenceKind::ClassConstant => DeclFamily::ClassConstant,
            ReferenceKind::TypeName | ReferenceKind::InstanceCreation | ReferenceKind::DocType => {
                DeclFamily::Type
            }
            ReferenceKind::Namespace => DeclFamily::Namespace,
            ReferenceKind::UseAlias => DeclFamily::UseAlias,
            ReferenceKind::IncludePath => DeclFamily::File,
        }
    }
}

/// What a member access was made on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Receiver {
    #[default]
    None,
    This,
    SelfType,
    Static,
    Parent,
    /// A class name as written.
    Named(SmolStr),
    /// A variable whose known types decide the receiver.
    Variable(SmolStr),
    /// Any other expression.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSite {
    pub id: RefId,
    /// Name as written; fields without `$`.
    pub name: SmolStr,
    pub kind: ReferenceKind,
    pub range: TextRange,
    pub scope: ScopeId,
    pub receiver: Receiver,
}

/// Parameters for a new reference site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReference {
    pub name: SmolStr,
    pub kind: ReferenceKind,
    pub range: TextRange,
    pub receiver: Receiver,
}

impl NewReference {
    pub fn new(kind: ReferenceKind, name: impl Into<SmolStr>, range: TextRange) -> Self {
        Self {
            name: name.into(),
            kind,
            range,
            receiver: Receiver::None,
        }
    }

    pub fn with_receiver(mut self, receiver: Receiver) -> Self {
        self.receiver = receiver;
        self
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Invariant violations while building a [`ScopeModel`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("unknown scope {0:?}")]
    UnknownScope(ScopeId),
    #[error("block range {0:?} is empty or inverted")]
    DegenerateBlock(TextRange),
    #[error("block range {child:?} is not nested in parent block {parent:?}")]
    BlockOutsideParent { child: TextRange, parent: TextRange },
    #[error("a {0:?} scope can only be the root of the tree")]
    MisplacedScope(ScopeKind),
    #[error("declaration refers to unregistered file {0}")]
    UnknownFile(FileId),
}

// ============================================================================
// MODEL
// ============================================================================

/// The scope tree of one document plus everything it resolves against.
#[derive(Debug, Clone)]
pub struct ScopeModel {
    file: FileId,
    scopes: Vec<Scope>,
    references: Vec<ReferenceSite>,
    index: DeclarationIndex,
    source_root: SourceRoot,
}

impl ScopeModel {
    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn root(&self) -> ScopeId {
        ScopeId::new(0)
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.index())
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    /// `id` itself followed by its parents up to the file scope.
    pub fn ancestors(&self, id: ScopeId) -> Ancestors<'_> {
        Ancestors {
            scopes: &self.scopes,
            next: Some(id),
        }
    }

    /// The deepest scope whose block holds `offset`; the file scope when
    /// nothing deeper does.
    pub fn innermost_scope_at(&self, offset: TextSize) -> ScopeId {
        innermost(&self.scopes, offset)
    }

    /// The declaration of variable `name` visible from `scope`.
    pub fn variable(&self, scope: ScopeId, name: &str) -> Option<DeclId> {
        visible_variable(&self.scopes, &self.index, scope, name)
    }

    pub fn reference(&self, id: RefId) -> Option<&ReferenceSite> {
        self.references.get(id.index())
    }

    pub fn references(&self) -> &[ReferenceSite] {
        &self.references
    }

    /// The reference site covering `range`: an exact match first, else the
    /// smallest site containing it.
    pub fn reference_at(&self, range: TextRange) -> Option<&ReferenceSite> {
        self.references
            .iter()
            .find(|site| site.range == range)
            .or_else(|| {
                self.references
                    .iter()
                    .filter(|site| site.range.contains_range(range))
                    .min_by_key(|site| site.range.len())
            })
    }

    /// A declaration of the current file whose name covers `range`.
    pub fn declaration_at(&self, range: TextRange) -> Option<&Declaration> {
        let mut local = self.index.in_file(self.file).filter(|decl| decl.scope.is_some());
        local
            .find(|decl| decl.name_range == range)
            .or_else(|| {
                self.index
                    .in_file(self.file)
                    .filter(|decl| decl.scope.is_some() && decl.name_range.contains_range(range))
                    .min_by_key(|decl| decl.name_range.len())
            })
    }

    pub fn declaration(&self, id: DeclId) -> Option<&Declaration> {
        self.index.get(id)
    }

    pub fn index(&self) -> &DeclarationIndex {
        &self.index
    }

    pub fn source_root(&self) -> &SourceRoot {
        &self.source_root
    }
}

/// Lookup stops at the first variable scope unless that scope is an arrow
/// function or captures `name` with `use`.
fn visible_variable(
    scopes: &[Scope],
    index: &DeclarationIndex,
    from: ScopeId,
    name: &str,
) -> Option<DeclId> {
    let ancestors = Ancestors {
        scopes,
        next: Some(from),
    };
    for scope in ancestors {
        if !scope.kind.is_variable_scope() {
            continue;
        }
        let local = scope.declarations.iter().copied().find(|&id| {
            index
                .get(id)
                .is_some_and(|decl| decl.kind == DeclKind::Variable && decl.name == name)
        });
        if local.is_some() {
            return local;
        }
        let falls_through = scope.inherits_variables || scope.captured.iter().any(|c| c == name);
        if !falls_through {
            return None;
        }
    }
    None
}

fn innermost(scopes: &[Scope], offset: TextSize) -> ScopeId {
    let mut current = ScopeId::new(0);
    loop {
        let Some(scope) = scopes.get(current.index()) else {
            return current;
        };
        let next = scope
            .children
            .iter()
            .copied()
            .find(|child| scopes.get(child.index()).is_some_and(|s| s.contains(offset)));
        match next {
            Some(child) => current = child,
            None => return current,
        }
    }
}

/// Iterator over a scope and its parents.
pub struct Ancestors<'a> {
    scopes: &'a [Scope],
    next: Option<ScopeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Scope;

    fn next(&mut self) -> Option<Self::Item> {
        let scope = self.scopes.get(self.next?.index())?;
        self.next = scope.parent;
        Some(scope)
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Incrementally builds a [`ScopeModel`], checking the tree invariants.
#[derive(Debug, Clone)]
pub struct ScopeModelBuilder {
    file: FileId,
    scopes: Vec<Scope>,
    references: Vec<ReferenceSite>,
    index: DeclarationIndex,
    source_root: SourceRoot,
}

impl ScopeModelBuilder {
    /// Start a model for `file`; the file scope spans the whole text.
    pub fn new(file: FileId, path: impl Into<Arc<str>>, text_len: TextSize) -> Self {
        let path = path.into();
        let mut source_root = SourceRoot::new();
        source_root.insert(file, path.clone());
        let block = (text_len > TextSize::from(0)).then(|| TextRange::up_to(text_len));
        let root = Scope {
            id: ScopeId::new(0),
            kind: ScopeKind::File,
            name: SmolStr::new(&*path),
            name_range: TextRange::empty(TextSize::from(0)),
            block_range: block,
            parent: None,
            children: Vec::new(),
            declaration: None,
            declarations: Vec::new(),
            references: Vec::new(),
            inherits_variables: false,
            captured: Vec::new(),
        };
        let mut index = DeclarationIndex::new();
        index.insert(None, file_declaration(file, &path));
        Self {
            file,
            scopes: vec![root],
            references: Vec::new(),
            index,
            source_root,
        }
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn root(&self) -> ScopeId {
        ScopeId::new(0)
    }

    /// Register another project file so indexed declarations can point at
    /// it and include paths can resolve to it.
    pub fn add_file(&mut self, file: FileId, path: impl Into<Arc<str>>) {
        if self.source_root.contains(file) {
            return;
        }
        let path = path.into();
        self.index.insert(None, file_declaration(file, &path));
        self.source_root.insert(file, path);
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.index())
    }

    pub fn declaration(&self, id: DeclId) -> Option<&Declaration> {
        self.index.get(id)
    }

    pub fn innermost_scope_at(&self, offset: TextSize) -> ScopeId {
        innermost(&self.scopes, offset)
    }

    pub fn ancestors(&self, id: ScopeId) -> Ancestors<'_> {
        Ancestors {
            scopes: &self.scopes,
            next: Some(id),
        }
    }

    pub fn variable(&self, scope: ScopeId, name: &str) -> Option<DeclId> {
        visible_variable(&self.scopes, &self.index, scope, name)
    }

    pub fn open_scope(&mut self, parent: ScopeId, new: NewScope) -> Result<ScopeId, ModelError> {
        if new.kind == ScopeKind::File {
            return Err(ModelError::MisplacedScope(ScopeKind::File));
        }
        let parent_block = self
            .scopes
            .get(parent.index())
            .ok_or(ModelError::UnknownScope(parent))?
            .block_range;
        if let Some(block) = new.block_range {
            if block.end() <= block.start() {
                return Err(ModelError::DegenerateBlock(block));
            }
            if let Some(outer) = parent_block {
                if !outer.contains_range(block) {
                    return Err(ModelError::BlockOutsideParent {
                        child: block,
                        parent: outer,
                    });
                }
            }
        }

        let id = ScopeId::new(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            kind: new.kind,
            name: new.name,
            name_range: new.name_range,
            block_range: new.block_range,
            parent: Some(parent),
            children: Vec::new(),
            declaration: new.declaration,
            declarations: Vec::new(),
            references: Vec::new(),
            inherits_variables: new.inherits_variables,
            captured: new.captured,
        });
        self.scopes[parent.index()].children.push(id);
        Ok(id)
    }

    /// Declare something of the current file inside `scope`.
    pub fn declare(&mut self, scope: ScopeId, new: NewDeclaration) -> Result<DeclId, ModelError> {
        if scope.index() >= self.scopes.len() {
            return Err(ModelError::UnknownScope(scope));
        }
        let id = self.index.insert(Some(scope), new.with_file(self.file));
        self.scopes[scope.index()].declarations.push(id);
        Ok(id)
    }

    /// Add a declaration of another project file.
    pub fn declare_indexed(&mut self, new: NewDeclaration) -> Result<DeclId, ModelError> {
        if let Some(file) = new.file {
            if !self.source_root.contains(file) {
                return Err(ModelError::UnknownFile(file));
            }
        }
        Ok(self.index.insert(None, new))
    }

    /// Record value types learned after the declaration was made.
    pub fn add_types(&mut self, decl: DeclId, types: impl IntoIterator<Item = SmolStr>) {
        self.index.add_types(decl, types);
    }

    pub fn reference(&mut self, scope: ScopeId, new: NewReference) -> Result<RefId, ModelError> {
        if scope.index() >= self.scopes.len() {
            return Err(ModelError::UnknownScope(scope));
        }
        let id = RefId::new(self.references.len() as u32);
        self.references.push(ReferenceSite {
            id,
            name: new.name,
            kind: new.kind,
            range: new.range,
            scope,
            receiver: new.receiver,
        });
        self.scopes[scope.index()].references.push(id);
        Ok(id)
    }

    pub fn build(self) -> ScopeModel {
        ScopeModel {
            file: self.file,
            scopes: self.scopes,
            references: self.references,
            index: self.index,
            source_root: self.source_root,
        }
    }
}

fn file_declaration(file: FileId, path: &str) -> NewDeclaration {
    NewDeclaration::new(DeclKind::File, path, TextRange::empty(TextSize::from(0))).with_file(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u32, end: u32) -> TextRange {
        TextRange::new(start.into(), end.into())
    }

    #[test]
    fn test_innermost_scope_descends_through_blocks() {
        let mut builder = ScopeModelBuilder::new(FileId::new(0), "a.php", 100.into());
        let class = builder
            .open_scope(
                builder.root(),
                NewScope::new(ScopeKind::Type(TypeKind::Class), "A", range(6, 7))
                    .with_block(Some(range(8, 90))),
            )
            .unwrap();
        let method = builder
            .open_scope(
                class,
                NewScope::new(ScopeKind::Method, "m", range(20, 21)).with_block(Some(range(21, 50))),
            )
            .unwrap();
        let model = builder.build();

        assert_eq!(model.innermost_scope_at(30.into()), method);
        assert_eq!(model.innermost_scope_at(60.into()), class);
        assert_eq!(model.innermost_scope_at(95.into()), model.root());

        let kinds: Vec<_> = model.ancestors(method).map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![ScopeKind::Method, ScopeKind::Type(TypeKind::Class), ScopeKind::File]
        );
    }

    #[test]
    fn test_builder_rejects_degenerate_and_escaping_blocks() {
        let mut builder = ScopeModelBuilder::new(FileId::new(0), "a.php", 50.into());
        let degenerate = builder.open_scope(
            builder.root(),
            NewScope::new(ScopeKind::Function, "f", range(0, 1)).with_block(Some(range(10, 10))),
        );
        assert_eq!(degenerate, Err(ModelError::DegenerateBlock(range(10, 10))));

        let escaping = builder.open_scope(
            builder.root(),
            NewScope::new(ScopeKind::Function, "f", range(0, 1)).with_block(Some(range(40, 60))),
        );
        assert!(matches!(escaping, Err(ModelError::BlockOutsideParent { .. })));

        let unknown = builder.open_scope(
            ScopeId::new(7),
            NewScope::new(ScopeKind::Function, "f", range(0, 1)),
        );
        assert_eq!(unknown, Err(ModelError::UnknownScope(ScopeId::new(7))));

        let file = builder.open_scope(builder.root(), NewScope::new(ScopeKind::File, "x", range(0, 0)));
        assert_eq!(file, Err(ModelError::MisplacedScope(ScopeKind::File)));
    }

    #[test]
    fn test_block_less_scopes_are_allowed() {
        let mut builder = ScopeModelBuilder::new(FileId::new(0), "a.php", 50.into());
        let broken = builder
            .open_scope(
                builder.root(),
                NewScope::new(ScopeKind::Type(TypeKind::Class), "Broken", range(6, 12)),
            )
            .unwrap();
        let model = builder.build();
        assert!(model.scope(broken).unwrap().block_range.is_none());
        assert_eq!(model.innermost_scope_at(8.into()), model.root());
    }

    #[test]
    fn test_declare_indexed_requires_registered_file() {
        let mut builder = ScopeModelBuilder::new(FileId::new(0), "a.php", 10.into());
        let decl = NewDeclaration::new(DeclKind::Function, "f", range(0, 1)).with_file(FileId::new(3));
        assert_eq!(
            builder.declare_indexed(decl.clone()),
            Err(ModelError::UnknownFile(FileId::new(3)))
        );
        builder.add_file(FileId::new(3), "lib.php");
        assert!(builder.declare_indexed(decl).is_ok());
    }

    #[test]
    fn test_reference_at_prefers_exact_then_smallest() {
        let mut builder = ScopeModelBuilder::new(FileId::new(0), "a.php", 40.into());
        let root = builder.root();
        builder
            .reference(root, NewReference::new(ReferenceKind::DocType, "A\\B", range(10, 13)))
            .unwrap();
        builder
            .reference(root, NewReference::new(ReferenceKind::UseAlias, "A", range(10, 11)))
            .unwrap();
        let model = builder.build();

        assert_eq!(model.reference_at(range(10, 11)).unwrap().kind, ReferenceKind::UseAlias);
        assert_eq!(model.reference_at(range(12, 13)).unwrap().kind, ReferenceKind::DocType);
        assert!(model.reference_at(range(20, 21)).is_none());
    }
}
