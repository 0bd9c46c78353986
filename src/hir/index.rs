//! Declaration index.
//!
//! Holds every declaration a snapshot can resolve to: the declarations of
//! the current file (with their defining scope) plus indexed declarations of
//! other project files. Lookups are keyed by name family and normalized
//! name, so case rules are applied once at insertion.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::ids::{DeclId, ScopeId};
use crate::base::{FileId, TextRange, TextSize};
use crate::syntax::ast::{TypeKind, UseKind, Visibility};

// ============================================================================
// DECLARATION KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeclKind {
    File,
    Namespace,
    Type(TypeKind),
    Function,
    Method,
    Field,
    ClassConstant,
    EnumCase,
    Constant,
    Variable,
    UseAlias(UseKind),
}

/// Groups kinds that share one namespace of names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclFamily {
    File,
    Namespace,
    Type,
    Function,
    Constant,
    Method,
    Field,
    ClassConstant,
    Variable,
    UseAlias,
}

impl DeclFamily {
    /// Variables, fields and constants are case-sensitive; everything else
    /// compares case-insensitively.
    pub fn is_case_sensitive(self) -> bool {
        matches!(
            self,
            DeclFamily::Variable
                | DeclFamily::Field
                | DeclFamily::Constant
                | DeclFamily::ClassConstant
                | DeclFamily::File
        )
    }

    /// Lookup key for a name of this family.
    pub fn normalize(self, name: &str) -> SmolStr {
        let name = if self == DeclFamily::File { name } else { name.trim_start_matches('\\') };
        if self.is_case_sensitive() {
            SmolStr::new(name)
        } else {
            SmolStr::new(name.to_lowercase())
        }
    }

    /// Whether two names of this family denote the same name.
    pub fn names_match(self, a: &str, b: &str) -> bool {
        let a = a.trim_start_matches('\\');
        let b = b.trim_start_matches('\\');
        if self.is_case_sensitive() { a == b } else { a.eq_ignore_ascii_case(b) }
    }

    pub fn is_member(self) -> bool {
        matches!(self, DeclFamily::Method | DeclFamily::Field | DeclFamily::ClassConstant)
    }
}

impl DeclKind {
    pub fn family(self) -> DeclFamily {
        match self {
            DeclKind::File => DeclFamily::File,
            DeclKind::Namespace => DeclFamily::Namespace,
            DeclKind::Type(_) => DeclFamily::Type,
            DeclKind::Function => DeclFamily::Function,
            DeclKind::Method => DeclFamily::Method,
            DeclKind::Field => DeclFamily::Field,
            DeclKind::ClassConstant | DeclKind::EnumCase => DeclFamily::ClassConstant,
            DeclKind::Constant => DeclFamily::Constant,
            DeclKind::Variable => DeclFamily::Variable,
            DeclKind::UseAlias(_) => DeclFamily::UseAlias,
        }
    }

    /// Scoped kinds are only reachable through their scope, never by a
    /// global name lookup.
    pub fn is_scoped(self) -> bool {
        matches!(self, DeclKind::Variable | DeclKind::UseAlias(_))
    }

    pub fn is_trait(self) -> bool {
        self == DeclKind::Type(TypeKind::Trait)
    }
}

// ============================================================================
// DECLARATIONS
// ============================================================================

/// A named element a reference can resolve to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub id: DeclId,
    /// Name as declared; fields are stored without their `$`.
    pub name: SmolStr,
    /// Fully qualified name without the leading `\`. Members use
    /// `Owner::name`, variables just their name.
    pub qualified_name: SmolStr,
    pub kind: DeclKind,
    /// `None` when the defining file is not known.
    pub file: Option<FileId>,
    pub name_range: TextRange,
    /// Defining scope, set for declarations of the current file.
    pub scope: Option<ScopeId>,
    /// Qualified name of the declaring type, for members.
    pub owner: Option<SmolStr>,
    /// Parent class, interfaces, used traits and `@mixin` types.
    pub supertypes: Vec<SmolStr>,
    /// Known value types of variables and fields.
    pub types: Vec<SmolStr>,
    pub deprecated: bool,
    pub visibility: Visibility,
    pub is_static: bool,
    /// Declared by a doc tag (`@method`, `@property`) rather than code.
    pub is_magic: bool,
    /// Target of a use alias.
    pub alias_target: Option<SmolStr>,
}

impl Declaration {
    #[inline]
    pub fn offset(&self) -> TextSize {
        self.name_range.start()
    }

    #[inline]
    pub fn family(&self) -> DeclFamily {
        self.kind.family()
    }

    /// Name shown to users and used to order alternatives.
    pub fn display_name(&self) -> &str {
        &self.qualified_name
    }
}

/// Everything needed to add a declaration; ids, scope and (for the current
/// file) the file are filled in by the builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDeclaration {
    pub name: SmolStr,
    pub qualified_name: SmolStr,
    pub kind: DeclKind,
    pub file: Option<FileId>,
    pub name_range: TextRange,
    pub owner: Option<SmolStr>,
    pub supertypes: Vec<SmolStr>,
    pub types: Vec<SmolStr>,
    pub deprecated: bool,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_magic: bool,
    pub alias_target: Option<SmolStr>,
}

impl NewDeclaration {
    pub fn new(kind: DeclKind, name: impl Into<SmolStr>, name_range: TextRange) -> Self {
        let name = name.into();
        Self {
            qualified_name: name.clone(),
            name,
            kind,
            file: None,
            name_range,
            owner: None,
            supertypes: Vec::new(),
            types: Vec::new(),
            deprecated: false,
            visibility: Visibility::Public,
            is_static: false,
            is_magic: false,
            alias_target: None,
        }
    }

    pub fn with_qualified_name(mut self, name: impl Into<SmolStr>) -> Self {
        self.qualified_name = SmolStr::new(name.into().trim_start_matches('\\'));
        self
    }

    /// Member of `owner`; the qualified name becomes `Owner::name`.
    pub fn with_owner(mut self, owner: impl Into<SmolStr>) -> Self {
        let owner = owner.into();
        self.qualified_name = SmolStr::new(format!("{}::{}", owner, self.name));
        self.owner = Some(owner);
        self
    }

    pub fn with_file(mut self, file: FileId) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_supertypes(mut self, supertypes: Vec<SmolStr>) -> Self {
        self.supertypes = supertypes;
        self
    }

    pub fn with_types(mut self, types: Vec<SmolStr>) -> Self {
        self.types = types;
        self
    }

    pub fn with_deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn magic(mut self) -> Self {
        self.is_magic = true;
        self
    }

    pub fn with_alias_target(mut self, target: impl Into<SmolStr>) -> Self {
        self.alias_target = Some(SmolStr::new(target.into().trim_start_matches('\\')));
        self
    }
}

/// Filter for lookups that care about deprecation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeprecationFilter {
    #[default]
    All,
    Deprecated,
    NotDeprecated,
}

impl DeprecationFilter {
    pub fn accepts(self, decl: &Declaration) -> bool {
        match self {
            DeprecationFilter::All => true,
            DeprecationFilter::Deprecated => decl.deprecated,
            DeprecationFilter::NotDeprecated => !decl.deprecated,
        }
    }
}

// ============================================================================
// INDEX
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct DeclarationIndex {
    decls: Vec<Declaration>,
    by_qualified: FxHashMap<(DeclFamily, SmolStr), Vec<DeclId>>,
    by_name: FxHashMap<(DeclFamily, SmolStr), Vec<DeclId>>,
    /// Lowercased owner name → member declarations.
    by_owner: FxHashMap<SmolStr, Vec<DeclId>>,
    by_file: FxHashMap<FileId, Vec<DeclId>>,
}

impl DeclarationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, scope: Option<ScopeId>, new: NewDeclaration) -> DeclId {
        let id = DeclId::new(self.decls.len() as u32);
        let family = new.kind.family();

        if !new.kind.is_scoped() {
            let qualified_key = if family.is_member() {
                // members are looked up through their owner
                None
            } else {
                Some(family.normalize(&new.qualified_name))
            };
            if let Some(key) = qualified_key {
                self.by_qualified.entry((family, key)).or_default().push(id);
            }
            self.by_name
                .entry((family, family.normalize(&new.name)))
                .or_default()
                .push(id);
        }
        if let Some(owner) = &new.owner {
            self.by_owner
                .entry(DeclFamily::Type.normalize(owner))
                .or_default()
                .push(id);
        }
        if let Some(file) = new.file {
            self.by_file.entry(file).or_default().push(id);
        }

        self.decls.push(Declaration {
            id,
            name: new.name,
            qualified_name: new.qualified_name,
            kind: new.kind,
            file: new.file,
            name_range: new.name_range,
            scope,
            owner: new.owner,
            supertypes: new.supertypes,
            types: new.types,
            deprecated: new.deprecated,
            visibility: new.visibility,
            is_static: new.is_static,
            is_magic: new.is_magic,
            alias_target: new.alias_target,
        });
        id
    }

    pub(crate) fn add_types(&mut self, id: DeclId, types: impl IntoIterator<Item = SmolStr>) {
        if let Some(decl) = self.decls.get_mut(id.index()) {
            for ty in types {
                if !decl.types.iter().any(|t| t.eq_ignore_ascii_case(&ty)) {
                    decl.types.push(ty);
                }
            }
        }
    }

    pub fn get(&self, id: DeclId) -> Option<&Declaration> {
        self.decls.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    fn resolve_ids<'a>(
        &'a self,
        ids: Option<&'a Vec<DeclId>>,
    ) -> impl Iterator<Item = &'a Declaration> + 'a {
        ids.into_iter()
            .flatten()
            .filter_map(|&id| self.decls.get(id.index()))
    }

    /// Declarations of `family` with the given qualified name.
    pub fn find(
        &self,
        family: DeclFamily,
        qualified_name: &str,
        filter: DeprecationFilter,
    ) -> Vec<&Declaration> {
        let key = (family, family.normalize(qualified_name));
        self.resolve_ids(self.by_qualified.get(&key))
            .filter(|decl| filter.accepts(decl))
            .collect()
    }

    /// Declarations of `family` with the given simple name, anywhere.
    pub fn named(&self, family: DeclFamily, name: &str) -> Vec<&Declaration> {
        let key = (family, family.normalize(name));
        self.resolve_ids(self.by_name.get(&key)).collect()
    }

    /// Members declared directly by `owner`.
    pub fn members<'a>(&'a self, owner: &str) -> impl Iterator<Item = &'a Declaration> + 'a {
        self.resolve_ids(self.by_owner.get(&DeclFamily::Type.normalize(owner)))
    }

    /// Members of `owner` in `family` named `name`.
    pub fn member(&self, owner: &str, family: DeclFamily, name: &str) -> Vec<&Declaration> {
        self.members(owner)
            .filter(|decl| decl.family() == family && family.names_match(&decl.name, name))
            .collect()
    }

    pub fn in_file(&self, file: FileId) -> impl Iterator<Item = &Declaration> {
        self.resolve_ids(self.by_file.get(&file))
    }
}
