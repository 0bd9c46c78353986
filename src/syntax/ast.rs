//! Typed syntax tree produced by [`parse`](super::parse).
//!
//! Every node kind is a variant of a closed enum, so traversals match
//! exhaustively. Nodes the parser could not make sense of become `Error`
//! variants carrying the skipped range; consumers skip them.

use smol_str::SmolStr;

use crate::base::{TextRange, TextSize};

/// Stable identity of a type-like node within one parse.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug)]
pub struct NodeId(pub u32);

/// A name as written, possibly qualified (`\App\Foo`) or a variable (`$x`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: SmolStr,
    pub range: TextRange,
}

impl Ident {
    pub fn new(name: impl Into<SmolStr>, range: TextRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }

    pub fn is_fully_qualified(&self) -> bool {
        self.name.starts_with('\\')
    }

    pub fn is_qualified(&self) -> bool {
        self.name.trim_start_matches('\\').contains('\\')
    }

    /// The part after the last `\`.
    pub fn last_segment(&self) -> &str {
        self.name.rsplit('\\').next().unwrap_or(self.name.as_str())
    }

    /// Range of [`last_segment`](Self::last_segment).
    pub fn last_segment_range(&self) -> TextRange {
        let len = TextSize::of(self.last_segment());
        TextRange::new(self.range.end() - len.min(self.range.len()), self.range.end())
    }

    /// The namespace part of a qualified name with its range.
    pub fn namespace_part(&self) -> Option<(&str, TextRange)> {
        let trimmed = self.name.trim_start_matches('\\');
        let split = trimmed.rfind('\\')?;
        let lead = TextSize::of(&self.name[..self.name.len() - trimmed.len()]);
        let start = self.range.start() + lead;
        Some((&trimmed[..split], TextRange::at(start, TextSize::of(&trimmed[..split]))))
    }

    /// The first segment of a relative qualified name with its range.
    pub fn first_segment(&self) -> Option<(&str, TextRange)> {
        if self.is_fully_qualified() {
            return None;
        }
        let end = self.name.find('\\')?;
        Some((&self.name[..end], TextRange::at(self.range.start(), TextSize::from(end as u32))))
    }
}

/// A raw documentation comment attached to a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocComment {
    pub text: SmolStr,
    pub range: TextRange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFile {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Namespace(NamespaceDecl),
    Use(UseDecl),
    Type(TypeDecl),
    Function(FunctionDecl),
    Stmt(Stmt),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    pub name: Option<Ident>,
    /// `{ ... }` of the braced form; `None` for `namespace Foo;`.
    pub block: Option<TextRange>,
    pub items: Vec<Item>,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UseKind {
    Type,
    Function,
    Constant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseDecl {
    pub kind: UseKind,
    pub clauses: Vec<UseClause>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseClause {
    /// Imported name; always treated as fully qualified.
    pub path: Ident,
    pub alias: Option<Ident>,
}

impl UseClause {
    /// The name the import is visible under.
    pub fn visible_name(&self) -> &Ident {
        self.alias.as_ref().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeKind {
    Class,
    Interface,
    Trait,
    Enum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    /// `None` when no visibility keyword was written.
    pub visibility: Option<Visibility>,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_readonly: bool,
}

impl Modifiers {
    pub fn visibility(&self) -> Visibility {
        self.visibility.unwrap_or_default()
    }
}

/// Class names mentioned by a type declaration (`?Foo`, `A|B`, `(A&B)|null`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHint {
    pub names: Vec<Ident>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub id: NodeId,
    pub kind: TypeKind,
    pub name: Ident,
    pub modifiers: Modifiers,
    pub extends: Vec<Ident>,
    pub implements: Vec<Ident>,
    pub doc: Option<DocComment>,
    /// Missing when the declaration has no well-formed body.
    pub body: Option<TypeBody>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeBody {
    pub members: Vec<Member>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    Method(MethodDecl),
    Property(PropertyDecl),
    Constant(ConstDecl),
    EnumCase(EnumCaseDecl),
    TraitUse(TraitUse),
    Error(TextRange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: Ident,
    pub modifiers: Modifiers,
    pub doc: Option<DocComment>,
    pub params: Vec<Param>,
    /// `( ... )` including the parentheses.
    pub params_range: TextRange,
    pub return_type: Option<TypeHint>,
    /// `None` for abstract and interface methods.
    pub body: Option<Block>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Includes the `$`.
    pub name: Ident,
    pub ty: Option<TypeHint>,
    /// Set when a constructor parameter is promoted to a property.
    pub promoted: Option<Modifiers>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDecl {
    pub modifiers: Modifiers,
    pub ty: Option<TypeHint>,
    pub doc: Option<DocComment>,
    pub entries: Vec<PropertyEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEntry {
    /// Includes the `$`.
    pub name: Ident,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstDecl {
    pub modifiers: Modifiers,
    pub doc: Option<DocComment>,
    pub entries: Vec<ConstEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstEntry {
    pub name: Ident,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumCaseDecl {
    pub name: Ident,
    pub doc: Option<DocComment>,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraitUse {
    pub names: Vec<Ident>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub doc: Option<DocComment>,
    pub params: Vec<Param>,
    pub params_range: TextRange,
    pub return_type: Option<TypeHint>,
    pub body: Option<Block>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Expr(Expr),
    Return(Option<Expr>),
    Block(Block),
    /// `if`, `while`, `for`, `foreach`, `switch`, `try` and friends: the
    /// parenthesized head expressions plus the nested statements.
    Control(Control),
    Catch(Catch),
    Function(FunctionDecl),
    Type(TypeDecl),
    Error(TextRange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub keyword: Ident,
    pub head: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catch {
    pub types: Vec<Ident>,
    pub var: Option<Ident>,
    pub body: Block,
}

/// The class side of `X::member` and `new X`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassRef {
    SelfType(TextRange),
    Static(TextRange),
    Parent(TextRange),
    Named(Ident),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousClass {
    pub id: NodeId,
    pub args: Vec<Expr>,
    pub extends: Vec<Ident>,
    pub implements: Vec<Ident>,
    pub body: Option<TypeBody>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    pub params: Vec<Param>,
    pub params_range: TextRange,
    /// Variables captured with `use (...)`.
    pub uses: Vec<Ident>,
    pub return_type: Option<TypeHint>,
    pub body: Block,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrowFunction {
    pub params: Vec<Param>,
    pub params_range: TextRange,
    pub return_type: Option<TypeHint>,
    pub body: Box<Expr>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Variable(Ident),
    This(TextRange),
    /// A bare constant name such as `FOO` or `\App\LIMIT`.
    Name(Ident),
    /// A class name in value position: the right side of `instanceof`.
    ClassName(ClassRef),
    /// A quoted literal; `value` and `range` cover the text between the
    /// quotes.
    String { value: SmolStr, range: TextRange },
    Literal(TextRange),
    Call { name: Ident, args: Vec<Expr> },
    CallExpr { callee: Box<Expr>, args: Vec<Expr> },
    MethodCall { receiver: Box<Expr>, name: Ident, args: Vec<Expr> },
    StaticCall { class: ClassRef, name: Ident, args: Vec<Expr> },
    PropertyFetch { receiver: Box<Expr>, name: Ident },
    /// `X::$name`; the name includes the `$`.
    StaticPropertyFetch { class: ClassRef, name: Ident },
    ClassConstant { class: ClassRef, name: Ident },
    New { class: ClassRef, args: Vec<Expr>, range: TextRange },
    NewAnonymous(Box<AnonymousClass>),
    Closure(Box<Closure>),
    ArrowFunction(ArrowFunction),
    Assign { target: Box<Expr>, value: Box<Expr> },
    Include { path: Box<Expr>, range: TextRange },
    /// Operators, arrays, `match` and everything else that only matters
    /// through its operands.
    Other(Vec<Expr>),
    Error(TextRange),
}

impl Expr {
    /// Source range of simple nodes; compound nodes report `None`.
    pub fn range(&self) -> Option<TextRange> {
        match self {
            Expr::Variable(ident) | Expr::Name(ident) => Some(ident.range),
            Expr::This(range) | Expr::Literal(range) | Expr::Error(range) => Some(*range),
            Expr::String { range, .. } | Expr::New { range, .. } | Expr::Include { range, .. } => {
                Some(*range)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str, start: u32) -> Ident {
        Ident::new(name, TextRange::at(start.into(), TextSize::of(name)))
    }

    #[test]
    fn test_segments_of_relative_name() {
        let name = ident("Alias\\Sub\\Foo", 10);
        assert_eq!(name.last_segment(), "Foo");
        assert_eq!(name.last_segment_range(), TextRange::new(20.into(), 23.into()));
        assert_eq!(
            name.first_segment(),
            Some(("Alias", TextRange::new(10.into(), 15.into())))
        );
        assert_eq!(
            name.namespace_part(),
            Some(("Alias\\Sub", TextRange::new(10.into(), 19.into())))
        );
    }

    #[test]
    fn test_segments_of_fully_qualified_name() {
        let name = ident("\\App\\Foo", 0);
        assert!(name.is_fully_qualified());
        assert!(name.first_segment().is_none());
        assert_eq!(name.namespace_part(), Some(("App", TextRange::new(1.into(), 4.into()))));
    }

    #[test]
    fn test_simple_name_has_no_namespace() {
        let name = ident("Foo", 3);
        assert!(!name.is_qualified());
        assert!(name.namespace_part().is_none());
        assert_eq!(name.last_segment_range(), name.range);
    }
}
