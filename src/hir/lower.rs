//! Lowering: syntax tree and tokens to a [`ScopeModel`].
//!
//! One walk over the AST opens scopes, declares every named element and
//! records reference sites. Comments not attached to a declaration are
//! scanned afterwards for inline `@var` annotations and doc types.
//! Malformed subtrees lose their block range or are skipped; lowering
//! itself never fails.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::debug;

use super::ids::{DeclId, ScopeId};
use super::index::{DeclFamily, DeclKind, NewDeclaration};
use super::resolve::{Resolver, is_builtin_type};
use super::scope::{
    NewReference, NewScope, ReferenceKind, Receiver, ScopeKind, ScopeModel, ScopeModelBuilder,
};
use super::source::ProjectIndex;
use crate::base::{FileId, TextRange, TextSize};
use crate::syntax::ast::*;
use crate::syntax::{DocBlock, DocTagKind, DocType, Token, TokenKind, parse_doc_block, parse_inline_var};

/// Range from `start` to `end` when it is non-empty and well ordered.
fn block_between(start: TextSize, end: TextSize) -> Option<TextRange> {
    (start < end).then(|| TextRange::new(start, end))
}

/// Name given to the type of an anonymous class.
pub fn anonymous_class_name(range: TextRange) -> SmolStr {
    SmolStr::new(format!("class@anonymous#{}", u32::from(range.start())))
}

/// Build the scope model of one file against the declarations `project`
/// exports from every other file.
pub fn lower_file(
    file: FileId,
    path: impl Into<Arc<str>>,
    tokens: &[Token],
    ast: &SourceFile,
    project: &ProjectIndex,
) -> ScopeModel {
    let len = tokens.last().map(Token::end).unwrap_or_default();
    let mut builder = ScopeModelBuilder::new(file, path, len);

    for (other, indexed) in project.iter() {
        if other == file {
            continue;
        }
        builder.add_file(other, indexed.path.clone());
        for decl in indexed.declarations.iter() {
            if let Err(err) = builder.declare_indexed(decl.clone().with_file(other)) {
                debug!(%err, "skipping indexed declaration");
            }
        }
    }

    let mut lowering = Lowering {
        builder,
        tokens,
        namespace: SmolStr::default(),
        handled_comments: FxHashSet::default(),
    };
    let root = lowering.builder.root();
    for item in &ast.items {
        lowering.item(root, item);
    }
    lowering.loose_comments();
    lowering.builder.build()
}

/// Declarations of `model`'s own file that other files can see, with
/// every stored type name fully qualified.
pub fn export_declarations(model: &ScopeModel) -> Vec<NewDeclaration> {
    let resolver = Resolver::new(model);
    model
        .index()
        .in_file(model.file())
        .filter(|decl| decl.scope.is_some() && !decl.kind.is_scoped())
        .map(|decl| {
            let here = resolver.clone().with_scope(decl.scope.unwrap_or(model.root()));
            let qualify = |name: &SmolStr| -> SmolStr {
                let resolved = here.resolve_type_name(name);
                match resolved.first() {
                    Some(found) => found.qualified_name.clone(),
                    None => here
                        .qualify(name, DeclFamily::Type)
                        .into_iter()
                        .next()
                        .unwrap_or_else(|| name.clone()),
                }
            };
            let mut new = NewDeclaration::new(decl.kind, decl.name.clone(), decl.name_range)
                .with_qualified_name(decl.qualified_name.clone())
                .with_supertypes(decl.supertypes.iter().map(&qualify).collect())
                .with_types(decl.types.iter().map(&qualify).collect())
                .with_deprecated(decl.deprecated)
                .with_visibility(decl.visibility)
                .with_static(decl.is_static);
            new.owner = decl.owner.clone();
            new.is_magic = decl.is_magic;
            new
        })
        .collect()
}

struct Lowering<'t> {
    builder: ScopeModelBuilder,
    tokens: &'t [Token],
    /// Current namespace, without leading `\`.
    namespace: SmolStr,
    /// Comments already read as the doc of a declaration.
    handled_comments: FxHashSet<TextRange>,
}

impl Lowering<'_> {
    // ========================================================================
    // HELPERS
    // ========================================================================

    fn qualified(&self, name: &str) -> SmolStr {
        if self.namespace.is_empty() {
            SmolStr::new(name)
        } else {
            SmolStr::new(format!("{}\\{}", self.namespace, name))
        }
    }

    /// Open a child scope; a block that breaks nesting is dropped.
    fn open(&mut self, parent: ScopeId, new: NewScope) -> Option<ScopeId> {
        match self.builder.open_scope(parent, new.clone()) {
            Ok(id) => Some(id),
            Err(err) => {
                debug!(%err, name = %new.name, "dropping block of malformed scope");
                self.builder.open_scope(parent, new.with_block(None)).ok()
            }
        }
    }

    fn declare(&mut self, scope: ScopeId, new: NewDeclaration) -> Option<DeclId> {
        match self.builder.declare(scope, new) {
            Ok(id) => Some(id),
            Err(err) => {
                debug!(%err, "declaration dropped");
                None
            }
        }
    }

    fn site(&mut self, scope: ScopeId, new: NewReference) {
        if let Err(err) = self.builder.reference(scope, new) {
            debug!(%err, "reference dropped");
        }
    }

    fn variable_scope(&self, scope: ScopeId) -> ScopeId {
        self.builder
            .ancestors(scope)
            .find(|s| s.kind.is_variable_scope())
            .map(|s| s.id)
            .unwrap_or(self.builder.root())
    }

    fn owner_name(&self, decl: DeclId) -> SmolStr {
        self.builder
            .declaration(decl)
            .map(|d| d.qualified_name.clone())
            .unwrap_or_default()
    }

    /// Whether `name` is a type alias imported by a `use` visible here.
    fn is_type_alias(&self, scope: ScopeId, name: &str) -> bool {
        let Some(container) = self
            .builder
            .ancestors(scope)
            .find(|s| matches!(s.kind, ScopeKind::Namespace | ScopeKind::File))
        else {
            return false;
        };
        container
            .children
            .iter()
            .filter_map(|&child| self.builder.scope(child))
            .filter(|s| s.kind == ScopeKind::Use)
            .flat_map(|s| s.declarations.iter())
            .filter_map(|&id| self.builder.declaration(id))
            .any(|d| {
                d.kind == DeclKind::UseAlias(UseKind::Type)
                    && DeclFamily::UseAlias.names_match(&d.name, name)
            })
    }

    /// Record a site for a (possibly qualified) name: the last segment gets
    /// `kind`, the namespace part a namespace or alias site.
    fn name_site(&mut self, scope: ScopeId, name: &Ident, kind: ReferenceKind) {
        let is_type = matches!(
            kind,
            ReferenceKind::TypeName | ReferenceKind::InstanceCreation | ReferenceKind::DocType
        );
        if is_type && is_builtin_type(&name.name) {
            return;
        }
        self.site(
            scope,
            NewReference::new(kind, name.name.clone(), name.last_segment_range()),
        );
        match name.first_segment() {
            Some((first, range)) if self.is_type_alias(scope, first) => {
                self.site(scope, NewReference::new(ReferenceKind::UseAlias, first, range));
            }
            _ => {
                if let Some((part, range)) = name.namespace_part() {
                    let written = if name.is_fully_qualified() {
                        SmolStr::new(format!("\\{}", part))
                    } else {
                        SmolStr::new(part)
                    };
                    self.site(scope, NewReference::new(ReferenceKind::Namespace, written, range));
                }
            }
        }
    }

    fn type_hint(&mut self, scope: ScopeId, hint: Option<&TypeHint>) -> Vec<SmolStr> {
        let Some(hint) = hint else {
            return Vec::new();
        };
        let mut types = Vec::new();
        for name in &hint.names {
            self.name_site(scope, name, ReferenceKind::TypeName);
            if !is_builtin_type(&name.name) || name.name.eq_ignore_ascii_case("self") {
                types.push(name.name.clone());
            }
        }
        types
    }

    /// Parse a declaration's doc comment and mark it handled.
    fn doc(&mut self, doc: Option<&DocComment>) -> Option<DocBlock> {
        let doc = doc?;
        self.handled_comments.insert(doc.range);
        match parse_doc_block(&doc.text, doc.range.start()) {
            Ok(block) => Some(block),
            Err(err) => {
                debug!(%err, "unreadable doc comment");
                None
            }
        }
    }

    fn doc_type_sites(&mut self, scope: ScopeId, types: &[DocType]) {
        for ty in types {
            let ident = Ident::new(ty.name.clone(), ty.range);
            self.name_site(scope, &ident, ReferenceKind::DocType);
        }
    }

    /// Type sites of every tag plus variable sites of `@param` tags.
    fn doc_sites(&mut self, scope: ScopeId, block: &DocBlock) {
        for tag in &block.tags {
            if !tag.kind.is_type_tag() {
                continue;
            }
            self.doc_type_sites(scope, &tag.types);
            if tag.kind == DocTagKind::Param {
                if let Some(var) = &tag.variable {
                    if let Some(decl) = self.builder.variable(scope, &var.name) {
                        self.site(
                            scope,
                            NewReference::new(ReferenceKind::Variable, var.name.clone(), var.range),
                        );
                        self.builder
                            .add_types(decl, tag.types.iter().map(|t| t.name.clone()));
                    }
                }
            }
        }
    }

    /// First occurrence of a variable in its scope declares it; later ones
    /// reference it.
    fn variable(&mut self, scope: ScopeId, name: &Ident) -> Option<DeclId> {
        if let Some(decl) = self.builder.variable(scope, &name.name) {
            self.site(
                scope,
                NewReference::new(ReferenceKind::Variable, name.name.clone(), name.range),
            );
            return Some(decl);
        }
        let vars = self.variable_scope(scope);
        self.declare(
            vars,
            NewDeclaration::new(DeclKind::Variable, name.name.clone(), name.range),
        )
    }

    // ========================================================================
    // ITEMS
    // ========================================================================

    fn item(&mut self, scope: ScopeId, item: &Item) {
        match item {
            Item::Namespace(ns) => self.namespace_decl(scope, ns),
            Item::Use(use_decl) => self.use_decl(scope, use_decl),
            Item::Type(ty) => self.type_decl(scope, ty),
            Item::Function(function) => self.function_decl(scope, function),
            Item::Stmt(stmt) => self.stmt(scope, stmt),
        }
    }

    fn namespace_decl(&mut self, scope: ScopeId, ns: &NamespaceDecl) {
        let name = ns
            .name
            .as_ref()
            .map(|n| SmolStr::new(n.name.trim_start_matches('\\')))
            .unwrap_or_default();
        let name_range = ns
            .name
            .as_ref()
            .map(|n| n.range)
            .unwrap_or(TextRange::empty(ns.range.start()));
        let decl = match &ns.name {
            Some(ident) => self.declare(
                scope,
                NewDeclaration::new(DeclKind::Namespace, ident.last_segment(), ident.range)
                    .with_qualified_name(name.clone()),
            ),
            None => None,
        };
        let block = ns.block.unwrap_or(ns.range);
        let mut new = NewScope::new(ScopeKind::Namespace, name.clone(), name_range)
            .with_block((!block.is_empty()).then_some(block));
        if let Some(decl) = decl {
            new = new.with_declaration(decl);
        }
        let Some(inner) = self.open(scope, new) else {
            return;
        };

        let outer = std::mem::replace(&mut self.namespace, name);
        for item in &ns.items {
            self.item(inner, item);
        }
        self.namespace = outer;
    }

    fn use_decl(&mut self, scope: ScopeId, use_decl: &UseDecl) {
        let Some(use_scope) = self.open(scope, NewScope::new(ScopeKind::Use, "", use_decl.range))
        else {
            return;
        };
        let kind = match use_decl.kind {
            UseKind::Type => ReferenceKind::TypeName,
            UseKind::Function => ReferenceKind::Function,
            UseKind::Constant => ReferenceKind::Constant,
        };
        for clause in &use_decl.clauses {
            // use paths are always absolute
            let absolute = format!("\\{}", clause.path.name.trim_start_matches('\\'));
            self.site(
                scope,
                NewReference::new(kind, absolute, clause.path.last_segment_range()),
            );
            if let Some((part, range)) = clause.path.namespace_part() {
                self.site(
                    scope,
                    NewReference::new(
                        ReferenceKind::Namespace,
                        format!("\\{}", part),
                        range,
                    ),
                );
            }

            let (alias, alias_range) = match &clause.alias {
                Some(alias) => (alias.name.clone(), alias.range),
                None => (
                    SmolStr::new(clause.path.last_segment()),
                    clause.path.last_segment_range(),
                ),
            };
            self.declare(
                use_scope,
                NewDeclaration::new(DeclKind::UseAlias(use_decl.kind), alias, alias_range)
                    .with_alias_target(clause.path.name.clone()),
            );
        }
    }

    fn function_decl(&mut self, scope: ScopeId, function: &FunctionDecl) {
        let doc = self.doc(function.doc.as_ref());
        let decl = self.declare(
            scope,
            NewDeclaration::new(DeclKind::Function, function.name.name.clone(), function.name.range)
                .with_qualified_name(self.qualified(&function.name.name))
                .with_deprecated(doc.as_ref().is_some_and(DocBlock::is_deprecated)),
        );
        let end = function.body.as_ref().map_or(function.params_range.end(), |b| b.range.end());
        let mut new = NewScope::new(ScopeKind::Function, function.name.name.clone(), function.name.range)
            .with_block(block_between(function.params_range.start(), end));
        if let Some(decl) = decl {
            new = new.with_declaration(decl);
        }
        let Some(inner) = self.open(scope, new) else {
            return;
        };
        self.params(inner, None, &function.params);
        self.type_hint(inner, function.return_type.as_ref());
        if let Some(doc) = &doc {
            self.doc_sites(inner, doc);
        }
        if let Some(body) = &function.body {
            self.stmts(inner, &body.stmts);
        }
    }

    /// Declare parameters in `scope`; promoted ones also declare fields of
    /// `owner`.
    fn params(&mut self, scope: ScopeId, owner: Option<(ScopeId, DeclId)>, params: &[Param]) {
        for param in params {
            let types = self.type_hint(scope, param.ty.as_ref());
            if let (Some(modifiers), Some((type_scope, owner))) = (param.promoted, owner) {
                let owner_name = self.owner_name(owner);
                self.declare(
                    type_scope,
                    NewDeclaration::new(
                        DeclKind::Field,
                        param.name.name.trim_start_matches('$'),
                        param.name.range,
                    )
                    .with_owner(owner_name)
                    .with_visibility(modifiers.visibility())
                    .with_types(types.clone()),
                );
            }
            self.declare(
                scope,
                NewDeclaration::new(DeclKind::Variable, param.name.name.clone(), param.name.range)
                    .with_types(types),
            );
            if let Some(default) = &param.default {
                self.expr(scope, default);
            }
        }
    }

    // ========================================================================
    // TYPES
    // ========================================================================

    fn type_decl(&mut self, scope: ScopeId, ty: &TypeDecl) {
        let doc = self.doc(ty.doc.as_ref());
        let mut supertypes: Vec<SmolStr> = ty
            .extends
            .iter()
            .chain(&ty.implements)
            .map(|name| name.name.clone())
            .collect();
        if let Some(body) = &ty.body {
            supertypes.extend(trait_names(body));
        }
        if let Some(doc) = &doc {
            supertypes.extend(
                doc.tags
                    .iter()
                    .filter(|tag| tag.kind == DocTagKind::Mixin)
                    .flat_map(|tag| tag.types.iter().map(|t| t.name.clone())),
            );
        }
        for name in ty.extends.iter().chain(&ty.implements) {
            self.name_site(scope, name, ReferenceKind::TypeName);
        }

        let Some(decl) = self.declare(
            scope,
            NewDeclaration::new(DeclKind::Type(ty.kind), ty.name.name.clone(), ty.name.range)
                .with_qualified_name(self.qualified(&ty.name.name))
                .with_supertypes(supertypes)
                .with_deprecated(doc.as_ref().is_some_and(DocBlock::is_deprecated)),
        ) else {
            return;
        };
        let block = ty.body.as_ref().map(|body| body.range).filter(|r| !r.is_empty());
        let Some(inner) = self.open(
            scope,
            NewScope::new(ScopeKind::Type(ty.kind), ty.name.name.clone(), ty.name.range)
                .with_block(block)
                .with_declaration(decl),
        ) else {
            return;
        };
        if let Some(doc) = &doc {
            self.doc_sites(inner, doc);
            self.magic_members(inner, decl, doc);
        }
        if let Some(body) = &ty.body {
            self.members(inner, decl, &body.members);
        }
    }

    fn anonymous_class(&mut self, scope: ScopeId, class: &AnonymousClass) {
        for arg in &class.args {
            self.expr(scope, arg);
        }
        for name in class.extends.iter().chain(&class.implements) {
            self.name_site(scope, name, ReferenceKind::TypeName);
        }
        let mut supertypes: Vec<SmolStr> = class
            .extends
            .iter()
            .chain(&class.implements)
            .map(|name| name.name.clone())
            .collect();
        if let Some(body) = &class.body {
            supertypes.extend(trait_names(body));
        }
        let name = anonymous_class_name(class.range);
        let name_range = TextRange::at(class.range.start(), TextSize::of("new"));
        let Some(decl) = self.declare(
            scope,
            NewDeclaration::new(DeclKind::Type(TypeKind::Class), name.clone(), name_range)
                .with_supertypes(supertypes),
        ) else {
            return;
        };
        let block = class.body.as_ref().map(|body| body.range).filter(|r| !r.is_empty());
        let Some(inner) = self.open(
            scope,
            NewScope::new(ScopeKind::Type(TypeKind::Class), name, name_range)
                .with_block(block)
                .with_declaration(decl),
        ) else {
            return;
        };
        if let Some(body) = &class.body {
            self.members(inner, decl, &body.members);
        }
    }

    /// `@property` and `@method` tags declare virtual members.
    fn magic_members(&mut self, scope: ScopeId, owner: DeclId, doc: &DocBlock) {
        let owner_name = self.owner_name(owner);
        for tag in &doc.tags {
            match tag.kind {
                DocTagKind::Property | DocTagKind::PropertyRead | DocTagKind::PropertyWrite => {
                    let Some(var) = &tag.variable else { continue };
                    self.declare(
                        scope,
                        NewDeclaration::new(DeclKind::Field, var.name.trim_start_matches('$'), var.range)
                            .with_owner(owner_name.clone())
                            .with_types(tag.types.iter().map(|t| t.name.clone()).collect())
                            .magic(),
                    );
                }
                DocTagKind::Method => {
                    let Some(method) = &tag.method else { continue };
                    self.declare(
                        scope,
                        NewDeclaration::new(DeclKind::Method, method.name.clone(), method.name_range)
                            .with_owner(owner_name.clone())
                            .with_static(method.is_static)
                            .magic(),
                    );
                }
                _ => {}
            }
        }
    }

    fn members(&mut self, scope: ScopeId, owner: DeclId, members: &[Member]) {
        let owner_name = self.owner_name(owner);
        for member in members {
            match member {
                Member::Method(method) => self.method(scope, owner, method),
                Member::Property(property) => {
                    let doc = self.doc(property.doc.as_ref());
                    let mut types = self.type_hint(scope, property.ty.as_ref());
                    if let Some(doc) = &doc {
                        self.doc_sites(scope, doc);
                        types.extend(
                            doc.tags
                                .iter()
                                .filter(|tag| tag.kind == DocTagKind::Var)
                                .flat_map(|tag| tag.types.iter().map(|t| t.name.clone())),
                        );
                    }
                    let deprecated = doc.as_ref().is_some_and(DocBlock::is_deprecated);
                    for entry in &property.entries {
                        self.declare(
                            scope,
                            NewDeclaration::new(
                                DeclKind::Field,
                                entry.name.name.trim_start_matches('$'),
                                entry.name.range,
                            )
                            .with_owner(owner_name.clone())
                            .with_visibility(property.modifiers.visibility())
                            .with_static(property.modifiers.is_static)
                            .with_types(types.clone())
                            .with_deprecated(deprecated),
                        );
                        if let Some(default) = &entry.default {
                            self.expr(scope, default);
                        }
                    }
                }
                Member::Constant(constant) => {
                    let doc = self.doc(constant.doc.as_ref());
                    let deprecated = doc.as_ref().is_some_and(DocBlock::is_deprecated);
                    for entry in &constant.entries {
                        self.declare(
                            scope,
                            NewDeclaration::new(DeclKind::ClassConstant, entry.name.name.clone(), entry.name.range)
                                .with_owner(owner_name.clone())
                                .with_visibility(constant.modifiers.visibility())
                                .with_static(true)
                                .with_deprecated(deprecated),
                        );
                        if let Some(value) = &entry.value {
                            self.expr(scope, value);
                        }
                    }
                }
                Member::EnumCase(case) => {
                    let doc = self.doc(case.doc.as_ref());
                    self.declare(
                        scope,
                        NewDeclaration::new(DeclKind::EnumCase, case.name.name.clone(), case.name.range)
                            .with_owner(owner_name.clone())
                            .with_static(true)
                            .with_deprecated(doc.as_ref().is_some_and(DocBlock::is_deprecated)),
                    );
                    if let Some(value) = &case.value {
                        self.expr(scope, value);
                    }
                }
                Member::TraitUse(uses) => {
                    for name in &uses.names {
                        self.name_site(scope, name, ReferenceKind::TypeName);
                    }
                }
                Member::Error(range) => {
                    debug!(?range, "skipping malformed member");
                }
            }
        }
    }

    fn method(&mut self, scope: ScopeId, owner: DeclId, method: &MethodDecl) {
        let doc = self.doc(method.doc.as_ref());
        let owner_name = self.owner_name(owner);
        let decl = self.declare(
            scope,
            NewDeclaration::new(DeclKind::Method, method.name.name.clone(), method.name.range)
                .with_owner(owner_name)
                .with_visibility(method.modifiers.visibility())
                .with_static(method.modifiers.is_static)
                .with_deprecated(doc.as_ref().is_some_and(DocBlock::is_deprecated)),
        );
        let end = method.body.as_ref().map_or(method.params_range.end(), |b| b.range.end());
        let mut new = NewScope::new(ScopeKind::Method, method.name.name.clone(), method.name.range)
            .with_block(block_between(method.params_range.start(), end));
        if let Some(decl) = decl {
            new = new.with_declaration(decl);
        }
        let Some(inner) = self.open(scope, new) else {
            return;
        };
        self.params(inner, Some((scope, owner)), &method.params);
        self.type_hint(inner, method.return_type.as_ref());
        if let Some(doc) = &doc {
            self.doc_sites(inner, doc);
        }
        if let Some(body) = &method.body {
            self.stmts(inner, &body.stmts);
        }
    }

    // ========================================================================
    // STATEMENTS
    // ========================================================================

    fn stmts(&mut self, scope: ScopeId, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(scope, stmt);
        }
    }

    fn stmt(&mut self, scope: ScopeId, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => self.expr(scope, expr),
            Stmt::Return(None) | Stmt::Error(_) => {}
            Stmt::Block(block) => self.stmts(scope, &block.stmts),
            Stmt::Control(control) => {
                for expr in &control.head {
                    self.expr(scope, expr);
                }
                self.stmts(scope, &control.body);
            }
            Stmt::Catch(catch) => {
                for name in &catch.types {
                    self.name_site(scope, name, ReferenceKind::TypeName);
                }
                if let Some(var) = &catch.var {
                    if let Some(decl) = self.variable(scope, var) {
                        self.builder
                            .add_types(decl, catch.types.iter().map(|t| t.name.clone()));
                    }
                }
                self.stmts(scope, &catch.body.stmts);
            }
            Stmt::Function(function) => self.function_decl(scope, function),
            Stmt::Type(ty) => self.type_decl(scope, ty),
        }
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    fn receiver(&mut self, scope: ScopeId, expr: &Expr) -> Receiver {
        match expr {
            Expr::This(_) => Receiver::This,
            Expr::Variable(var) => {
                self.variable(scope, var);
                Receiver::Variable(var.name.clone())
            }
            other => {
                self.expr(scope, other);
                Receiver::Unknown
            }
        }
    }

    fn class_ref(&mut self, scope: ScopeId, class: &ClassRef) -> Receiver {
        match class {
            ClassRef::SelfType(_) => Receiver::SelfType,
            ClassRef::Static(_) => Receiver::Static,
            ClassRef::Parent(_) => Receiver::Parent,
            ClassRef::Named(name) => {
                self.name_site(scope, name, ReferenceKind::TypeName);
                Receiver::Named(name.name.clone())
            }
            ClassRef::Expr(expr) => self.receiver(scope, expr),
        }
    }

    fn exprs(&mut self, scope: ScopeId, exprs: &[Expr]) {
        for expr in exprs {
            self.expr(scope, expr);
        }
    }

    fn expr(&mut self, scope: ScopeId, expr: &Expr) {
        match expr {
            Expr::Variable(var) => {
                self.variable(scope, var);
            }
            Expr::This(_) | Expr::String { .. } | Expr::Literal(_) | Expr::Error(_) => {}
            Expr::Name(name) => self.name_site(scope, name, ReferenceKind::Constant),
            Expr::ClassName(class) => {
                self.class_ref(scope, class);
            }
            Expr::Call { name, args } => self.call(scope, name, args),
            Expr::CallExpr { callee, args } => {
                self.expr(scope, callee);
                self.exprs(scope, args);
            }
            Expr::MethodCall {
                receiver,
                name,
                args,
            } => {
                let receiver = self.receiver(scope, receiver);
                self.site(
                    scope,
                    NewReference::new(ReferenceKind::Method, name.name.clone(), name.range)
                        .with_receiver(receiver),
                );
                self.exprs(scope, args);
            }
            Expr::StaticCall { class, name, args } => {
                let receiver = self.class_ref(scope, class);
                self.site(
                    scope,
                    NewReference::new(ReferenceKind::StaticMethod, name.name.clone(), name.range)
                        .with_receiver(receiver),
                );
                self.exprs(scope, args);
            }
            Expr::PropertyFetch { receiver, name } => {
                let receiver = self.receiver(scope, receiver);
                self.site(
                    scope,
                    NewReference::new(ReferenceKind::Field, name.name.clone(), name.range)
                        .with_receiver(receiver),
                );
            }
            Expr::StaticPropertyFetch { class, name } => {
                let receiver = self.class_ref(scope, class);
                self.site(
                    scope,
                    NewReference::new(
                        ReferenceKind::StaticField,
                        name.name.trim_start_matches('$'),
                        name.range,
                    )
                    .with_receiver(receiver),
                );
            }
            Expr::ClassConstant { class, name } => {
                let receiver = self.class_ref(scope, class);
                if !name.name.eq_ignore_ascii_case("class") {
                    self.site(
                        scope,
                        NewReference::new(ReferenceKind::ClassConstant, name.name.clone(), name.range)
                            .with_receiver(receiver),
                    );
                }
            }
            Expr::New { class, args, .. } => {
                match class {
                    ClassRef::Named(name) => {
                        self.name_site(scope, name, ReferenceKind::InstanceCreation)
                    }
                    ClassRef::Expr(inner) => self.expr(scope, inner),
                    ClassRef::SelfType(_) | ClassRef::Static(_) | ClassRef::Parent(_) => {}
                }
                self.exprs(scope, args);
            }
            Expr::NewAnonymous(class) => self.anonymous_class(scope, class),
            Expr::Closure(closure) => self.closure(scope, closure),
            Expr::ArrowFunction(arrow) => self.arrow_function(scope, arrow),
            Expr::Assign { target, value } => {
                let assigned = match target.as_ref() {
                    Expr::Variable(var) => self.variable(scope, var),
                    other => {
                        self.expr(scope, other);
                        None
                    }
                };
                self.expr(scope, value);
                if let (Some(decl), Some(ty)) = (assigned, created_type(value)) {
                    self.builder.add_types(decl, [ty]);
                }
            }
            Expr::Include { path, .. } => {
                let literal = match path.as_ref() {
                    Expr::String { value, range } => Some((value, *range)),
                    Expr::Other(parts) => match parts.last() {
                        Some(Expr::String { value, range }) => Some((value, *range)),
                        _ => None,
                    },
                    _ => None,
                };
                if let Some((value, range)) = literal {
                    self.site(
                        scope,
                        NewReference::new(ReferenceKind::IncludePath, value.clone(), range),
                    );
                }
                self.expr(scope, path);
            }
            Expr::Other(parts) => self.exprs(scope, parts),
        }
    }

    fn call(&mut self, scope: ScopeId, name: &Ident, args: &[Expr]) {
        let callee = name.last_segment();
        let first_string = match args.first() {
            Some(Expr::String { value, range }) => Some((value, *range)),
            _ => None,
        };
        match first_string {
            Some((value, range)) if callee.eq_ignore_ascii_case("define") && !value.is_empty() => {
                let constant = value.trim_start_matches('\\');
                self.declare(
                    scope,
                    NewDeclaration::new(
                        DeclKind::Constant,
                        constant.rsplit('\\').next().unwrap_or(constant),
                        range,
                    )
                    .with_qualified_name(constant),
                );
                self.exprs(scope, &args[1..]);
                return;
            }
            Some((value, range))
                if callee.eq_ignore_ascii_case("constant")
                    && !value.is_empty()
                    && !value.contains("::") =>
            {
                self.site(
                    scope,
                    NewReference::new(
                        ReferenceKind::Constant,
                        format!("\\{}", value.trim_start_matches('\\')),
                        range,
                    ),
                );
                self.exprs(scope, &args[1..]);
                return;
            }
            _ => {}
        }
        self.name_site(scope, name, ReferenceKind::Function);
        self.exprs(scope, args);
    }

    fn closure(&mut self, scope: ScopeId, closure: &Closure) {
        for captured in &closure.uses {
            self.variable(scope, captured);
        }
        let new = NewScope::new(ScopeKind::Variable, "", TextRange::empty(closure.range.start()))
            .with_block(block_between(closure.params_range.start(), closure.body.range.end()))
            .capturing(closure.uses.iter().map(|u| u.name.clone()).collect());
        let Some(inner) = self.open(scope, new) else {
            return;
        };
        self.params(inner, None, &closure.params);
        self.type_hint(inner, closure.return_type.as_ref());
        self.stmts(inner, &closure.body.stmts);
    }

    fn arrow_function(&mut self, scope: ScopeId, arrow: &ArrowFunction) {
        let new = NewScope::new(ScopeKind::Variable, "", TextRange::empty(arrow.range.start()))
            .with_block(block_between(arrow.params_range.start(), arrow.range.end()))
            .inheriting_variables();
        let Some(inner) = self.open(scope, new) else {
            return;
        };
        self.params(inner, None, &arrow.params);
        self.type_hint(inner, arrow.return_type.as_ref());
        self.expr(inner, &arrow.body);
    }

    // ========================================================================
    // COMMENTS
    // ========================================================================

    /// Inline `@var` annotations and doc types in comments that no
    /// declaration claimed.
    fn loose_comments(&mut self) {
        let tokens = self.tokens;
        for token in tokens {
            if !matches!(token.kind, TokenKind::Comment | TokenKind::DocComment) {
                continue;
            }
            if self.handled_comments.contains(&token.range) {
                continue;
            }
            let scope = self.builder.innermost_scope_at(token.start());
            if let Some(inline) = parse_inline_var(&token.text, token.start()) {
                let ident = Ident::new(inline.variable.name.clone(), inline.variable.range);
                if let Some(decl) = self.variable(scope, &ident) {
                    self.builder
                        .add_types(decl, inline.types.iter().map(|t| t.name.clone()));
                }
                self.doc_type_sites(scope, &inline.types);
                continue;
            }
            if token.kind != TokenKind::DocComment {
                continue;
            }
            let Ok(block) = parse_doc_block(&token.text, token.start()) else {
                continue;
            };
            for tag in &block.tags {
                if !tag.kind.is_type_tag() {
                    continue;
                }
                self.doc_type_sites(scope, &tag.types);
                if tag.kind != DocTagKind::Var {
                    continue;
                }
                if let Some(var) = &tag.variable {
                    let ident = Ident::new(var.name.clone(), var.range);
                    if let Some(decl) = self.variable(scope, &ident) {
                        self.builder
                            .add_types(decl, tag.types.iter().map(|t| t.name.clone()));
                    }
                }
            }
        }
    }
}

fn trait_names(body: &TypeBody) -> impl Iterator<Item = SmolStr> + '_ {
    body.members.iter().flat_map(|member| match member {
        Member::TraitUse(uses) => uses.names.iter().map(|n| n.name.clone()).collect(),
        _ => Vec::new(),
    })
}

/// The class named by a `new` expression.
fn created_type(value: &Expr) -> Option<SmolStr> {
    match value {
        Expr::New { class, .. } => match class {
            ClassRef::Named(name) => Some(name.name.clone()),
            ClassRef::SelfType(_) | ClassRef::Static(_) => Some(SmolStr::new("self")),
            ClassRef::Parent(_) => Some(SmolStr::new("parent")),
            ClassRef::Expr(_) => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::scope::ReferenceSite;
    use crate::syntax::{lex, parse};

    fn lower(text: &str) -> ScopeModel {
        let tokens = lex(text);
        let ast = parse(&tokens);
        lower_file(FileId::new(0), "/test.php", &tokens, &ast, &ProjectIndex::new())
    }

    fn offset(text: &str, needle: &str) -> TextSize {
        TextSize::from(text.find(needle).unwrap() as u32)
    }

    /// The site covering the first `len` bytes of `needle`.
    fn site_at<'m>(model: &'m ScopeModel, text: &str, needle: &str, len: u32) -> &'m ReferenceSite {
        let range = TextRange::at(offset(text, needle), len.into());
        model.reference_at(range).unwrap()
    }

    #[test]
    fn test_lower_class_declares_members() {
        let text = "<?php\nclass A {\n    private $x = 1;\n    const C = 2;\n    public function run($a) { return $a; }\n}\n";
        let model = lower(text);
        let index = model.index();

        let run = index.member("A", DeclFamily::Method, "run");
        assert_eq!(run.len(), 1);
        assert_eq!(run[0].qualified_name, "A::run");
        let x = index.member("A", DeclFamily::Field, "x");
        assert_eq!(x[0].visibility, Visibility::Private);
        assert!(index.member("A", DeclFamily::ClassConstant, "C")[0].is_static);
    }

    #[test]
    fn test_lower_method_scope_holds_parameters() {
        let text = "<?php\nclass A {\n    public function run($a) { return $a; }\n}\n";
        let model = lower(text);
        let use_offset = TextSize::from(text.rfind("$a").unwrap() as u32);
        let scope = model.innermost_scope_at(use_offset);
        assert_eq!(model.scope(scope).unwrap().kind, ScopeKind::Method);

        let site = site_at(&model, text, "$a; }", 2);
        assert_eq!(site.kind, ReferenceKind::Variable);
        let resolved = Resolver::new(&model).resolve_reference(site).unwrap();
        let decl = model.declaration(resolved.declarations[0]).unwrap();
        assert_eq!(decl.name_range.start(), offset(text, "$a)"));
    }

    #[test]
    fn test_lower_namespace_and_use_alias() {
        let text = "<?php\nnamespace App;\nuse Lib\\Db as Conn;\nnew Conn\\Pool();\n";
        let model = lower(text);
        let alias = site_at(&model, text, "Conn\\Pool", 4);
        assert_eq!(alias.kind, ReferenceKind::UseAlias);
        let pool = site_at(&model, text, "Pool", 4);
        assert_eq!(pool.kind, ReferenceKind::InstanceCreation);
        assert_eq!(pool.name, "Conn\\Pool");

        let resolver = Resolver::new(&model).with_scope(pool.scope);
        assert_eq!(resolver.qualify(&pool.name, DeclFamily::Type), vec!["Lib\\Db\\Pool"]);
    }

    #[test]
    fn test_lower_receivers() {
        let text = "<?php\nclass A {\n    function f() { $this->g(); self::h(); $o = new B(); $o->k; }\n}\n";
        let model = lower(text);
        assert_eq!(site_at(&model, text, "g()", 1).receiver, Receiver::This);
        assert_eq!(site_at(&model, text, "h()", 1).receiver, Receiver::SelfType);
        assert_eq!(site_at(&model, text, "k;", 1).receiver, Receiver::Variable("$o".into()));

        let o = model
            .index()
            .in_file(FileId::new(0))
            .find(|d| d.name == "$o")
            .unwrap();
        assert_eq!(o.types, vec!["B"]);
    }

    #[test]
    fn test_lower_define_and_include() {
        let text = "<?php\ndefine('LIMIT', 10);\necho LIMIT;\nrequire_once 'lib/a.php';\n";
        let model = lower(text);
        let decl = model.index().find(DeclFamily::Constant, "LIMIT", Default::default());
        assert_eq!(decl.len(), 1);
        assert_eq!(decl[0].name_range.start(), offset(text, "LIMIT'"));

        assert_eq!(site_at(&model, text, "LIMIT;", 5).kind, ReferenceKind::Constant);
        let include = site_at(&model, text, "lib/a.php", 9);
        assert_eq!(include.kind, ReferenceKind::IncludePath);
    }

    #[test]
    fn test_lower_inline_var_comment_types_variable() {
        let text = "<?php\nfunction f() {\n    /* @var $x Foo|Bar */\n    $x->go();\n}\n";
        let model = lower(text);
        let x = model
            .index()
            .in_file(FileId::new(0))
            .find(|d| d.name == "$x")
            .unwrap();
        assert_eq!(x.types, vec!["Foo", "Bar"]);
        assert_eq!(site_at(&model, text, "Bar", 3).kind, ReferenceKind::DocType);
    }

    #[test]
    fn test_lower_closure_captures_and_arrow_inherits() {
        let text = "<?php\n$a = 1;\n$f = function () use ($a) { return $a; };\n$g = fn() => $a;\n";
        let model = lower(text);
        let declared = model
            .index()
            .in_file(FileId::new(0))
            .filter(|d| d.name == "$a")
            .count();
        assert_eq!(declared, 1);
        let uses = model
            .references()
            .iter()
            .filter(|r| r.kind == ReferenceKind::Variable && r.name == "$a")
            .count();
        assert_eq!(uses, 3);
    }

    #[test]
    fn test_lower_imports_project_declarations() {
        let mut project = ProjectIndex::new();
        project.index_file(FileId::new(1), "/lib.php", "<?php\nclass Lib { function go() {} }\n");
        let text = "<?php\n$l = new Lib();\n$l->go();\n";
        let tokens = lex(text);
        let ast = parse(&tokens);
        let model = lower_file(FileId::new(0), "/main.php", &tokens, &ast, &project);

        let lib = model.index().find(DeclFamily::Type, "Lib", Default::default());
        assert_eq!(lib[0].file, Some(FileId::new(1)));
        assert_eq!(model.source_root().display_name(FileId::new(1)), Some("lib.php"));

        let go = site_at(&model, text, "go", 2);
        let resolved = Resolver::new(&model).resolve_reference(go).unwrap();
        assert_eq!(resolved.declarations.len(), 1);
    }
}
