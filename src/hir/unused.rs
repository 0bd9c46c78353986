//! Unused private member tracking.
//!
//! One pass over the syntax tree. For every type body the tracker first
//! declares all members, then walks the deferred method bodies and
//! initializers, so a member referenced by a sibling declared later is
//! still seen as used. Whatever is still pending when a type's deferred
//! work is done is reported unused.
//!
//! Declared members and member references both come out as
//! [`MemberHighlight`]s; static and deprecated flags are independent of the
//! used/unused state.

use std::ops::ControlFlow;

use indexmap::IndexMap;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::index::{DeclFamily, DeclKind, DeclarationIndex};
use crate::base::TextRange;
use crate::syntax::ast::*;
use crate::syntax::parse_doc_block;

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemberKind {
    Method,
    Field,
    Constant,
    EnumCase,
}

impl MemberKind {
    /// Constants and enum cases share one name space.
    pub fn family(self) -> DeclFamily {
        match self {
            MemberKind::Method => DeclFamily::Method,
            MemberKind::Field => DeclFamily::Field,
            MemberKind::Constant | MemberKind::EnumCase => DeclFamily::ClassConstant,
        }
    }

    fn from_decl(kind: DeclKind) -> Option<Self> {
        match kind {
            DeclKind::Method => Some(MemberKind::Method),
            DeclKind::Field => Some(MemberKind::Field),
            DeclKind::ClassConstant => Some(MemberKind::Constant),
            DeclKind::EnumCase => Some(MemberKind::EnumCase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HighlightSite {
    Declaration,
    Reference,
}

/// Classification of one member declaration or member reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemberHighlight {
    /// Fields without their `$`.
    pub name: SmolStr,
    pub range: TextRange,
    pub kind: MemberKind,
    pub site: HighlightSite,
    /// Only ever set on declarations of private members.
    pub unused: bool,
    pub is_static: bool,
    pub deprecated: bool,
}

// ============================================================================
// SESSION STATE
// ============================================================================

/// Deprecated member names known to the current analysis session.
///
/// Consulted for references the current type does not declare itself.
#[derive(Debug, Clone, Default)]
pub struct DeprecatedMembers {
    names: FxHashSet<(DeclFamily, SmolStr)>,
}

impl DeprecatedMembers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every deprecated member of `index`.
    pub fn from_index(index: &DeclarationIndex) -> Self {
        let mut members = Self::new();
        for decl in index.iter().filter(|decl| decl.deprecated) {
            if let Some(kind) = MemberKind::from_decl(decl.kind) {
                members.insert(kind, &decl.name);
            }
        }
        members
    }

    pub fn insert(&mut self, kind: MemberKind, name: &str) {
        let family = kind.family();
        self.names.insert((family, family.normalize(name)));
    }

    pub fn contains(&self, kind: MemberKind, name: &str) -> bool {
        let family = kind.family();
        self.names.contains(&(family, family.normalize(name)))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ============================================================================
// TRACKER
// ============================================================================

/// The type whose body is being visited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    pub node: NodeId,
    /// `None` for anonymous classes.
    pub name: Option<SmolStr>,
    pub kind: TypeKind,
}

impl TypeInfo {
    pub fn is_trait(&self) -> bool {
        self.kind == TypeKind::Trait
    }

    /// Whether a class name as written denotes this type.
    fn is_named(&self, written: &str) -> bool {
        let last = written.rsplit('\\').next().unwrap_or(written);
        self.name
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(last))
    }
}

/// Identity of a pending member: name under the family's case rule plus
/// the declaring type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnusedKey {
    pub name: SmolStr,
    pub family: DeclFamily,
    pub owner: NodeId,
}

impl UnusedKey {
    fn new(kind: MemberKind, name: &str, owner: NodeId) -> Self {
        let family = kind.family();
        Self {
            name: family.normalize(name),
            family,
            owner,
        }
    }
}

enum Deferred<'a> {
    Method(&'a MethodDecl),
    Expr(&'a Expr),
}

/// Walks one syntax subtree. Create one per top-level item.
pub struct UnusedMemberTracker<'a> {
    deprecated: &'a DeprecatedMembers,
    cancel: Option<&'a CancellationToken>,
    types: Vec<TypeInfo>,
    /// Every member declared so far, used or not.
    declared: FxHashMap<UnusedKey, MemberHighlight>,
    pending: IndexMap<UnusedKey, MemberHighlight>,
    visited_anonymous: FxHashSet<NodeId>,
    output: Vec<MemberHighlight>,
}

impl<'a> UnusedMemberTracker<'a> {
    pub fn new(deprecated: &'a DeprecatedMembers) -> Self {
        Self {
            deprecated,
            cancel: None,
            types: Vec::new(),
            declared: FxHashMap::default(),
            pending: IndexMap::new(),
            visited_anonymous: FxHashSet::default(),
            output: Vec::new(),
        }
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn poll(&self) -> ControlFlow<()> {
        if self.cancel.is_some_and(CancellationToken::is_cancelled) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Visit `item`; `None` when cancelled.
    pub fn track(mut self, item: &Item) -> Option<Vec<MemberHighlight>> {
        match self.item(item) {
            ControlFlow::Continue(()) => Some(self.output),
            ControlFlow::Break(()) => None,
        }
    }

    // ------------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------------

    fn declare(&mut self, owner: &TypeInfo, highlight: MemberHighlight, tracked: bool) {
        let key = UnusedKey::new(highlight.kind, &highlight.name, owner.node);
        self.declared.insert(key.clone(), highlight.clone());
        if tracked {
            self.pending.insert(key, highlight);
        } else {
            self.output.push(highlight);
        }
    }

    /// A reference to member `name`; `target` is the type it is looked up
    /// on when that type is being visited.
    fn reference(
        &mut self,
        kind: MemberKind,
        name: &str,
        range: TextRange,
        static_access: bool,
        target: Option<NodeId>,
    ) {
        let mut is_static = static_access;
        let mut deprecated = self.deprecated.contains(kind, name);
        if let Some(owner) = target {
            let key = UnusedKey::new(kind, name, owner);
            if let Some(declared) = self.declared.get(&key) {
                is_static = declared.is_static;
                deprecated = declared.deprecated;
            }
            if let Some(used) = self.pending.swap_remove(&key) {
                self.output.push(used);
            }
        }
        self.output.push(MemberHighlight {
            name: SmolStr::new(name),
            range,
            kind,
            site: HighlightSite::Reference,
            unused: false,
            is_static,
            deprecated,
        });
    }

    fn current_type(&self) -> Option<NodeId> {
        self.types.last().map(|info| info.node)
    }

    fn class_target(&self, class: &ClassRef) -> Option<NodeId> {
        match class {
            ClassRef::SelfType(_) | ClassRef::Static(_) => self.current_type(),
            ClassRef::Named(name) => self
                .types
                .iter()
                .rev()
                .find(|info| info.is_named(&name.name))
                .map(|info| info.node),
            ClassRef::Parent(_) | ClassRef::Expr(_) => None,
        }
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    fn type_body(&mut self, info: TypeInfo, body: Option<&TypeBody>) -> ControlFlow<()> {
        self.poll()?;
        let Some(body) = body else {
            debug!(node = ?info.node, "skipping type without a well-formed body");
            return ControlFlow::Continue(());
        };

        let mut deferred = Vec::new();
        for member in &body.members {
            self.declare_member(&info, member, &mut deferred);
        }

        self.types.push(info);
        let walked = deferred.iter().try_for_each(|work| match work {
            Deferred::Method(method) => self.method_body(method),
            Deferred::Expr(expr) => self.expr(expr),
        });
        let Some(info) = self.types.pop() else {
            return walked;
        };
        walked?;

        let finished: Vec<UnusedKey> = self
            .pending
            .keys()
            .filter(|key| key.owner == info.node)
            .cloned()
            .collect();
        for key in finished {
            if let Some(mut unused) = self.pending.swap_remove(&key) {
                unused.unused = true;
                self.output.push(unused);
            }
        }
        self.declared.retain(|key, _| key.owner != info.node);
        ControlFlow::Continue(())
    }

    fn declare_member<'t>(&mut self, info: &TypeInfo, member: &'t Member, deferred: &mut Vec<Deferred<'t>>) {
        let tracks = |visibility: Visibility, kind: MemberKind| {
            if info.is_trait() {
                return false;
            }
            match visibility {
                Visibility::Private => true,
                // enums are final, so protected constants are private in effect
                Visibility::Protected => info.kind == TypeKind::Enum && kind == MemberKind::Constant,
                Visibility::Public => false,
            }
        };

        match member {
            Member::Method(method) => {
                let magic = method.name.name.starts_with("__");
                let visibility = method.modifiers.visibility();
                self.declare(
                    info,
                    MemberHighlight {
                        name: method.name.name.clone(),
                        range: method.name.range,
                        kind: MemberKind::Method,
                        site: HighlightSite::Declaration,
                        unused: false,
                        is_static: method.modifiers.is_static,
                        deprecated: is_deprecated(method.doc.as_ref()),
                    },
                    !magic && tracks(visibility, MemberKind::Method),
                );
                for param in &method.params {
                    let Some(modifiers) = param.promoted else { continue };
                    let visibility = modifiers.visibility();
                    self.declare(
                        info,
                        MemberHighlight {
                            name: SmolStr::new(param.name.name.trim_start_matches('$')),
                            range: param.name.range,
                            kind: MemberKind::Field,
                            site: HighlightSite::Declaration,
                            unused: false,
                            is_static: false,
                            deprecated: false,
                        },
                        tracks(visibility, MemberKind::Field),
                    );
                }
                deferred.push(Deferred::Method(method));
            }
            Member::Property(property) => {
                let deprecated = is_deprecated(property.doc.as_ref());
                let tracked = tracks(property.modifiers.visibility(), MemberKind::Field);
                for entry in &property.entries {
                    self.declare(
                        info,
                        MemberHighlight {
                            name: SmolStr::new(entry.name.name.trim_start_matches('$')),
                            range: entry.name.range,
                            kind: MemberKind::Field,
                            site: HighlightSite::Declaration,
                            unused: false,
                            is_static: property.modifiers.is_static,
                            deprecated,
                        },
                        tracked,
                    );
                    if let Some(default) = &entry.default {
                        deferred.push(Deferred::Expr(default));
                    }
                }
            }
            Member::Constant(constant) => {
                let deprecated = is_deprecated(constant.doc.as_ref());
                let tracked = tracks(constant.modifiers.visibility(), MemberKind::Constant);
                for entry in &constant.entries {
                    self.declare(
                        info,
                        MemberHighlight {
                            name: entry.name.name.clone(),
                            range: entry.name.range,
                            kind: MemberKind::Constant,
                            site: HighlightSite::Declaration,
                            unused: false,
                            is_static: true,
                            deprecated,
                        },
                        tracked,
                    );
                    if let Some(value) = &entry.value {
                        deferred.push(Deferred::Expr(value));
                    }
                }
            }
            Member::EnumCase(case) => {
                self.declare(
                    info,
                    MemberHighlight {
                        name: case.name.name.clone(),
                        range: case.name.range,
                        kind: MemberKind::EnumCase,
                        site: HighlightSite::Declaration,
                        unused: false,
                        is_static: true,
                        deprecated: is_deprecated(case.doc.as_ref()),
                    },
                    false,
                );
                if let Some(value) = &case.value {
                    deferred.push(Deferred::Expr(value));
                }
            }
            Member::TraitUse(_) => {}
            Member::Error(range) => debug!(?range, "skipping malformed member"),
        }
    }

    fn method_body(&mut self, method: &MethodDecl) -> ControlFlow<()> {
        for param in &method.params {
            if let Some(default) = &param.default {
                self.expr(default)?;
            }
        }
        match &method.body {
            Some(body) => self.stmts(&body.stmts),
            None => ControlFlow::Continue(()),
        }
    }

    // ------------------------------------------------------------------------
    // Walk
    // ------------------------------------------------------------------------

    fn item(&mut self, item: &Item) -> ControlFlow<()> {
        self.poll()?;
        match item {
            Item::Namespace(ns) => ns.items.iter().try_for_each(|item| self.item(item)),
            Item::Use(_) => ControlFlow::Continue(()),
            Item::Type(ty) => self.type_decl(ty),
            Item::Function(function) => self.function(function),
            Item::Stmt(stmt) => self.stmt(stmt),
        }
    }

    fn type_decl(&mut self, ty: &TypeDecl) -> ControlFlow<()> {
        let info = TypeInfo {
            node: ty.id,
            name: Some(ty.name.name.clone()),
            kind: ty.kind,
        };
        self.type_body(info, ty.body.as_ref())
    }

    fn function(&mut self, function: &FunctionDecl) -> ControlFlow<()> {
        for param in &function.params {
            if let Some(default) = &param.default {
                self.expr(default)?;
            }
        }
        match &function.body {
            Some(body) => self.stmts(&body.stmts),
            None => ControlFlow::Continue(()),
        }
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> ControlFlow<()> {
        stmts.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &Stmt) -> ControlFlow<()> {
        self.poll()?;
        match stmt {
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => self.expr(expr),
            Stmt::Return(None) | Stmt::Error(_) => ControlFlow::Continue(()),
            Stmt::Block(block) => self.stmts(&block.stmts),
            Stmt::Control(control) => {
                self.exprs(&control.head)?;
                self.stmts(&control.body)
            }
            Stmt::Catch(catch) => self.stmts(&catch.body.stmts),
            Stmt::Function(function) => self.function(function),
            Stmt::Type(ty) => self.type_decl(ty),
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) -> ControlFlow<()> {
        exprs.iter().try_for_each(|expr| self.expr(expr))
    }

    fn class_ref(&mut self, class: &ClassRef) -> ControlFlow<()> {
        match class {
            ClassRef::Expr(expr) => self.expr(expr),
            _ => ControlFlow::Continue(()),
        }
    }

    fn expr(&mut self, expr: &Expr) -> ControlFlow<()> {
        self.poll()?;
        match expr {
            Expr::Variable(_)
            | Expr::This(_)
            | Expr::Name(_)
            | Expr::String { .. }
            | Expr::Literal(_)
            | Expr::Error(_) => ControlFlow::Continue(()),
            Expr::ClassName(class) => self.class_ref(class),
            Expr::Call { args, .. } => self.exprs(args),
            Expr::CallExpr { callee, args } => {
                self.expr(callee)?;
                self.exprs(args)
            }
            Expr::MethodCall {
                receiver,
                name,
                args,
            } => {
                self.expr(receiver)?;
                let target = self.current_type();
                self.reference(MemberKind::Method, &name.name, name.range, false, target);
                self.exprs(args)
            }
            Expr::PropertyFetch { receiver, name } => {
                self.expr(receiver)?;
                let target = self.current_type();
                self.reference(MemberKind::Field, &name.name, name.range, false, target);
                ControlFlow::Continue(())
            }
            Expr::StaticCall { class, name, args } => {
                self.class_ref(class)?;
                let target = self.class_target(class);
                self.reference(MemberKind::Method, &name.name, name.range, true, target);
                self.exprs(args)
            }
            Expr::StaticPropertyFetch { class, name } => {
                self.class_ref(class)?;
                let target = self.class_target(class);
                let field = name.name.trim_start_matches('$');
                self.reference(MemberKind::Field, field, name.range, true, target);
                ControlFlow::Continue(())
            }
            Expr::ClassConstant { class, name } => {
                self.class_ref(class)?;
                if !name.name.eq_ignore_ascii_case("class") {
                    let target = self.class_target(class);
                    let kind = self.constant_kind(target, &name.name);
                    self.reference(kind, &name.name, name.range, true, target);
                }
                ControlFlow::Continue(())
            }
            Expr::New { class, args, .. } => {
                self.class_ref(class)?;
                self.exprs(args)
            }
            Expr::NewAnonymous(class) => self.anonymous_class(class),
            Expr::Closure(closure) => {
                for param in &closure.params {
                    if let Some(default) = &param.default {
                        self.expr(default)?;
                    }
                }
                self.stmts(&closure.body.stmts)
            }
            Expr::ArrowFunction(arrow) => self.expr(&arrow.body),
            Expr::Assign { target, value } => {
                self.expr(target)?;
                self.expr(value)
            }
            Expr::Include { path, .. } => self.expr(path),
            Expr::Other(parts) => self.exprs(parts),
        }
    }

    /// `X::NAME` names an enum case when the target declares one.
    fn constant_kind(&self, target: Option<NodeId>, name: &str) -> MemberKind {
        let is_case = target.is_some_and(|owner| {
            self.declared
                .get(&UnusedKey::new(MemberKind::EnumCase, name, owner))
                .is_some_and(|d| d.kind == MemberKind::EnumCase)
        });
        if is_case { MemberKind::EnumCase } else { MemberKind::Constant }
    }

    fn anonymous_class(&mut self, class: &AnonymousClass) -> ControlFlow<()> {
        self.exprs(&class.args)?;
        if !self.visited_anonymous.insert(class.id) {
            return ControlFlow::Continue(());
        }
        let info = TypeInfo {
            node: class.id,
            name: None,
            kind: TypeKind::Class,
        };
        self.type_body(info, class.body.as_ref())
    }
}

fn is_deprecated(doc: Option<&DocComment>) -> bool {
    doc.and_then(|doc| parse_doc_block(&doc.text, doc.range.start()).ok())
        .is_some_and(|block| block.is_deprecated())
}

/// Top-level items with namespaces flattened, in source order.
fn flatten_items<'a>(items: &'a [Item], out: &mut Vec<&'a Item>) {
    for item in items {
        match item {
            Item::Namespace(ns) => flatten_items(&ns.items, out),
            other => out.push(other),
        }
    }
}

/// Classify every member declaration and member reference of `file`.
///
/// Top-level items are independent and run in parallel. Returns `None`
/// when `cancel` fires before the pass completes.
pub fn member_highlights(
    file: &SourceFile,
    deprecated: &DeprecatedMembers,
    cancel: &CancellationToken,
) -> Option<Vec<MemberHighlight>> {
    let mut items = Vec::new();
    flatten_items(&file.items, &mut items);

    let per_item: Option<Vec<Vec<MemberHighlight>>> = items
        .par_iter()
        .map(|item| {
            UnusedMemberTracker::new(deprecated)
                .with_cancellation(cancel)
                .track(item)
        })
        .collect();
    if per_item.is_none() {
        debug!("member highlighting cancelled");
    }

    let mut highlights: Vec<MemberHighlight> = per_item?.into_iter().flatten().collect();
    highlights.sort_by_key(|h| (h.range.start(), h.range.end(), h.site));
    highlights.dedup();
    Some(highlights)
}
