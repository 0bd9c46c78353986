//! Best-effort recursive-descent parser.
//!
//! Consumes the token vector from [`lex`](super::lex) and always produces a
//! [`SourceFile`]: input it cannot understand is skipped and surfaces as
//! `Error` nodes. Every loop either consumes a token or stops, so the parser
//! terminates on arbitrary input.

use smol_str::SmolStr;

use super::ast::*;
use super::token::{Token, TokenKind};
use crate::base::{TextRange, TextSize};

/// Parse a whole document.
pub fn parse(tokens: &[Token]) -> SourceFile {
    let mut parser = Parser::new(tokens);
    let items = parser.items(false, false);
    SourceFile { items }
}

const BINARY_OPS: &[&str] = &[
    "+", "-", "*", "/", "%", ".", "<", ">", "<=", ">=", "==", "===", "!=", "!==", "<>", "<=>",
    "&&", "||", "??", "&", "|", "^", "<<", ">>", "**", "=>", "and", "or", "xor",
];

const ASSIGN_OPS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", ".=", "%=", "|=", "&=", "^=", "**=", "??=",
];

const CASTS: &[&str] = &[
    "int", "integer", "bool", "boolean", "float", "double", "real", "string", "array", "object",
    "unset", "binary",
];

const CONTROL_KEYWORDS: &[&str] = &["if", "elseif", "while", "for", "foreach", "switch", "declare"];

const BLOCK_KEYWORDS: &[&str] = &["else", "try", "finally", "do"];

const ALT_SYNTAX_END: &[&str] = &[
    "endif", "endwhile", "endfor", "endforeach", "endswitch", "enddeclare", "else", "elseif",
];

fn is_skipped(kind: TokenKind) -> bool {
    kind.is_trivia() || matches!(kind, TokenKind::OpenTag | TokenKind::CloseTag)
}

fn is_word(token: &Token) -> bool {
    matches!(token.kind, TokenKind::Identifier | TokenKind::Keyword)
}

fn token_is(token: &Token, text: &str) -> bool {
    match token.kind {
        TokenKind::Identifier | TokenKind::Keyword => token.text.eq_ignore_ascii_case(text),
        TokenKind::Punct
        | TokenKind::Arrow
        | TokenKind::NullsafeArrow
        | TokenKind::DoubleColon
        | TokenKind::NsSeparator => token.text == text,
        _ => false,
    }
}

fn ident(token: &Token) -> Ident {
    Ident::new(token.text.clone(), token.range)
}

struct Parser<'t> {
    tokens: &'t [Token],
    /// Index of the first unconsumed raw token.
    pos: usize,
    last_end: TextSize,
    next_node: u32,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            last_end: TextSize::from(0),
            next_node: 0,
        }
    }

    // ========================================================================
    // TOKEN ACCESS
    // ========================================================================

    fn nth_index(&self, n: usize) -> Option<usize> {
        let mut remaining = n;
        for (i, token) in self.tokens.iter().enumerate().skip(self.pos) {
            if is_skipped(token.kind) {
                continue;
            }
            if remaining == 0 {
                return Some(i);
            }
            remaining -= 1;
        }
        None
    }

    fn nth(&self, n: usize) -> Option<&'t Token> {
        self.nth_index(n).map(|i| &self.tokens[i])
    }

    fn peek(&self) -> Option<&'t Token> {
        self.nth(0)
    }

    fn at_eof(&self) -> bool {
        self.peek().is_none()
    }

    fn at(&self, text: &str) -> bool {
        self.nth_at(0, text)
    }

    fn nth_at(&self, n: usize, text: &str) -> bool {
        self.nth(n).is_some_and(|t| token_is(t, text))
    }

    fn at_any(&self, texts: &[&str]) -> bool {
        texts.iter().any(|text| self.at(text))
    }

    fn at_kind(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn nth_is_word(&self, n: usize) -> bool {
        self.nth(n).is_some_and(is_word)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let index = self.nth_index(0)?;
        let token = &self.tokens[index];
        self.pos = index + 1;
        self.last_end = token.end();
        Some(token)
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.at(text) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Start of the next significant token.
    fn start(&self) -> TextSize {
        self.peek().map(Token::start).unwrap_or(self.last_end)
    }

    fn range_from(&self, start: TextSize) -> TextRange {
        TextRange::new(start, self.last_end.max(start))
    }

    /// The doc comment directly preceding the next significant token.
    fn doc(&self) -> Option<DocComment> {
        let mut doc = None;
        for token in &self.tokens[self.pos.min(self.tokens.len())..] {
            match token.kind {
                TokenKind::DocComment => {
                    doc = Some(DocComment {
                        text: token.text.clone(),
                        range: token.range,
                    })
                }
                kind if is_skipped(kind) => {}
                _ => break,
            }
        }
        doc
    }

    fn node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /// Skip a `{ ... }` group including nested groups.
    fn skip_balanced(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.bump() {
            if token_is(token, "{") {
                depth += 1;
            } else if token_is(token, "}") {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
        }
    }

    /// Skip to the end of a malformed construct: past `;`, before `}`.
    fn recover(&mut self) {
        while let Some(token) = self.peek() {
            if token_is(token, "}") {
                break;
            }
            if token_is(token, "{") {
                self.skip_balanced();
                continue;
            }
            self.bump();
            if token_is(token, ";") {
                break;
            }
        }
    }

    // ========================================================================
    // NAMES
    // ========================================================================

    fn at_name(&self) -> bool {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Identifier => true,
            Some(t) if t.kind == TokenKind::NsSeparator => self.nth_is_word(1),
            _ => false,
        }
    }

    /// A possibly qualified name. Keywords are accepted after a `\`.
    fn name(&mut self) -> Option<Ident> {
        if !self.at_name() {
            return None;
        }
        let start = self.start();
        let mut text = String::new();
        if self.eat("\\") {
            text.push('\\');
        }
        let first = self.bump()?;
        text.push_str(&first.text);
        while self.at("\\") && self.nth_is_word(1) {
            self.bump();
            text.push('\\');
            if let Some(segment) = self.bump() {
                text.push_str(&segment.text);
            }
        }
        Some(Ident::new(text, self.range_from(start)))
    }

    /// Declared names may collide with keywords (`function list()`).
    fn decl_name(&mut self) -> Option<Ident> {
        if self.nth_is_word(0) {
            self.bump().map(ident)
        } else {
            None
        }
    }

    fn name_list(&mut self) -> Vec<Ident> {
        let mut names = Vec::new();
        while let Some(name) = self.name() {
            names.push(name);
            if !self.eat(",") {
                break;
            }
        }
        names
    }

    fn type_hint(&mut self) -> TypeHint {
        let mut names = Vec::new();
        let mut depth = 0usize;
        loop {
            while self.eat("?") {}
            if self.at("(") {
                self.bump();
                depth += 1;
                continue;
            }
            if self.at_name() {
                if let Some(name) = self.name() {
                    names.push(name);
                }
            } else if self.at("static") {
                if let Some(token) = self.bump() {
                    names.push(ident(token));
                }
            } else {
                break;
            }
            while depth > 0 && self.at(")") {
                self.bump();
                depth -= 1;
            }
            if self.eat("|") {
                continue;
            }
            let intersection = self.at("&")
                && self.nth(1).is_some_and(|t| {
                    t.kind == TokenKind::Identifier
                        || t.kind == TokenKind::NsSeparator
                        || token_is(t, "(")
                });
            if intersection {
                self.bump();
                continue;
            }
            break;
        }
        TypeHint { names }
    }

    fn modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            if self.eat("public") || self.eat("var") {
                modifiers.visibility = Some(Visibility::Public);
            } else if self.eat("protected") {
                modifiers.visibility = Some(Visibility::Protected);
            } else if self.eat("private") {
                modifiers.visibility = Some(Visibility::Private);
            } else if self.at("static") && !self.nth_at(1, "::") {
                self.bump();
                modifiers.is_static = true;
            } else if self.eat("abstract") {
                modifiers.is_abstract = true;
            } else if self.eat("final") {
                modifiers.is_final = true;
            } else if self.eat("readonly") {
                modifiers.is_readonly = true;
            } else {
                break;
            }
        }
        modifiers
    }

    // ========================================================================
    // ITEMS
    // ========================================================================

    fn items(&mut self, in_braces: bool, stop_at_namespace: bool) -> Vec<Item> {
        let mut items = Vec::new();
        loop {
            if self.at_eof() || (in_braces && self.at("}")) {
                break;
            }
            if stop_at_namespace && self.at_namespace_decl() {
                break;
            }
            let before = self.pos;
            if let Some(item) = self.item() {
                items.push(item);
            }
            if self.pos == before {
                self.bump();
            }
        }
        items
    }

    fn at_namespace_decl(&self) -> bool {
        self.at("namespace") && !self.nth_at(1, "\\")
    }

    fn at_type_decl(&self) -> bool {
        let mut n = 0;
        while ["abstract", "final", "readonly"].iter().any(|m| self.nth_at(n, m)) {
            n += 1;
        }
        let keyword = ["class", "interface", "trait", "enum"]
            .iter()
            .any(|k| self.nth_at(n, k));
        keyword && self.nth_is_word(n + 1)
    }

    fn at_function_decl(&self) -> bool {
        self.at("function")
            && (self.nth_is_word(1) || (self.nth_at(1, "&") && self.nth_is_word(2)))
    }

    fn item(&mut self) -> Option<Item> {
        if self.at_namespace_decl() {
            return Some(Item::Namespace(self.namespace_decl()));
        }
        if self.at("use") {
            return Some(Item::Use(self.use_decl()));
        }
        if self.at_type_decl() {
            return self.type_decl().map(Item::Type);
        }
        if self.at_function_decl() {
            return self.function_decl().map(Item::Function);
        }
        self.stmt().map(Item::Stmt)
    }

    fn namespace_decl(&mut self) -> NamespaceDecl {
        let start = self.start();
        self.bump();
        let name = self.name();
        let (block, items) = if self.at("{") {
            let open = self.start();
            self.bump();
            let items = self.items(true, false);
            self.eat("}");
            (Some(self.range_from(open)), items)
        } else {
            self.eat(";");
            (None, self.items(false, true))
        };
        NamespaceDecl {
            name,
            block,
            items,
            range: self.range_from(start),
        }
    }

    fn use_decl(&mut self) -> UseDecl {
        let start = self.start();
        self.bump();
        let kind = if self.eat("function") {
            UseKind::Function
        } else if self.eat("const") {
            UseKind::Constant
        } else {
            UseKind::Type
        };

        let mut clauses = Vec::new();
        while let Some(path) = self.name() {
            if self.at("\\") && self.nth_at(1, "{") {
                self.bump();
                self.bump();
                while let Some(member) = self.name() {
                    let alias = self.use_alias();
                    let full = format!("{}\\{}", path.name.trim_end_matches('\\'), member.name);
                    clauses.push(UseClause {
                        path: Ident::new(full, member.range),
                        alias,
                    });
                    if !self.eat(",") || self.at("}") {
                        break;
                    }
                }
                self.eat("}");
            } else {
                let alias = self.use_alias();
                clauses.push(UseClause { path, alias });
            }
            if !self.eat(",") {
                break;
            }
        }
        if !self.eat(";") {
            self.recover();
        }
        UseDecl {
            kind,
            clauses,
            range: self.range_from(start),
        }
    }

    fn use_alias(&mut self) -> Option<Ident> {
        if self.eat("as") {
            self.decl_name()
        } else {
            None
        }
    }

    fn type_decl(&mut self) -> Option<TypeDecl> {
        let doc = self.doc();
        let start = self.start();
        let modifiers = self.modifiers();
        let keyword = self.bump()?;
        let kind = match keyword.text.to_ascii_lowercase().as_str() {
            "interface" => TypeKind::Interface,
            "trait" => TypeKind::Trait,
            "enum" => TypeKind::Enum,
            _ => TypeKind::Class,
        };
        let name = self.decl_name()?;
        if kind == TypeKind::Enum && self.eat(":") {
            self.type_hint();
        }
        let extends = if self.eat("extends") { self.name_list() } else { Vec::new() };
        let implements = if self.eat("implements") { self.name_list() } else { Vec::new() };
        let body = self.type_body();
        let id = self.node_id();
        Some(TypeDecl {
            id,
            kind,
            name,
            modifiers,
            extends,
            implements,
            doc,
            body,
            range: self.range_from(start),
        })
    }

    fn type_body(&mut self) -> Option<TypeBody> {
        if !self.at("{") {
            return None;
        }
        let open = self.start();
        self.bump();
        let mut members = Vec::new();
        loop {
            if self.at_eof() || self.at("}") {
                break;
            }
            // never valid at member position: the body was left unclosed
            if self.at_type_decl() || self.at_namespace_decl() {
                break;
            }
            let before = self.pos;
            members.push(self.member());
            if self.pos == before {
                self.bump();
            }
        }
        self.eat("}");
        Some(TypeBody {
            members,
            range: self.range_from(open),
        })
    }

    fn member(&mut self) -> Member {
        let doc = self.doc();
        let start = self.start();
        let modifiers = self.modifiers();

        if self.eat("use") {
            let names = self.name_list();
            if self.at("{") {
                self.skip_balanced();
            } else {
                self.eat(";");
            }
            return Member::TraitUse(TraitUse {
                names,
                range: self.range_from(start),
            });
        }

        if self.eat("case") {
            let Some(name) = self.decl_name() else {
                self.recover();
                return Member::Error(self.range_from(start));
            };
            let value = if self.eat("=") { Some(self.expr()) } else { None };
            self.eat(";");
            return Member::EnumCase(EnumCaseDecl { name, doc, value });
        }

        if self.eat("const") {
            // typed constant: `const string NAME = ...`
            if self.nth_is_word(0) && !self.nth_at(1, "=") {
                self.type_hint();
            }
            let mut entries = Vec::new();
            while let Some(name) = self.decl_name() {
                let value = if self.eat("=") { Some(self.expr()) } else { None };
                entries.push(ConstEntry { name, value });
                if !self.eat(",") {
                    break;
                }
            }
            if !self.eat(";") {
                self.recover();
            }
            return Member::Constant(ConstDecl {
                modifiers,
                doc,
                entries,
            });
        }

        if self.at("function") {
            return match self.method(doc, start, modifiers) {
                Some(method) => Member::Method(method),
                None => {
                    self.recover();
                    Member::Error(self.range_from(start))
                }
            };
        }

        let ty = if self.at_kind(TokenKind::Variable) {
            None
        } else {
            Some(self.type_hint()).filter(|hint| !hint.names.is_empty())
        };
        let mut entries = Vec::new();
        while self.at_kind(TokenKind::Variable) {
            let Some(token) = self.bump() else { break };
            let default = if self.eat("=") { Some(self.expr()) } else { None };
            entries.push(PropertyEntry {
                name: ident(token),
                default,
            });
            if !self.eat(",") {
                break;
            }
        }
        if entries.is_empty() {
            self.recover();
            return Member::Error(self.range_from(start));
        }
        if !self.eat(";") {
            self.recover();
        }
        Member::Property(PropertyDecl {
            modifiers,
            ty,
            doc,
            entries,
        })
    }

    fn method(
        &mut self,
        doc: Option<DocComment>,
        start: TextSize,
        modifiers: Modifiers,
    ) -> Option<MethodDecl> {
        self.bump();
        self.eat("&");
        let name = self.decl_name()?;
        let (params, params_range) = self.params();
        let return_type = if self.eat(":") { Some(self.type_hint()) } else { None };
        let body = if self.at("{") {
            Some(self.block())
        } else {
            self.eat(";");
            None
        };
        Some(MethodDecl {
            name,
            modifiers,
            doc,
            params,
            params_range,
            return_type,
            body,
            range: self.range_from(start),
        })
    }

    fn function_decl(&mut self) -> Option<FunctionDecl> {
        let doc = self.doc();
        let start = self.start();
        self.bump();
        self.eat("&");
        let name = self.decl_name()?;
        let (params, params_range) = self.params();
        let return_type = if self.eat(":") { Some(self.type_hint()) } else { None };
        let body = if self.at("{") {
            Some(self.block())
        } else {
            self.eat(";");
            None
        };
        Some(FunctionDecl {
            name,
            doc,
            params,
            params_range,
            return_type,
            body,
            range: self.range_from(start),
        })
    }

    fn params(&mut self) -> (Vec<Param>, TextRange) {
        let open = self.start();
        let mut params = Vec::new();
        if !self.eat("(") {
            return (params, TextRange::empty(open));
        }
        loop {
            if self.at_eof() || self.at_any(&[")", "{", ";"]) {
                break;
            }
            let before = self.pos;
            if let Some(param) = self.param() {
                params.push(param);
            }
            if self.eat(",") {
                continue;
            }
            if self.pos == before || !self.at(")") {
                self.bump();
            }
        }
        self.eat(")");
        (params, self.range_from(open))
    }

    fn param(&mut self) -> Option<Param> {
        let modifiers = self.modifiers();
        let promoted = (modifiers.visibility.is_some() || modifiers.is_readonly).then_some(modifiers);
        let ty = if self.at_kind(TokenKind::Variable) || self.at("&") || self.at("...") {
            None
        } else {
            Some(self.type_hint()).filter(|hint| !hint.names.is_empty())
        };
        self.eat("&");
        self.eat("...");
        if !self.at_kind(TokenKind::Variable) {
            return None;
        }
        let name = ident(self.bump()?);
        let default = if self.eat("=") { Some(self.expr()) } else { None };
        Some(Param {
            name,
            ty,
            promoted,
            default,
        })
    }

    // ========================================================================
    // STATEMENTS
    // ========================================================================

    fn block(&mut self) -> Block {
        let open = self.start();
        self.bump();
        let mut stmts = Vec::new();
        loop {
            if self.at_eof() || self.at("}") {
                break;
            }
            let before = self.pos;
            if let Some(stmt) = self.stmt() {
                stmts.push(stmt);
            }
            if self.pos == before {
                self.bump();
            }
        }
        self.eat("}");
        Block {
            stmts,
            range: self.range_from(open),
        }
    }

    fn stmt(&mut self) -> Option<Stmt> {
        if self.at("{") {
            return Some(Stmt::Block(self.block()));
        }
        if self.eat(";") {
            return None;
        }
        if self.at_type_decl() {
            return self.type_decl().map(Stmt::Type);
        }
        if self.at_function_decl() {
            return self.function_decl().map(Stmt::Function);
        }
        if self.eat("return") {
            let value = if self.at(";") || self.at("}") || self.at_eof() {
                None
            } else {
                Some(self.expr())
            };
            self.eat(";");
            return Some(Stmt::Return(value));
        }
        if self.at_any(CONTROL_KEYWORDS) && self.nth_at(1, "(") {
            return Some(self.control(true));
        }
        if self.at_any(BLOCK_KEYWORDS) {
            return Some(self.control(false));
        }
        if self.at("catch") && self.nth_at(1, "(") {
            return Some(self.catch());
        }
        if self.eat("case") {
            let value = self.expr();
            if !self.eat(":") {
                self.eat(";");
            }
            return Some(Stmt::Expr(value));
        }
        if self.at("default") && (self.nth_at(1, ":") || self.nth_at(1, ";")) {
            self.bump();
            self.bump();
            return None;
        }
        if self.at_any(&["break", "continue"]) {
            self.bump();
            if self.at_kind(TokenKind::Number) {
                self.bump();
            }
            self.eat(";");
            return None;
        }
        let list_keyword = self.at_any(&["echo", "global", "unset"])
            || (self.at("static") && self.nth(1).is_some_and(|t| t.kind == TokenKind::Variable));
        if list_keyword {
            self.bump();
            let mut exprs = Vec::new();
            loop {
                if self.at_eof() || self.at_any(&[";", "}"]) {
                    break;
                }
                let before = self.pos;
                exprs.push(self.expr());
                if !self.eat(",") && self.pos == before {
                    break;
                }
            }
            self.eat(";");
            return Some(Stmt::Expr(Expr::Other(exprs)));
        }

        let start = self.start();
        let expr = self.expr();
        if let Expr::Error(range) = expr {
            if range.is_empty() {
                self.recover();
                return Some(Stmt::Error(self.range_from(start)));
            }
        }
        self.eat(";");
        Some(Stmt::Expr(expr))
    }

    fn control(&mut self, has_head: bool) -> Stmt {
        let keyword = self.bump().map(ident).unwrap_or_else(|| {
            Ident::new(SmolStr::default(), TextRange::empty(self.last_end))
        });
        let head = if has_head { self.paren_exprs() } else { Vec::new() };

        let mut body = Vec::new();
        if self.eat(":") {
            // alternative syntax: `if (...): ... endif;`
            loop {
                if self.at_eof() || self.at("}") || self.at_any(ALT_SYNTAX_END) {
                    break;
                }
                let before = self.pos;
                if let Some(stmt) = self.stmt() {
                    body.push(stmt);
                }
                if self.pos == before {
                    self.bump();
                }
            }
            if self.at_any(&ALT_SYNTAX_END[..6]) {
                self.bump();
                self.eat(";");
            }
        } else if !self.eat(";") {
            body.extend(self.stmt());
        }

        Stmt::Control(Control {
            keyword,
            head,
            body,
        })
    }

    fn catch(&mut self) -> Stmt {
        self.bump();
        self.eat("(");
        let mut types = Vec::new();
        while let Some(name) = self.name() {
            types.push(name);
            if !self.eat("|") {
                break;
            }
        }
        let var = if self.at_kind(TokenKind::Variable) {
            self.bump().map(ident)
        } else {
            None
        };
        self.eat(")");
        let body = if self.at("{") {
            self.block()
        } else {
            Block {
                stmts: Vec::new(),
                range: TextRange::empty(self.last_end),
            }
        };
        Stmt::Catch(Catch { types, var, body })
    }

    /// `( expr; expr, expr as $k => $v )`
    fn paren_exprs(&mut self) -> Vec<Expr> {
        let mut exprs = Vec::new();
        if !self.eat("(") {
            return exprs;
        }
        loop {
            if self.at_eof() || self.at_any(&[")", "}"]) {
                break;
            }
            if self.eat(",") || self.eat(";") || self.eat("as") || self.eat("&") {
                continue;
            }
            let before = self.pos;
            exprs.push(self.expr());
            if self.pos == before {
                self.bump();
            }
        }
        self.eat(")");
        exprs
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    fn expr(&mut self) -> Expr {
        let target = self.ternary();
        if self.at_any(ASSIGN_OPS) {
            self.bump();
            self.eat("&");
            let value = self.expr();
            return Expr::Assign {
                target: Box::new(target),
                value: Box::new(value),
            };
        }
        target
    }

    fn ternary(&mut self) -> Expr {
        let condition = self.binary();
        if !self.eat("?") {
            return condition;
        }
        let mut parts = vec![condition];
        if !self.at(":") {
            parts.push(self.expr());
        }
        self.eat(":");
        parts.push(self.expr());
        Expr::Other(parts)
    }

    fn binary(&mut self) -> Expr {
        let mut operands = vec![self.unary()];
        loop {
            if self.eat("instanceof") {
                let class = self.class_operand();
                operands.push(Expr::ClassName(class));
            } else if self.at_any(BINARY_OPS) {
                self.bump();
                operands.push(self.unary());
            } else {
                break;
            }
        }
        if operands.len() == 1 {
            operands.pop().unwrap_or(Expr::Other(Vec::new()))
        } else {
            Expr::Other(operands)
        }
    }

    fn class_operand(&mut self) -> ClassRef {
        match self.class_keyword() {
            Some(class) => class,
            None if self.at_name() => match self.name() {
                Some(name) => ClassRef::Named(name),
                None => ClassRef::Expr(Box::new(Expr::Other(Vec::new()))),
            },
            None => ClassRef::Expr(Box::new(self.unary())),
        }
    }

    /// `self`, `static` or `parent` in class position.
    fn class_keyword(&mut self) -> Option<ClassRef> {
        let token = self.peek()?;
        let class = if token_is(token, "self") {
            ClassRef::SelfType(token.range)
        } else if token_is(token, "static") {
            ClassRef::Static(token.range)
        } else if token_is(token, "parent") {
            ClassRef::Parent(token.range)
        } else {
            return None;
        };
        self.bump();
        Some(class)
    }

    fn unary(&mut self) -> Expr {
        if self.at_any(&["!", "-", "+", "@", "&", "++", "--", "..."]) {
            self.bump();
            return self.unary();
        }
        if self.at_any(&["clone", "print", "throw", "yield"]) && !self.nth_at(1, "(") {
            self.bump();
            self.eat("from");
            if self.at_any(&[";", ")", "]", ",", "}"]) {
                return Expr::Other(Vec::new());
            }
            return self.unary();
        }
        if self.peek().is_some_and(|t| t.kind.is_include()) {
            let start = self.start();
            self.bump();
            let path = self.expr();
            return Expr::Include {
                path: Box::new(path),
                range: self.range_from(start),
            };
        }
        let cast = self.at("(")
            && self.nth(1).is_some_and(|t| {
                t.kind == TokenKind::Identifier
                    && CASTS.iter().any(|c| t.text.eq_ignore_ascii_case(c))
            })
            && self.nth_at(2, ")");
        if cast {
            self.bump();
            self.bump();
            self.bump();
            return self.unary();
        }
        let primary = self.primary();
        self.postfix(primary)
    }

    fn primary(&mut self) -> Expr {
        let Some(token) = self.peek() else {
            return Expr::Error(TextRange::empty(self.last_end));
        };
        match token.kind {
            TokenKind::Variable => {
                self.bump();
                if token.text == "$this" {
                    Expr::This(token.range)
                } else {
                    Expr::Variable(ident(token))
                }
            }
            TokenKind::StringLiteral => {
                self.bump();
                let text = token.text.as_str();
                if text.len() >= 2 {
                    let inner = TextRange::new(
                        token.start() + TextSize::from(1),
                        token.end() - TextSize::from(1),
                    );
                    Expr::String {
                        value: SmolStr::new(&text[1..text.len() - 1]),
                        range: inner,
                    }
                } else {
                    Expr::Literal(token.range)
                }
            }
            TokenKind::Number => {
                self.bump();
                Expr::Literal(token.range)
            }
            TokenKind::Identifier | TokenKind::NsSeparator => self.name_expr(),
            TokenKind::Keyword => self.keyword_expr(),
            TokenKind::Punct if token_is(token, "(") => {
                self.bump();
                let inner = self.expr();
                self.eat(")");
                inner
            }
            TokenKind::Punct if token_is(token, "[") => {
                self.bump();
                let items = self.list_until("]");
                Expr::Other(items)
            }
            TokenKind::Punct
                if [")", "]", "}", ";", ",", ":"].iter().any(|p| token_is(token, p)) =>
            {
                Expr::Error(TextRange::empty(token.start()))
            }
            _ => {
                self.bump();
                Expr::Error(token.range)
            }
        }
    }

    fn name_expr(&mut self) -> Expr {
        if self.at("fn") && (self.nth_at(1, "(") || self.nth_at(1, "&")) {
            return self.arrow_function();
        }
        if self.at("match") && self.nth_at(1, "(") {
            self.bump();
            let mut parts = self.paren_exprs();
            if self.eat("{") {
                parts.extend(self.list_until("}"));
            }
            return Expr::Other(parts);
        }
        if self.nth_at(1, "::") {
            if let Some(class) = self.class_keyword() {
                return self.static_access(class);
            }
        }
        let literal = self.peek().is_some_and(|t| {
            ["true", "false", "null"].iter().any(|l| token_is(t, l))
        }) && !self.nth_at(1, "(")
            && !self.nth_at(1, "\\");
        if literal {
            let range = self.bump().map(|t| t.range).unwrap_or_default();
            return Expr::Literal(range);
        }
        let Some(name) = self.name() else {
            let range = self.bump().map(|t| t.range).unwrap_or_default();
            return Expr::Error(range);
        };
        if self.at("(") {
            let args = self.args();
            Expr::Call { name, args }
        } else if self.at("::") {
            self.static_access(ClassRef::Named(name))
        } else {
            Expr::Name(name)
        }
    }

    fn keyword_expr(&mut self) -> Expr {
        if self.at("new") {
            return self.new_expr();
        }
        if self.at("function") {
            return self.closure();
        }
        if self.at("static") {
            if self.nth_at(1, "::") {
                if let Some(class) = self.class_keyword() {
                    return self.static_access(class);
                }
            }
            if self.nth_at(1, "function") {
                self.bump();
                return self.closure();
            }
            if self.nth_at(1, "fn") {
                self.bump();
                return self.arrow_function();
            }
        }
        let range = self.bump().map(|t| t.range).unwrap_or_default();
        Expr::Error(range)
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    fn list_until(&mut self, close: &str) -> Vec<Expr> {
        let mut items = Vec::new();
        loop {
            if self.at_eof() || self.at(close) || self.at(";") {
                break;
            }
            if self.eat(",") || self.eat("default") {
                continue;
            }
            let before = self.pos;
            items.push(self.expr());
            if self.pos == before {
                self.bump();
            }
        }
        self.eat(close);
        items
    }

    fn static_access(&mut self, class: ClassRef) -> Expr {
        self.bump();
        let Some(token) = self.peek() else {
            return Expr::Error(TextRange::empty(self.last_end));
        };
        match token.kind {
            TokenKind::Variable => {
                self.bump();
                Expr::StaticPropertyFetch {
                    class,
                    name: ident(token),
                }
            }
            TokenKind::Identifier | TokenKind::Keyword => {
                self.bump();
                let name = ident(token);
                if self.at("(") {
                    let args = self.args();
                    Expr::StaticCall { class, name, args }
                } else {
                    Expr::ClassConstant { class, name }
                }
            }
            _ if token_is(token, "{") => {
                self.skip_balanced();
                Expr::Other(Vec::new())
            }
            _ => Expr::Error(TextRange::empty(token.start())),
        }
    }

    fn postfix(&mut self, mut expr: Expr) -> Expr {
        loop {
            if self.at_kind(TokenKind::Arrow) || self.at_kind(TokenKind::NullsafeArrow) {
                self.bump();
                let Some(token) = self.peek() else { break };
                expr = match token.kind {
                    TokenKind::Identifier | TokenKind::Keyword => {
                        self.bump();
                        let name = ident(token);
                        if self.at("(") {
                            let args = self.args();
                            Expr::MethodCall {
                                receiver: Box::new(expr),
                                name,
                                args,
                            }
                        } else {
                            Expr::PropertyFetch {
                                receiver: Box::new(expr),
                                name,
                            }
                        }
                    }
                    TokenKind::Variable => {
                        self.bump();
                        Expr::Other(vec![expr, Expr::Variable(ident(token))])
                    }
                    _ if token_is(token, "{") => {
                        self.skip_balanced();
                        Expr::Other(vec![expr])
                    }
                    _ => break,
                };
            } else if self.at("::") {
                expr = self.static_access(ClassRef::Expr(Box::new(expr)));
            } else if self.at("(") {
                let args = self.args();
                expr = Expr::CallExpr {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.eat("[") {
                let mut parts = vec![expr];
                if !self.at("]") {
                    parts.push(self.expr());
                }
                self.eat("]");
                expr = Expr::Other(parts);
            } else if self.at("++") || self.at("--") {
                self.bump();
            } else {
                break;
            }
        }
        expr
    }

    fn args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        if !self.eat("(") {
            return args;
        }
        loop {
            if self.at_eof() || self.at_any(&[")", ";", "}"]) {
                break;
            }
            if self.eat(",") {
                continue;
            }
            // named argument
            if self.nth_is_word(0) && self.nth_at(1, ":") {
                self.bump();
                self.bump();
            }
            self.eat("...");
            if self.at(")") {
                break;
            }
            let before = self.pos;
            args.push(self.expr());
            if self.pos == before {
                self.bump();
            }
        }
        self.eat(")");
        args
    }

    fn new_expr(&mut self) -> Expr {
        let start = self.start();
        self.bump();

        if self.eat("class") {
            let args = if self.at("(") { self.args() } else { Vec::new() };
            let extends = if self.eat("extends") { self.name_list() } else { Vec::new() };
            let implements = if self.eat("implements") { self.name_list() } else { Vec::new() };
            let body = self.type_body();
            let id = self.node_id();
            return Expr::NewAnonymous(Box::new(AnonymousClass {
                id,
                args,
                extends,
                implements,
                body,
                range: self.range_from(start),
            }));
        }

        let class = if let Some(class) = self.class_keyword() {
            class
        } else if self.at_name() {
            match self.name() {
                Some(name) => ClassRef::Named(name),
                None => return Expr::Error(self.range_from(start)),
            }
        } else if self.at_kind(TokenKind::Variable) {
            let variable = self.primary();
            ClassRef::Expr(Box::new(variable))
        } else if self.eat("(") {
            let inner = self.expr();
            self.eat(")");
            ClassRef::Expr(Box::new(inner))
        } else {
            return Expr::Error(self.range_from(start));
        };
        let args = if self.at("(") { self.args() } else { Vec::new() };
        Expr::New {
            class,
            args,
            range: self.range_from(start),
        }
    }

    fn closure(&mut self) -> Expr {
        let start = self.start();
        self.bump();
        self.eat("&");
        let (params, params_range) = self.params();
        let mut uses = Vec::new();
        if self.eat("use") && self.eat("(") {
            loop {
                self.eat("&");
                match self.peek() {
                    Some(token) if token.kind == TokenKind::Variable => {
                        self.bump();
                        uses.push(ident(token));
                    }
                    _ => break,
                }
                if !self.eat(",") {
                    break;
                }
            }
            self.eat(")");
        }
        let return_type = if self.eat(":") { Some(self.type_hint()) } else { None };
        let body = if self.at("{") {
            self.block()
        } else {
            Block {
                stmts: Vec::new(),
                range: TextRange::empty(self.last_end),
            }
        };
        Expr::Closure(Box::new(Closure {
            params,
            params_range,
            uses,
            return_type,
            body,
            range: self.range_from(start),
        }))
    }

    fn arrow_function(&mut self) -> Expr {
        let start = self.start();
        self.bump();
        self.eat("&");
        let (params, params_range) = self.params();
        let return_type = if self.eat(":") { Some(self.type_hint()) } else { None };
        self.eat("=>");
        let body = self.expr();
        Expr::ArrowFunction(ArrowFunction {
            params,
            params_range,
            return_type,
            body: Box::new(body),
            range: self.range_from(start),
        })
    }
}
