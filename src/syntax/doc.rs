//! PHPDoc comment parsing.
//!
//! Produces a small tag tree with absolute offsets: every type named in a
//! tag is split into atoms (`?Foo|Bar[]` yields `Foo` and `Bar`), so callers
//! can map a caret to exactly one class name.

use smol_str::SmolStr;
use thiserror::Error;

use crate::base::{TextRange, TextSize, touches};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocParseError {
    #[error("comment does not start with `/*`")]
    NotAComment,
    #[error("comment is not terminated by `*/`")]
    Unterminated,
}

/// One class-like name inside a doc type expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocType {
    pub name: SmolStr,
    pub range: TextRange,
}

impl DocType {
    /// The leading namespace segment of a relative qualified name
    /// (`Foo` in `Foo\Bar`). Fully qualified names have none.
    pub fn first_segment(&self) -> Option<(&str, TextRange)> {
        if self.name.starts_with('\\') {
            return None;
        }
        let end = self.name.find('\\')?;
        let len = TextSize::from(end as u32);
        Some((&self.name[..end], TextRange::at(self.range.start(), len)))
    }
}

/// A `$name` inside a tag. The range includes the `$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocVariable {
    pub name: SmolStr,
    pub range: TextRange,
}

/// The virtual method described by an `@method` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicMethod {
    pub name: SmolStr,
    pub name_range: TextRange,
    pub is_static: bool,
    pub return_range: Option<TextRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocTagKind {
    Var,
    Param,
    Return,
    Property,
    PropertyRead,
    PropertyWrite,
    Method,
    Throws,
    Mixin,
    See,
    Deprecated,
    Other,
}

impl DocTagKind {
    fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "@var" => DocTagKind::Var,
            "@param" => DocTagKind::Param,
            "@return" | "@returns" => DocTagKind::Return,
            "@property" => DocTagKind::Property,
            "@property-read" => DocTagKind::PropertyRead,
            "@property-write" => DocTagKind::PropertyWrite,
            "@method" => DocTagKind::Method,
            "@throws" => DocTagKind::Throws,
            "@mixin" => DocTagKind::Mixin,
            "@see" => DocTagKind::See,
            "@deprecated" => DocTagKind::Deprecated,
            _ => DocTagKind::Other,
        }
    }

    /// Tags whose payload names types.
    pub fn is_type_tag(self) -> bool {
        !matches!(self, DocTagKind::Deprecated | DocTagKind::Other)
    }

    fn has_variable(self) -> bool {
        matches!(
            self,
            DocTagKind::Var
                | DocTagKind::Param
                | DocTagKind::Property
                | DocTagKind::PropertyRead
                | DocTagKind::PropertyWrite
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocTag {
    pub kind: DocTagKind,
    /// Tag name including the `@`.
    pub name: SmolStr,
    pub range: TextRange,
    pub types: Vec<DocType>,
    pub variable: Option<DocVariable>,
    pub method: Option<MagicMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocBlock {
    pub range: TextRange,
    pub tags: Vec<DocTag>,
}

impl DocBlock {
    /// The type tag whose range holds `offset`.
    pub fn type_tag_at(&self, offset: TextSize) -> Option<&DocTag> {
        self.tags
            .iter()
            .find(|tag| tag.kind.is_type_tag() && touches(tag.range, offset))
    }

    pub fn is_deprecated(&self) -> bool {
        self.tags.iter().any(|tag| tag.kind == DocTagKind::Deprecated)
    }
}

/// Single-line `@var Type $name` / `@var $name Type` comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineVar {
    pub variable: DocVariable,
    pub types: Vec<DocType>,
}

/// Parse a `/** ... */` (or `/* ... */`) comment starting at `offset`.
pub fn parse_doc_block(text: &str, offset: TextSize) -> Result<DocBlock, DocParseError> {
    let (body_start, body_end) = comment_body(text)?;
    let scanner = Scanner { text, base: offset };
    let mut tags = Vec::new();

    let mut line_start = body_start;
    while line_start < body_end {
        let line_end = text[line_start..body_end]
            .find('\n')
            .map(|i| line_start + i)
            .unwrap_or(body_end);
        if let Some(tag) = scanner.tag(line_start, line_end) {
            tags.push(tag);
        }
        line_start = line_end + 1;
    }

    Ok(DocBlock {
        range: TextRange::at(offset, TextSize::of(text)),
        tags,
    })
}

/// Match the inline `@var` form. Anything beyond the two words rejects the
/// match.
pub fn parse_inline_var(text: &str, offset: TextSize) -> Option<InlineVar> {
    let (body_start, body_end) = comment_body(text).ok()?;
    let scanner = Scanner { text, base: offset };

    let pos = skip_ws(text, body_start, body_end);
    if !text[pos..body_end].starts_with("@var") {
        return None;
    }
    let after_tag = pos + "@var".len();
    let first = skip_ws(text, after_tag, body_end);
    if first == after_tag {
        return None;
    }
    let first_end = word_end(text, first, body_end);
    let second = skip_ws(text, first_end, body_end);
    let second_end = word_end(text, second, body_end);
    if second == second_end || skip_ws(text, second_end, body_end) != body_end {
        return None;
    }

    let (var, ty) = match (text[first..].starts_with('$'), text[second..].starts_with('$')) {
        (true, false) => ((first, first_end), (second, second_end)),
        (false, true) => ((second, second_end), (first, first_end)),
        _ => return None,
    };
    Some(InlineVar {
        variable: scanner.variable(var.0, var.1)?,
        types: scanner.atoms(ty.0, ty.1),
    })
}

/// Byte bounds of the comment body between the delimiters.
fn comment_body(text: &str) -> Result<(usize, usize), DocParseError> {
    if !text.starts_with("/*") {
        return Err(DocParseError::NotAComment);
    }
    if text.len() < 4 || !text.ends_with("*/") {
        return Err(DocParseError::Unterminated);
    }
    let end = text.len() - 2;
    let start = if text.starts_with("/**") { 3 } else { 2 };
    Ok((start.min(end), end))
}

fn skip_ws(text: &str, mut pos: usize, end: usize) -> usize {
    while pos < end {
        match text[pos..].chars().next() {
            Some(c) if c.is_whitespace() => pos += c.len_utf8(),
            _ => break,
        }
    }
    pos
}

fn word_end(text: &str, mut pos: usize, end: usize) -> usize {
    while pos < end {
        match text[pos..].chars().next() {
            Some(c) if !c.is_whitespace() => pos += c.len_utf8(),
            _ => break,
        }
    }
    pos
}

fn is_atom_start(c: char) -> bool {
    if c.is_ascii() {
        c.is_ascii_alphabetic() || c == '_' || c == '\\'
    } else {
        unicode_ident::is_xid_start(c)
    }
}

fn is_atom_continue(c: char) -> bool {
    if c.is_ascii() {
        c.is_ascii_alphanumeric() || c == '_' || c == '\\'
    } else {
        unicode_ident::is_xid_continue(c)
    }
}

struct Scanner<'t> {
    text: &'t str,
    base: TextSize,
}

impl Scanner<'_> {
    fn range(&self, start: usize, end: usize) -> TextRange {
        TextRange::new(
            self.base + TextSize::from(start as u32),
            self.base + TextSize::from(end as u32),
        )
    }

    fn tag(&self, line_start: usize, line_end: usize) -> Option<DocTag> {
        let text = self.text;
        let mut pos = skip_ws(text, line_start, line_end);
        while pos < line_end && text[pos..].starts_with('*') {
            pos += 1;
        }
        pos = skip_ws(text, pos, line_end);
        if !text[pos..line_end].starts_with('@') {
            return None;
        }

        let name_end = text[pos + 1..line_end]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '\\'))
            .map(|i| pos + 1 + i)
            .unwrap_or(line_end);
        let name = &text[pos..name_end];
        let kind = DocTagKind::from_name(name);
        let tag_end = pos + text[pos..line_end].trim_end().len();

        let mut tag = DocTag {
            kind,
            name: SmolStr::new(name),
            range: self.range(pos, tag_end),
            types: Vec::new(),
            variable: None,
            method: None,
        };

        let payload = skip_ws(text, name_end, tag_end);
        match kind {
            DocTagKind::Method => self.method_payload(&mut tag, payload, tag_end),
            kind if kind.has_variable() => self.typed_variable_payload(&mut tag, payload, tag_end),
            kind if kind.is_type_tag() => {
                let end = self.type_expr_end(payload, tag_end);
                tag.types = self.atoms(payload, end);
            }
            _ => {}
        }
        Some(tag)
    }

    /// `Type $name` in either order, each part optional.
    fn typed_variable_payload(&self, tag: &mut DocTag, mut pos: usize, end: usize) {
        for _ in 0..2 {
            if pos >= end {
                break;
            }
            let rest = &self.text[pos..end];
            if rest.starts_with('$') || rest.starts_with('&') || rest.starts_with("...") {
                let word = word_end(self.text, pos, end);
                if tag.variable.is_none() {
                    tag.variable = self.variable(pos, word);
                }
                pos = skip_ws(self.text, word, end);
            } else if tag.types.is_empty() {
                let expr_end = self.type_expr_end(pos, end);
                tag.types = self.atoms(pos, expr_end);
                pos = skip_ws(self.text, expr_end, end);
            } else {
                break;
            }
        }
    }

    /// `[static] [ReturnType] name(Type $param, ...)`.
    fn method_payload(&self, tag: &mut DocTag, pos: usize, end: usize) {
        let text = self.text;
        let Some(paren) = text[pos..end].find('(').map(|i| pos + i) else {
            return;
        };

        let mut words = Vec::new();
        let mut cursor = pos;
        while cursor < paren {
            let start = skip_ws(text, cursor, paren);
            if start >= paren {
                break;
            }
            let stop = word_end(text, start, paren);
            words.push((start, stop));
            cursor = stop;
        }
        let Some(&(name_start, name_end)) = words.last() else {
            return;
        };
        if !text[name_start..name_end].chars().all(is_atom_continue) {
            return;
        }

        let mut head = &words[..words.len() - 1];
        let is_static = head
            .first()
            .is_some_and(|&(s, e)| text[s..e].eq_ignore_ascii_case("static"));
        if is_static {
            head = &head[1..];
        }
        let return_range = match (head.first(), head.last()) {
            (Some(&(first, _)), Some(&(_, last))) => {
                tag.types.extend(self.atoms(first, last));
                Some(self.range(first, last))
            }
            _ => None,
        };

        let params_end = text[paren..end].rfind(')').map(|i| paren + i).unwrap_or(end);
        let mut param_start = paren + 1;
        for (i, c) in text[paren + 1..params_end].char_indices() {
            if c == ',' {
                self.param_types(tag, param_start, paren + 1 + i);
                param_start = paren + 1 + i + 1;
            }
        }
        self.param_types(tag, param_start, params_end);

        tag.method = Some(MagicMethod {
            name: SmolStr::new(&text[name_start..name_end]),
            name_range: self.range(name_start, name_end),
            is_static,
            return_range,
        });
    }

    fn param_types(&self, tag: &mut DocTag, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let segment = &self.text[start..end];
        let type_end = segment
            .find(['$', '='])
            .map(|i| start + i)
            .unwrap_or(end);
        tag.types.extend(self.atoms(start, type_end));
    }

    /// End of a type expression; whitespace only terminates it outside
    /// brackets so `array<int, Foo>` stays whole.
    fn type_expr_end(&self, start: usize, end: usize) -> usize {
        let mut depth = 0usize;
        for (i, c) in self.text[start..end].char_indices() {
            match c {
                '<' | '(' | '[' | '{' => depth += 1,
                '>' | ')' | ']' | '}' => depth = depth.saturating_sub(1),
                c if c.is_whitespace() && depth == 0 => return start + i,
                _ => {}
            }
        }
        end
    }

    fn atoms(&self, start: usize, end: usize) -> Vec<DocType> {
        let mut atoms = Vec::new();
        let mut current: Option<usize> = None;
        for (i, c) in self.text[start..end].char_indices() {
            let at = start + i;
            match current {
                Some(_) if is_atom_continue(c) => {}
                Some(s) => {
                    atoms.push(self.atom(s, at));
                    current = is_atom_start(c).then_some(at);
                }
                None if is_atom_start(c) => current = Some(at),
                None => {}
            }
        }
        if let Some(s) = current {
            atoms.push(self.atom(s, end));
        }
        atoms
    }

    fn atom(&self, start: usize, end: usize) -> DocType {
        DocType {
            name: SmolStr::new(&self.text[start..end]),
            range: self.range(start, end),
        }
    }

    fn variable(&self, start: usize, end: usize) -> Option<DocVariable> {
        let dollar = start + self.text[start..end].find('$')?;
        let name_end = self.text[dollar + 1..end]
            .find(|c: char| !is_atom_continue(c) || c == '\\')
            .map(|i| dollar + 1 + i)
            .unwrap_or(end);
        if name_end == dollar + 1 {
            return None;
        }
        Some(DocVariable {
            name: SmolStr::new(&self.text[dollar..name_end]),
            range: self.range(dollar, name_end),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(text: &str, range: TextRange) -> &str {
        &text[usize::from(range.start())..usize::from(range.end())]
    }

    #[test]
    fn test_inline_var_variable_first() {
        let text = "/* @var $x Foo|Bar */";
        let inline = parse_inline_var(text, 0.into()).unwrap();
        assert_eq!(slice(text, inline.variable.range), "$x");
        let names: Vec<_> = inline.types.iter().map(|t| slice(text, t.range)).collect();
        assert_eq!(names, vec!["Foo", "Bar"]);
    }

    #[test]
    fn test_inline_var_type_first_with_offset() {
        let text = "/** @var ?\\App\\Foo $item */";
        let inline = parse_inline_var(text, 100.into()).unwrap();
        assert_eq!(inline.types.len(), 1);
        assert_eq!(inline.types[0].name, "\\App\\Foo");
        assert_eq!(inline.types[0].range.start(), TextSize::from(110));
        assert_eq!(inline.variable.name, "$item");
    }

    #[test]
    fn test_inline_var_rejects_extra_words() {
        assert!(parse_inline_var("/* @var $x Foo trailing */", 0.into()).is_none());
        assert!(parse_inline_var("/* @var Foo Bar */", 0.into()).is_none());
        assert!(parse_inline_var("/* var $x Foo */", 0.into()).is_none());
    }

    #[test]
    fn test_doc_block_param_and_return() {
        let text = "/**\n * Does things.\n * @param Foo&Bar $a first\n * @return array<int, Baz>|null\n */";
        let block = parse_doc_block(text, 0.into()).unwrap();
        assert_eq!(block.tags.len(), 2);

        let param = &block.tags[0];
        assert_eq!(param.kind, DocTagKind::Param);
        let names: Vec<_> = param.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Foo", "Bar"]);
        assert_eq!(param.variable.as_ref().unwrap().name, "$a");

        let ret = &block.tags[1];
        let names: Vec<_> = ret.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["array", "int", "Baz", "null"]);
    }

    #[test]
    fn test_doc_block_method_tag() {
        let text = "/** @method static Foo|null find(int $id, Bar $b = null) */";
        let block = parse_doc_block(text, 0.into()).unwrap();
        let tag = &block.tags[0];
        let method = tag.method.as_ref().unwrap();
        assert!(method.is_static);
        assert_eq!(method.name, "find");
        assert_eq!(slice(text, method.name_range), "find");
        assert_eq!(slice(text, method.return_range.unwrap()), "Foo|null");
        let names: Vec<_> = tag.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Foo", "null", "int", "Bar"]);
    }

    #[test]
    fn test_doc_block_method_without_return_type() {
        let block = parse_doc_block("/** @method run() */", 0.into()).unwrap();
        let method = block.tags[0].method.as_ref().unwrap();
        assert!(!method.is_static);
        assert!(method.return_range.is_none());
    }

    #[test]
    fn test_doc_block_deprecated_is_not_a_type_tag() {
        let block = parse_doc_block("/**\n * @deprecated use other\n */", 0.into()).unwrap();
        assert!(block.is_deprecated());
        assert!(block.type_tag_at(8.into()).is_none());
    }

    #[test]
    fn test_first_segment_of_relative_name() {
        let ty = DocType {
            name: "Alias\\Sub".into(),
            range: TextRange::at(10.into(), 9.into()),
        };
        let (segment, range) = ty.first_segment().unwrap();
        assert_eq!(segment, "Alias");
        assert_eq!(range, TextRange::at(10.into(), 5.into()));

        let absolute = DocType {
            name: "\\Alias\\Sub".into(),
            range: TextRange::at(0.into(), 10.into()),
        };
        assert!(absolute.first_segment().is_none());
    }

    #[test]
    fn test_malformed_comments() {
        assert_eq!(parse_doc_block("// nope", 0.into()), Err(DocParseError::NotAComment));
        assert_eq!(parse_doc_block("/** open", 0.into()), Err(DocParseError::Unterminated));
        assert!(parse_doc_block("/**/", 0.into()).unwrap().tags.is_empty());
    }
}
