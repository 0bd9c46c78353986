//! Caret to reference span.
//!
//! Maps a caret offset to the range of "the thing under the caret": a name
//! token, a path or constant string, or one segment of a type named inside
//! a comment. Carets between two tokens are retried one character to the
//! left, up to a configured number of turns.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{trace, warn};

use crate::base::{TextRange, TextSize, touches};
use crate::config::AnalysisConfig;
use crate::hir::{Resolver, ScopeModel};
use crate::syntax::ast::UseKind;
use crate::syntax::{
    DocType, Token, TokenKind, TokenSequence, parse_doc_block, parse_inline_var,
};

/// Set once the retry limit has been reported; later hits only trace.
static RECURSION_LIMIT_REPORTED: AtomicBool = AtomicBool::new(false);

/// Finds the reference span at a caret.
#[derive(Clone, Debug)]
pub struct ReferenceSpanFinder {
    recursion_limit: usize,
    string_lookback: usize,
}

impl Default for ReferenceSpanFinder {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl ReferenceSpanFinder {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            recursion_limit: config.recursion_limit,
            string_lookback: config.string_lookback,
        }
    }

    /// The reference span at `caret`, or `None`. Never fails, whatever the
    /// caret.
    pub fn find<S: TokenSequence>(
        &self,
        tokens: &mut S,
        caret: i64,
        model: &ScopeModel,
    ) -> Option<TextRange> {
        let len = i64::from(u32::from(tokens.len()));
        if caret < 0 || caret > len {
            return None;
        }
        let mut offset = TextSize::from(caret as u32);
        let mut turns = 0;

        loop {
            tokens.move_to(offset);
            let start = if tokens.move_next() { tokens.token().map(Token::start) } else { None };
            if start.is_some() {
                if let Some(span) = self.span_at(tokens, offset, model) {
                    return Some(span);
                }
            }

            // a caret past the last token is a boundary too
            let on_boundary = match start {
                Some(start) => start == offset,
                None => !tokens.is_empty(),
            };
            if !on_boundary || offset == TextSize::from(0) {
                return None;
            }
            if turns == self.recursion_limit {
                if !RECURSION_LIMIT_REPORTED.swap(true, Ordering::Relaxed) {
                    warn!(caret, limit = self.recursion_limit, "reference span search hit the retry limit");
                } else {
                    trace!(caret, "reference span search hit the retry limit");
                }
                return None;
            }
            turns += 1;
            offset -= TextSize::from(1);
        }
    }

    fn span_at<S: TokenSequence>(
        &self,
        tokens: &mut S,
        offset: TextSize,
        model: &ScopeModel,
    ) -> Option<TextRange> {
        let token = tokens.token()?.clone();
        match token.kind {
            TokenKind::Identifier | TokenKind::Variable => Some(token.range),
            TokenKind::StringLiteral => self.string_reference(tokens, &token),
            TokenKind::DocComment => inline_var_span(&token, offset, model)
                .or_else(|| doc_tag_span(&token, offset, model)),
            TokenKind::Comment => inline_var_span(&token, offset, model),
            _ => None,
        }
    }

    /// A string literal is a reference when an include keyword or a
    /// `define`/`constant` call precedes it closely.
    fn string_reference<S: TokenSequence>(&self, tokens: &mut S, literal: &Token) -> Option<TextRange> {
        let mut found = false;
        for _ in 0..self.string_lookback {
            if !tokens.move_previous() {
                break;
            }
            let Some(token) = tokens.token() else { break };
            let is_call = token.kind == TokenKind::Identifier
                && (token.text.eq_ignore_ascii_case("define")
                    || token.text.eq_ignore_ascii_case("constant"));
            if token.kind.is_include() || is_call {
                found = true;
                break;
            }
        }
        if found { string_contents(literal) } else { None }
    }
}

/// Range of a quoted literal without its quotes.
fn string_contents(literal: &Token) -> Option<TextRange> {
    let text = literal.text.as_str();
    let quote = text.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let start = literal.start() + TextSize::of(quote);
    let end = if text.len() > 1 && text.ends_with(quote) {
        literal.end() - TextSize::of(quote)
    } else {
        literal.end()
    };
    (start <= end).then(|| TextRange::new(start, end))
}

fn inline_var_span(token: &Token, offset: TextSize, model: &ScopeModel) -> Option<TextRange> {
    let inline = parse_inline_var(&token.text, token.start())?;
    if touches(inline.variable.range, offset) {
        return Some(inline.variable.range);
    }
    inline
        .types
        .iter()
        .find(|ty| touches(ty.range, offset))
        .map(|ty| doc_type_segment(ty, offset, model))
}

fn doc_tag_span(token: &Token, offset: TextSize, model: &ScopeModel) -> Option<TextRange> {
    let block = parse_doc_block(&token.text, token.start()).ok()?;
    let tag = block.type_tag_at(offset)?;
    if let Some(ty) = tag.types.iter().find(|ty| touches(ty.range, offset)) {
        return Some(doc_type_segment(ty, offset, model));
    }
    if let Some(var) = tag.variable.as_ref().filter(|v| touches(v.range, offset)) {
        return Some(var.range);
    }
    let method = tag.method.as_ref()?;
    if touches(method.name_range, offset) {
        return Some(method.name_range);
    }
    method.return_range.filter(|range| touches(*range, offset))
}

/// The segment of a doc type under the caret: the class name itself, a
/// use-alias prefix, or the namespace part.
fn doc_type_segment(ty: &DocType, offset: TextSize, model: &ScopeModel) -> TextRange {
    let name = ty.name.as_str();
    let Some(split) = name.rfind('\\') else {
        return ty.range;
    };
    let last = TextRange::new(ty.range.start() + TextSize::from(split as u32 + 1), ty.range.end());
    if !last.is_empty() && touches(last, offset) {
        return last;
    }
    if let Some((first, range)) = ty.first_segment() {
        if touches(range, offset) {
            let scope = model.innermost_scope_at(offset);
            let resolver = Resolver::new(model).with_scope(scope);
            if resolver.use_alias(first, UseKind::Type).is_some() {
                return range;
            }
        }
    }
    let lead = name.len() - name.trim_start_matches('\\').len();
    if lead >= split {
        return ty.range;
    }
    TextRange::new(
        ty.range.start() + TextSize::from(lead as u32),
        ty.range.start() + TextSize::from(split as u32),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::FileId;
    use crate::hir::{ProjectIndex, lower_file};
    use crate::syntax::{TokenCursor, lex, parse};

    fn find_with<'t>(config: &AnalysisConfig, text: &'t str, caret: i64) -> Option<&'t str> {
        let tokens = lex(text);
        let ast = parse(&tokens);
        let model = lower_file(FileId::new(0), "/t.php", &tokens, &ast, &ProjectIndex::new());
        let range = ReferenceSpanFinder::new(config).find(&mut TokenCursor::new(&tokens), caret, &model)?;
        Some(&text[usize::from(range.start())..usize::from(range.end())])
    }

    fn find(text: &str, caret: usize) -> Option<&str> {
        find_with(&AnalysisConfig::default(), text, caret as i64)
    }

    #[test]
    fn test_identifier_and_variable() {
        let text = "<?php $user->save();";
        assert_eq!(find(text, 7), Some("$user"));
        assert_eq!(find(text, 15), Some("save"));
    }

    #[test]
    fn test_caret_after_name_retries_left() {
        let text = "<?php foo();";
        assert_eq!(find(text, 9), Some("foo"));
    }

    #[test]
    fn test_include_string_without_quotes() {
        let text = "<?php require_once 'lib/a.php';";
        assert_eq!(find(text, 22), Some("lib/a.php"));
    }

    #[test]
    fn test_define_string() {
        let text = "<?php define( 'LIMIT', 1);";
        assert_eq!(find(text, 16), Some("LIMIT"));
    }

    #[test]
    fn test_plain_string_is_not_a_reference() {
        let text = "<?php echo 'hello';";
        assert_eq!(find(text, 14), None);
    }

    #[test]
    fn test_lookback_is_bounded() {
        let text = "<?php define('A', 'B');";
        assert_eq!(find(text, 20), None);
        let config = AnalysisConfig::default().with_string_lookback(8);
        assert_eq!(find_with(&config, text, 20), Some("B"));
    }

    #[test]
    fn test_inline_var_segments() {
        let text = "<?php /* @var $x Foo|Bar */";
        let bar = text.find("Bar").unwrap();
        assert_eq!(find(text, bar + 1), Some("Bar"));
        assert_eq!(find(text, text.find("$x").unwrap()), Some("$x"));
        assert_eq!(find(text, text.find("@var").unwrap() + 1), None);
    }

    #[test]
    fn test_doc_block_type_and_method_name() {
        let text = "<?php\n/**\n * @param \\App\\Model $m\n * @method int count()\n */\nfunction f($m) {}";
        assert_eq!(find(text, text.find("Model").unwrap() + 2), Some("Model"));
        assert_eq!(find(text, text.find("App").unwrap()), Some("App"));
        assert_eq!(find(text, text.find("count").unwrap() + 1), Some("count"));
    }

    #[test]
    fn test_doc_type_alias_segment() {
        let text = "<?php\nuse Lib\\Models as M;\n/** @var M\\User $u */\n$u = null;";
        let caret = text.find("M\\User").unwrap();
        assert_eq!(find(text, caret), Some("M"));
    }

    #[test]
    fn test_doc_type_with_only_leading_backslashes() {
        let text = "<?php /* @var \\\\Foo $x */";
        let ty = text.find('\\').unwrap();
        assert_eq!(find(text, ty), Some("\\\\Foo"));
        assert_eq!(find(text, ty + 1), Some("\\\\Foo"));
        assert_eq!(find(text, ty + 3), Some("Foo"));

        let text = "<?php /** @param \\ $x */ function f($x) {}";
        let ty = text.find('\\').unwrap();
        assert_eq!(find(text, ty), Some("\\"));
        assert_eq!(find(text, ty + 1), Some("\\"));
    }

    #[test]
    fn test_out_of_range_carets() {
        let text = "<?php $a;";
        assert_eq!(find_with(&AnalysisConfig::default(), text, -1), None);
        assert_eq!(find_with(&AnalysisConfig::default(), text, 1_000), None);
        assert_eq!(find_with(&AnalysisConfig::default(), "", 0), None);
    }

    #[test]
    fn test_boundary_retries_stop_at_limit() {
        let text = format!("<?php {}", "(".repeat(50));
        let config = AnalysisConfig::default().with_recursion_limit(5);
        assert_eq!(find_with(&config, &text, text.len() as i64), None);
        assert_eq!(find_with(&AnalysisConfig::default(), &text, 30), None);
    }

    #[test]
    fn test_end_of_document_counts_as_boundary() {
        let text = "<?php $abc";
        assert_eq!(find(text, text.len()), Some("$abc"));
    }
}
