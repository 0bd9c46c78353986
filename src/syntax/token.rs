//! Token model and the logos-based PHP tokenizer.

use logos::Logos;
use smol_str::SmolStr;

use crate::base::{TextRange, TextSize};

/// Kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    OpenTag,
    CloseTag,
    Whitespace,
    /// `$name`
    Variable,
    /// A bare name: class, function, constant, member name.
    Identifier,
    StringLiteral,
    Number,
    DocComment,
    Comment,
    LineComment,
    Include,
    IncludeOnce,
    Require,
    RequireOnce,
    Keyword,
    Arrow,
    NullsafeArrow,
    DoubleColon,
    NsSeparator,
    Punct,
    Error,
}

impl TokenKind {
    /// Tokens that name something without further interpretation.
    pub fn is_name(self) -> bool {
        matches!(self, TokenKind::Identifier | TokenKind::Variable)
    }

    pub fn is_include(self) -> bool {
        matches!(
            self,
            TokenKind::Include | TokenKind::IncludeOnce | TokenKind::Require | TokenKind::RequireOnce
        )
    }

    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::Comment | TokenKind::LineComment | TokenKind::DocComment
        )
    }
}

/// One token: kind, absolute range and source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: TextRange,
    pub text: SmolStr,
}

impl Token {
    #[inline]
    pub fn start(&self) -> TextSize {
        self.range.start()
    }

    #[inline]
    pub fn end(&self) -> TextSize {
        self.range.end()
    }

    #[inline]
    pub fn len(&self) -> TextSize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum RawToken {
    #[token("<?php", ignore(ascii_case))]
    #[token("<?=")]
    OpenTag,

    #[token("?>")]
    CloseTag,

    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,

    #[regex(r"\$[a-zA-Z_\x{80}-\x{10FFFF}][a-zA-Z0-9_\x{80}-\x{10FFFF}]*")]
    Variable,

    #[regex(r"[a-zA-Z_\x{80}-\x{10FFFF}][a-zA-Z0-9_\x{80}-\x{10FFFF}]*")]
    Identifier,

    #[regex(r"'([^'\\]|\\.)*'")]
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLiteral,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[token("/*", block_comment)]
    BlockComment,

    #[regex(r"//[^\n]*")]
    #[regex(r"#[^\n]*")]
    LineComment,

    #[token("include", ignore(ascii_case))]
    Include,
    #[token("include_once", ignore(ascii_case))]
    IncludeOnce,
    #[token("require", ignore(ascii_case))]
    Require,
    #[token("require_once", ignore(ascii_case))]
    RequireOnce,

    #[token("function", ignore(ascii_case))]
    #[token("class", ignore(ascii_case))]
    #[token("interface", ignore(ascii_case))]
    #[token("trait", ignore(ascii_case))]
    #[token("enum", ignore(ascii_case))]
    #[token("namespace", ignore(ascii_case))]
    #[token("use", ignore(ascii_case))]
    #[token("new", ignore(ascii_case))]
    #[token("return", ignore(ascii_case))]
    #[token("private", ignore(ascii_case))]
    #[token("protected", ignore(ascii_case))]
    #[token("public", ignore(ascii_case))]
    #[token("static", ignore(ascii_case))]
    #[token("const", ignore(ascii_case))]
    #[token("extends", ignore(ascii_case))]
    #[token("implements", ignore(ascii_case))]
    Keyword,

    #[token("->")]
    Arrow,
    #[token("?->")]
    NullsafeArrow,
    #[token("::")]
    DoubleColon,
    #[token("\\")]
    NsSeparator,

    #[token("==")]
    #[token("===")]
    #[token("!=")]
    #[token("!==")]
    #[token("<>")]
    #[token("<=")]
    #[token(">=")]
    #[token("<=>")]
    #[token("=>")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token(".=")]
    #[token("%=")]
    #[token("|=")]
    #[token("&=")]
    #[token("^=")]
    #[token("**=")]
    #[token("??=")]
    #[token("??")]
    #[token("&&")]
    #[token("||")]
    #[token("++")]
    #[token("--")]
    #[token("**")]
    #[token("<<")]
    #[token(">>")]
    #[token("...")]
    #[token("^")]
    #[token("(")]
    #[token(")")]
    #[token("{")]
    #[token("}")]
    #[token("[")]
    #[token("]")]
    #[token(";")]
    #[token(",")]
    #[token("=")]
    #[token(".")]
    #[token("?")]
    #[token(":")]
    #[token("|")]
    #[token("&")]
    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("<")]
    #[token(">")]
    #[token("!")]
    #[token("@")]
    #[token("%")]
    Punct,
}

/// Consumes a block comment up to and including `*/`, or to the end of
/// input when the comment is unterminated.
fn block_comment(lex: &mut logos::Lexer<RawToken>) -> bool {
    let consumed = match lex.remainder().find("*/") {
        Some(end) => end + 2,
        None => lex.remainder().len(),
    };
    lex.bump(consumed);
    true
}

impl RawToken {
    fn classify(self, text: &str) -> TokenKind {
        match self {
            RawToken::OpenTag => TokenKind::OpenTag,
            RawToken::CloseTag => TokenKind::CloseTag,
            RawToken::Whitespace => TokenKind::Whitespace,
            RawToken::Variable => TokenKind::Variable,
            RawToken::Identifier => TokenKind::Identifier,
            RawToken::StringLiteral => TokenKind::StringLiteral,
            RawToken::Number => TokenKind::Number,
            // `/**/` is an empty block comment, not a doc comment
            RawToken::BlockComment if text.starts_with("/**") && text.len() > 4 => {
                TokenKind::DocComment
            }
            RawToken::BlockComment => TokenKind::Comment,
            RawToken::LineComment => TokenKind::LineComment,
            RawToken::Include => TokenKind::Include,
            RawToken::IncludeOnce => TokenKind::IncludeOnce,
            RawToken::Require => TokenKind::Require,
            RawToken::RequireOnce => TokenKind::RequireOnce,
            RawToken::Keyword => TokenKind::Keyword,
            RawToken::Arrow => TokenKind::Arrow,
            RawToken::NullsafeArrow => TokenKind::NullsafeArrow,
            RawToken::DoubleColon => TokenKind::DoubleColon,
            RawToken::NsSeparator => TokenKind::NsSeparator,
            RawToken::Punct => TokenKind::Punct,
        }
    }
}

/// Tokenize a whole document.
///
/// The result covers the input without gaps; input the lexer cannot match
/// becomes [`TokenKind::Error`] tokens.
pub fn lex(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = RawToken::lexer(text);
    while let Some(raw) = lexer.next() {
        let span = lexer.span();
        let slice = lexer.slice();
        let kind = match raw {
            Ok(raw) => raw.classify(slice),
            Err(()) => TokenKind::Error,
        };
        tokens.push(Token {
            kind,
            range: TextRange::new((span.start as u32).into(), (span.end as u32).into()),
            text: SmolStr::new(slice),
        });
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        lex(text)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_lex_include_statement() {
        assert_eq!(
            kinds("<?php include_once 'a.php';"),
            vec![
                TokenKind::OpenTag,
                TokenKind::IncludeOnce,
                TokenKind::StringLiteral,
                TokenKind::Punct,
            ]
        );
    }

    #[test]
    fn test_lex_keywords_are_case_insensitive() {
        assert_eq!(kinds("REQUIRE Includes"), vec![TokenKind::Require, TokenKind::Identifier]);
    }

    #[test]
    fn test_lex_member_access() {
        assert_eq!(
            kinds("$this->foo(); Foo::BAR"),
            vec![
                TokenKind::Variable,
                TokenKind::Arrow,
                TokenKind::Identifier,
                TokenKind::Punct,
                TokenKind::Punct,
                TokenKind::Punct,
                TokenKind::Identifier,
                TokenKind::DoubleColon,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn test_lex_compound_operators_are_single_tokens() {
        let texts: Vec<_> = lex("$a ??= $b === 1 => ...")
            .into_iter()
            .filter(|t| t.kind == TokenKind::Punct)
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["??=", "===", "=>", "..."]);
    }

    #[test]
    fn test_lex_comment_kinds() {
        assert_eq!(
            kinds("/** @var Foo $x */ /* @var $y Bar */ /**/ // tail"),
            vec![
                TokenKind::DocComment,
                TokenKind::Comment,
                TokenKind::Comment,
                TokenKind::LineComment,
            ]
        );
    }

    #[test]
    fn test_lex_unterminated_comment_runs_to_end() {
        let tokens = lex("$a /** open");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::DocComment);
        assert_eq!(last.end(), TextSize::from(11));
    }

    #[test]
    fn test_lex_covers_input_without_gaps() {
        let text = "<?php $a = \"x\" ~ 1;";
        let tokens = lex(text);
        let mut expected = TextSize::from(0);
        for token in &tokens {
            assert_eq!(token.start(), expected);
            expected = token.end();
        }
        assert_eq!(expected, TextSize::of(text));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Error));
    }
}
