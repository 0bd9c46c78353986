//! Positionable token sequences.

use crate::base::TextSize;

use super::token::Token;

/// Random-access, positionable view over a token stream.
///
/// Mirrors the cursor protocol of editor lexers: [`move_to`] positions the
/// cursor *before* the token containing an offset, [`move_next`] then makes
/// that token current.
///
/// [`move_to`]: TokenSequence::move_to
/// [`move_next`]: TokenSequence::move_next
pub trait TokenSequence {
    /// Position before the token containing `offset`. Offsets at or past
    /// the end of the stream leave the cursor after the last token.
    fn move_to(&mut self, offset: TextSize);

    /// Advance to the next token, returning `false` at the end.
    fn move_next(&mut self) -> bool;

    /// Step back to the previous token, returning `false` at the start.
    fn move_previous(&mut self) -> bool;

    /// The current token, if the cursor sits on one.
    fn token(&self) -> Option<&Token>;

    /// Total length covered by the stream.
    fn len(&self) -> TextSize;

    fn is_empty(&self) -> bool {
        self.len() == TextSize::from(0)
    }
}

/// [`TokenSequence`] over a lexed token slice.
#[derive(Debug, Clone)]
pub struct TokenCursor<'a> {
    tokens: &'a [Token],
    /// Index of the token `move_next` will make current.
    next: usize,
    current: Option<usize>,
}

impl<'a> TokenCursor<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            next: 0,
            current: None,
        }
    }

    /// Index of the current token.
    pub fn index(&self) -> Option<usize> {
        self.current
    }
}

impl TokenSequence for TokenCursor<'_> {
    fn move_to(&mut self, offset: TextSize) {
        self.current = None;
        // first token whose end lies past the offset contains it
        self.next = self.tokens.partition_point(|t| t.end() <= offset);
    }

    fn move_next(&mut self) -> bool {
        if self.next < self.tokens.len() {
            self.current = Some(self.next);
            self.next += 1;
            true
        } else {
            self.current = None;
            false
        }
    }

    fn move_previous(&mut self) -> bool {
        let from = self.current.unwrap_or(self.next);
        if from == 0 {
            return false;
        }
        self.current = Some(from - 1);
        self.next = from;
        true
    }

    fn token(&self) -> Option<&Token> {
        self.current.and_then(|i| self.tokens.get(i))
    }

    fn len(&self) -> TextSize {
        self.tokens.last().map(Token::end).unwrap_or_default()
    }
}
