use super::lexer::{Token, tokenize};
use crate::error::LexicalError;

/// Cursor over the tokens of one source text.
///
/// `next` advances and hands out the token it moved onto, `current` re-reads
/// it. Both return `None` once the end of input has been reached.
#[derive(Debug, Clone)]
pub struct TokenStream<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    consumed: usize,
    exhausted: bool,
}

impl<'s> TokenStream<'s> {
    pub fn new(source: &'s str) -> Result<Self, LexicalError> {
        Ok(TokenStream {
            source,
            tokens: tokenize(source)?,
            consumed: 0,
            exhausted: false,
        })
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&Token> {
        if self.consumed < self.tokens.len() {
            self.consumed += 1;
            self.tokens.get(self.consumed - 1)
        } else {
            self.exhausted = true;
            None
        }
    }

    /// Advance past whitespace and comments to the next significant token.
    pub fn next_significant(&mut self) -> Option<&Token> {
        while self.consumed < self.tokens.len() && self.tokens[self.consumed].is_trivia() {
            self.consumed += 1;
        }
        self.next()
    }

    pub fn current(&self) -> Option<&Token> {
        if self.exhausted {
            return None;
        }
        self.consumed
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
    }

    /// The token `next` would return, without advancing.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.consumed)
    }

    /// The token `next_significant` would return, without advancing.
    pub fn peek_significant(&self) -> Option<&Token> {
        self.tokens[self.consumed.min(self.tokens.len())..]
            .iter()
            .find(|t| !t.is_trivia())
    }

    /// Byte offset of the current token, or the source length at end of input.
    pub fn offset(&self) -> usize {
        self.current().map_or(self.source.len(), |t| t.offset)
    }

    /// Source text up to and including the current token.
    pub fn scanned(&self) -> &'s str {
        let end = self.current().map_or(self.source.len(), Token::end);
        &self.source[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    #[test]
    fn test_next_and_current() {
        let mut stream = TokenStream::new("a b").unwrap();
        assert!(stream.current().is_none());
        assert_eq!(stream.next().unwrap().text, "a");
        assert_eq!(stream.current().unwrap().text, "a");
        assert_eq!(stream.next().unwrap().kind, TokenKind::Whitespace);
        assert_eq!(stream.next().unwrap().text, "b");
        assert!(stream.next().is_none());
        assert!(stream.current().is_none());
        assert_eq!(stream.offset(), 3);
    }

    #[test]
    fn test_significant_skips_trivia() {
        let mut stream = TokenStream::new("  /* x */ foo = 1").unwrap();
        assert_eq!(stream.peek_significant().unwrap().text, "foo");
        assert_eq!(stream.next_significant().unwrap().text, "foo");
        assert_eq!(stream.next_significant().unwrap().text, "=");
        assert_eq!(stream.scanned(), "  /* x */ foo =");
        assert_eq!(stream.next_significant().unwrap().text, "1");
        assert!(stream.next_significant().is_none());
    }

    #[test]
    fn test_empty_source() {
        let mut stream = TokenStream::new("").unwrap();
        assert!(stream.peek().is_none());
        assert!(stream.next().is_none());
        assert_eq!(stream.scanned(), "");
    }
}
