//! Lexer shared by the filter grammar and the stylesheet grammar.

use winnow::combinator::{alt, cut_err, opt};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{take_until, take_while};

use crate::error::LexicalError;

/// Token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier, // line-width, AND, Map
    Hash,       // #layer, #c00
    Number,     // 3, 0.25, -1, 2px
    String,     // 'xyz', "xyz"
    Operator,   // = <> != < <= > >= * + - /
    Delimiter,  // ( ) [ ] { } , ; : :: .
    Comment,    // /* ... */
    Whitespace,
}

/// A lexed token. `text` is the exact source slice, quotes included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            offset,
        }
    }

    /// Byte offset one past the end of the token.
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub fn is_delimiter(&self, text: &str) -> bool {
        self.kind == TokenKind::Delimiter && self.text == text
    }

    pub fn is_operator(&self, text: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == text
    }

    /// Case-insensitive keyword match against an identifier token.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text.eq_ignore_ascii_case(keyword)
    }

    /// Content of a string token with quotes stripped and escapes resolved.
    ///
    /// Both a doubled quote (`'it''s'`) and a backslash escape are accepted.
    pub fn unquoted(&self) -> String {
        let mut chars = self.text.chars();
        let Some(quote) = chars.next() else {
            return String::new();
        };
        let inner: Vec<char> = chars.collect();
        let inner = &inner[..inner.len().saturating_sub(1)];

        let mut out = String::with_capacity(inner.len());
        let mut i = 0;
        while i < inner.len() {
            let c = inner[i];
            if c == '\\' && i + 1 < inner.len() {
                out.push(match inner[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            } else if c == quote && i + 1 < inner.len() && inner[i + 1] == quote {
                out.push(quote);
                i += 2;
            } else {
                out.push(c);
                i += 1;
            }
        }
        out
    }
}

// Manually define PResult for resilience against winnow version changes
type PResult<T> = Result<T, ErrMode<ContextError>>;

type Lexed<'s> = (TokenKind, &'s str);

fn lex_whitespace<'s>(input: &mut &'s str) -> PResult<Lexed<'s>> {
    take_while(1.., char::is_whitespace)
        .map(|text| (TokenKind::Whitespace, text))
        .parse_next(input)
}

/// `/* ... */`. Once the opener is seen a missing closer is fatal.
fn lex_comment<'s>(input: &mut &'s str) -> PResult<Lexed<'s>> {
    ("/*", cut_err((take_until(0.., "*/"), "*/")))
        .take()
        .map(|text| (TokenKind::Comment, text))
        .parse_next(input)
}

fn lex_string<'s>(input: &mut &'s str) -> PResult<Lexed<'s>> {
    let source = *input;
    let mut chars = source.char_indices().peekable();
    let quote = match chars.next() {
        Some((_, c)) if c == '\'' || c == '"' => c,
        _ => return Err(ErrMode::Backtrack(ContextError::default())),
    };

    let mut escaped = false;
    while let Some((i, c)) = chars.next() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if c == quote {
            // doubled quote is an escaped quote
            if matches!(chars.peek(), Some((_, next)) if *next == quote) {
                chars.next();
                continue;
            }
            let (text, rest) = source.split_at(i + c.len_utf8());
            *input = rest;
            return Ok((TokenKind::String, text));
        }
    }

    Err(ErrMode::Cut(ContextError::default()))
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// `#name`: ids in selectors, hex colours in values.
fn lex_hash<'s>(input: &mut &'s str) -> PResult<Lexed<'s>> {
    ('#', take_while(1.., is_name_char))
        .take()
        .map(|text| (TokenKind::Hash, text))
        .parse_next(input)
}

/// Number with an optional sign, fraction and unit suffix (`2px`, `50%`).
fn lex_number<'s>(input: &mut &'s str) -> PResult<Lexed<'s>> {
    (
        opt('-'),
        alt(((digits, opt(('.', digits))).void(), ('.', digits).void())),
        take_while(0.., |c: char| c.is_ascii_alphabetic() || c == '%'),
    )
        .take()
        .map(|text| (TokenKind::Number, text))
        .parse_next(input)
}

fn digits<'s>(input: &mut &'s str) -> PResult<&'s str> {
    take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)
}

/// Identifier: a letter or underscore followed by letters, digits, `_` or `-`.
fn lex_ident<'s>(input: &mut &'s str) -> PResult<Lexed<'s>> {
    (
        take_while(1, |c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., is_name_char),
    )
        .take()
        .map(|text| (TokenKind::Identifier, text))
        .parse_next(input)
}

fn lex_operator<'s>(input: &mut &'s str) -> PResult<Lexed<'s>> {
    alt((
        // Multi-char operators first
        "<>", "!=", "<=", ">=", "=", "<", ">", "*", "+", "-", "/",
    ))
    .map(|text| (TokenKind::Operator, text))
    .parse_next(input)
}

fn lex_delimiter<'s>(input: &mut &'s str) -> PResult<Lexed<'s>> {
    alt(("::", "(", ")", "[", "]", "{", "}", ",", ";", ":", "."))
        .map(|text| (TokenKind::Delimiter, text))
        .parse_next(input)
}

/// Lex a single token.
fn lex_token<'s>(input: &mut &'s str) -> PResult<Lexed<'s>> {
    alt((
        lex_whitespace,
        lex_comment,
        lex_string,
        lex_hash,
        // Number (before ident to catch negative numbers)
        lex_number,
        lex_ident,
        lex_operator,
        lex_delimiter,
    ))
    .parse_next(input)
}

/// Tokenize the entire input. Whitespace and comments are kept.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexicalError> {
    let mut remaining = source;
    let mut tokens = Vec::new();

    while !remaining.is_empty() {
        let offset = source.len() - remaining.len();
        let before = remaining;
        match lex_token(&mut remaining) {
            Ok((kind, text)) => tokens.push(Token::new(kind, text, offset)),
            Err(_) => return Err(classify_failure(before, offset)),
        }
    }

    Ok(tokens)
}

fn classify_failure(rest: &str, offset: usize) -> LexicalError {
    if rest.starts_with('\'') || rest.starts_with('"') {
        LexicalError::UnterminatedString { offset }
    } else if rest.starts_with("/*") {
        LexicalError::UnterminatedComment { offset }
    } else {
        LexicalError::UnexpectedCharacter {
            found: rest.chars().next().unwrap_or('\0'),
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_trivia())
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_comparison_tokens() {
        assert_eq!(
            kinds("foo <= 3"),
            vec![
                (TokenKind::Identifier, "foo".into()),
                (TokenKind::Operator, "<=".into()),
                (TokenKind::Number, "3".into()),
            ]
        );
    }

    #[test]
    fn test_whitespace_and_comments_preserved() {
        let tokens = tokenize("a /* b */ c").unwrap();
        let rebuilt: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(rebuilt, "a /* b */ c");
        assert_eq!(tokens[2].kind, TokenKind::Comment);
        assert_eq!(tokens[4].offset, 10);
    }

    #[test]
    fn test_stylesheet_tokens() {
        assert_eq!(
            kinds("#states::glow{line-width:1px;}"),
            vec![
                (TokenKind::Hash, "#states".into()),
                (TokenKind::Delimiter, "::".into()),
                (TokenKind::Identifier, "glow".into()),
                (TokenKind::Delimiter, "{".into()),
                (TokenKind::Identifier, "line-width".into()),
                (TokenKind::Delimiter, ":".into()),
                (TokenKind::Number, "1px".into()),
                (TokenKind::Delimiter, ";".into()),
                (TokenKind::Delimiter, "}".into()),
            ]
        );
    }

    #[test]
    fn test_negative_and_decimal_numbers() {
        assert_eq!(
            kinds("x<-3.5"),
            vec![
                (TokenKind::Identifier, "x".into()),
                (TokenKind::Operator, "<".into()),
                (TokenKind::Number, "-3.5".into()),
            ]
        );
    }

    #[test]
    fn test_leading_dot_numbers() {
        assert_eq!(
            kinds("a > .07 AND b.c < -.5"),
            vec![
                (TokenKind::Identifier, "a".into()),
                (TokenKind::Operator, ">".into()),
                (TokenKind::Number, ".07".into()),
                (TokenKind::Identifier, "AND".into()),
                (TokenKind::Identifier, "b".into()),
                (TokenKind::Delimiter, ".".into()),
                (TokenKind::Identifier, "c".into()),
                (TokenKind::Operator, "<".into()),
                (TokenKind::Number, "-.5".into()),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#"'it''s' "a\"b""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].unquoted(), "it's");
        assert_eq!(tokens[2].unquoted(), "a\"b");
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            tokenize("name = 'abc"),
            Err(LexicalError::UnterminatedString { offset: 7 })
        );
    }

    #[test]
    fn test_unterminated_comment() {
        assert_eq!(
            tokenize("* { /* open"),
            Err(LexicalError::UnterminatedComment { offset: 4 })
        );
    }

    #[test]
    fn test_unexpected_character() {
        assert_eq!(
            tokenize("a ? b"),
            Err(LexicalError::UnexpectedCharacter {
                found: '?',
                offset: 2
            })
        );
    }
}
