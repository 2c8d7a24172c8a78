//! Error types for parsing and evaluation.

/// Raised by the tokenizer. Lexing never recovers: the first bad token aborts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexicalError {
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("unterminated comment starting at offset {offset}")]
    UnterminatedComment { offset: usize },

    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedCharacter { found: char, offset: usize },
}

impl LexicalError {
    pub fn offset(&self) -> usize {
        match self {
            LexicalError::UnterminatedString { offset }
            | LexicalError::UnterminatedComment { offset }
            | LexicalError::UnexpectedCharacter { offset, .. } => *offset,
        }
    }

    fn shifted(self, base: usize) -> Self {
        match self {
            LexicalError::UnterminatedString { offset } => LexicalError::UnterminatedString {
                offset: offset + base,
            },
            LexicalError::UnterminatedComment { offset } => LexicalError::UnterminatedComment {
                offset: offset + base,
            },
            LexicalError::UnexpectedCharacter { found, offset } => {
                LexicalError::UnexpectedCharacter {
                    found,
                    offset: offset + base,
                }
            }
        }
    }
}

/// An unexpected token in a given parser state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{state}: unexpected {found:?} at offset {offset}, expected {expected} (scanned {scanned:?})")]
pub struct SyntaxError {
    /// Parser state in which the token was seen.
    pub state: &'static str,
    /// Text of the offending token (`"end of input"` at EOF).
    pub found: String,
    /// What the parser wanted instead.
    pub expected: String,
    /// Byte offset of the offending token.
    pub offset: usize,
    /// Source text scanned before the failure, up to and including the token.
    pub scanned: String,
}

/// Any failure of a single parse call. No partial result accompanies it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("lexical error: {0}")]
    Lexical(#[from] LexicalError),

    #[error("syntax error in {0}")]
    Syntax(#[from] SyntaxError),

    #[error("nesting deeper than {limit} levels at offset {offset}")]
    TooDeep { limit: usize, offset: usize },

    #[error("invalid geometry literal {text:?} at offset {offset}: {message}")]
    Geometry {
        text: String,
        message: String,
        offset: usize,
    },
}

impl ParseError {
    /// Byte offset in the parsed source where the failure was detected.
    pub fn offset(&self) -> usize {
        match self {
            ParseError::Lexical(e) => e.offset(),
            ParseError::Syntax(e) => e.offset,
            ParseError::TooDeep { offset, .. } | ParseError::Geometry { offset, .. } => *offset,
        }
    }

    /// Re-base an error raised while parsing the substring of `source` that
    /// starts at `base`. Offsets and scanned text then refer to `source`.
    pub(crate) fn shifted(self, base: usize, source: &str) -> Self {
        match self {
            ParseError::Lexical(e) => ParseError::Lexical(e.shifted(base)),
            ParseError::Syntax(mut e) => {
                e.offset += base;
                e.scanned = match source.get(..base + e.scanned.len()) {
                    Some(text) => text.to_string(),
                    None => format!("{}{}", source.get(..base).unwrap_or_default(), e.scanned),
                };
                ParseError::Syntax(e)
            }
            ParseError::TooDeep { limit, offset } => ParseError::TooDeep {
                limit,
                offset: offset + base,
            },
            ParseError::Geometry {
                text,
                message,
                offset,
            } => ParseError::Geometry {
                text,
                message,
                offset: offset + base,
            },
        }
    }
}

/// Failure while evaluating an expression or filter against a feature.
///
/// Missing attributes are not errors; they evaluate to null.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("cannot convert {found} to {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("function {function}() takes {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("function {function}() argument {index}: {message}")]
    Argument {
        function: String,
        index: usize,
        message: String,
    },

    #[error("unknown function {name}()")]
    UnknownFunction { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shifted_syntax_error_refers_to_outer_source() {
        let inner = ParseError::Syntax(SyntaxError {
            state: "filter",
            found: "<".to_string(),
            expected: "value".to_string(),
            offset: 4,
            scanned: "foo <".to_string(),
        });
        let ParseError::Syntax(e) = inner.shifted(3, "#a[foo <] { x: 1; }") else {
            panic!("shifting keeps the variant");
        };
        assert_eq!(e.offset, 7);
        assert_eq!(e.scanned, "#a[foo <");
        assert_eq!(
            e.to_string(),
            "filter: unexpected \"<\" at offset 7, expected value (scanned \"#a[foo <\")"
        );
    }
}
