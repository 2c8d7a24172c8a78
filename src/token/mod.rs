//! Tokenization shared by the CQL and stylesheet parsers.

mod lexer;
mod stream;

pub use lexer::{Token, TokenKind, tokenize};
pub use stream::TokenStream;
