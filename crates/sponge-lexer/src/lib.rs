//! Sponge lexer: converts script text into a token stream with explicit
//! `Newline`, `Indent` and `Dedent` tokens.

pub mod lexer;
pub mod token;

pub use lexer::{LexResult, Lexer};
pub use token::{Token, TokenKind, ALL_KEYWORDS};
