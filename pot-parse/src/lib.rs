#![forbid(unsafe_code)]

mod error;
mod fmt;
mod parser;

use pot_lex::Lexer;

pub use error::{ParseError, SyntaxError};
pub use fmt::format_expr;
pub use parser::{Parser, MAX_DEPTH};

/// Parse one expression string from a program document.
pub fn parse_expr(src: &str) -> Result<pot_ast::Expr, SyntaxError> {
    let tokens = Lexer::new(src).lex()?;
    let mut parser = Parser::new(&tokens);
    Ok(parser.parse_expr_eof()?)
}
