//! Requirement expression parser
//!
//! Parses scanned tokens into an unevaluated [`Expression`] tree.

mod expr_parser;

pub use expr_parser::ExprParser;

use crate::error::Result;
use crate::expr::Expression;
use crate::lexer::Scanner;

/// Scan and parse source text
pub fn parse_expression(source: &str) -> Result<Expression> {
    let tokens = Scanner::new(source).scan_tokens()?;
    ExprParser::new(tokens).parse()
}
