pub mod lexer;
pub mod ast;
pub mod grammar;

use crate::error::ParseError;

/// Parse `.proto` schema text into a parse tree.
///
/// This is the main entry point for the parser module.
pub fn parse(schema_text: &str) -> Result<ast::ProtoFile, ParseError> {
    grammar::parse_file(schema_text)
}
