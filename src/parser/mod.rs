//! Parser for the cuff template language

pub mod ast;
mod grammar;
pub mod lexer;

pub use ast::*;
pub use grammar::{parse, parse_expr};
