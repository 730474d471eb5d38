//! The rule DSL: tokens, lexer, abstract syntax, and parser.
//!
//! A unit of DSL text contains `ACTION` and `RULE` declarations in any
//! order. [`parse`] returns the full declaration list or a single error;
//! declarations render back to canonical text via their `Display` impls.

/// Abstract syntax tree node types.
pub mod ast;
/// Source text → token stream.
pub mod lexer;
/// Token stream → declarations.
pub mod parser;
/// Token and span types.
pub mod token;

pub use ast::{
    ActionDef, ArithOp, CmpOp, Declaration, Expr, ForClause, Parameter, PathExpr, Precondition,
    RuleDef, Stmt, Trigger,
};
pub use parser::{parse, parse_file};
