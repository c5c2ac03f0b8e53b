//! Restricted arithmetic evaluator for `calc` mode.
//!
//! Expressions are tokenized, parsed into a small tree and walked by an
//! evaluator that only knows the allow-listed constants and functions. There
//! is no name resolution, attribute access, assignment or statement support.

mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use error::CalcError;
pub use eval::{Function, CONSTANTS};
pub use parser::{parse, BinaryOp, Expr, Literal, UnaryOp, MAX_DEPTH};

/// Longest accepted expression, in bytes.
pub const MAX_EXPR_BYTES: usize = 4096;

/// Parse and evaluate an expression.
pub fn evaluate(input: &str) -> Result<f64, CalcError> {
    if input.len() > MAX_EXPR_BYTES {
        return Err(CalcError::TooLong {
            len: input.len(),
            max: MAX_EXPR_BYTES,
        });
    }
    let expr = parse(input)?;
    let value = eval::eval(&expr)?;
    if !value.is_finite() {
        return Err(CalcError::Range);
    }
    // -0.0 would otherwise reach the wire as "-0.0".
    Ok(if value == 0.0 { 0.0 } else { value })
}
