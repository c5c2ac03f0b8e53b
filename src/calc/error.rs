//! Evaluation errors for the restricted calculator.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    #[error("illegal function call: {0}")]
    IllegalFunction(String),

    #[error("illegal constant type: {0}")]
    IllegalConstant(&'static str),

    #[error("disallowed operator '{0}'")]
    DisallowedOperator(String),

    #[error("illegal expression: {0}")]
    IllegalExpression(&'static str),

    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("{function}() takes {expected} argument(s), got {got}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("math domain error")]
    Domain,

    #[error("math range error")]
    Range,

    #[error("expression too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("expression nested too deeply (max depth {0})")]
    TooDeep(usize),
}

impl CalcError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    /// True for failures of the grammar or allow-lists, as opposed to
    /// arithmetic failures on a well-formed expression.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::DivisionByZero | Self::Domain | Self::Range)
    }
}
