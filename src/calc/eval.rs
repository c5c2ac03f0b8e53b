//! Allow-list driven evaluation of a parsed expression tree.
//!
//! Names resolve only against [`CONSTANTS`] and callees only against
//! [`Function::lookup`]; nothing else in the tree can reach any capability.

use std::f64::consts;

use super::error::CalcError;
use super::parser::{BinaryOp, Expr, Literal, UnaryOp};

pub const CONSTANTS: &[(&str, f64)] = &[("pi", consts::PI), ("e", consts::E)];

/// Functions callable from an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Sqrt,
    Log,
    Exp,
    Max,
    Min,
    Abs,
}

impl Function {
    pub const ALL: [Function; 9] = [
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Sqrt,
        Self::Log,
        Self::Exp,
        Self::Max,
        Self::Min,
        Self::Abs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Sqrt => "sqrt",
            Self::Log => "log",
            Self::Exp => "exp",
            Self::Max => "max",
            Self::Min => "min",
            Self::Abs => "abs",
        }
    }

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn apply(self, args: &[f64]) -> Result<f64, CalcError> {
        let value = match self {
            Self::Sin => self.unary(args)?.sin(),
            Self::Cos => self.unary(args)?.cos(),
            Self::Tan => self.unary(args)?.tan(),
            Self::Exp => self.unary(args)?.exp(),
            Self::Abs => self.unary(args)?.abs(),
            Self::Sqrt => {
                let x = self.unary(args)?;
                if x < 0.0 {
                    return Err(CalcError::Domain);
                }
                x.sqrt()
            }
            Self::Log => log(args)?,
            Self::Max => self.variadic(args)?.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => self.variadic(args)?.iter().copied().fold(f64::INFINITY, f64::min),
        };
        check_result(value, args)
    }

    fn unary(self, args: &[f64]) -> Result<f64, CalcError> {
        match args {
            [x] => Ok(*x),
            _ => Err(CalcError::Arity {
                function: self.name(),
                expected: "exactly 1",
                got: args.len(),
            }),
        }
    }

    fn variadic(self, args: &[f64]) -> Result<&[f64], CalcError> {
        if args.len() < 2 {
            return Err(CalcError::Arity {
                function: self.name(),
                expected: "at least 2",
                got: args.len(),
            });
        }
        Ok(args)
    }
}

/// `log(x)` is the natural logarithm, `log(x, base)` divides by `ln(base)`.
fn log(args: &[f64]) -> Result<f64, CalcError> {
    let (x, base) = match args {
        [x] => (*x, None),
        [x, base] => (*x, Some(*base)),
        _ => {
            return Err(CalcError::Arity {
                function: "log",
                expected: "1 or 2",
                got: args.len(),
            })
        }
    };
    if x <= 0.0 {
        return Err(CalcError::Domain);
    }
    match base {
        None => Ok(x.ln()),
        Some(base) if base <= 0.0 => Err(CalcError::Domain),
        Some(base) if base == 1.0 => Err(CalcError::DivisionByZero),
        Some(base) => Ok(x.ln() / base.ln()),
    }
}

/// NaN from non-NaN inputs is a domain error; infinity from finite inputs
/// is a range error.
fn check_result(value: f64, inputs: &[f64]) -> Result<f64, CalcError> {
    if value.is_nan() && !inputs.iter().any(|x| x.is_nan()) {
        return Err(CalcError::Domain);
    }
    if value.is_infinite() && inputs.iter().all(|x| x.is_finite()) {
        return Err(CalcError::Range);
    }
    Ok(value)
}

pub fn eval(expr: &Expr) -> Result<f64, CalcError> {
    match expr {
        Expr::Literal(Literal::Number(value)) => Ok(*value),
        Expr::Literal(other) => Err(CalcError::IllegalConstant(other.type_name())),
        Expr::Name(name) => CONSTANTS
            .iter()
            .find(|(constant, _)| *constant == name.as_str())
            .map(|(_, value)| *value)
            .ok_or_else(|| CalcError::UnknownSymbol(name.clone())),
        Expr::Unary { op, operand } => {
            let value = eval(operand)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Neg => -value,
            })
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs)?;
            let rhs = eval(rhs)?;
            apply_binary(*op, lhs, rhs)
        }
        Expr::Call { callee, args } => {
            // The callee is checked before any argument is evaluated.
            let function = match callee.as_ref() {
                Expr::Name(name) => {
                    Function::lookup(name).ok_or_else(|| CalcError::IllegalFunction(name.clone()))?
                }
                _ => return Err(CalcError::IllegalFunction("<expression>".into())),
            };
            let values = args.iter().map(eval).collect::<Result<Vec<_>, _>>()?;
            function.apply(&values)
        }
    }
}

fn apply_binary(op: BinaryOp, lhs: f64, rhs: f64) -> Result<f64, CalcError> {
    match op {
        BinaryOp::Add => Ok(lhs + rhs),
        BinaryOp::Sub => Ok(lhs - rhs),
        BinaryOp::Mul => Ok(lhs * rhs),
        BinaryOp::Div => {
            nonzero(rhs)?;
            Ok(lhs / rhs)
        }
        BinaryOp::FloorDiv => {
            nonzero(rhs)?;
            Ok(floor_div(lhs, rhs))
        }
        BinaryOp::Mod => {
            nonzero(rhs)?;
            let mut rem = lhs % rhs;
            // Result takes the sign of the divisor.
            if rem != 0.0 && (rem < 0.0) != (rhs < 0.0) {
                rem += rhs;
            }
            Ok(rem)
        }
        BinaryOp::Pow => {
            if lhs == 0.0 && rhs < 0.0 {
                return Err(CalcError::DivisionByZero);
            }
            if lhs < 0.0 && rhs.fract() != 0.0 && rhs.is_finite() {
                return Err(CalcError::Domain);
            }
            check_result(lhs.powf(rhs), &[lhs, rhs])
        }
    }
}

/// Floor division derived from the exact remainder, so `1 // 0.1` is 9
/// rather than the floor of the rounded quotient.
fn floor_div(lhs: f64, rhs: f64) -> f64 {
    let rem = lhs % rhs;
    let mut div = (lhs - rem) / rhs;
    if rem != 0.0 && (rem < 0.0) != (rhs < 0.0) {
        div -= 1.0;
    }
    if div == 0.0 {
        return 0.0;
    }
    let floored = div.floor();
    if div - floored > 0.5 {
        floored + 1.0
    } else {
        floored
    }
}

fn nonzero(divisor: f64) -> Result<(), CalcError> {
    if divisor == 0.0 {
        Err(CalcError::DivisionByZero)
    } else {
        Ok(())
    }
}
