//! Recursive-descent parser producing the calculator expression tree.
//!
//! Precedence, loosest first: `+ -`, `* / // %`, unary `+ -`, `**`, call.
//! `**` is right-associative and binds tighter than a unary operator on its
//! left, so `-2**2` is `-(2**2)`.

use super::error::CalcError;
use super::lexer::{tokenize, Spanned, Token};

/// Maximum nesting of parentheses, unary operators and powers.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Imaginary,
    Text,
    Bool(bool),
    Null,
}

impl Literal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Imaginary => "complex",
            Self::Text => "str",
            Self::Bool(_) => "bool",
            Self::Null => "None",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}

pub fn parse(input: &str) -> Result<Expr, CalcError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    parser.expect_end()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token list always ends with Eof and the parser never moves past it.
        &self.tokens[self.index].token
    }

    fn position(&self) -> usize {
        self.tokens[self.index].position
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.index].token.clone();
        if token != Token::Eof {
            self.index += 1;
        }
        token
    }

    fn unexpected(&self) -> CalcError {
        match self.peek() {
            Token::Disallowed(op) => CalcError::DisallowedOperator(op.clone()),
            Token::Ident(word) if is_keyword_operator(word) => {
                CalcError::DisallowedOperator(word.clone())
            }
            Token::Bracket('[') => CalcError::IllegalExpression("subscript or list"),
            Token::Bracket('{') => CalcError::IllegalExpression("dict or set"),
            Token::Dot => CalcError::IllegalExpression("attribute access"),
            Token::Eof => CalcError::syntax(self.position(), "unexpected end of expression"),
            other => CalcError::syntax(self.position(), format!("unexpected token {:?}", other)),
        }
    }

    fn expect_end(&self) -> Result<(), CalcError> {
        if *self.peek() == Token::Eof {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Every level of parentheses, unary sign or exponent passes through
    /// `factor`, so counting there bounds the recursion.
    fn descend(&mut self) -> Result<(), CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, CalcError> {
        self.additive()
    }

    fn additive(&mut self) -> Result<Expr, CalcError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr, CalcError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::DoubleSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.factor()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn factor(&mut self) -> Result<Expr, CalcError> {
        self.descend()?;
        let result = self.unary();
        self.depth -= 1;
        result
    }

    fn unary(&mut self) -> Result<Expr, CalcError> {
        let op = match self.peek() {
            Token::Plus => UnaryOp::Plus,
            Token::Minus => UnaryOp::Neg,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.factor()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr, CalcError> {
        let base = self.call()?;
        if *self.peek() != Token::DoubleStar {
            return Ok(base);
        }
        self.advance();
        let exponent = self.factor()?;
        Ok(binary(BinaryOp::Pow, base, exponent))
    }

    fn call(&mut self) -> Result<Expr, CalcError> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Token::Dot => return Err(CalcError::IllegalExpression("attribute access")),
                Token::Bracket('[') => return Err(CalcError::IllegalExpression("subscript")),
                _ => return Ok(expr),
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, CalcError> {
        let mut args = Vec::new();
        loop {
            if *self.peek() == Token::RParen {
                self.advance();
                return Ok(args);
            }
            args.push(self.expr()?);
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                Token::RParen => {}
                Token::Disallowed(op) if op == "=" => {
                    return Err(CalcError::IllegalExpression("keyword argument"))
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn atom(&mut self) -> Result<Expr, CalcError> {
        let position = self.position();
        match self.peek().clone() {
            Token::Number(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(value)))
            }
            Token::Imaginary => {
                self.advance();
                Ok(Expr::Literal(Literal::Imaginary))
            }
            Token::Text => {
                self.advance();
                Ok(Expr::Literal(Literal::Text))
            }
            Token::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "True" => Ok(Expr::Literal(Literal::Bool(true))),
                    "False" => Ok(Expr::Literal(Literal::Bool(false))),
                    "None" => Ok(Expr::Literal(Literal::Null)),
                    "lambda" => Err(CalcError::IllegalExpression("lambda")),
                    word if is_keyword_operator(word) => {
                        Err(CalcError::DisallowedOperator(word.to_string()))
                    }
                    _ => Ok(Expr::Name(name)),
                }
            }
            Token::LParen => {
                self.advance();
                if *self.peek() == Token::RParen {
                    return Err(CalcError::IllegalExpression("tuple"));
                }
                let inner = self.expr()?;
                match self.advance() {
                    Token::RParen => Ok(inner),
                    Token::Comma => Err(CalcError::IllegalExpression("tuple")),
                    Token::Eof => Err(CalcError::syntax(position, "unclosed '('")),
                    _ => {
                        self.index -= 1;
                        Err(self.unexpected())
                    }
                }
            }
            _ => Err(self.unexpected()),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn is_keyword_operator(word: &str) -> bool {
    matches!(word, "and" | "or" | "not" | "in" | "is" | "if" | "else")
}
