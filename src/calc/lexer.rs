//! Tokenizer for calculator expressions.
//!
//! Tokens outside the grammar (string literals, comparison and bitwise
//! operators, brackets) are still produced so the parser can reject them
//! with a precise error instead of a generic syntax error.

use super::error::CalcError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Imaginary,
    Text,
    Ident(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    LParen,
    RParen,
    Comma,
    Dot,
    /// `[`, `]`, `{`, `}`.
    Bracket(char),
    /// Operators that exist in the general language but not in this grammar.
    Disallowed(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Characters that combine into operators this grammar refuses.
const DISALLOWED_OPERATOR_CHARS: &str = "<>=!&|^~@:";

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, CalcError> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            index: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).map(|(_, c)| *c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).map(|(_, c)| *c)
    }

    fn position(&self) -> usize {
        self.chars
            .get(self.index)
            .map(|(pos, _)| *pos)
            .unwrap_or(self.input.len())
    }

    fn run(mut self) -> Result<Vec<Spanned>, CalcError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            let position = self.position();
            let token = match c {
                c if c.is_whitespace() => {
                    self.index += 1;
                    continue;
                }
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number()?,
                c if c == '_' || c.is_alphabetic() => self.ident(),
                '\'' | '"' => self.text()?,
                '+' => self.single(Token::Plus),
                '-' => self.single(Token::Minus),
                '%' => self.single(Token::Percent),
                '(' => self.single(Token::LParen),
                ')' => self.single(Token::RParen),
                ',' => self.single(Token::Comma),
                '.' => self.single(Token::Dot),
                '[' | ']' | '{' | '}' => self.single(Token::Bracket(c)),
                '*' => self.doubled('*', Token::Star, Token::DoubleStar),
                '/' => self.doubled('/', Token::Slash, Token::DoubleSlash),
                c if DISALLOWED_OPERATOR_CHARS.contains(c) => self.disallowed(),
                other => {
                    return Err(CalcError::syntax(
                        position,
                        format!("unexpected character '{}'", other),
                    ))
                }
            };
            tokens.push(Spanned { token, position });
        }
        tokens.push(Spanned {
            token: Token::Eof,
            position: self.input.len(),
        });
        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.index += 1;
        token
    }

    fn doubled(&mut self, second: char, single: Token, double: Token) -> Token {
        self.index += 1;
        if self.peek() == Some(second) {
            self.index += 1;
            double
        } else {
            single
        }
    }

    fn disallowed(&mut self) -> Token {
        let mut op = String::new();
        while let Some(c) = self.peek() {
            if !DISALLOWED_OPERATOR_CHARS.contains(c) || op.len() >= 3 {
                break;
            }
            op.push(c);
            self.index += 1;
        }
        Token::Disallowed(op)
    }

    fn ident(&mut self) -> Token {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                name.push(c);
                self.index += 1;
            } else {
                break;
            }
        }
        Token::Ident(name)
    }

    fn text(&mut self) -> Result<Token, CalcError> {
        let start = self.position();
        let quote = self.peek();
        self.index += 1;
        while let Some(c) = self.peek() {
            self.index += 1;
            if c == '\\' {
                self.index += 1;
            } else if Some(c) == quote {
                return Ok(Token::Text);
            }
        }
        Err(CalcError::syntax(start, "unterminated string literal"))
    }

    fn number(&mut self) -> Result<Token, CalcError> {
        let start = self.position();
        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.index += 2;
                return self.radix_integer(start, radix);
            }
        }

        let mut literal = String::new();
        self.digits(&mut literal);
        if self.peek() == Some('.') {
            literal.push('.');
            self.index += 1;
            self.digits(&mut literal);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = self.peek_at(1);
            let has_sign = matches!(sign, Some('+' | '-'));
            let digit_at = if has_sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                literal.push('e');
                self.index += 1;
                if let Some(sign @ ('+' | '-')) = sign {
                    literal.push(sign);
                    self.index += 1;
                }
                self.digits(&mut literal);
            } else {
                return Err(CalcError::syntax(start, "invalid decimal literal"));
            }
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            self.index += 1;
            return Ok(Token::Imaginary);
        }
        if self.peek().is_some_and(|c| c == '_' || c.is_alphanumeric()) {
            return Err(CalcError::syntax(start, "invalid decimal literal"));
        }

        literal
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| CalcError::syntax(start, format!("invalid number '{}'", literal)))
    }

    /// Collect ASCII digits, dropping `_` separators.
    fn digits(&mut self, literal: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                literal.push(c);
            } else if c != '_' {
                break;
            }
            self.index += 1;
        }
    }

    fn radix_integer(&mut self, start: usize, radix: u32) -> Result<Token, CalcError> {
        let mut value = 0f64;
        let mut seen = false;
        while let Some(c) = self.peek() {
            if c == '_' {
                self.index += 1;
                continue;
            }
            match c.to_digit(radix) {
                Some(digit) => {
                    value = value * f64::from(radix) + f64::from(digit);
                    seen = true;
                    self.index += 1;
                }
                None if c.is_alphanumeric() => {
                    return Err(CalcError::syntax(start, "invalid digit in integer literal"))
                }
                None => break,
            }
        }
        if !seen {
            return Err(CalcError::syntax(start, "integer literal has no digits"));
        }
        Ok(Token::Number(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("1 ** 2 // 3 % 4"),
            vec![
                Token::Number(1.0),
                Token::DoubleStar,
                Token::Number(2.0),
                Token::DoubleSlash,
                Token::Number(3.0),
                Token::Percent,
                Token::Number(4.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(kinds("1_000")[0], Token::Number(1000.0));
        assert_eq!(kinds(".5")[0], Token::Number(0.5));
        assert_eq!(kinds("5.")[0], Token::Number(5.0));
        assert_eq!(kinds("2.5e-3")[0], Token::Number(0.0025));
        assert_eq!(kinds("0x1F")[0], Token::Number(31.0));
        assert_eq!(kinds("0b101")[0], Token::Number(5.0));
        assert_eq!(kinds("0o17")[0], Token::Number(15.0));
        assert_eq!(kinds("3j")[0], Token::Imaginary);
    }

    #[test]
    fn test_strings_and_disallowed() {
        assert_eq!(kinds("'os'")[0], Token::Text);
        assert_eq!(kinds("1 <= 2")[1], Token::Disallowed("<=".into()));
        assert_eq!(kinds("a.b")[1], Token::Dot);
    }

    #[test]
    fn test_bad_literals() {
        assert!(matches!(tokenize("2x"), Err(CalcError::Syntax { position: 0, .. })));
        assert!(matches!(tokenize("1e"), Err(CalcError::Syntax { .. })));
        assert!(matches!(tokenize("0x"), Err(CalcError::Syntax { .. })));
        assert!(matches!(tokenize("'open"), Err(CalcError::Syntax { .. })));
        assert!(matches!(tokenize("1 $ 2"), Err(CalcError::Syntax { position: 2, .. })));
    }
}
