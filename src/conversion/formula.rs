//! Algebraic conversion formulas (MCD-2 MC style).
//!
//! The formula text is parsed once into an expression tree when the
//! conversion is resolved; evaluation per sample is then a plain tree walk
//! with the raw value bound to `X`. Only arithmetic, exponentiation and a
//! small set of math functions are supported; anything else is a parse error
//! and the caller degrades the channel to an identity conversion.

use crate::error::{ConversionError, Result};

/// A parsed formula, ready to evaluate against raw values.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    root: Expr,
    /// Original text, kept for diagnostics.
    text: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Variable,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Sqrt,
    Ln,
    Log10,
    Exp,
    Abs,
    Sin,
    Cos,
    Tan,
}

impl Formula {
    /// Parse a formula from its source text.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expression()?;
        if parser.pos != parser.tokens.len() {
            return Err(formula_error(text, "trailing input after expression"));
        }
        Ok(Self {
            root,
            text: text.to_string(),
        })
    }

    /// Evaluate with the raw value bound to `X`.
    ///
    /// Returns `None` when the result is not a finite number (division by
    /// zero, log of a negative value, ...).
    pub fn eval(&self, x: f64) -> Option<f64> {
        let value = eval_expr(&self.root, x);
        value.is_finite().then_some(value)
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

fn eval_expr(expr: &Expr, x: f64) -> f64 {
    match expr {
        Expr::Number(n) => *n,
        Expr::Variable => x,
        Expr::Unary(UnaryOp::Neg, inner) => -eval_expr(inner, x),
        Expr::Binary(op, lhs, rhs) => {
            let l = eval_expr(lhs, x);
            let r = eval_expr(rhs, x);
            match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Pow => l.powf(r),
            }
        }
        Expr::Call(func, inner) => {
            let v = eval_expr(inner, x);
            match func {
                Function::Sqrt => v.sqrt(),
                Function::Ln => v.ln(),
                Function::Log10 => v.log10(),
                Function::Exp => v.exp(),
                Function::Abs => v.abs(),
                Function::Sin => v.sin(),
                Function::Cos => v.cos(),
                Function::Tan => v.tan(),
            }
        }
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Variable,
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn formula_error(text: &str, reason: &str) -> crate::error::Error {
    ConversionError::Formula(format!("{reason} in formula {text:?}")).into()
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                // "**" is an alternative spelling of "^".
                if bytes.get(i + 1) == Some(&b'*') {
                    tokens.push(Token::Caret);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < bytes.len() && matches!(bytes[i], b'0'..=b'9' | b'.') {
                    i += 1;
                }
                // Scientific notation suffix: e or E, optional sign, digits.
                if i < bytes.len()
                    && matches!(bytes[i], b'e' | b'E')
                    && i + 1 < bytes.len()
                    && (bytes[i + 1].is_ascii_digit() || matches!(bytes[i + 1], b'+' | b'-'))
                {
                    i += 2;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let literal = &text[start..i];
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| formula_error(text, "malformed number literal"))?;
                tokens.push(Token::Number(number));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                let ident = &text[start..i];
                if ident.eq_ignore_ascii_case("x") {
                    tokens.push(Token::Variable);
                } else {
                    tokens.push(Token::Ident(ident.to_ascii_lowercase()));
                }
            }
            _ => return Err(formula_error(text, "unexpected character")),
        }
    }

    Ok(tokens)
}

// ============================================================================
// Recursive-descent parser
// ============================================================================
// expression := term (("+" | "-") term)*
// term       := power (("*" | "/") power)*
// power      := unary ("^" power)?          (right-associative)
// unary      := "-" unary | primary
// primary    := number | X | ident "(" expression ")" | "(" expression ")"

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, reason: &str) -> Result<()> {
        if self.bump().as_ref() == Some(&expected) {
            Ok(())
        } else {
            Err(ConversionError::Formula(reason.to_string()).into())
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.power()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Mul),
            Some(Token::Slash) => Some(BinaryOp::Div),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.power()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.unary()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            let exponent = self.power()?;
            return Ok(Expr::Binary(
                BinaryOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            let inner = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Variable) => Ok(Expr::Variable),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen, "missing closing parenthesis")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                let func = match name.as_str() {
                    "sqrt" => Function::Sqrt,
                    "ln" => Function::Ln,
                    "log" | "log10" => Function::Log10,
                    "exp" => Function::Exp,
                    "abs" => Function::Abs,
                    "sin" => Function::Sin,
                    "cos" => Function::Cos,
                    "tan" => Function::Tan,
                    other => {
                        return Err(ConversionError::Formula(format!(
                            "unknown function {other:?}"
                        ))
                        .into());
                    }
                };
                self.expect(Token::LParen, "function call missing opening parenthesis")?;
                let arg = self.expression()?;
                self.expect(Token::RParen, "function call missing closing parenthesis")?;
                Ok(Expr::Call(func, Box::new(arg)))
            }
            _ => Err(ConversionError::Formula("expected a value".to_string()).into()),
        }
    }
}
