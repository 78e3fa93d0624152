//! Parser for tariff formulas
//!
//! Implements a recursive descent parser with one function per precedence
//! level. Input is expected to be preprocessed already (no `SI(...)` or
//! other domain calls left, decimal commas normalised).

use crate::ast::{BinaryOperator, Expression, UnaryOperator};
use crate::error::{EvalResult, EvaluationError};
use std::fmt;

/// Token types recognized by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    True,
    False,

    // Identifiers and keywords
    Identifier(String),
    And,
    Or,
    Not,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Question,
    Colon,

    // Delimiters
    LeftParen,
    RightParen,
    Semicolon,
    Comma,

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::String(s) => write!(f, "\"{s}\""),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Identifier(name) => write!(f, "{name}"),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Caret => write!(f, "^"),
            Token::Equal => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::LessThan => write!(f, "<"),
            Token::LessThanEqual => write!(f, "<="),
            Token::GreaterThan => write!(f, ">"),
            Token::GreaterThanEqual => write!(f, ">="),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::Semicolon => write!(f, ";"),
            Token::Comma => write!(f, ","),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Lexer for tokenizing formulas
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
    token_start: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self { input: chars, position: 0, current_char, token_start: 0 }
    }

    /// Character offset where the most recent token started
    pub fn token_start(&self) -> usize {
        self.token_start
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> EvalResult<Token> {
        let mut number = String::new();
        let mut seen_dot = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.' && !seen_dot {
                seen_dot = true;
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        number.parse::<f64>().map(Token::Number).map_err(|e| {
            EvaluationError::syntax(self.token_start, format!("invalid number '{number}': {e}"))
        })
    }

    fn read_string(&mut self, quote: char) -> EvalResult<Token> {
        let mut string = String::new();
        self.advance(); // Skip opening quote

        while let Some(ch) = self.current_char {
            if ch == quote {
                self.advance(); // Skip closing quote
                return Ok(Token::String(string));
            } else if ch == '\\' {
                self.advance();
                match self.current_char {
                    Some(escaped) => string.push(escaped),
                    None => break,
                }
                self.advance();
            } else {
                string.push(ch);
                self.advance();
            }
        }

        Err(EvaluationError::syntax(self.token_start, "unterminated string literal"))
    }

    fn read_identifier(&mut self) -> Token {
        let mut identifier = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match identifier.as_str() {
            "true" | "TRUE" => Token::True,
            "false" | "FALSE" => Token::False,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            _ => Token::Identifier(identifier),
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    /// Consume a one- or two-character operator
    fn operator(&mut self, second: char, double: Token, single: Token) -> Token {
        if self.peek() == Some(second) {
            self.advance();
            self.advance();
            double
        } else {
            self.advance();
            single
        }
    }

    pub fn next_token(&mut self) -> EvalResult<Token> {
        self.skip_whitespace();
        self.token_start = self.position;

        let Some(ch) = self.current_char else {
            return Ok(Token::Eof);
        };

        let token = match ch {
            '0'..='9' | '.' => return self.read_number(),
            '"' | '\'' => return self.read_string(ch),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(),
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '*' => self.operator('*', Token::Caret, Token::Star),
            '/' => self.single(Token::Slash),
            '%' => self.single(Token::Percent),
            '^' => self.single(Token::Caret),
            '=' => self.operator('=', Token::Equal, Token::Equal),
            '!' => self.operator('=', Token::NotEqual, Token::Not),
            '<' => {
                if self.peek() == Some('>') {
                    self.advance();
                    self.advance();
                    Token::NotEqual
                } else {
                    self.operator('=', Token::LessThanEqual, Token::LessThan)
                }
            }
            '>' => self.operator('=', Token::GreaterThanEqual, Token::GreaterThan),
            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    self.advance();
                    Token::And
                } else {
                    return Err(EvaluationError::syntax(
                        self.position,
                        "unexpected character '&', did you mean '&&'?",
                    ));
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    self.advance();
                    Token::Or
                } else {
                    return Err(EvaluationError::syntax(
                        self.position,
                        "unexpected character '|', did you mean '||'?",
                    ));
                }
            }
            '?' => self.single(Token::Question),
            ':' => self.single(Token::Colon),
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            ';' => self.single(Token::Semicolon),
            ',' => self.single(Token::Comma),
            other => {
                return Err(EvaluationError::syntax(
                    self.position,
                    format!("unexpected character '{other}'"),
                ));
            }
        };

        Ok(token)
    }
}

/// Parser for tariff formulas
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(mut lexer: Lexer, max_depth: usize) -> EvalResult<Self> {
        let current_token = lexer.next_token()?;
        Ok(Self { lexer, current_token, depth: 0, max_depth })
    }

    fn advance(&mut self) -> EvalResult<()> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> EvalResult<()> {
        if std::mem::discriminant(&self.current_token) == std::mem::discriminant(&expected) {
            self.advance()
        } else {
            Err(self.error(format!("expected {}, found {}", expected, self.current_token)))
        }
    }

    fn error(&self, message: impl Into<String>) -> EvaluationError {
        EvaluationError::syntax(self.lexer.token_start(), message)
    }

    fn enter(&mut self) -> EvalResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(EvaluationError::TooDeep { limit: self.max_depth });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    pub fn parse_expression(&mut self) -> EvalResult<Expression> {
        self.enter()?;
        let expr = self.parse_ternary_expression();
        self.leave();
        expr
    }

    fn parse_ternary_expression(&mut self) -> EvalResult<Expression> {
        let condition = self.parse_or_expression()?;

        if matches!(self.current_token, Token::Question) {
            self.advance()?;
            let then_expr = self.parse_expression()?;
            self.expect(Token::Colon)?;
            let else_expr = self.parse_expression()?;
            return Ok(Expression::conditional(condition, then_expr, else_expr));
        }

        Ok(condition)
    }

    fn parse_or_expression(&mut self) -> EvalResult<Expression> {
        let mut left = self.parse_and_expression()?;

        while matches!(self.current_token, Token::Or) {
            self.advance()?;
            let right = self.parse_and_expression()?;
            left = Expression::binary(left, BinaryOperator::Or, right);
        }

        Ok(left)
    }

    fn parse_and_expression(&mut self) -> EvalResult<Expression> {
        let mut left = self.parse_equality_expression()?;

        while matches!(self.current_token, Token::And) {
            self.advance()?;
            let right = self.parse_equality_expression()?;
            left = Expression::binary(left, BinaryOperator::And, right);
        }

        Ok(left)
    }

    fn parse_equality_expression(&mut self) -> EvalResult<Expression> {
        let mut left = self.parse_comparison_expression()?;

        loop {
            let op = match self.current_token {
                Token::Equal => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_comparison_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_comparison_expression(&mut self) -> EvalResult<Expression> {
        let mut left = self.parse_additive_expression()?;

        loop {
            let op = match self.current_token {
                Token::LessThan => BinaryOperator::LessThan,
                Token::LessThanEqual => BinaryOperator::LessThanOrEqual,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::GreaterThanEqual => BinaryOperator::GreaterThanOrEqual,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_additive_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> EvalResult<Expression> {
        let mut left = self.parse_multiplicative_expression()?;

        loop {
            let op = match self.current_token {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplicative_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> EvalResult<Expression> {
        let mut left = self.parse_unary_expression()?;

        loop {
            let op = match self.current_token {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                Token::Percent => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    // Unary minus binds looser than `^`, so `-2^2` is `-(2^2)`
    fn parse_unary_expression(&mut self) -> EvalResult<Expression> {
        let operator = match self.current_token {
            Token::Minus => Some(UnaryOperator::Negate),
            Token::Not => Some(UnaryOperator::Not),
            Token::Plus => None,
            _ => return self.parse_power_expression(),
        };

        self.advance()?;
        self.enter()?;
        let operand = self.parse_unary_expression();
        self.leave();
        let operand = operand?;

        Ok(match operator {
            Some(op) => Expression::unary(op, operand),
            None => operand,
        })
    }

    fn parse_power_expression(&mut self) -> EvalResult<Expression> {
        let base = self.parse_primary_expression()?;

        // Power is right-associative; each link nests one level
        if matches!(self.current_token, Token::Caret) {
            self.advance()?;
            self.enter()?;
            let exponent = self.parse_unary_expression();
            self.leave();
            return Ok(Expression::binary(base, BinaryOperator::Power, exponent?));
        }

        Ok(base)
    }

    fn parse_primary_expression(&mut self) -> EvalResult<Expression> {
        match &self.current_token {
            Token::Number(value) => {
                let val = *value;
                self.advance()?;
                Ok(Expression::number(val))
            }
            Token::String(value) => {
                let val = value.clone();
                self.advance()?;
                Ok(Expression::Text(val))
            }
            Token::True => {
                self.advance()?;
                Ok(Expression::number(1.0))
            }
            Token::False => {
                self.advance()?;
                Ok(Expression::number(0.0))
            }
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;

                if matches!(self.current_token, Token::LeftParen) {
                    self.advance()?;
                    let args = self.parse_arguments()?;
                    return Ok(Expression::call(&name, args));
                }

                Ok(Expression::var(&name))
            }
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            _ => Err(self.error(format!("unexpected token: {}", self.current_token))),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one
    fn parse_arguments(&mut self) -> EvalResult<Vec<Expression>> {
        let mut args = Vec::new();

        if !matches!(self.current_token, Token::RightParen) {
            args.push(self.parse_expression()?);

            while matches!(self.current_token, Token::Semicolon | Token::Comma) {
                self.advance()?;
                args.push(self.parse_expression()?);
            }
        }

        self.expect(Token::RightParen)?;
        Ok(args)
    }
}

/// Parse a formula string into an AST
pub fn parse_expression(input: &str, max_depth: usize) -> EvalResult<Expression> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer, max_depth)?;
    let expr = parser.parse_expression()?;

    // Ensure we've consumed all tokens
    if !matches!(parser.current_token, Token::Eof) {
        return Err(parser.error(format!(
            "unexpected token after expression: {}",
            parser.current_token
        )));
    }

    Ok(expr)
}
