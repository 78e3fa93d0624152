//! Restricted fallback evaluator
//!
//! Evaluates an already-substituted formula that contains nothing but numeric
//! literals, arithmetic, comparisons, logical operators and the ternary. Any
//! identifier, string literal or call is rejected. It shares no state with the
//! primary evaluator and has no way to reach anything outside the input text.

use crate::error::{EvalResult, EvaluationError};
use crate::functions::floored_mod;

/// Evaluate `input` with the restricted grammar
pub fn evaluate_restricted(input: &str, max_depth: usize) -> EvalResult<f64> {
    let mut cursor = Cursor { chars: input.chars().collect(), position: 0, depth: 0, max_depth };
    let value = cursor.ternary()?;
    cursor.skip_whitespace();
    if let Some(ch) = cursor.peek() {
        return Err(cursor.unexpected(ch));
    }
    if value.is_finite() { Ok(value) } else { Err(EvaluationError::NonFinite { value }) }
}

struct Cursor {
    chars: Vec<char>,
    position: usize,
    depth: usize,
    max_depth: usize,
}

fn truth(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

impl Cursor {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    /// Consume `token` if it comes next
    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        let matches = token
            .chars()
            .enumerate()
            .all(|(offset, ch)| self.chars.get(self.position + offset) == Some(&ch));
        if matches {
            self.position += token.chars().count();
        }
        matches
    }

    fn unexpected(&self, ch: char) -> EvaluationError {
        if ch.is_alphabetic() || ch == '_' {
            EvaluationError::Forbidden {
                message: format!("identifier at position {}", self.position),
            }
        } else if ch == '"' || ch == '\'' {
            EvaluationError::Forbidden {
                message: format!("string literal at position {}", self.position),
            }
        } else {
            EvaluationError::syntax(self.position, format!("unexpected character '{ch}'"))
        }
    }

    fn enter(&mut self) -> EvalResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(EvaluationError::TooDeep { limit: self.max_depth });
        }
        Ok(())
    }

    fn ternary(&mut self) -> EvalResult<f64> {
        self.enter()?;
        let condition = self.or()?;
        let value = if self.eat("?") {
            let then_value = self.ternary()?;
            if !self.eat(":") {
                return Err(EvaluationError::syntax(self.position, "expected ':' in conditional"));
            }
            let else_value = self.ternary()?;
            if condition != 0.0 && !condition.is_nan() { then_value } else { else_value }
        } else {
            condition
        };
        self.depth -= 1;
        Ok(value)
    }

    fn or(&mut self) -> EvalResult<f64> {
        let mut left = self.and()?;
        while self.eat("||") {
            let right = self.and()?;
            left = truth(left != 0.0 || right != 0.0);
        }
        Ok(left)
    }

    fn and(&mut self) -> EvalResult<f64> {
        let mut left = self.equality()?;
        while self.eat("&&") {
            let right = self.equality()?;
            left = truth(left != 0.0 && right != 0.0);
        }
        Ok(left)
    }

    fn equality(&mut self) -> EvalResult<f64> {
        let mut left = self.comparison()?;
        loop {
            if self.eat("==") || self.eat("=") {
                left = truth(left == self.comparison()?);
            } else if self.eat("!=") || self.eat("<>") {
                left = truth(left != self.comparison()?);
            } else {
                return Ok(left);
            }
        }
    }

    fn comparison(&mut self) -> EvalResult<f64> {
        let mut left = self.additive()?;
        loop {
            if self.eat("<=") {
                left = truth(left <= self.additive()?);
            } else if self.eat(">=") {
                left = truth(left >= self.additive()?);
            } else if self.lookahead_less() {
                left = truth(left < self.additive()?);
            } else if self.eat(">") {
                left = truth(left > self.additive()?);
            } else {
                return Ok(left);
            }
        }
    }

    /// `<` that does not start `<>`
    fn lookahead_less(&mut self) -> bool {
        self.skip_whitespace();
        if self.peek() == Some('<') && self.chars.get(self.position + 1) != Some(&'>') {
            self.position += 1;
            return true;
        }
        false
    }

    fn additive(&mut self) -> EvalResult<f64> {
        let mut left = self.multiplicative()?;
        loop {
            if self.eat("+") {
                left += self.multiplicative()?;
            } else if self.eat("-") {
                left -= self.multiplicative()?;
            } else {
                return Ok(left);
            }
        }
    }

    fn multiplicative(&mut self) -> EvalResult<f64> {
        let mut left = self.unary()?;
        loop {
            if self.eat("*") {
                left *= self.unary()?;
            } else if self.eat("/") {
                left /= self.unary()?;
            } else if self.eat("%") {
                left = floored_mod(left, self.unary()?);
            } else {
                return Ok(left);
            }
        }
    }

    fn unary(&mut self) -> EvalResult<f64> {
        if self.eat("-") {
            self.enter()?;
            let value = -self.unary()?;
            self.depth -= 1;
            Ok(value)
        } else if self.eat("+") {
            self.unary()
        } else if self.peek_not() {
            self.enter()?;
            let value = truth(self.unary()? == 0.0);
            self.depth -= 1;
            Ok(value)
        } else {
            self.power()
        }
    }

    /// `!` that does not start `!=`
    fn peek_not(&mut self) -> bool {
        self.skip_whitespace();
        if self.peek() == Some('!') && self.chars.get(self.position + 1) != Some(&'=') {
            self.position += 1;
            return true;
        }
        false
    }

    fn power(&mut self) -> EvalResult<f64> {
        let base = self.primary()?;
        if self.eat("^") || self.eat("**") {
            self.enter()?;
            let exponent = self.unary()?;
            self.depth -= 1;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> EvalResult<f64> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => {
                self.position += 1;
                let value = self.ternary()?;
                if !self.eat(")") {
                    return Err(EvaluationError::syntax(self.position, "expected ')'"));
                }
                if self.eat("(") {
                    return Err(EvaluationError::Forbidden {
                        message: format!("call syntax at position {}", self.position - 1),
                    });
                }
                Ok(value)
            }
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.number(),
            Some(ch) => Err(self.unexpected(ch)),
            None => Err(EvaluationError::syntax(self.position, "unexpected end of expression")),
        }
    }

    fn number(&mut self) -> EvalResult<f64> {
        let start = self.position;
        let mut seen_dot = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.position += 1;
            } else if ch == '.' && !seen_dot {
                seen_dot = true;
                self.position += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.position].iter().collect();
        text.parse::<f64>()
            .map_err(|e| EvaluationError::syntax(start, format!("invalid number '{text}': {e}")))
    }
}
