// SPDX-License-Identifier: MIT

//! Condition expression parser
//!
//! Precedence, lowest first: `or`, `and`, `not`, parenthesized group, leaf.
//! Binary operators associate to the left.

use super::ast::{Expression, Leaf};
use super::formatter::{self, Token};
use crate::error::SyntaxError;

/// Deepest nesting accepted, counted in groups, `not`s and binary operators
pub const MAX_DEPTH: usize = 256;

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, SyntaxError> {
    let tokens = formatter::format(input)?;
    if tokens.is_empty() {
        return Err(SyntaxError::new("<end>", 0, "Empty condition"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };
    let (expr, _) = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(SyntaxError::new(
            token.to_string(),
            parser.pos,
            "Unexpected token",
        ));
    }
    Ok(expr)
}

/// A parsed subtree together with its height
type Parsed = (Expression, usize);

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    // open groups and `not`s on the current descent
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        let token = self
            .peek()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "<end>".to_string());
        SyntaxError::new(token, self.pos, message)
    }

    fn too_deep(&self) -> SyntaxError {
        self.error_here("Expression nested too deeply")
    }

    fn descend(&mut self) -> Result<(), SyntaxError> {
        if self.nesting >= MAX_DEPTH {
            return Err(self.too_deep());
        }
        self.nesting += 1;
        Ok(())
    }

    fn combine(
        &self,
        left: Parsed,
        right: Parsed,
        op: fn(Expression, Expression) -> Expression,
    ) -> Result<Parsed, SyntaxError> {
        let height = left.1.max(right.1) + 1;
        if height > MAX_DEPTH {
            return Err(self.too_deep());
        }
        Ok((op(left.0, right.0), height))
    }

    fn parse_or(&mut self) -> Result<Parsed, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = self.combine(left, right, Expression::or)?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Parsed, SyntaxError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_not()?;
            left = self.combine(left, right, Expression::and)?;
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Parsed, SyntaxError> {
        if self.peek() == Some(&Token::Not) {
            self.descend()?;
            self.pos += 1;
            let (operand, height) = self.parse_not()?;
            self.nesting -= 1;
            return Ok((Expression::not(operand), height + 1));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Parsed, SyntaxError> {
        match self.peek() {
            Some(Token::Open) => {
                self.descend()?;
                self.pos += 1;
                let inner = self.parse_or()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(self.error_here("Expected ')'"));
                }
                self.pos += 1;
                self.nesting -= 1;
                Ok(inner)
            }
            Some(Token::Leaf { .. }) => match self.advance() {
                Some(Token::Leaf { test, config }) => {
                    Ok((Expression::Leaf(Leaf { test, config }), 0))
                }
                _ => Err(self.error_here("Expected test")),
            },
            _ => Err(self.error_here("Expected test or '('")),
        }
    }
}
