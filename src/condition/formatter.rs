// SPDX-License-Identifier: MIT

//! Expression formatter - turns a raw condition string into tokens
//!
//! Operators are matched case-insensitively and whitespace between tokens is
//! dropped, so the parser only ever sees canonical tokens. Whitespace around
//! the `:` of a leaf configuration is allowed. Everything inside a `{...}`
//! configuration literal is kept verbatim.

use crate::error::SyntaxError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Open,
    Close,
    And,
    Or,
    Not,
    Leaf {
        test: String,
        config: Option<String>,
    },
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Open => write!(f, "("),
            Token::Close => write!(f, ")"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::Leaf {
                test,
                config: Some(config),
            } => write!(f, "{}:{{{}}}", test, config),
            Token::Leaf { test, config: None } => write!(f, "{}", test),
        }
    }
}

fn is_name_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | ':' | '{' | '}')
}

/// Tokenize a raw condition string
pub fn format(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            ':' | '{' | '}' => {
                return Err(SyntaxError::new(
                    c.to_string(),
                    tokens.len(),
                    "Expected test name",
                ));
            }
            _ => {
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();

                let colon = skip_whitespace(&chars, i);
                if colon < chars.len() && chars[colon] == ':' {
                    let brace = skip_whitespace(&chars, colon + 1);
                    let (config, next) = read_config(&chars, brace, &word, tokens.len())?;
                    tokens.push(Token::Leaf {
                        test: word,
                        config: Some(config),
                    });
                    i = next;
                    continue;
                }

                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Leaf {
                        test: word,
                        config: None,
                    },
                };
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Reads a balanced `{...}` literal starting at `start`, returning its body
/// and the index just past the closing brace
fn read_config(
    chars: &[char],
    start: usize,
    test: &str,
    position: usize,
) -> Result<(String, usize), SyntaxError> {
    if chars.get(start) != Some(&'{') {
        return Err(SyntaxError::new(
            format!("{}:", test),
            position,
            "Expected '{' after ':'",
        ));
    }

    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let body: String = chars[start + 1..i].iter().collect();
                    return Ok((body, i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }

    Err(SyntaxError::new(
        format!("{}:{}", test, chars[start..].iter().collect::<String>()),
        position,
        "Unterminated configuration literal",
    ))
}

/// Canonical text of a condition: lowercase operators, single spaces
pub fn normalize(input: &str) -> Result<String, SyntaxError> {
    let tokens = format(input)?;
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        let glue = i > 0 && !matches!(tokens[i - 1], Token::Open) && *token != Token::Close;
        if glue {
            out.push(' ');
        }
        out.push_str(&token.to_string());
    }
    Ok(out)
}
