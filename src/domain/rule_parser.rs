//! Call-list parser for rule configuration.
//!
//! Recursive descent parser for the grammar used in `[rule.*]` sections:
//!
//! ```text
//! call_list := ( call ( ',' call )* )?
//! call      := IDENT '(' ( arg ( ',' arg )* )? ')'
//! arg       := IDENT '=' value
//! value     := '"' chars '"' | bare_token
//! ```
//!
//! Values stay textual; typed interpretation happens in [`Params`].

use crate::domain::error::ParseError;
use crate::domain::rule::{Call, Params};

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.input.len()
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(ParseError {
                message: format!("expected '{}', found '{}'", expected, ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: format!("expected '{}', found end of input", expected),
                position: self.pos,
            }),
        }
    }

    fn parse_ident(&mut self, what: &str) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        match self.peek() {
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
            Some(ch) => {
                return Err(ParseError {
                    message: format!("expected {}, found '{}'", what, ch),
                    position: start,
                });
            }
            None => {
                return Err(ParseError {
                    message: format!("expected {}, found end of input", what),
                    position: start,
                });
            }
        }
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_quoted(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(value),
                Some('\\') => match self.advance() {
                    Some(ch) => value.push(ch),
                    None => break,
                },
                Some(ch) => value.push(ch),
                None => break,
            }
        }
        Err(ParseError {
            message: "unterminated string".to_string(),
            position: start,
        })
    }

    fn parse_value(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('"') {
            return self.parse_quoted();
        }

        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-' | '+' | ':') {
                self.advance();
            } else {
                break;
            }
        }

        if self.pos == start {
            let found = self
                .peek()
                .map(|c| format!("'{}'", c))
                .unwrap_or_else(|| "end of input".to_string());
            return Err(ParseError {
                message: format!("expected value, found {}", found),
                position: start,
            });
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_call(&mut self) -> Result<Call, ParseError> {
        self.skip_whitespace();
        let position = self.pos;
        let name = self.parse_ident("name")?;
        self.expect_char('(')?;

        let mut params = Params::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.advance();
            return Ok(Call {
                name,
                params,
                position,
            });
        }

        loop {
            let key_pos = {
                self.skip_whitespace();
                self.pos
            };
            let key = self.parse_ident("parameter name")?;
            self.expect_char('=')?;
            let value = self.parse_value()?;
            if params.contains(&key) {
                return Err(ParseError {
                    message: format!("duplicate parameter '{}'", key),
                    position: key_pos,
                });
            }
            params.insert(&key, &value);

            self.skip_whitespace();
            match self.peek() {
                Some(')') => {
                    self.advance();
                    break;
                }
                _ => self.expect_char(',')?,
            }
        }

        Ok(Call {
            name,
            params,
            position,
        })
    }

    fn parse_list(&mut self) -> Result<Vec<Call>, ParseError> {
        let mut calls = Vec::new();
        if self.at_end() {
            return Ok(calls);
        }
        calls.push(self.parse_call()?);
        while !self.at_end() {
            self.expect_char(',')?;
            calls.push(self.parse_call()?);
        }
        Ok(calls)
    }

    fn parse_single(&mut self) -> Result<Call, ParseError> {
        let call = self.parse_call()?;
        if !self.at_end() {
            return Err(ParseError {
                message: format!("unexpected input after call: '{}'", self.remaining()),
                position: self.pos,
            });
        }
        Ok(call)
    }
}

/// Parse a comma-separated list of calls. Blank input yields an empty list.
pub fn parse_calls(input: &str) -> Result<Vec<Call>, ParseError> {
    Parser::new(input).parse_list()
}

/// Parse exactly one call.
pub fn parse_call(input: &str) -> Result<Call, ParseError> {
    Parser::new(input).parse_single()
}
