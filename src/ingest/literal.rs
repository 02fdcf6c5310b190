//! Decoding of literal-encoded list columns
//!
//! Vector and list columns are stored as list literals, e.g.
//! `[0.12, -0.5, 3e-4]` or `['Kardiologie', "Innere Medizin"]`. Supported
//! values: lists and tuples, numbers, single- or double-quoted strings,
//! `True`, `False` and `None`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

/// A decoded literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Numeric lexeme as written, so integers keep their integer spelling
    Number(String),
    Str(String),
    Bool(bool),
    None,
    List(Vec<Literal>),
}

impl Literal {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Number(text) => text.parse().ok(),
            _ => None,
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Literal, LiteralError> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.sequence(']'),
            Some('(') => self.sequence(')'),
            Some(q @ ('\'' | '"')) => self.string(q).map(Literal::Str),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_alphabetic() => self.keyword(),
            Some(c) => Err(self.error(format!("unexpected character {:?}", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn sequence(&mut self, close: char) -> Result<Literal, LiteralError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Literal::List(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {}
                Some(c) => return Err(self.error(format!("expected ',' or {:?}, found {:?}", close, c))),
                None => return Err(self.error(format!("unterminated list, expected {:?}", close))),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, LiteralError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error("unterminated string"));
            };
            self.pos += 1;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(escaped) = self.peek() else {
                return Err(self.error("unterminated escape"));
            };
            self.pos += 1;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' | '\'' | '"' => out.push(escaped),
                'x' => out.push(self.code_point(2)?),
                'u' => out.push(self.code_point(4)?),
                'U' => out.push(self.code_point(8)?),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn code_point(&mut self, digits: usize) -> Result<char, LiteralError> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(self.error("truncated escape sequence"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        let value = u32::from_str_radix(&hex, 16)
            .map_err(|_| self.error(format!("invalid escape digits {:?}", hex)))?;
        let c = char::from_u32(value).ok_or_else(|| self.error("invalid code point"))?;
        self.pos = end;
        Ok(c)
    }

    fn number(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        if text.parse::<f64>().is_err() {
            self.pos = start;
            return Err(self.error(format!("invalid number {:?}", text)));
        }
        Ok(Literal::Number(text.trim_start_matches('+').to_string()))
    }

    fn keyword(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Ok(Literal::Bool(true)),
            "False" => Ok(Literal::Bool(false)),
            "None" => Ok(Literal::None),
            _ => {
                self.pos = start;
                Err(self.error(format!("unknown name {:?}", word)))
            }
        }
    }
}

/// Parse a complete literal; trailing content is an error.
pub fn parse(input: &str) -> Result<Literal, LiteralError> {
    let mut parser = Parser::new(input);
    let value = parser.value()?;
    parser.skip_ws();
    if parser.peek().is_some() {
        return Err(parser.error("trailing characters"));
    }
    Ok(value)
}

fn parse_list(input: &str) -> Result<Vec<Literal>, LiteralError> {
    match parse(input)? {
        Literal::List(items) => Ok(items),
        _ => Err(LiteralError {
            offset: 0,
            message: "expected a list".into(),
        }),
    }
}

/// Decode a numeric vector such as an embedding.
pub fn parse_float_list(input: &str) -> Result<Vec<f64>, LiteralError> {
    parse_list(input)?
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_f64().ok_or_else(|| LiteralError {
                offset: 0,
                message: format!("element {} is not a number", idx),
            })
        })
        .collect()
}

/// Decode a list of identifiers or names; numbers keep their written form.
pub fn parse_string_list(input: &str) -> Result<Vec<String>, LiteralError> {
    parse_list(input)?
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Literal::Str(s) | Literal::Number(s) => Ok(s),
            _ => Err(LiteralError {
                offset: 0,
                message: format!("element {} is not a string or number", idx),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_vector() {
        let v = parse_float_list("[0.12, -0.5, 3e-4, 2]").unwrap();
        assert_eq!(v, vec![0.12, -0.5, 3e-4, 2.0]);
    }

    #[test]
    fn empty_lists() {
        assert!(parse_float_list("[]").unwrap().is_empty());
        assert!(parse_string_list(" [ ] ").unwrap().is_empty());
    }

    #[test]
    fn mixed_quotes_and_escapes() {
        let v = parse_string_list(r#"['Kardiologie', "Innere Medizin", 'Morbus \'X\'', 'Grü\xdf']"#)
            .unwrap();
        assert_eq!(v, vec!["Kardiologie", "Innere Medizin", "Morbus 'X'", "Grüß"]);
    }

    #[test]
    fn numeric_ids_keep_spelling() {
        let v = parse_string_list("[101, 102, 'abc']").unwrap();
        assert_eq!(v, vec!["101", "102", "abc"]);
    }

    #[test]
    fn tuples_and_trailing_comma() {
        assert_eq!(parse_float_list("(1.0, 2.0,)").unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn keywords() {
        assert_eq!(
            parse("[True, False, None]").unwrap(),
            Literal::List(vec![Literal::Bool(true), Literal::Bool(false), Literal::None])
        );
    }

    #[test]
    fn malformed_inputs_fail() {
        assert!(parse_float_list("[0.1, 0.2").is_err());
        assert!(parse_float_list("[0.1 0.2]").is_err());
        assert!(parse_float_list("0.1, 0.2").is_err());
        assert!(parse_float_list("['a']").is_err());
        assert!(parse_string_list("['unterminated]").is_err());
        assert!(parse_string_list("[nan]").is_err());
        assert!(parse_float_list("[1.2.3]").is_err());
        assert!(parse("[1] extra").is_err());
    }

    #[test]
    fn error_reports_offset() {
        let err = parse("[1, @]").unwrap_err();
        assert_eq!(err.offset, 4);
    }
}
