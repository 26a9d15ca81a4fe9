//! Parasites and the parenthesized tag grammar some of them carry
//!
//! ```text
//! tag    := '(' name value* ')'
//! value  := string | number | tag
//! string := '"' (escape | char)* '"' | bare-word
//! number := '-'? digits ('.' digits)?
//! ```
//!
//! Inside quotes only `\"` and `\\` are escapes; any other backslash pair is
//! kept as written.

use crate::error::{Result, XcfError};
use crate::property::{Payload, PayloadWriter};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named metadata blob attached to the document, a layer, a channel or a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parasite {
    pub name: String,
    pub flags: u32,
    pub data: Vec<u8>,
}

impl Parasite {
    /// Persistent parasites survive a save; this crate writes every parasite it holds
    pub const PERSISTENT: u32 = 1;

    pub fn new(name: impl Into<String>, flags: u32, data: impl Into<Vec<u8>>) -> Self {
        Parasite {
            name: name.into(),
            flags,
            data: data.into(),
        }
    }

    /// Payload as text, without the trailing NUL writers usually append
    pub fn text(&self) -> Result<&str> {
        let bytes = self.data.strip_suffix(&[0]).unwrap_or(&self.data);
        std::str::from_utf8(bytes).map_err(|_| {
            XcfError::InvalidParasiteLayout(format!("parasite {:?} is not UTF-8", self.name))
        })
    }

    pub fn read(payload: &mut Payload<'_>) -> Result<Self> {
        let name = payload.read_string()?;
        let flags = payload.read_u32()?;
        let size = payload.read_u32()? as usize;
        let data = payload.read_bytes(size)?.to_vec();
        Ok(Parasite { name, flags, data })
    }

    pub fn write(&self, out: &mut PayloadWriter) -> Result<()> {
        let size = u32::try_from(self.data.len()).map_err(|_| {
            XcfError::InvalidDocument(format!("parasite {:?} is too large", self.name))
        })?;
        out.write_string(&self.name)?;
        out.write_u32(self.flags)?;
        out.write_u32(size)?;
        out.write_bytes(&self.data);
        Ok(())
    }
}

/// A PARASITES property: records back to back until the payload is used up
pub fn read_parasites(payload: &mut Payload<'_>) -> Result<Vec<Parasite>> {
    let mut parasites = Vec::new();
    while !payload.is_empty() {
        parasites.push(Parasite::read(payload)?);
    }
    Ok(parasites)
}

pub fn write_parasites(parasites: &[Parasite], out: &mut PayloadWriter) -> Result<()> {
    parasites.iter().try_for_each(|p| p.write(out))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Number(f64),
    Tag(Tag),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Value::Tag(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub values: Vec<Value>,
}

impl Tag {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Tag {
            name: name.into(),
            values,
        }
    }

    /// Parse a whole blob: any number of top-level tags
    pub fn parse_all(source: &str) -> Result<Vec<Tag>> {
        let tokens = Lexer::new(source).lex()?;
        let mut parser = Parser {
            tokens,
            index: 0,
            depth: 0,
        };
        let mut tags = Vec::new();
        while parser.peek().is_some() {
            tags.push(parser.parse_tag()?);
        }
        Ok(tags)
    }

    /// Parse exactly one tag
    pub fn parse(source: &str) -> Result<Tag> {
        let mut tags = Self::parse_all(source)?;
        if tags.len() != 1 {
            return Err(XcfError::InvalidParasiteLayout(format!(
                "expected one tag, found {}",
                tags.len()
            )));
        }
        Ok(tags.remove(0))
    }

    /// First direct child tag named `name`
    pub fn find(&self, name: &str) -> Option<&Tag> {
        self.values
            .iter()
            .filter_map(Value::as_tag)
            .find(|t| t.name == name)
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) if is_bare_word(s) => f.write_str(s),
            Value::String(s) => {
                f.write_str("\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        _ => write!(f, "{}", ch)?,
                    }
                }
                f.write_str("\"")
            }
            Value::Number(n) => write!(f, "{}", n),
            Value::Tag(t) => write!(f, "{}", t),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.name)?;
        for value in &self.values {
            write!(f, " {}", value)?;
        }
        f.write_str(")")
    }
}

/// Words that read back as the same string without quotes
fn is_bare_word(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && parse_number(s).is_none()
}

fn parse_number(word: &str) -> Option<f64> {
    let digits = word.strip_prefix('-').unwrap_or(word);
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !fraction.map_or(true, all_digits) {
        return None;
    }
    word.parse().ok()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Quoted(String),
    Word(String),
}

struct Lexer<'a> {
    source: &'a str,
    index: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, index: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.index..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.index += ch.len_utf8();
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        while matches!(self.peek_char(), Some(' ' | '\n' | '\r' | '\t')) {
            self.index += 1;
        }
    }

    fn lex(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let token = match self.peek_char() {
                None => break,
                Some('(') => {
                    self.index += 1;
                    Token::Open
                }
                Some(')') => {
                    self.index += 1;
                    Token::Close
                }
                Some('"') => self.lex_string()?,
                Some(_) => self.lex_word(),
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn lex_string(&mut self) -> Result<Token> {
        let start = self.index;
        self.index += 1;
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(XcfError::InvalidParasiteLayout(format!(
                        "unterminated string at byte {}",
                        start
                    )))
                }
                Some('"') => return Ok(Token::Quoted(value)),
                Some('\\') => match self.bump() {
                    Some(escaped @ ('"' | '\\')) => value.push(escaped),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => value.push('\\'),
                },
                Some(ch) => value.push(ch),
            }
        }
    }

    fn lex_word(&mut self) -> Token {
        let start = self.index;
        while let Some(ch) = self.peek_char() {
            if matches!(ch, ' ' | '\n' | '\r' | '\t' | '(' | ')' | '"') {
                break;
            }
            self.index += ch.len_utf8();
        }
        Token::Word(self.source[start..self.index].to_string())
    }
}

/// Deepest tag nesting accepted; real text parasites nest two or three levels
const MAX_TAG_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        self.index += 1;
        token
    }

    fn error(&self, message: &str) -> XcfError {
        XcfError::InvalidParasiteLayout(format!("{} at token {}", message, self.index))
    }

    fn parse_tag(&mut self) -> Result<Tag> {
        if self.advance() != Some(Token::Open) {
            return Err(self.error("expected '('"));
        }
        if self.depth >= MAX_TAG_DEPTH {
            return Err(self.error(&format!("tags nested deeper than {}", MAX_TAG_DEPTH)));
        }
        self.depth += 1;
        let tag = self.parse_tag_body();
        self.depth -= 1;
        tag
    }

    fn parse_tag_body(&mut self) -> Result<Tag> {
        let name = match self.advance() {
            Some(Token::Word(name)) => name,
            _ => return Err(self.error("expected tag name")),
        };
        let mut values = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Close) => {
                    self.index += 1;
                    return Ok(Tag { name, values });
                }
                Some(_) => values.push(self.parse_value()?),
                None => return Err(self.error(&format!("unclosed tag ({}", name))),
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek() {
            Some(Token::Open) => Ok(Value::Tag(self.parse_tag()?)),
            Some(Token::Quoted(_)) | Some(Token::Word(_)) => match self.advance() {
                Some(Token::Quoted(s)) => Ok(Value::String(s)),
                Some(Token::Word(w)) => Ok(match parse_number(&w) {
                    Some(n) => Value::Number(n),
                    None => Value::String(w),
                }),
                _ => Err(self.error("expected value")),
            },
            _ => Err(self.error("expected value")),
        }
    }
}
