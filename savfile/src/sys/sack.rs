// PSPP - a program for statistical analysis.
// Copyright (C) 2025 Free Software Foundation, Inc.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

//! SAv Construction Kit.
//!
//! A tiny language for writing system files by hand, for testing.  The input
//! is a sequence of data items, each followed by a semicolon.  A data item is
//! one of:
//!
//!   - An integer in decimal or in hexadecimal prefixed by `0x`, written as a
//!     32-bit integer.
//!
//!   - A number with a decimal point, written as a 64-bit IEEE 754 float.
//!
//!   - `SYSMIS`, `LOWEST`, or `HIGHEST`, written as the float with that
//!     meaning in a system file.
//!
//!   - A string in double quotes, written literally.  There are no escapes
//!     and no new-lines.
//!
//!   - `s<N>` followed by a string, written padded with spaces to `N` bytes.
//!
//!   - `i8`, `i16`, or `i64` followed by one or more integers, written with
//!     the given number of bits.
//!
//!   - `hex` followed by a string of hex digit pairs, written as bytes.
//!
//!   - `ENDIAN`, written as the 32-bit integer 1 for big-endian output or 2
//!     for little-endian.
//!
//!   - Data items in parentheses, written in sequence.  `COUNT` or `COUNT8`
//!     before the parentheses writes their length in bytes first, as a 32-bit
//!     or 8-bit integer.
//!
//!   - `NAME:` defines a label for the current output offset, and `@NAME`
//!     writes that offset as a 32-bit integer.  `@A - @B + 4` does arithmetic.
//!
//! Any data item may be followed by `* N` to repeat it `N` times.  `#` starts
//! a comment that runs to the end of the line.

use std::{
    collections::{hash_map::Entry, HashMap},
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    iter::repeat_n,
    path::{Path, PathBuf},
};

use binrw::Endian;
use num::{Bounded, Zero};
use ordered_float::OrderedFloat;

use crate::endian::ToBytes;

/// An error in sack input.
#[derive(Debug)]
pub struct Error {
    pub file_name: Option<PathBuf>,
    pub line_number: Option<usize>,
    pub token: Option<String>,
    pub message: String,
}

impl StdError for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match (&self.file_name, self.line_number) {
            (Some(file_name), Some(line_number)) => {
                write!(f, "{}:{line_number}: ", file_name.display())?
            }
            (Some(file_name), None) => write!(f, "{}: ", file_name.display())?,
            (None, Some(line_number)) => write!(f, "line {line_number}: ")?,
            (None, None) => (),
        }
        if let Some(token) = &self.token {
            write!(f, "at '{token}': ")?;
        }
        write!(f, "{}", self.message)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Translates sack `input` into bytes in `endian` byte order.  `file_name` is
/// only for error messages.
pub fn sack(input: &str, file_name: Option<&Path>, endian: Endian) -> Result<Vec<u8>> {
    let mut labels = HashMap::new();
    let output = Assembler::run(input, file_name, endian, &mut labels)?;
    if labels.is_empty() {
        return Ok(output);
    }

    // Labels may be used before they are defined, so make a second pass now
    // that all of their values are known.
    if let Some((name, _)) = labels.iter().find(|(_, value)| value.is_none()) {
        return Err(Error {
            file_name: file_name.map(PathBuf::from),
            line_number: None,
            token: None,
            message: format!("label {name} used but never defined"),
        });
    }
    Assembler::run(input, file_name, endian, &mut labels)
}

/// Reads and translates the sack file `path`.
pub fn sack_file(path: &Path, endian: Endian) -> anyhow::Result<Vec<u8>> {
    let input = std::fs::read_to_string(path)?;
    Ok(sack(&input, Some(path), endian)?)
}

struct Assembler<'a, 'b> {
    lexer: Lexer<'a>,
    output: Vec<u8>,
    labels: &'b mut HashMap<String, Option<u32>>,
}

impl<'a, 'b> Assembler<'a, 'b> {
    fn run(
        input: &'a str,
        file_name: Option<&'a Path>,
        endian: Endian,
        labels: &'b mut HashMap<String, Option<u32>>,
    ) -> Result<Vec<u8>> {
        let mut assembler = Self {
            lexer: Lexer::new(input, file_name, endian)?,
            output: Vec::new(),
            labels,
        };
        while assembler.lexer.token.is_some() {
            assembler.item()?;
        }
        Ok(assembler.output)
    }

    fn put<T, const N: usize>(&mut self, value: T)
    where
        Endian: ToBytes<T, N>,
    {
        let bytes = self.lexer.endian.to_bytes(value);
        self.output.extend_from_slice(&bytes);
    }

    fn expect_string(&mut self, after: &str) -> Result<String> {
        match self.lexer.take()? {
            Token::String(string) => Ok(string),
            _ => Err(self.lexer.error(format!("string expected after '{after}'"))),
        }
    }

    fn item(&mut self) -> Result<()> {
        let start = self.output.len();
        match self.lexer.take()? {
            Token::Integer(integer) => {
                if let Ok(integer) = i32::try_from(integer) {
                    self.put(integer);
                } else if let Ok(integer) = u32::try_from(integer) {
                    self.put(integer);
                } else {
                    return Err(self.lexer.error(format!(
                        "{integer} is not in the valid range [{},{}]",
                        i32::MIN,
                        u32::MAX
                    )));
                }
            }
            Token::Float(float) => self.put(float.0),
            Token::I8 => self.integers::<u8, 1>("i8")?,
            Token::I16 => self.integers::<u16, 2>("i16")?,
            Token::I64 => self.integers::<i64, 8>("i64")?,
            Token::String(string) => self.output.extend_from_slice(string.as_bytes()),
            Token::S(size) => {
                let string = self.expect_string(&format!("s{size}"))?;
                if string.len() > size {
                    return Err(self.lexer.error(format!(
                        "{}-byte string is longer than pad length {size}",
                        string.len()
                    )));
                }
                self.output.extend_from_slice(string.as_bytes());
                self.output.extend(repeat_n(b' ', size - string.len()));
            }
            Token::LParen => self.group()?,
            Token::Count => self.counted::<u32, 4>("COUNT")?,
            Token::Count8 => self.counted::<u8, 1>("COUNT8")?,
            Token::Hex => {
                let string = self.expect_string("hex")?;
                let digits = string
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| c.to_digit(16))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| self.lexer.error(String::from("invalid digit in hex string")))?;
                if digits.len() % 2 != 0 {
                    return Err(self
                        .lexer
                        .error(String::from("hex string has odd number of characters")));
                }
                self.output
                    .extend(digits.chunks(2).map(|pair| (pair[0] * 16 + pair[1]) as u8));
            }
            Token::Label(name) => {
                self.define_label(name)?;
                return Ok(());
            }
            Token::At(name) => {
                let value = self.offset_expression(name)?;
                self.put(value.unwrap_or(0));
            }
            token => {
                return Err(self.lexer.error(format!("unexpected {token:?}")));
            }
        }
        self.repeat(start)?;
        match self.lexer.token {
            Some((Token::Semicolon, _)) => {
                self.lexer.get()?;
            }
            Some((Token::RParen, _)) => (),
            _ => return Err(self.lexer.error(String::from("';' expected"))),
        }
        Ok(())
    }

    /// Parses items up to and including `)`.
    fn group(&mut self) -> Result<()> {
        while !matches!(self.lexer.token, Some((Token::RParen, _))) {
            if self.lexer.token.is_none() {
                return Err(self.lexer.error(String::from("')' expected")));
            }
            self.item()?;
        }
        self.lexer.get()?;
        Ok(())
    }

    fn counted<T, const N: usize>(&mut self, name: &str) -> Result<()>
    where
        T: Zero + TryFrom<usize>,
        Endian: ToBytes<T, N>,
    {
        let count_offset = self.output.len();
        self.put(T::zero());
        if !matches!(self.lexer.take()?, Token::LParen) {
            return Err(self.lexer.error(format!("'(' expected after '{name}'")));
        }
        self.group()?;
        let delta = self.output.len() - count_offset - N;
        let Ok(count) = T::try_from(delta) else {
            return Err(self
                .lexer
                .error(format!("{delta} bytes is too much for '{name}'")));
        };
        let bytes = self.lexer.endian.to_bytes(count);
        self.output[count_offset..count_offset + N].copy_from_slice(&bytes);
        Ok(())
    }

    fn integers<T, const N: usize>(&mut self, name: &str) -> Result<()>
    where
        T: Bounded + Display + TryFrom<i64> + Copy,
        Endian: ToBytes<T, N>,
    {
        let mut n = 0;
        while let Some((Token::Integer(integer), _)) = self.lexer.token {
            let Ok(value) = T::try_from(integer) else {
                return Err(self.lexer.error(format!(
                    "{integer} is not in the valid range [{},{}]",
                    T::min_value(),
                    T::max_value()
                )));
            };
            self.put(value);
            self.lexer.get()?;
            n += 1;
        }
        if n == 0 {
            return Err(self.lexer.error(format!("integer expected after '{name}'")));
        }
        Ok(())
    }

    fn define_label(&mut self, name: String) -> Result<()> {
        let value = self.output.len() as u32;
        match self.labels.entry(name) {
            Entry::Vacant(entry) => {
                entry.insert(Some(value));
            }
            Entry::Occupied(mut entry) => match *entry.get() {
                Some(old) if old != value => {
                    return Err(self.lexer.error(format!(
                        "{}: can't redefine label for offset {old:#x} with offset {value:#x}",
                        entry.key()
                    )));
                }
                Some(_) => (),
                None => {
                    entry.insert(Some(value));
                }
            },
        }
        Ok(())
    }

    /// Evaluates `@name` followed by any number of `+ operand` or `- operand`.
    /// Returns `None` on the first pass if any label is not yet defined.
    fn offset_expression(&mut self, name: String) -> Result<Option<u32>> {
        let mut value = *self.labels.entry(name).or_insert(None);
        loop {
            let plus = match self.lexer.token {
                Some((Token::Plus, _)) => true,
                Some((Token::Minus, _)) => false,
                _ => return Ok(value),
            };
            self.lexer.get()?;
            let operand = match self.lexer.take()? {
                Token::At(name) => *self.labels.entry(name).or_insert(None),
                Token::Integer(integer) => Some(u32::try_from(integer).map_err(|error| {
                    self.lexer.error(format!("bad offset literal ({error})"))
                })?),
                _ => {
                    return Err(self
                        .lexer
                        .error(String::from("expecting @label or integer literal")))
                }
            };
            value = match (value, operand) {
                (Some(a), Some(b)) => Some(
                    if plus { a.checked_add(b) } else { a.checked_sub(b) }
                        .ok_or_else(|| self.lexer.error(String::from("overflow in offset arithmetic")))?,
                ),
                _ => None,
            };
        }
    }

    /// Handles an optional `* N` after the item that began at output offset
    /// `start`.
    fn repeat(&mut self, start: usize) -> Result<()> {
        if !matches!(self.lexer.token, Some((Token::Asterisk, _))) {
            return Ok(());
        }
        self.lexer.get()?;
        let count = match self.lexer.take()? {
            Token::Integer(count) if count >= 1 => count,
            _ => {
                return Err(self
                    .lexer
                    .error(String::from("positive integer expected after '*'")))
            }
        };
        let end = self.output.len();
        for _ in 1..count {
            self.output.extend_from_within(start..end);
        }
        Ok(())
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
enum Token {
    Integer(i64),
    Float(OrderedFloat<f64>),
    String(String),
    Semicolon,
    Asterisk,
    LParen,
    RParen,
    I8,
    I16,
    I64,
    S(usize),
    Count,
    Count8,
    Hex,
    Label(String),
    At(String),
    Minus,
    Plus,
}

struct Lexer<'a> {
    input: &'a str,
    token: Option<(Token, &'a str)>,
    file_name: Option<&'a Path>,
    line_number: usize,
    endian: Endian,
}

/// Skips white space and comments at the start of `s`.  Returns what remains
/// and the number of new-lines skipped.
fn skip_space(mut s: &str) -> (&str, usize) {
    let mut n_newlines = 0;
    loop {
        s = s.trim_start_matches([' ', '\t', '\r']);
        if let Some(rest) = s.strip_prefix('#') {
            s = rest.find('\n').map_or("", |newline| &rest[newline..]);
        } else if let Some(rest) = s.strip_prefix('\n') {
            s = rest;
            n_newlines += 1;
        } else {
            return (s, n_newlines);
        }
    }
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, file_name: Option<&'a Path>, endian: Endian) -> Result<Self> {
        let mut lexer = Lexer {
            input,
            token: None,
            file_name,
            line_number: 1,
            endian,
        };
        lexer.token = lexer.next()?;
        Ok(lexer)
    }

    fn error(&self, message: String) -> Error {
        Error {
            file_name: self.file_name.map(PathBuf::from),
            line_number: Some(self.line_number),
            token: self.token.as_ref().map(|(_, repr)| String::from(*repr)),
            message,
        }
    }

    /// Returns the current token and advances to the next one.
    fn take(&mut self) -> Result<Token> {
        let Some((token, _)) = self.token.take() else {
            return Err(self.error(String::from("unexpected end of input")));
        };
        self.token = self.next()?;
        Ok(token)
    }

    /// Advances to the next token.
    fn get(&mut self) -> Result<()> {
        self.take().map(|_| ())
    }

    fn word(&self, word: &str) -> Result<Token> {
        if let Some(size) = word.strip_prefix('s').filter(|size| !size.is_empty()) {
            return size
                .parse()
                .map(Token::S)
                .map_err(|error| self.error(format!("bad counted string '{word}' ({error})")));
        }
        Ok(match word {
            "i8" => Token::I8,
            "i16" => Token::I16,
            "i64" => Token::I64,
            "SYSMIS" => Token::Float(OrderedFloat(-f64::MAX)),
            "LOWEST" => Token::Float(OrderedFloat(f64::MIN.next_up())),
            "HIGHEST" => Token::Float(OrderedFloat(f64::MAX)),
            "ENDIAN" => Token::Integer(match self.endian {
                Endian::Big => 1,
                Endian::Little => 2,
            }),
            "COUNT" => Token::Count,
            "COUNT8" => Token::Count8,
            "hex" => Token::Hex,
            _ => return Err(self.error(format!("invalid token '{word}'"))),
        })
    }

    fn number(&self, number: &str) -> Result<Token> {
        if number == "-" {
            Ok(Token::Minus)
        } else if let Some(digits) = number.strip_prefix("0x") {
            i64::from_str_radix(digits, 16)
                .map(Token::Integer)
                .map_err(|error| self.error(format!("bad integer literal '{number}' ({error})")))
        } else if number.contains('.') {
            number
                .parse()
                .map(|float| Token::Float(OrderedFloat(float)))
                .map_err(|error| self.error(format!("bad float literal '{number}' ({error})")))
        } else {
            number
                .parse()
                .map(Token::Integer)
                .map_err(|error| self.error(format!("bad integer literal '{number}' ({error})")))
        }
    }

    fn next(&mut self) -> Result<Option<(Token, &'a str)>> {
        let (s, n_newlines) = skip_space(self.input);
        self.line_number += n_newlines;
        self.input = s;

        let mut chars = s.chars();
        let Some(c) = chars.next() else {
            return Ok(None);
        };
        let (token, rest) = match c {
            '0'..='9' | '-' => {
                let len = s
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '-'))
                    .unwrap_or(s.len());
                let (number, rest) = s.split_at(len);
                (self.number(number)?, rest)
            }
            '"' => {
                let body = chars.as_str();
                let Some(len) = body.find(['\n', '"']) else {
                    return Err(self.error(String::from("end of input inside string")));
                };
                let (string, rest) = body.split_at(len);
                let Some(rest) = rest.strip_prefix('"') else {
                    return Err(self.error(format!("new-line inside string ({string}...)")));
                };
                (Token::String(string.into()), rest)
            }
            ';' => (Token::Semicolon, chars.as_str()),
            '*' => (Token::Asterisk, chars.as_str()),
            '+' => (Token::Plus, chars.as_str()),
            '(' => (Token::LParen, chars.as_str()),
            ')' => (Token::RParen, chars.as_str()),
            c if c.is_alphabetic() || c == '@' || c == '_' => {
                let len = s
                    .find(|c: char| !(c.is_alphanumeric() || c == '@' || c == '.' || c == '_'))
                    .unwrap_or(s.len());
                let (word, rest) = s.split_at(len);
                if let Some(rest) = rest.strip_prefix(':') {
                    (Token::Label(word.into()), rest)
                } else if let Some(name) = word.strip_prefix('@') {
                    (Token::At(name.into()), rest)
                } else {
                    (self.word(word)?, rest)
                }
            }
            _ => return Err(self.error(format!("invalid input character '{c}'"))),
        };
        self.input = rest;
        Ok(Some((token, &s[..s.len() - rest.len()])))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use binrw::Endian;

    use crate::sys::sack::sack;

    #[test]
    fn items() -> Result<()> {
        let input = r#"
1; 0x10; -1;       # integers
1.5;               # float
"ab"; s4 "c";      # strings
i8 1 2; i16 3;
hex "ff 00";
COUNT8 ("xyz");
(i8 7) * 3;
"#;
        let output = sack(input, None, Endian::Little)?;
        let mut expected = Vec::new();
        expected.extend_from_slice(&1i32.to_le_bytes());
        expected.extend_from_slice(&16i32.to_le_bytes());
        expected.extend_from_slice(&(-1i32).to_le_bytes());
        expected.extend_from_slice(&1.5f64.to_le_bytes());
        expected.extend_from_slice(b"abc   ");
        expected.extend_from_slice(&[1, 2, 3, 0, 0xff, 0, 3]);
        expected.extend_from_slice(b"xyz");
        expected.extend_from_slice(&[7, 7, 7]);
        assert_eq!(output, expected);
        Ok(())
    }

    #[test]
    fn labels() -> Result<()> {
        let input = r#"
@END - @START;
START: i8 1 2 3;
END: ENDIAN;
"#;
        assert_eq!(
            sack(input, None, Endian::Big)?,
            vec![0, 0, 0, 3, 1, 2, 3, 0, 0, 0, 1]
        );
        Ok(())
    }

    #[test]
    fn errors() {
        assert!(sack("1", None, Endian::Little).is_err());
        assert!(sack("s2 \"abc\";", None, Endian::Little).is_err());
        assert!(sack("@NOWHERE;", None, Endian::Little).is_err());
        assert!(sack("i8 300;", None, Endian::Little).is_err());
    }
}
