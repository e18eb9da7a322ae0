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

//! Bytecode decompression.
//!
//! Compressed case data is a sequence of 8-byte command blocks, each followed
//! by the raw 8-byte values that its codes call for.  [CommandReader] walks
//! the codes one at a time and hands back decoded numbers and 8-byte string
//! chunks.  Uncompressed data passes straight through.

use std::{io::ErrorKind, ops::Range};

use binrw::Endian;
use thiserror::Error as ThisError;

use crate::{
    endian::FromBytes,
    sys::{
        chunk::ChunkReader,
        raw::{records::Compression, Error, ErrorDetails, Warning},
        source::ByteSource,
    },
    variable::VarType,
};

/// Warning for compressed case data.
#[derive(ThisError, Debug)]
pub enum CompressionWarning {
    /// A command code that makes no sense for the type of value being read.
    #[error("Unexpected compression code {code} for {var_type} value.")]
    UnexpectedCode {
        /// The command code.
        code: u8,
        /// Type of the value being read.
        var_type: VarType,
    },
}

/// Code that ends the data.
const END_OF_DATA: u8 = 252;

/// Code for an uncompressed value that follows the command block.
const RAW: u8 = 253;

/// Code for an all-spaces string chunk.
const SPACES: u8 = 254;

/// Code for the system-missing value.
const SYSMIS: u8 = 255;

/// Reads compressed or uncompressed case data.
pub struct CommandReader<S> {
    reader: ChunkReader<S>,
    endian: Endian,

    /// Compression bias, if the data is compressed.
    bias: Option<f64>,

    /// Current command block and the index of its next code.  A cursor of 8
    /// means the next code requires reading a new block.
    block: [u8; 8],
    cursor: usize,
    block_offset: u64,

    strict: bool,
}

impl<S> CommandReader<S>
where
    S: ByteSource,
{
    /// Constructs a new [CommandReader] that reads data from `reader`, which
    /// must be positioned at the start of case data.
    ///
    /// If `strict` is true, command codes that do not fit the type of the
    /// value being read are errors instead of warnings.
    pub fn new(
        reader: ChunkReader<S>,
        endian: Endian,
        compression: Option<Compression>,
        bias: f64,
        strict: bool,
    ) -> Self {
        Self {
            block_offset: reader.position(),
            reader,
            endian,
            bias: compression.map(|_| bias),
            block: [0; 8],
            cursor: 8,
            strict,
        }
    }

    /// Returns true if the data is compressed.
    pub fn is_compressed(&self) -> bool {
        self.bias.is_some()
    }

    /// Returns the file offset of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Closes the underlying source.
    pub fn close(&mut self) {
        self.reader.close();
        self.cursor = 8;
    }

    /// Returns true if the underlying reader is cleanly at end of input.
    /// Other failures to look ahead are errors.
    fn at_eof(&mut self) -> Result<bool, Error> {
        match self.reader.peek(1).map(|_| ()) {
            Ok(()) => Ok(false),
            Err(error) if error.kind() == ErrorKind::UnexpectedEof && self.reader.is_at_end() => {
                Ok(true)
            }
            Err(error) => Err(error.into()),
        }
    }

    fn block_offsets(&self) -> Range<u64> {
        self.block_offset..self.block_offset + 8
    }

    fn read_block(&mut self) -> Result<(), Error> {
        self.block_offset = self.reader.position();
        self.block = self.reader.read_array()?;
        self.cursor = 0;
        Ok(())
    }

    /// Returns the next command code, reading a new command block if the
    /// current one is used up, or `None` at a clean end of input.
    pub fn next_command_code(&mut self) -> Result<Option<u8>, Error> {
        if self.cursor >= 8 {
            if self.at_eof()? {
                return Ok(None);
            }
            self.read_block()?;
        }
        let code = self.block[self.cursor];
        self.cursor += 1;
        Ok(Some(code))
    }

    fn unexpected_code(
        &self,
        code: u8,
        var_type: VarType,
        warn: &mut dyn FnMut(Warning),
    ) -> Result<(), Error> {
        if self.strict {
            Err(Error::new(
                Some(self.block_offsets()),
                ErrorDetails::UnexpectedCommandCode { code, var_type },
            ))
        } else {
            warn(Warning::new(
                Some(self.block_offsets()),
                CompressionWarning::UnexpectedCode { code, var_type },
            ));
            Ok(())
        }
    }

    fn read_raw(&mut self) -> Result<Option<[u8; 8]>, Error> {
        if self.at_eof()? {
            Ok(None)
        } else {
            Ok(Some(self.reader.read_array()?))
        }
    }

    /// Reads a number.  Returns `Some(None)` for the system-missing value, or
    /// `None` at the end of the data.
    pub fn read_number(
        &mut self,
        warn: &mut dyn FnMut(Warning),
    ) -> Result<Option<Option<f64>>, Error> {
        let Some(bias) = self.bias else {
            return Ok(self.read_raw()?.map(|raw| self.endian.parse(raw)));
        };
        loop {
            let Some(code) = self.next_command_code()? else {
                return Ok(None);
            };
            match code {
                0 => (),
                1..=251 => return Ok(Some(Some(code as f64 - bias))),
                END_OF_DATA => return Ok(None),
                RAW => return Ok(Some(self.endian.parse(self.reader.read_array()?))),
                SPACES => {
                    self.unexpected_code(code, VarType::Numeric, warn)?;
                    return Ok(Some(None));
                }
                SYSMIS => return Ok(Some(None)),
            }
        }
    }

    /// Reads an 8-byte chunk of a string.  Returns `None` at the end of the
    /// data.
    pub fn read_str8(&mut self, warn: &mut dyn FnMut(Warning)) -> Result<Option<[u8; 8]>, Error> {
        if self.bias.is_none() {
            return self.read_raw();
        }
        loop {
            let Some(code) = self.next_command_code()? else {
                return Ok(None);
            };
            match code {
                0 => (),
                1..=251 => {
                    self.unexpected_code(code, VarType::String, warn)?;
                    return Ok(Some([b' '; 8]));
                }
                END_OF_DATA => return Ok(None),
                RAW => return Ok(Some(self.reader.read_array()?)),
                SPACES | SYSMIS => return Ok(Some([b' '; 8])),
            }
        }
    }

    /// Returns true if there is no more data, either because the input is
    /// exhausted or because the next command code ends the data.
    ///
    /// This consumes padding codes and may read a new command block.
    pub fn at_end_of_data(&mut self) -> Result<bool, Error> {
        if self.bias.is_none() {
            return self.at_eof();
        }
        loop {
            while self.cursor < 8 {
                match self.block[self.cursor] {
                    0 => self.cursor += 1,
                    code => return Ok(code == END_OF_DATA),
                }
            }
            if self.at_eof()? {
                return Ok(true);
            }
            self.read_block()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use binrw::Endian;

    use crate::{
        endian::ToBytes,
        sys::{
            chunk::ChunkReader,
            command::CommandReader,
            raw::{records::Compression, ErrorDetails, Warning, WarningDetails},
            source::ReadSource,
        },
    };

    fn no_warnings(warning: Warning) {
        panic!("{warning}");
    }

    fn command_reader(
        data: Vec<u8>,
        compression: Option<Compression>,
        strict: bool,
    ) -> CommandReader<ReadSource<Cursor<Vec<u8>>>> {
        CommandReader::new(
            ChunkReader::new(ReadSource::new(Cursor::new(data)), 5),
            Endian::Little,
            compression,
            100.0,
            strict,
        )
    }

    #[test]
    fn uncompressed() {
        let mut data = Vec::new();
        data.extend_from_slice(&Endian::Little.to_bytes(1.25f64));
        data.extend_from_slice(&Endian::Little.to_bytes(-f64::MAX));
        data.extend_from_slice(b"abcdefgh");
        let mut r = command_reader(data, None, false);
        assert!(!r.at_end_of_data().unwrap());
        assert_eq!(r.read_number(&mut no_warnings).unwrap(), Some(Some(1.25)));
        assert_eq!(r.read_number(&mut no_warnings).unwrap(), Some(None));
        assert_eq!(r.read_str8(&mut no_warnings).unwrap(), Some(*b"abcdefgh"));
        assert!(r.at_end_of_data().unwrap());
        assert_eq!(r.read_number(&mut no_warnings).unwrap(), None);
    }

    #[test]
    fn compressed_numbers() {
        let mut data = vec![0, 1, 101, 251, 253, 255, 0, 0];
        data.extend_from_slice(&Endian::Little.to_bytes(3.5f64));
        data.extend_from_slice(&[252, 0, 0, 0, 0, 0, 0, 0]);
        let mut r = command_reader(data, Some(Compression::Bytecode), false);
        assert!(r.is_compressed());
        assert_eq!(r.read_number(&mut no_warnings).unwrap(), Some(Some(-99.0)));
        assert_eq!(r.read_number(&mut no_warnings).unwrap(), Some(Some(1.0)));
        assert_eq!(r.read_number(&mut no_warnings).unwrap(), Some(Some(151.0)));
        assert_eq!(r.read_number(&mut no_warnings).unwrap(), Some(Some(3.5)));
        assert_eq!(r.read_number(&mut no_warnings).unwrap(), Some(None));
        assert!(r.at_end_of_data().unwrap());
        assert_eq!(r.read_number(&mut no_warnings).unwrap(), None);
    }

    #[test]
    fn compressed_strings() {
        let mut data = vec![253, 254, 255, 0, 0, 0, 0, 0];
        data.extend_from_slice(b"abcdefgh");
        let mut r = command_reader(data, Some(Compression::Bytecode), false);
        assert_eq!(r.read_str8(&mut no_warnings).unwrap(), Some(*b"abcdefgh"));
        assert_eq!(r.read_str8(&mut no_warnings).unwrap(), Some(*b"        "));
        assert_eq!(r.read_str8(&mut no_warnings).unwrap(), Some(*b"        "));
        assert!(r.at_end_of_data().unwrap());
        assert_eq!(r.read_str8(&mut no_warnings).unwrap(), None);
    }

    #[test]
    fn unexpected_codes() {
        let data = vec![254, 105, 0, 0, 0, 0, 0, 0];
        let mut r = command_reader(data.clone(), Some(Compression::Bytecode), false);
        let mut warnings = Vec::new();
        let mut warn = |w: Warning| warnings.push(w);
        assert_eq!(r.read_number(&mut warn).unwrap(), Some(None));
        assert_eq!(r.read_str8(&mut warn).unwrap(), Some(*b"        "));
        assert_eq!(warnings.len(), 2);
        assert!(matches!(warnings[0].details, WarningDetails::Compression(_)));

        let mut r = command_reader(data, Some(Compression::Bytecode), true);
        let error = r.read_number(&mut |_| ()).unwrap_err();
        assert!(matches!(
            error.details,
            ErrorDetails::UnexpectedCommandCode { code: 254, .. }
        ));
    }

    #[test]
    fn truncated_raw_value() {
        let data = vec![253, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3];
        let mut r = command_reader(data, Some(Compression::Bytecode), false);
        assert!(r.read_number(&mut |_| ()).unwrap_err().is_unexpected_eof());
    }
}
