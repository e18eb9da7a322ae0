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

//! Buffered reading with lookahead.

use std::io::{Error as IoError, ErrorKind};

use log::trace;

use crate::sys::source::ByteSource;

/// Wraps a [ByteSource] with a buffer that allows looking ahead.
///
/// The buffer is refilled `chunk_size` bytes at a time.  Consumed bytes are
/// discarded before each refill, so the buffer never holds much more than one
/// chunk plus the largest single request.
pub struct ChunkReader<S> {
    source: S,
    buffer: Vec<u8>,

    /// Number of bytes at the start of `buffer` already consumed.
    consumed: usize,

    /// Logical offset of the next byte to be consumed.
    position: u64,

    chunk_size: usize,
}

impl<S> ChunkReader<S>
where
    S: ByteSource,
{
    /// Chunk size for generic streams.
    pub const STREAM_CHUNK_SIZE: usize = 1024;

    /// Chunk size for files.
    pub const FILE_CHUNK_SIZE: usize = 1024 * 1024;

    /// Constructs a new [ChunkReader] for `source` that refills `chunk_size`
    /// bytes at a time.
    pub fn new(source: S, chunk_size: usize) -> Self {
        Self {
            position: source.position(),
            source,
            buffer: Vec::new(),
            consumed: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    fn buffered(&self) -> usize {
        self.buffer.len() - self.consumed
    }

    fn fill(&mut self, n: usize) -> Result<(), IoError> {
        while self.buffered() < n {
            if self.source.is_at_end() {
                return Err(IoError::new(
                    ErrorKind::UnexpectedEof,
                    format!(
                        "unexpected end of input reading {n} bytes at offset {:#x}",
                        self.position
                    ),
                ));
            }
            if self.consumed > 0 {
                self.buffer.drain(..self.consumed);
                self.consumed = 0;
            }
            let chunk = self.source.read(self.chunk_size)?;
            trace!(
                "buffered {} bytes at source offset {:#x}",
                chunk.len(),
                self.source.position() - chunk.len() as u64
            );
            if chunk.is_empty() && !self.source.is_at_end() {
                return Err(IoError::new(
                    ErrorKind::UnexpectedEof,
                    "byte source returned no data",
                ));
            }
            self.buffer.extend_from_slice(&chunk);
        }
        Ok(())
    }

    /// Returns the next `n` bytes without consuming them.
    pub fn peek(&mut self, n: usize) -> Result<&[u8], IoError> {
        self.fill(n)?;
        Ok(&self.buffer[self.consumed..self.consumed + n])
    }

    /// Returns the next `N` bytes as an array without consuming them.
    pub fn peek_array<const N: usize>(&mut self) -> Result<[u8; N], IoError> {
        let mut array = [0; N];
        array.copy_from_slice(self.peek(N)?);
        Ok(array)
    }

    /// Consumes and returns the next `n` bytes.
    pub fn read(&mut self, n: usize) -> Result<&[u8], IoError> {
        self.fill(n)?;
        let start = self.consumed;
        self.consumed += n;
        self.position += n as u64;
        Ok(&self.buffer[start..start + n])
    }

    /// Consumes and returns the next `N` bytes as an array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], IoError> {
        let mut array = [0; N];
        array.copy_from_slice(self.read(N)?);
        Ok(array)
    }

    /// Consumes and returns the next `n` bytes as a vector.
    pub fn read_vec(&mut self, n: usize) -> Result<Vec<u8>, IoError> {
        Ok(self.read(n)?.to_vec())
    }

    /// Consumes and discards the next `n` bytes.
    pub fn skip(&mut self, mut n: usize) -> Result<(), IoError> {
        while n > 0 {
            let chunk = n.min(self.chunk_size);
            self.read(chunk)?;
            n -= chunk;
        }
        Ok(())
    }

    /// Returns the logical offset of the next byte to be consumed.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns true if every byte has been consumed and the source has
    /// reported end of input.
    pub fn is_at_end(&self) -> bool {
        self.buffered() == 0 && self.source.is_at_end()
    }

    /// Closes the underlying source and discards buffered data.
    pub fn close(&mut self) {
        self.source.close();
        self.buffer.clear();
        self.consumed = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use crate::sys::{chunk::ChunkReader, source::ReadSource};

    fn reader(data: &[u8], chunk_size: usize) -> ChunkReader<ReadSource<Cursor<Vec<u8>>>> {
        ChunkReader::new(ReadSource::new(Cursor::new(data.to_vec())), chunk_size)
    }

    #[test]
    fn peek_then_read() {
        let mut r = reader(b"0123456789", 3);
        assert_eq!(r.peek(4).unwrap(), b"0123");
        assert_eq!(r.position(), 0);
        assert_eq!(r.read(2).unwrap(), b"01");
        assert_eq!(r.peek(5).unwrap(), b"23456");
        assert_eq!(r.read_array::<5>().unwrap(), *b"23456");
        assert_eq!(r.position(), 7);
        assert!(!r.is_at_end());
        r.skip(3).unwrap();
        assert_eq!(r.position(), 10);
        assert_eq!(r.peek(1).unwrap_err().kind(), ErrorKind::UnexpectedEof);
        assert!(r.is_at_end());
    }

    #[test]
    fn short_read_fails() {
        let mut r = reader(b"abc", 1024);
        assert_eq!(r.read(4).unwrap_err().kind(), ErrorKind::UnexpectedEof);
        assert_eq!(r.read_vec(3).unwrap(), b"abc");
    }

    #[test]
    fn closed_source() {
        let mut r = reader(b"abcdef", 2);
        assert_eq!(r.read(1).unwrap(), b"a");
        r.close();
        assert!(r.read(4).is_err());
    }
}
