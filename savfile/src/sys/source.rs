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

//! Byte sources.
//!
//! A [ByteSource] is the bottom layer of a system file reader.  It hands out
//! bytes in order, with no peeking and no seeking.

use std::io::{Error as IoError, ErrorKind, Read};

/// An ordered supply of bytes.
pub trait ByteSource {
    /// Reads and returns the next `n` bytes.  Returns fewer than `n` bytes only
    /// if the source reaches end of input first, after which
    /// [is_at_end](Self::is_at_end) returns true.
    ///
    /// Fails if the source has been closed.
    fn read(&mut self, n: usize) -> Result<Vec<u8>, IoError>;

    /// Returns the number of bytes read so far.
    fn position(&self) -> u64;

    /// Returns true if the source has reported end of input.
    fn is_at_end(&self) -> bool;

    /// Closes the source.  Any later read fails.
    fn close(&mut self);
}

impl<S> ByteSource for Box<S>
where
    S: ByteSource + ?Sized,
{
    fn read(&mut self, n: usize) -> Result<Vec<u8>, IoError> {
        (**self).read(n)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn is_at_end(&self) -> bool {
        (**self).is_at_end()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// A [ByteSource] for anything that implements [Read].
pub struct ReadSource<R> {
    inner: Option<R>,
    position: u64,
    at_end: bool,
}

impl<R> ReadSource<R>
where
    R: Read,
{
    /// Constructs a new [ReadSource] that reads from `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner: Some(inner),
            position: 0,
            at_end: false,
        }
    }

    /// Returns the underlying reader, or `None` if the source was closed.
    pub fn into_inner(self) -> Option<R> {
        self.inner
    }
}

impl<R> ByteSource for ReadSource<R>
where
    R: Read,
{
    fn read(&mut self, n: usize) -> Result<Vec<u8>, IoError> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(IoError::new(ErrorKind::NotConnected, "byte source is closed"));
        };
        let mut buf = vec![0; n];
        let mut filled = 0;
        while filled < n && !self.at_end {
            match inner.read(&mut buf[filled..]) {
                Ok(0) => self.at_end = true,
                Ok(count) => filled += count,
                Err(error) if error.kind() == ErrorKind::Interrupted => (),
                Err(error) => return Err(error),
            }
        }
        buf.truncate(filled);
        self.position += filled as u64;
        Ok(buf)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn is_at_end(&self) -> bool {
        self.at_end
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use crate::sys::source::{ByteSource, ReadSource};

    #[test]
    fn read_to_end() {
        let mut source = ReadSource::new(Cursor::new(b"abcdefg".to_vec()));
        assert_eq!(source.read(3).unwrap(), b"abc");
        assert!(!source.is_at_end());
        assert_eq!(source.position(), 3);
        assert_eq!(source.read(10).unwrap(), b"defg");
        assert!(source.is_at_end());
        assert_eq!(source.read(1).unwrap(), b"");
        assert_eq!(source.position(), 7);
    }

    #[test]
    fn closed() {
        let mut source = ReadSource::new(Cursor::new(b"abc".to_vec()));
        source.close();
        assert_eq!(source.read(1).unwrap_err().kind(), ErrorKind::NotConnected);
    }
}
