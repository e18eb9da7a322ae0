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

use std::fmt::{Debug, Formatter, Result as FmtResult};

use encoding_rs::Encoding;
use log::debug;
use smallvec::SmallVec;

use crate::{
    data::{Case, Datum},
    sys::{
        command::CommandReader,
        raw::{Decoder, Error, ErrorDetails, Warning},
        source::ByteSource,
    },
    variable::{Variable, VarType},
};

/// Longest string that one segment of a string variable can hold.
const MAX_SEGMENT_BYTES: usize = 255;

/// How to read one variable's value in a case.
#[derive(Clone, Debug)]
enum CaseVar {
    Numeric,

    /// The number of 8-byte chunks in each of the variable's segments.
    String(SmallVec<[usize; 1]>),
}

impl CaseVar {
    fn new(variable: &Variable) -> Self {
        match variable.var_type() {
            VarType::Numeric => Self::Numeric,
            VarType::String => Self::String(
                variable
                    .segments
                    .iter()
                    .map(|segment| segment.n_chunks)
                    .collect(),
            ),
        }
    }

    fn n_chunks(&self) -> usize {
        match self {
            CaseVar::Numeric => 1,
            CaseVar::String(segments) => segments.iter().sum(),
        }
    }
}

/// Reader for the cases in a system file.
///
/// Each item is one [Case], with one [Datum] per variable in the
/// [Dictionary](crate::dictionary::Dictionary), even for very long string
/// variables.  Iteration stops after the first error.
pub struct Cases<'a> {
    reader: CommandReader<Box<dyn ByteSource + 'a>>,
    case_vars: Vec<CaseVar>,
    encoding: &'static Encoding,
    warn: Box<dyn FnMut(Warning) + 'a>,
    expected_cases: Option<u64>,
    read_cases: u64,
    eof: bool,
}

impl Debug for Cases<'_> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "Cases")
    }
}

impl<'a> Cases<'a> {
    pub(crate) fn new(
        reader: CommandReader<Box<dyn ByteSource + 'a>>,
        variables: &[Variable],
        encoding: &'static Encoding,
        warn: Box<dyn FnMut(Warning) + 'a>,
        expected_cases: Option<u64>,
    ) -> Self {
        Self {
            reader,
            case_vars: variables.iter().map(CaseVar::new).collect(),
            encoding,
            warn,
            expected_cases,
            read_cases: 0,
            eof: false,
        }
    }

    /// Returns the number of cases read so far.
    pub fn read_cases(&self) -> u64 {
        self.read_cases
    }

    /// Reads all of the remaining cases.
    pub fn read_all(self) -> Result<Vec<Case>, Error> {
        self.collect()
    }

    /// Closes the underlying source.  Iteration ends.
    pub fn close(&mut self) {
        self.reader.close();
        self.eof = true;
    }

    fn eof_in_case(&self, case_start: u64, n_chunks: usize) -> Error {
        let offset = self.reader.position();
        let case_number = self.read_cases + 1;
        let details = if self.reader.is_compressed() {
            ErrorDetails::EofInCompressedCase {
                case_ofs: offset - case_start,
                n_chunks,
                case_number,
            }
        } else {
            ErrorDetails::EofInCase {
                case_ofs: offset - case_start,
                case_len: self.case_vars.iter().map(CaseVar::n_chunks).sum::<usize>() * 8,
                case_number,
            }
        };
        Error::new(Some(case_start..offset), details)
    }

    fn read_case(&mut self) -> Result<Case, Error> {
        let case_start = self.reader.position();
        let mut n_chunks = 0;
        let mut values = Vec::with_capacity(self.case_vars.len());
        for index in 0..self.case_vars.len() {
            let value = match &self.case_vars[index] {
                CaseVar::Numeric => {
                    let number = self.reader.read_number(&mut self.warn);
                    match number {
                        Ok(Some(number)) => {
                            n_chunks += 1;
                            Datum::Number(number)
                        }
                        Ok(None) => return Err(self.eof_in_case(case_start, n_chunks)),
                        Err(error) if error.is_unexpected_eof() => {
                            return Err(self.eof_in_case(case_start, n_chunks))
                        }
                        Err(error) => return Err(error),
                    }
                }
                CaseVar::String(segments) => {
                    let segments = segments.clone();
                    let mut bytes = Vec::new();
                    for segment_chunks in segments {
                        let segment_start = bytes.len();
                        for _ in 0..segment_chunks {
                            match self.reader.read_str8(&mut self.warn) {
                                Ok(Some(chunk)) => bytes.extend_from_slice(&chunk),
                                Ok(None) => return Err(self.eof_in_case(case_start, n_chunks)),
                                Err(error) if error.is_unexpected_eof() => {
                                    return Err(self.eof_in_case(case_start, n_chunks))
                                }
                                Err(error) => return Err(error),
                            }
                            n_chunks += 1;
                        }
                        bytes.truncate(segment_start + MAX_SEGMENT_BYTES);
                    }
                    Datum::String(Decoder::new(self.encoding, &mut self.warn).decode_trimmed(&bytes))
                }
            };
            values.push(value);
        }
        Ok(Case(values))
    }

    fn finish(&mut self) -> Option<Result<Case, Error>> {
        self.eof = true;
        debug!("read {} cases", self.read_cases);
        match self.expected_cases {
            Some(expected) if expected != self.read_cases => Some(Err(Error::new(
                None,
                ErrorDetails::WrongNumberOfCases {
                    expected,
                    actual: self.read_cases,
                },
            ))),
            _ => None,
        }
    }
}

impl Iterator for Cases<'_> {
    type Item = Result<Case, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof {
            return None;
        }
        if self.case_vars.is_empty() {
            return self.finish();
        }
        match self.reader.at_end_of_data() {
            Ok(true) => return self.finish(),
            Ok(false) => (),
            Err(error) => {
                self.eof = true;
                return Some(Err(error));
            }
        }
        match self.read_case() {
            Ok(case) => {
                self.read_cases += 1;
                Some(Ok(case))
            }
            Err(error) => {
                self.eof = true;
                Some(Err(error))
            }
        }
    }
}
