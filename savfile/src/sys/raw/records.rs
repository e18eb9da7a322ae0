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

//! Individual records in a system file's dictionary.

use std::{
    io::{Cursor, Error as IoError, ErrorKind},
    ops::Range,
};

use binrw::{BinRead, Endian};
use itertools::Itertools;
use log::debug;
use serde::Serialize;
use thiserror::Error as ThisError;

use crate::{
    data::ByteString,
    endian::FromBytes,
    format::{Error as FormatError, Format, RawFormat},
    sys::{
        chunk::ChunkReader,
        raw::{
            read_bytes, read_string, Decoder, Error, ErrorDetails, Magic, RawDatum, RawWidth,
            Record, UntypedDatum, VarTypes, Warning, WarningDetails,
        },
        serialize_endian,
        source::ByteSource,
    },
    variable::{Alignment, Measure, MissingValueRange, VarType, VarWidth},
};

/// How case data is compressed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Compression {
    /// Bytecode compression, in 8-code command blocks.
    Bytecode,
}

/// Problems found in the file header that do not stop reading.
#[derive(ThisError, Debug)]
pub enum HeaderWarning {
    /// The bias is neither 0 nor 100.
    #[error("Compression bias is {0} instead of the usual values of 0 or 100.")]
    UnexpectedBias(f64),

    /// Unparsable creation date.
    #[error("File creation date {0:?} is not in the expected \"DD MMM YY\" format.")]
    InvalidCreationDate(String),

    /// Unparsable creation time.
    #[error("File creation time {0:?} is not in the expected \"HH:MM:SS\" format.")]
    InvalidCreationTime(String),

    /// Weight index out of range.
    #[error("Weight variable index {index} exceeds the number of variable records {max_index}.")]
    WeightIndexOutOfRange {
        /// 1-based weight index.
        index: u32,
        /// Number of variable records.
        max_index: usize,
    },

    /// Weight index refers to a string continuation.
    #[error("Weight variable index {0} refers to a long string continuation.")]
    WeightIndexContinuation(u32),

    /// Weight variable is a string variable.
    #[error("File designates string variable {0} as weight variable, but weight variables must be numeric.")]
    StringWeight(String),
}

/// The decoded file header.
#[derive(Clone, Debug, Serialize)]
pub struct FileHeader {
    /// Product identification text, still undecoded and space-padded
    /// to its fixed width.
    pub eye_catcher: ByteString,

    /// Layout code; 2 and 3 are the values seen in practice.
    pub layout_code: u32,

    /// Number of 8-byte case slots, or `None` when the stored value looks
    /// implausible.
    pub nominal_case_size: Option<u32>,

    /// Compression type, if any.
    pub compression: Option<Compression>,

    /// Physical 1-based slot of the weight variable, or `None` if the
    /// file is unweighted.
    pub weight_index: Option<u32>,

    /// Case count stated by the header, when one is given.
    pub n_cases: Option<u32>,

    /// Bias subtracted from compressed bytecodes (normally 100).
    pub bias: f64,

    /// Creation date as raw `dd mmm yy` bytes.
    pub creation_date: ByteString,

    /// Creation time as raw `HH:MM:SS` bytes.
    pub creation_time: ByteString,

    /// Raw file label bytes, space-padded.
    pub file_label: ByteString,

    /// Endianness of the data in the file.
    #[serde(serialize_with = "serialize_endian")]
    pub endian: Endian,
}

/// Raw file header.
#[derive(BinRead)]
pub struct RawHeader {
    /// Magic number.
    pub magic: [u8; 4],

    /// Product identification text.
    pub eye_catcher: [u8; 60],

    /// Layout code; 2 and 3 are the values seen in practice.
    pub layout_code: u32,

    /// Number of 8-byte case slots as written by the producer.
    pub nominal_case_size: u32,

    /// Compression type.
    pub compression_code: u32,

    /// Physical 1-based slot of the weight variable, or 0 if the
    /// file is unweighted.
    pub weight_index: u32,

    /// Case count, with `-1` (all bits set) meaning unknown.
    pub n_cases: u32,

    /// Bias subtracted from compressed bytecodes (normally 100).
    pub bias: f64,

    /// Creation date as raw `dd mmm yy` bytes.
    pub creation_date: [u8; 9],

    /// Creation time as raw `HH:MM:SS` bytes.
    pub creation_time: [u8; 8],

    /// Raw file label bytes, space-padded.
    #[br(pad_after = 3)]
    pub file_label: [u8; 64],
}

impl RawHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 176;
}

fn not_a_system_file(error: IoError) -> Error {
    Error::new(
        None,
        if error.kind() == ErrorKind::UnexpectedEof {
            ErrorDetails::NotASystemFile
        } else {
            error.into()
        },
    )
}

impl FileHeader {
    /// Parses the 176-byte header from `r`, detecting byte order along the way.
    ///
    /// The magic number is checked before anything else is consumed.
    pub fn read<S>(r: &mut ChunkReader<S>, warn: &mut dyn FnMut(Warning)) -> Result<Self, Error>
    where
        S: ByteSource,
    {
        let magic: [u8; 4] = r.peek_array().map_err(not_a_system_file)?;
        let details = match Magic::try_from(magic) {
            Ok(Magic::Sav) => None,
            Ok(Magic::Zsav) => Some(ErrorDetails::UnsupportedZlib),
            Ok(Magic::Ebcdic) => Some(ErrorDetails::Ebcdic),
            Err(details) => Some(details),
        };
        if let Some(details) = details {
            return Err(Error::new(Some(0..4), details));
        }

        let header_bytes = r.read_vec(RawHeader::SIZE).map_err(not_a_system_file)?;
        Self::read_inner(&header_bytes, warn)
            .map_err(|details| Error::new(Some(0..RawHeader::SIZE as u64), details))
    }

    fn read_inner(
        header_bytes: &[u8],
        warn: &mut dyn FnMut(Warning),
    ) -> Result<Self, ErrorDetails> {
        let be_header = RawHeader::read_be(&mut Cursor::new(header_bytes))
            .map_err(|_| ErrorDetails::NotASystemFile)?;
        let le_header = RawHeader::read_le(&mut Cursor::new(header_bytes))
            .map_err(|_| ErrorDetails::NotASystemFile)?;

        let (endian, header) = if matches!(be_header.layout_code, 2 | 3) {
            (Endian::Big, &be_header)
        } else if matches!(le_header.layout_code, 2 | 3) {
            (Endian::Little, &le_header)
        } else {
            return Err(ErrorDetails::NotASystemFile);
        };

        let nominal_case_size = (1..i32::MAX as u32 / 16)
            .contains(&header.nominal_case_size)
            .then_some(header.nominal_case_size);

        let compression = match header.compression_code {
            0 => None,
            1 => Some(Compression::Bytecode),
            2 => return Err(ErrorDetails::UnsupportedZlib),
            code => return Err(ErrorDetails::InvalidCompression(code)),
        };

        let weight_index = (header.weight_index > 0).then_some(header.weight_index);

        let n_cases = (header.n_cases <= u32::MAX / 2).then_some(header.n_cases);

        if header.bias != 100.0 && header.bias != 0.0 {
            warn(Warning::new(
                Some(84..92),
                HeaderWarning::UnexpectedBias(header.bias),
            ));
        }

        Ok(FileHeader {
            layout_code: header.layout_code,
            nominal_case_size,
            compression,
            weight_index,
            n_cases,
            bias: header.bias,
            creation_date: header.creation_date.into(),
            creation_time: header.creation_time.into(),
            eye_catcher: header.eye_catcher.into(),
            file_label: header.file_label.into(),
            endian,
        })
    }
}

/// Missing-value specification as stored on one variable record.
///
/// Numbers are already typed, but strings are not yet decoded.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RawMissingValues {
    /// Discrete missing values (at most three).
    pub values: Vec<RawDatum>,

    /// Inclusive range, if one was given.
    pub range: Option<MissingValueRange>,
}

impl RawMissingValues {
    fn read<S>(
        r: &mut ChunkReader<S>,
        offsets: Range<u64>,
        raw_width: RawWidth,
        code: i32,
        endian: Endian,
        warn: &mut dyn FnMut(Warning),
    ) -> Result<Self, Error>
    where
        S: ByteSource,
    {
        let (individual_values, has_range) = match code {
            0 => return Ok(Self::default()),
            1..=3 => (code as usize, false),
            -2 => (0, true),
            -3 => (1, true),
            _ => {
                return Err(Error::new(
                    Some(offsets),
                    ErrorDetails::BadMissingValueCode(code),
                ))
            }
        };

        // The range, if any, comes before the individual values.
        let range = if has_range {
            let low: [u8; 8] = r.read_array()?;
            let high: [u8; 8] = r.read_array()?;
            Some((low, high))
        } else {
            None
        };
        let mut values = Vec::with_capacity(individual_values);
        for _ in 0..individual_values {
            values.push(r.read_array::<8>()?);
        }

        match VarWidth::try_from(raw_width) {
            Ok(VarWidth::Numeric) => Ok(Self {
                values: values
                    .into_iter()
                    .map(|value| RawDatum::Number(endian.parse(value)))
                    .collect(),
                range: range.map(|(low, high)| {
                    MissingValueRange::new(endian.parse(low), endian.parse(high))
                }),
            }),
            Ok(VarWidth::String(width)) => {
                if range.is_some() {
                    warn(Warning::new(
                        Some(offsets),
                        VariableWarning::MissingValueStringRange,
                    ));
                }
                let width = (width as usize).min(8);
                Ok(Self {
                    values: values
                        .into_iter()
                        .map(|value| RawDatum::String(ByteString::from(&value[..width])))
                        .collect(),
                    range: None,
                })
            }
            Err(()) => {
                warn(Warning::new(
                    Some(offsets),
                    VariableWarning::MissingValueContinuation,
                ));
                Ok(Self::default())
            }
        }
    }
}

/// Nonfatal problems in a type-2 record.
#[derive(ThisError, Debug)]
pub enum VariableWarning {
    /// A string variable declared a missing-value range.
    #[error("Missing value record with range not allowed for string variable.")]
    MissingValueStringRange,

    /// A continuation record declared missing values.
    #[error("Missing value not allowed for long string continuation.")]
    MissingValueContinuation,

    /// Invalid print format.
    #[error("Substituting {new_format} for invalid print format on variable {variable}.  {error}")]
    InvalidPrintFormat {
        /// Name of the variable.
        variable: String,
        /// Replacement format.
        new_format: Format,
        /// What was wrong with the format.
        error: FormatError,
    },

    /// Invalid write format.
    #[error("Substituting {new_format} for invalid write format on variable {variable}.  {error}")]
    InvalidWriteFormat {
        /// Name of the variable.
        variable: String,
        /// Replacement format.
        new_format: Format,
        /// What was wrong with the format.
        error: FormatError,
    },
}

/// One type-2 record after parsing.
#[derive(Clone, Debug, Serialize)]
pub struct VariableRecord {
    /// Where the record sits in the file.
    pub offsets: Range<u64>,

    /// Width code: 0 numeric, 1..=255 string, -1 continuation.
    pub width: RawWidth,

    /// Short name bytes, space-padded to 8.
    pub name: ByteString,

    /// Print format.
    pub print_format: RawFormat,

    /// Write format.
    pub write_format: RawFormat,

    /// Missing values.
    pub missing_values: RawMissingValues,

    /// Label bytes, if the record has one.
    pub label: Option<ByteString>,
}

/// Raw variable record.
#[derive(BinRead)]
pub struct RawVariableRecord {
    /// Width code: 0 numeric, 1..=255 string, -1 continuation.
    pub width: i32,

    /// Label flag: 0 or 1.
    pub has_variable_label: u32,

    /// Missing-value code:
    /// - `0`: none.
    /// - `1`, `2`, `3`: that many discrete values.
    /// - `-2`: a range.
    /// - `-3`: a range and one discrete value.
    pub missing_value_code: i32,

    /// Print format.
    pub print_format: RawFormat,

    /// Write format.
    pub write_format: RawFormat,

    /// Short name bytes, space-padded.
    pub name: [u8; 8],
}

impl VariableRecord {
    /// Reads a variable record from `r`, which must be positioned just after
    /// the record type.
    pub fn read<S>(
        r: &mut ChunkReader<S>,
        endian: Endian,
        warn: &mut dyn FnMut(Warning),
    ) -> Result<Self, Error>
    where
        S: ByteSource,
    {
        let start_offset = r.position();
        let offsets = start_offset..start_offset + 28;
        let raw_record: [u8; 28] = r
            .read_array()
            .map_err(|e| Error::new(Some(offsets.clone()), e.into()))?;
        let raw_record =
            RawVariableRecord::read_options(&mut Cursor::new(&raw_record), endian, ())
                .map_err(|_| Error::new(Some(offsets.clone()), ErrorDetails::UnexpectedEof))?;

        let width: RawWidth = raw_record.width.try_into().map_err(|_| {
            Error::new(
                Some(offsets.clone()),
                ErrorDetails::BadVariableWidth(raw_record.width),
            )
        })?;

        let label = match raw_record.has_variable_label {
            0 => None,
            1 => {
                let len: u32 = endian.parse(r.read_array()?);
                let label = r.read_vec(len as usize)?;
                r.skip((len.next_multiple_of(4) - len) as usize)?;
                Some(label.into())
            }
            _ => {
                return Err(Error::new(
                    Some(offsets),
                    ErrorDetails::BadVariableLabelCode(raw_record.has_variable_label),
                ));
            }
        };

        let missing_values = RawMissingValues::read(
            r,
            offsets,
            width,
            raw_record.missing_value_code,
            endian,
            warn,
        )?;

        Ok(Self {
            offsets: start_offset..r.position(),
            width,
            name: raw_record.name.into(),
            print_format: raw_record.print_format,
            write_format: raw_record.write_format,
            missing_values,
            label,
        })
    }
}

/// Nonfatal problems in a type-3/type-4 record pair.
#[derive(ThisError, Debug)]
pub enum ValueLabelWarning {
    /// The type-4 record listed no variables.
    #[error("At least one valid variable index is required but none were specified.")]
    NoVarIndexes,

    /// Value label record not followed by a variable index record.
    #[error("Value label record is followed by record type {0} instead of the type 4 variable index record.  Ignoring the labels.")]
    MissingVarIndexRecord(u32),

    /// Value label record at end of file.
    #[error("File ends after value label record without a variable index record.  Ignoring the labels.")]
    ValueLabelsAtEnd,

    /// Variable indexes that refer to string continuations.
    #[error("One or more variable indexes referred to long string continuations: {}", .0.iter().join(", "))]
    ContinuationIndexes(Vec<u32>),

    /// The listed variables are not all of one type.
    #[error("First variable {first} is {var_type} but the following variables have the other type: {}", others.iter().join(", "))]
    MixedVarTypes {
        /// Name of the first variable.
        first: String,
        /// Its type.
        var_type: VarType,
        /// Names of variables with the other type.
        others: Vec<String>,
    },
}

/// Labels from a type-3 record with the variables from the type-4 record
/// that must follow it.
#[derive(Clone, Debug, Serialize)]
pub struct ValueLabelRecord {
    /// Where the record sits in the file.
    pub offsets: Range<u64>,

    /// The labels, with values whose type is not yet known.
    pub labels: Vec<(UntypedDatum, ByteString)>,

    /// The 1-based indexes of the variable records for the variables that the
    /// labels apply to.
    pub dict_indexes: Vec<u32>,
}

impl ValueLabelRecord {
    /// Reads a value label record from `r`, which must be positioned just after
    /// the record type, given that the variable records read so far have the
    /// widths in `var_types`.
    ///
    /// Returns `None` if the labels apply to no variables.
    pub fn read<S>(
        r: &mut ChunkReader<S>,
        endian: Endian,
        var_types: &VarTypes,
        warn: &mut dyn FnMut(Warning),
    ) -> Result<Option<Self>, Error>
    where
        S: ByteSource,
    {
        let label_offset = r.position();
        let n: u32 = endian.parse(r.read_array()?);

        let mut labels = Vec::new();
        for _ in 0..n {
            let value = UntypedDatum(r.read_array()?);
            let [label_len] = r.read_array::<1>()?;
            let label_len = label_len as usize;
            let padded_len = (label_len + 1).next_multiple_of(8);

            let mut label = r.read_vec(padded_len - 1)?;
            label.truncate(label_len);
            labels.push((value, label.into()));
        }

        let index_offset = r.position();
        match r.peek_array() {
            Ok(rec_type) => {
                let rec_type: u32 = endian.parse(rec_type);
                if rec_type != 4 {
                    warn(Warning::new(
                        Some(index_offset..index_offset + 4),
                        ValueLabelWarning::MissingVarIndexRecord(rec_type),
                    ));
                    return Ok(None);
                }
            }
            Err(error) if error.kind() == ErrorKind::UnexpectedEof => {
                warn(Warning::new(
                    Some(label_offset..index_offset),
                    ValueLabelWarning::ValueLabelsAtEnd,
                ));
                return Ok(None);
            }
            Err(error) => return Err(error.into()),
        }
        r.skip(4)?;

        let n: u32 = endian.parse(r.read_array()?);
        let mut dict_indexes = Vec::new();
        let mut continuations = Vec::new();
        for _ in 0..n {
            let offset = r.position();
            let index: u32 = endian.parse(r.read_array()?);
            match var_types.get(index as usize) {
                None => {
                    return Err(Error::new(
                        Some(offset..offset + 4),
                        ErrorDetails::InvalidVarIndex {
                            index,
                            max: var_types.len(),
                        },
                    ))
                }
                Some(RawWidth::Continuation) => continuations.push(index),
                Some(_) => dict_indexes.push(index),
            }
        }
        let offsets = label_offset..r.position();
        if !continuations.is_empty() {
            warn(Warning::new(
                Some(offsets.clone()),
                ValueLabelWarning::ContinuationIndexes(continuations),
            ));
        }
        if dict_indexes.is_empty() {
            warn(Warning::new(Some(offsets), ValueLabelWarning::NoVarIndexes));
            return Ok(None);
        }

        Ok(Some(ValueLabelRecord {
            offsets,
            labels,
            dict_indexes,
        }))
    }
}

/// Bytes per document line.  Lines are stored at this fixed width and
/// space-padded.
pub const DOC_LINE_LEN: usize = 80;

/// A type-6 document record.
#[derive(Clone, Debug, Serialize)]
pub struct DocumentRecord {
    /// Where the record sits in the file.
    pub offsets: Range<u64>,

    /// The document, as an array of [DOC_LINE_LEN]-byte lines, without
    /// new-line termination.
    pub lines: Vec<ByteString>,
}

impl DocumentRecord {
    /// Reads a document record from `r`, which must be positioned just after
    /// the record type.
    pub fn read<S>(r: &mut ChunkReader<S>, endian: Endian) -> Result<Self, Error>
    where
        S: ByteSource,
    {
        let start_offset = r.position();
        let n: u32 = endian.parse(r.read_array()?);
        let offsets = start_offset..start_offset + 4 + n as u64 * DOC_LINE_LEN as u64;
        let mut lines = Vec::new();
        for _ in 0..n {
            let line: [u8; DOC_LINE_LEN] = r
                .read_array()
                .map_err(|e| Error::new(Some(offsets.clone()), e.into()))?;
            lines.push(ByteString::from(line));
        }
        Ok(DocumentRecord { offsets, lines })
    }
}

/// Version number of the product that wrote a file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, BinRead, Serialize)]
pub struct ProductVersion(
    /// Major version.
    pub i32,
    /// Minor version.
    pub i32,
    /// Revision.
    pub i32,
);

/// Extension subtype 3: producer version and machine details.
#[derive(Clone, Debug, PartialEq, Eq, BinRead, Serialize)]
pub struct IntegerInfo {
    /// Version number.
    pub version: ProductVersion,

    /// Machine code.
    pub machine_code: i32,

    /// Float format; 1 means IEEE 754.
    pub floating_point_rep: i32,

    /// Compression code.
    pub compression_code: i32,

    /// Endianness (1 for big-endian, 2 for little-endian).
    pub endianness: i32,

    /// Code page number for strings.
    pub character_code: i32,
}

impl IntegerInfo {
    /// Parses the record's payload.
    pub fn parse(ext: &Extension, endian: Endian) -> Result<Record, WarningDetails> {
        ext.check_size(Some(4), Some(8), "integer record")?;
        let inner = Self::read_options(&mut Cursor::new(ext.data.as_slice()), endian, ())
            .map_err(|_| ExtensionWarning::UnexpectedEndOfData)?;
        Ok(Record::IntegerInfo(inner))
    }
}

/// Extension subtype 4: special numeric values.
#[derive(Clone, Debug, PartialEq, BinRead, Serialize)]
pub struct FloatInfo {
    /// The system-missing value.
    pub sysmis: f64,

    /// Stand-in for `HIGHEST` in missing-value ranges.
    pub highest: f64,

    /// Stand-in for `LOWEST` in missing-value ranges.
    pub lowest: f64,
}

impl FloatInfo {
    /// Parses the record's payload.
    pub fn parse(ext: &Extension, endian: Endian) -> Result<Record, WarningDetails> {
        ext.check_size(Some(8), Some(3), "floating point record")?;
        let inner = Self::read_options(&mut Cursor::new(ext.data.as_slice()), endian, ())
            .map_err(|_| ExtensionWarning::UnexpectedEndOfData)?;
        Ok(Record::FloatInfo(inner))
    }
}

/// An extension payload that is just undecoded text.
#[derive(Clone, Debug, Serialize)]
pub struct TextRecord {
    /// Where the payload sits in the file.
    pub offsets: Range<u64>,

    /// Payload bytes.
    pub text: ByteString,
}

impl TextRecord {
    /// Wraps the payload of `extension`.
    pub fn parse(extension: Extension, name: &'static str) -> Result<TextRecord, WarningDetails> {
        extension.check_size(Some(1), None, name)?;
        Ok(Self {
            offsets: extension.offsets,
            text: extension.data.into(),
        })
    }
}

/// Problems in the subtype-13 rename list.
#[derive(ThisError, Debug)]
pub enum LongNameWarning {
    /// Missing `=`.
    #[error("Missing `=` separator in {0:?}.")]
    LongNameMissingEquals(String),

    /// Empty short or long name.
    #[error("Empty name in {0:?}.")]
    EmptyName(String),

    /// Short name that does not match any variable.
    #[error("No variable has short name {0}.")]
    UnknownShortName(String),
}

/// One `SHORT=Long` rename.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LongName {
    /// Name from the variable record.
    pub short_name: String,

    /// Name to use instead.
    pub long_name: String,
}

impl LongName {
    /// Parses a `SHORT=LONG` pair.
    pub fn parse(input: &str) -> Result<Self, WarningDetails> {
        let Some((short_name, long_name)) = input.split_once('=') else {
            return Err(LongNameWarning::LongNameMissingEquals(input.into()).into());
        };
        let (short_name, long_name) = (short_name.trim_end(), long_name.trim_end());
        if short_name.is_empty() || long_name.is_empty() {
            return Err(LongNameWarning::EmptyName(input.into()).into());
        }
        Ok(LongName {
            short_name: short_name.into(),
            long_name: long_name.into(),
        })
    }
}

/// Long variable names record, as text.
#[derive(Clone, Debug, Serialize)]
pub struct RawLongNamesRecord(
    /// Undecoded `SHORT=Long` pairs.
    pub TextRecord,
);

impl RawLongNamesRecord {
    /// Wraps the payload of `extension`.
    pub fn parse(extension: Extension) -> Result<Record, WarningDetails> {
        Ok(Record::LongNames(Self(TextRecord::parse(
            extension,
            "long names record",
        )?)))
    }

    /// Splits and decodes the payload.
    pub fn decode(&self, decoder: &mut Decoder) -> Vec<LongName> {
        let input = decoder.decode(&self.0.text).into_owned();
        let mut names = Vec::new();
        for pair in input.split('\t').filter(|s| !s.is_empty()) {
            if let Some(long_name) = LongName::parse(pair).issue_warning(&self.0.offsets, decoder.warn)
            {
                names.push(long_name);
            }
        }
        names
    }
}

/// Problems in the subtype-14 width list.
#[derive(ThisError, Debug)]
pub enum VeryLongStringWarning {
    /// Missing delimiter.
    #[error("Missing delimiter in {0:?}.")]
    VeryLongStringMissingDelimiter(String),

    /// Invalid length.
    #[error("Invalid length in {0:?}.")]
    VeryLongStringInvalidLength(String),

    /// Unknown variable.
    #[error("No string variable has short name {0}.")]
    UnknownVariable(String),

    /// Not enough variables follow for the segments.
    #[error("Variable {short_name} with width {width} needs {n_segments} segments but only {available} variables remain.")]
    NotEnoughSegments {
        /// Short name of the variable.
        short_name: String,
        /// Declared width.
        width: u16,
        /// Number of segments needed.
        n_segments: usize,
        /// Number of variables available, including the variable itself.
        available: usize,
    },
}

/// A very long string parsed from a [RawVeryLongStringsRecord].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VeryLongString {
    /// Short name of the head segment.
    pub short_name: String,

    /// Declared total width.
    pub length: u16,
}

impl VeryLongString {
    /// Parses a `NAME=LENGTH` pair.
    pub fn parse(input: &str) -> Result<VeryLongString, WarningDetails> {
        let Some((short_name, length)) = input.split_once('=') else {
            return Err(VeryLongStringWarning::VeryLongStringMissingDelimiter(input.into()).into());
        };
        let length = length
            .trim_end()
            .parse()
            .ok()
            .filter(|length| (1..=VarWidth::MAX_STRING).contains(length))
            .ok_or_else(|| VeryLongStringWarning::VeryLongStringInvalidLength(input.into()))?;
        Ok(VeryLongString {
            short_name: short_name.trim_end().into(),
            length,
        })
    }
}

/// A very long string record, as text.
#[derive(Clone, Debug, Serialize)]
pub struct RawVeryLongStringsRecord(pub TextRecord);

impl RawVeryLongStringsRecord {
    /// Wraps the payload of `extension`.
    pub fn parse(extension: Extension) -> Result<Record, WarningDetails> {
        Ok(Record::VeryLongStrings(Self(TextRecord::parse(
            extension,
            "very long strings record",
        )?)))
    }

    /// Splits and decodes the payload.
    pub fn decode(&self, decoder: &mut Decoder) -> Vec<VeryLongString> {
        let input = decoder.decode(&self.0.text).into_owned();
        let mut very_long_strings = Vec::new();
        for tuple in input
            .split('\0')
            .map(|s| s.trim_start_matches('\t'))
            .filter(|s| !s.is_empty())
        {
            if let Some(vls) =
                VeryLongString::parse(tuple).issue_warning(&self.0.offsets, decoder.warn)
            {
                very_long_strings.push(vls)
            }
        }
        very_long_strings
    }
}

/// Problems in the subtype-11 display list.
#[derive(ThisError, Debug)]
pub enum VariableDisplayWarning {
    /// The item count matches neither layout.
    #[error("Record contains {count} items but should contain either {first} or {second}.")]
    InvalidVariableDisplayCount {
        /// Actual count.
        count: usize,
        /// First valid count.
        first: usize,
        /// Second valid count.
        second: usize,
    },

    /// Unknown measure code.
    #[error("Invalid variable measurement level value {0}.")]
    InvalidMeasurement(u32),

    /// Unknown alignment code.
    #[error("Invalid variable display alignment value {0}.")]
    InvalidAlignment(u32),
}

/// Display settings for one variable record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VarDisplay {
    /// Measurement level.
    pub measure: Option<Measure>,

    /// Column width, when the record carries widths.
    pub width: Option<u32>,

    /// Variable alignment.
    pub alignment: Option<Alignment>,
}

/// Extension subtype 11.
#[derive(Clone, Debug, Serialize)]
pub struct VarDisplayRecord(
    /// Variable display settings for each variable record other than
    /// continuations, in order.
    pub Vec<VarDisplay>,
);

impl VarDisplayRecord {
    /// Parses a variable display record from `ext` given variable types
    /// `var_types`.
    fn parse(
        ext: &Extension,
        var_types: &VarTypes,
        endian: Endian,
        warn: &mut dyn FnMut(Warning),
    ) -> Result<Record, WarningDetails> {
        ext.check_size(Some(4), None, "variable display record")?;

        let n_vars = var_types.n_vars();
        let has_width = if ext.count as usize == 3 * n_vars {
            true
        } else if ext.count as usize == 2 * n_vars {
            false
        } else {
            return Err(VariableDisplayWarning::InvalidVariableDisplayCount {
                count: ext.count as usize,
                first: 2 * n_vars,
                second: 3 * n_vars,
            }
            .into());
        };

        let mut var_displays = Vec::with_capacity(n_vars);
        let mut input = &ext.data[..];
        for _ in 0..n_vars {
            let measure = Measure::try_decode(endian.parse(read_bytes(&mut input)?))
                .map_err(VariableDisplayWarning::InvalidMeasurement)
                .issue_warning(&ext.offsets, warn)
                .flatten();
            let width = if has_width {
                Some(endian.parse(read_bytes(&mut input)?))
            } else {
                None
            };
            let alignment = Alignment::try_decode(endian.parse(read_bytes(&mut input)?))
                .map_err(VariableDisplayWarning::InvalidAlignment)
                .issue_warning(&ext.offsets, warn);
            var_displays.push(VarDisplay {
                measure,
                width,
                alignment,
            });
        }
        Ok(Record::VarDisplay(VarDisplayRecord(var_displays)))
    }
}

/// Extension subtype 20: the name of the character encoding.
#[derive(Clone, Debug, Serialize)]
pub struct EncodingRecord(
    /// The encoding name.
    pub String,
);

impl EncodingRecord {
    /// Parses the record's payload.
    pub fn parse(ext: &Extension) -> Result<Record, WarningDetails> {
        ext.check_size(Some(1), None, "encoding record")?;

        let name = String::from_utf8(ext.data.clone()).map_err(|_| WarningDetails::BadEncodingName)?;
        Ok(Record::Encoding(EncodingRecord(
            name.trim_matches(|c: char| c == '\0' || c.is_whitespace())
                .into(),
        )))
    }
}

/// Problems in subtype-21 long-string labels.
#[derive(ThisError, Debug)]
pub enum LongStringValueLabelWarning {
    /// Unknown variable.
    #[error("Ignoring long string value labels for unknown variable {0}.")]
    UnknownVariable(String),

    /// Numeric variable.
    #[error("Ignoring long string value labels for numeric variable {0}.")]
    NumericVariable(String),
}

/// Labels for one long string variable.
#[derive(Clone, Debug, Serialize)]
pub struct LongStringValueLabels {
    /// Name of the labeled variable, undecoded.
    pub var_name: ByteString,

    /// Width the values were written at.
    pub width: u32,

    /// `(value, label)` byte pairs.
    pub labels: Vec<(ByteString, ByteString)>,
}

/// Extension subtype 21.
#[derive(Clone, Debug, Serialize)]
pub struct LongStringValueLabelRecord {
    /// Where the payload sits in the file.
    pub offsets: Range<u64>,

    /// The labels.
    pub labels: Vec<LongStringValueLabels>,
}

impl LongStringValueLabelRecord {
    /// Parses the length-prefixed payload.
    fn parse(ext: &Extension, endian: Endian) -> Result<Record, WarningDetails> {
        ext.check_size(Some(1), None, "long string value labels record")?;

        let mut input = &ext.data[..];
        let mut label_set = Vec::new();
        while !input.is_empty() {
            let var_name = read_string(&mut input, endian)?;
            let width: u32 = endian.parse(read_bytes(&mut input)?);
            let n_labels: u32 = endian.parse(read_bytes(&mut input)?);
            let mut labels = Vec::new();
            for _ in 0..n_labels {
                let value = read_string(&mut input, endian)?;
                let label = read_string(&mut input, endian)?;
                labels.push((value, label));
            }
            label_set.push(LongStringValueLabels {
                var_name,
                width,
                labels,
            })
        }
        Ok(Record::LongStringValueLabels(LongStringValueLabelRecord {
            offsets: ext.offsets.clone(),
            labels: label_set,
        }))
    }
}

pub(crate) trait IssueWarning<T> {
    fn issue_warning(self, offsets: &Range<u64>, warn: &mut dyn FnMut(Warning)) -> Option<T>;
}

impl<T, W> IssueWarning<T> for Result<T, W>
where
    W: Into<WarningDetails>,
{
    fn issue_warning(self, offsets: &Range<u64>, warn: &mut dyn FnMut(Warning)) -> Option<T> {
        match self {
            Ok(result) => Some(result),
            Err(error) => {
                warn(Warning::new(Some(offsets.clone()), error.into()));
                None
            }
        }
    }
}

/// Problems with an extension record's framing.
#[derive(ThisError, Debug)]
pub enum ExtensionWarning {
    /// The payload ended in the middle of an item.
    #[error("Unexpected end of data.")]
    UnexpectedEndOfData,

    /// Invalid record size.
    #[error("{record} has bad size {size} bytes instead of the expected {expected_size}.")]
    BadRecordSize {
        /// Name of the record.
        record: &'static str,
        /// Element size found.
        size: u32,
        /// Element size required.
        expected_size: u32,
    },

    /// Invalid record count.
    #[error("{record} has bad count {count} instead of the expected {expected_count}.")]
    BadRecordCount {
        /// Name of the record.
        record: &'static str,
        /// Element count found.
        count: u32,
        /// Element count required.
        expected_count: u32,
    },

    /// Floating-point format other than IEEE 754.
    #[error("Floating-point representation indicated by system file ({0}) differs from expected (1).")]
    UnexpectedFloatFormat(i32),

    /// Integer info disagrees with the header about byte order.
    #[error("Integer format indicated by system file ({actual}) differs from expected ({expected}).")]
    UnexpectedEndianness {
        /// Endianness code in the integer info record.
        actual: i32,
        /// Code for the byte order of the file header.
        expected: i32,
    },
}

/// A type-7 record: subtype, element size, count, and payload.
///
/// The payload is kept whole until the subtype decides how to read it.
#[derive(Clone, Debug, Serialize)]
pub struct Extension {
    /// Where the payload sits in the file.
    ///
    /// The 16-byte header before the payload is excluded.
    pub offsets: Range<u64>,

    /// Record subtype.
    pub subtype: u32,

    /// Bytes per element.
    pub size: u32,

    /// Element count.
    pub count: u32,

    /// The payload, `size * count` bytes.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Extension {
    /// Validates element size and count against what `name` requires, when
    /// either is given.
    pub fn check_size(
        &self,
        size: Option<u32>,
        count: Option<u32>,
        name: &'static str,
    ) -> Result<(), WarningDetails> {
        if let Some(expected_size) = size.filter(|expected| *expected != self.size) {
            Err(ExtensionWarning::BadRecordSize {
                record: name,
                size: self.size,
                expected_size,
            }
            .into())
        } else if let Some(expected_count) = count.filter(|expected| *expected != self.count) {
            Err(ExtensionWarning::BadRecordCount {
                record: name,
                count: self.count,
                expected_count,
            }
            .into())
        } else {
            Ok(())
        }
    }

    /// Reads an extension record from `r`, which must be positioned just after
    /// the record type, given that the variable records read so far have the
    /// widths in `var_types`.
    ///
    /// Returns `None` if the record's contents are unusable, after reporting
    /// why with `warn`.
    pub fn read<S>(
        r: &mut ChunkReader<S>,
        endian: Endian,
        var_types: &VarTypes,
        warn: &mut dyn FnMut(Warning),
    ) -> Result<Option<Record>, Error>
    where
        S: ByteSource,
    {
        let subtype: u32 = endian.parse(r.read_array()?);
        let header_offset = r.position();
        let size: u32 = endian.parse(r.read_array()?);
        let count: u32 = endian.parse(r.read_array()?);
        let Some(product) = size.checked_mul(count) else {
            return Err(Error::new(
                Some(header_offset..header_offset + 8),
                ErrorDetails::ExtensionRecordTooLarge {
                    subtype,
                    size,
                    count,
                },
            ));
        };
        let start_offset = r.position();
        let data = r.read_vec(product as usize)?;
        let offsets = start_offset..start_offset + product as u64;
        let extension = Extension {
            offsets: offsets.clone(),
            subtype,
            size,
            count,
            data,
        };
        let result = match subtype {
            3 => IntegerInfo::parse(&extension, endian),
            4 => FloatInfo::parse(&extension, endian),
            7 | 19 => TextRecord::parse(extension, "multiple response set record")
                .map(Record::MultipleResponse),
            11 => VarDisplayRecord::parse(&extension, var_types, endian, warn),
            13 => RawLongNamesRecord::parse(extension),
            14 => RawVeryLongStringsRecord::parse(extension),
            20 => EncodingRecord::parse(&extension),
            21 => LongStringValueLabelRecord::parse(&extension, endian),
            _ => {
                debug!(
                    "skipping extension record subtype {subtype} with {count} {size}-byte elements at offset {start_offset:#x}"
                );
                Ok(Record::OtherExtension(extension))
            }
        };
        match result {
            Ok(result) => Ok(Some(result)),
            Err(details) => {
                warn(Warning::new(Some(offsets), details));
                Ok(None)
            }
        }
    }
}
