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

//! Reading the dictionary records of a `.sav` file without interpreting them.
//!
//! This module splits the dictionary at the start of a system file into
//! records, in all of their raw details.  Nothing here knows the file's
//! character encoding, so text stays as [ByteString] and 8-byte values whose
//! type is not yet known stay as [UntypedDatum].  Most readers will want to use
//! the higher-level [ReaderOptions](crate::sys::ReaderOptions).

use std::{
    borrow::Cow,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    io::{Error as IoError, ErrorKind, Read},
    ops::Range,
};

use binrw::Endian;
use encoding_rs::Encoding;
use log::debug;
use serde::{Serialize, Serializer};
use thiserror::Error as ThisError;

use crate::{
    data::{trim_end_spaces, ByteString, Datum},
    endian::FromBytes,
    sys::{
        chunk::ChunkReader,
        command::CompressionWarning,
        encoding::{default_encoding, get_encoding, Error as EncodingError},
        raw::records::{
            DocumentRecord, EncodingRecord, Extension, ExtensionWarning, FileHeader, FloatInfo,
            HeaderWarning, IntegerInfo, LongNameWarning, LongStringValueLabelRecord,
            LongStringValueLabelWarning, RawLongNamesRecord, RawVeryLongStringsRecord,
            TextRecord, ValueLabelRecord, ValueLabelWarning, VarDisplayRecord,
            VariableDisplayWarning, VariableRecord, VariableWarning, VeryLongStringWarning,
        },
        source::ByteSource,
    },
    variable::{VarType, VarWidth},
};

pub mod records;

/// An error encountered reading a system file.
///
/// After an error nothing more can be read from the file.
#[derive(Debug)]
pub struct Error {
    /// File offsets involved, when known.
    pub offsets: Option<Range<u64>>,

    /// Details of the error.
    pub details: ErrorDetails,
}

impl std::error::Error for Error {}

impl Error {
    /// Creates an error at `offsets`.
    pub fn new(offsets: Option<Range<u64>>, details: ErrorDetails) -> Self {
        Self { offsets, details }
    }

    /// Returns true if this error means that the input ended too soon.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self.details, ErrorDetails::UnexpectedEof)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if let Some(offsets) = &self.offsets {
            if offsets.end > offsets.start.wrapping_add(1) {
                write!(
                    f,
                    "Error at file offsets {:#x} to {:#x}: ",
                    offsets.start, offsets.end
                )?;
            } else if !offsets.is_empty() {
                write!(f, "Error at file offset {:#x}: ", offsets.start)?;
            }
        }
        write!(f, "{}", &self.details)
    }
}

impl From<IoError> for Error {
    fn from(value: IoError) -> Self {
        Self::new(None, value.into())
    }
}

/// What went wrong, for an [Error].
#[derive(ThisError, Debug)]
pub enum ErrorDetails {
    /// The magic number is not one we recognize.
    #[error("Not an SPSS system file.")]
    NotASystemFile,

    /// Bad magic number.
    #[error("Invalid magic number {0:02x?}.")]
    BadMagic([u8; 4]),

    /// EBCDIC system file.
    #[error("This system file is encoded in EBCDIC, which is not supported.")]
    Ebcdic,

    /// ZLIB-compressed system file.
    #[error("This system file has ZLIB-compressed data, which is not supported.")]
    UnsupportedZlib,

    /// Invalid compression code in the file header.
    #[error("Invalid compression code {0}.")]
    InvalidCompression(u32),

    /// Missing-value code outside -3..=3 or equal to -1.
    #[error("Missing value code ({0}) is not -3, -2, 0, 1, 2, or 3.")]
    BadMissingValueCode(i32),

    /// Width code outside -1..=255.
    #[error("Variable width {0} in variable record is not in the valid range -1 to 255.")]
    BadVariableWidth(i32),

    /// Label flag other than 0 or 1.
    #[error("In variable record, variable label code {0} is not 0 or 1.")]
    BadVariableLabelCode(u32),

    /// Compression command code that makes no sense for the variable being
    /// read.
    #[error("Compression code {code} is not valid for a {var_type} variable.")]
    UnexpectedCommandCode {
        /// The command code.
        code: u8,
        /// Type of the variable being read.
        var_type: VarType,
    },

    /// More than one document record.
    #[error("File contains more than one document record.")]
    DuplicateDocument,

    /// Variable index for value labels out of range.
    #[error("Variable index {index} for value labels is not in the valid range [1,{max}].")]
    InvalidVarIndex {
        /// The 1-based index.
        index: u32,
        /// Number of variable records.
        max: usize,
    },

    /// String continuation record that does not follow a string variable.
    #[error("Long string continuation record does not follow a string variable record.")]
    ContinuationWithoutRoot,

    /// Record type 7 subtype {subtype} is too large with element size {size} and {count} elements.
    #[error(
        "Record type 7 subtype {subtype} is too large with element size {size} and {count} elements."
    )]
    ExtensionRecordTooLarge {
        /// Subtype.
        subtype: u32,
        /// Bytes per element.
        size: u32,
        /// Number of elements.
        count: u32,
    },

    /// Unexpected end of file in an uncompressed case.
    #[error("Unexpected end of file {case_ofs} bytes into case {case_number} with expected length {case_len} bytes.")]
    EofInCase {
        /// Bytes of the case already read.
        case_ofs: u64,
        /// Bytes per case.
        case_len: usize,
        /// Which case, counting from 1.
        case_number: u64,
    },

    /// Unexpected end of file in a compressed case.
    #[error(
        "Unexpected end of file {case_ofs} bytes and {n_chunks} compression chunks into compressed case {case_number}."
    )]
    EofInCompressedCase {
        /// Bytes of the case already read.
        case_ofs: u64,
        /// Number of values already decoded.
        n_chunks: usize,
        /// Which case, counting from 1.
        case_number: u64,
    },

    /// File header says it contains {expected} cases, but {actual} cases were read.
    #[error("File header says it contains {expected} cases, but {actual} cases were read.")]
    WrongNumberOfCases {
        /// Count from the header.
        expected: u64,
        /// Count actually read.
        actual: u64,
    },

    /// I/O error.
    #[error("I/O error ({0})")]
    Io(#[source] IoError),

    /// The input ended in the middle of a record.
    #[error("Unexpected end of file.")]
    UnexpectedEof,
}

impl From<IoError> for ErrorDetails {
    fn from(value: IoError) -> Self {
        match value.kind() {
            ErrorKind::UnexpectedEof => Self::UnexpectedEof,
            _ => Self::Io(value),
        }
    }
}

/// A warning reading a system file.
///
/// Reading continues after a warning.
#[derive(Debug)]
pub struct Warning {
    /// File offsets involved, when known.
    pub offsets: Option<Range<u64>>,

    /// What was noticed.
    pub details: WarningDetails,
}

impl std::error::Error for Warning {}

impl Warning {
    /// Creates a warning at `offsets`.
    pub fn new(offsets: Option<Range<u64>>, details: impl Into<WarningDetails>) -> Self {
        Self {
            offsets,
            details: details.into(),
        }
    }
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if let Some(offsets) = &self.offsets {
            if offsets.end > offsets.start.wrapping_add(1) {
                write!(
                    f,
                    "Warning at file offsets {:#x} to {:#x}: ",
                    offsets.start, offsets.end
                )?;
            } else if !offsets.is_empty() {
                write!(f, "Warning at file offset {:#x}: ", offsets.start)?;
            }
        }
        write!(f, "{}", &self.details)
    }
}

/// What was noticed, for a [Warning].
#[derive(ThisError, Debug)]
pub enum WarningDetails {
    /// From the header.
    #[error("In file header: {0}")]
    Header(#[from] HeaderWarning),

    /// From a variable record.
    #[error("In variable record: {0}")]
    Variable(#[from] VariableWarning),

    /// From extension record framing.
    #[error("In extension record: {0}")]
    Extension(#[from] ExtensionWarning),

    /// From a value label record.
    #[error("In value label record: {0}")]
    ValueLabel(#[from] ValueLabelWarning),

    /// From subtype 21.
    #[error("In long string value label record: {0}")]
    LongStringValueLabel(#[from] LongStringValueLabelWarning),

    /// From subtype 13.
    #[error("In long variable name record: {0}")]
    LongName(#[from] LongNameWarning),

    /// From subtype 14.
    #[error("In very long string record: {0}")]
    VeryLongString(#[from] VeryLongStringWarning),

    /// From subtype 11.
    #[error("In variable display record: {0}")]
    VariableDisplay(#[from] VariableDisplayWarning),

    /// Warning for compressed case data.
    #[error("In compressed data: {0}")]
    Compression(#[from] CompressionWarning),

    /// A record that should appear at most once appeared more than once.
    #[error("File contains multiple {0} records.  Using the first one.")]
    MoreThanOne(&'static str),

    /// Bad encoding name.
    #[error("Encoding record contains an encoding name that is not valid UTF-8.")]
    BadEncodingName,

    /// Bytes that are not valid in the file's encoding.
    #[error("Text string contains invalid bytes for {encoding} encoding: {text:?}")]
    MalformedString {
        /// The encoding.
        encoding: String,
        /// The problematic string, with replacement characters.
        text: String,
    },

    /// Encoding error.
    #[error(transparent)]
    EncodingError(#[from] EncodingError),
}

impl From<IoError> for WarningDetails {
    fn from(_source: IoError) -> Self {
        Self::Extension(ExtensionWarning::UnexpectedEndOfData)
    }
}

/// One dictionary record, parsed but not interpreted.
#[derive(Clone, Debug, Serialize)]
pub enum Record {
    /// Variable record.
    ///
    /// Strings wider than 8 bytes get extra continuation records, one per
    /// further 8 bytes.
    Variable(VariableRecord),

    /// Value labels for numeric and short string variables, together with the
    /// indexes of the variables that they apply to.
    ValueLabel(ValueLabelRecord),

    /// Document record.
    Document(DocumentRecord),

    /// Integer info record.
    IntegerInfo(IntegerInfo),

    /// Subtype 4.
    FloatInfo(FloatInfo),

    /// Subtype 11.
    VarDisplay(VarDisplayRecord),

    /// Multiple response set record, kept as undecoded text.
    MultipleResponse(TextRecord),

    /// Long variable names.
    LongNames(RawLongNamesRecord),

    /// Subtype 14, declaring strings wider than 255 bytes.
    VeryLongStrings(RawVeryLongStringsRecord),

    /// Encoding record.
    ///
    /// Subtype 20.  It governs every string in the file, including
    /// those in earlier records.
    Encoding(EncodingRecord),

    /// Subtype 21.
    LongStringValueLabels(LongStringValueLabelRecord),

    /// Any other extension record, kept as is.
    OtherExtension(Extension),

    /// End of the dictionary.
    EndOfHeaders(u32),
}

impl Record {
    /// Returns the encoding record, if this is one.
    pub fn as_encoding_record(&self) -> Option<&EncodingRecord> {
        match self {
            Record::Encoding(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the inner [IntegerInfo], if any.
    pub fn as_integer_info(&self) -> Option<&IntegerInfo> {
        match self {
            Record::IntegerInfo(record) => Some(record),
            _ => None,
        }
    }
}

/// Picks the encoding for the strings in `records`.
///
/// An encoding record wins.  Failing that, the code page in the integer info
/// record is used.  With neither, the default applies and `warn` hears about
/// it.  EBCDIC code pages are rejected.
pub fn infer_encoding(
    records: &[Record],
    warn: &mut dyn FnMut(Warning),
) -> Result<&'static Encoding, Error> {
    let encoding = records
        .iter()
        .find_map(Record::as_encoding_record)
        .map(|record| record.0.as_str());
    let character_code = records
        .iter()
        .find_map(Record::as_integer_info)
        .map(|record| record.character_code);
    match get_encoding(encoding, character_code) {
        Ok(encoding) => Ok(encoding),
        Err(EncodingError::Ebcdic) => Err(Error::new(None, ErrorDetails::Ebcdic)),
        Err(error) => {
            warn(Warning::new(None, error));
            Ok(default_encoding())
        }
    }
}

/// Decodes strings with a fixed [Encoding], reporting bad bytes as warnings.
pub struct Decoder<'a> {
    /// Encoding of every string in the file.
    pub encoding: &'static Encoding,

    /// Used to report [Warning]s during decoding.
    pub warn: &'a mut dyn FnMut(Warning),
}

impl<'a> Decoder<'a> {
    /// Constructs a decoder for `encoding` that reports problems with `warn`.
    pub fn new(encoding: &'static Encoding, warn: &'a mut dyn FnMut(Warning)) -> Self {
        Self { encoding, warn }
    }

    /// Reports `warning`.
    pub fn warn(&mut self, warning: Warning) {
        (self.warn)(warning)
    }

    /// Decodes `input`, warning about and replacing malformed sequences.
    pub fn decode_slice<'b>(&mut self, input: &'b [u8]) -> Cow<'b, str> {
        let (output, malformed) = self.encoding.decode_without_bom_handling(input);
        if malformed {
            self.warn(Warning::new(
                None,
                WarningDetails::MalformedString {
                    encoding: self.encoding.name().into(),
                    text: output.clone().into(),
                },
            ));
        }
        output
    }

    /// Decodes `input`.
    pub fn decode<'b>(&mut self, input: &'b ByteString) -> Cow<'b, str> {
        self.decode_slice(input.as_bytes())
    }

    /// Decodes `input` after dropping its trailing spaces.
    pub fn decode_trimmed(&mut self, input: &[u8]) -> String {
        self.decode_slice(trim_end_spaces(input)).into_owned()
    }
}

/// System file type, inferred from its "magic number".
///
/// These are the first four bytes of the file.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Magic {
    /// Regular system file.
    Sav,

    /// System file with ZLIB-compressed data.
    Zsav,

    /// `$FL2` written in EBCDIC.
    Ebcdic,
}

impl Magic {
    /// `$FL2`.
    pub const SAV: [u8; 4] = *b"$FL2";

    /// Magic number for a system file that contains ZLIB-compressed data.
    pub const ZSAV: [u8; 4] = *b"$FL3";

    /// Magic number for an EBCDIC-encoded system file.  This is `$FL2` encoded
    /// in EBCDIC.
    pub const EBCDIC: [u8; 4] = [0x5b, 0xc6, 0xd3, 0xf2];
}

impl Debug for Magic {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let s = match *self {
            Magic::Sav => "$FL2",
            Magic::Zsav => "$FL3",
            Magic::Ebcdic => "($FL2 in EBCDIC)",
        };
        write!(f, "{s}")
    }
}

impl TryFrom<[u8; 4]> for Magic {
    type Error = ErrorDetails;

    fn try_from(value: [u8; 4]) -> Result<Self, Self::Error> {
        match value {
            Magic::SAV => Ok(Magic::Sav),
            Magic::ZSAV => Ok(Magic::Zsav),
            Magic::EBCDIC => Ok(Magic::Ebcdic),
            _ => Err(ErrorDetails::BadMagic(value)),
        }
    }
}

/// Width code from a variable record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RawWidth {
    /// String continuation.
    ///
    /// Placeholder record for each 8 bytes of a string beyond the
    /// first 8.
    Continuation,

    /// Numeric.
    Numeric,

    /// String, with a width in `1..=255`.
    String(u8),
}

impl RawWidth {
    /// Returns the number of 8-byte chunks that a variable with this width
    /// occupies, or `None` for a continuation.
    pub fn n_chunks(&self) -> Option<usize> {
        match self {
            RawWidth::Numeric => Some(1),
            RawWidth::String(width) => Some((*width as usize).div_ceil(8)),
            RawWidth::Continuation => None,
        }
    }
}

impl TryFrom<i32> for RawWidth {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Continuation),
            0 => Ok(Self::Numeric),
            1..=255 => Ok(Self::String(value as u8)),
            _ => Err(()),
        }
    }
}

impl TryFrom<RawWidth> for VarWidth {
    type Error = ();

    fn try_from(value: RawWidth) -> Result<Self, Self::Error> {
        match value {
            RawWidth::Continuation => Err(()),
            RawWidth::Numeric => Ok(Self::Numeric),
            RawWidth::String(width) => Ok(Self::String(width as u16)),
        }
    }
}

impl Display for RawWidth {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RawWidth::Continuation => write!(f, "long string continuation"),
            RawWidth::Numeric => write!(f, "numeric"),
            RawWidth::String(width) => write!(f, "{width}-byte string"),
        }
    }
}

/// 8 bytes that are either a number or a string slice.
///
/// Value labels are stored this way until the type of the variables that they
/// label is known.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct UntypedDatum(pub [u8; 8]);

impl UntypedDatum {
    /// Interprets this datum as a value of type `var_type`.
    pub fn to_raw(self, var_type: VarType, endian: Endian) -> RawDatum {
        match var_type {
            VarType::Numeric => RawDatum::Number(endian.parse(self.0)),
            VarType::String => RawDatum::String(ByteString::from(self.0)),
        }
    }
}

impl Debug for UntypedDatum {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{:02x?}/{:?}", self.0, ByteString::from(self.0))
    }
}

impl Serialize for UntypedDatum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// A number, or a string in an unknown character encoding.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum RawDatum {
    /// Number, or `None` for the system-missing value.
    Number(Option<f64>),

    /// String, not yet decoded.
    String(ByteString),
}

impl RawDatum {
    /// Returns the type of this datum.
    pub fn var_type(&self) -> VarType {
        match self {
            RawDatum::Number(_) => VarType::Numeric,
            RawDatum::String(_) => VarType::String,
        }
    }

    /// Decodes this datum into a [Datum] using `decoder`, dropping trailing
    /// spaces from strings.
    pub fn decode(&self, decoder: &mut Decoder) -> Datum {
        match self {
            RawDatum::Number(number) => Datum::Number(*number),
            RawDatum::String(string) => Datum::String(decoder.decode_trimmed(string.as_bytes())),
        }
    }
}

pub(crate) fn read_bytes<const N: usize, R: Read>(r: &mut R) -> Result<[u8; N], IoError> {
    let mut buf = [0; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn read_vec<R: Read>(r: &mut R, n: usize) -> Result<Vec<u8>, IoError> {
    let mut vec = vec![0; n];
    r.read_exact(&mut vec)?;
    Ok(vec)
}

/// Reads a 32-bit length followed by that many bytes.
pub(crate) fn read_string<R: Read>(r: &mut R, endian: Endian) -> Result<ByteString, IoError> {
    let length: u32 = endian.parse(read_bytes(r)?);
    Ok(read_vec(r, length as usize)?.into())
}

/// The widths of the variable records in a system file, in order.
///
/// Some parts of a system file refer to variables by 1-based index into the
/// sequence of variable records, which includes a record for each string
/// continuation.  [VarTypes] allows this kind of lookup.
#[derive(Clone, Debug, Default)]
pub struct VarTypes {
    widths: Vec<RawWidth>,
}

impl VarTypes {
    /// Constructs a new, empty [VarTypes].
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `width`.  Fails if `width` is a string continuation that does
    /// not follow a string or another continuation.
    pub fn push(&mut self, width: RawWidth) -> Result<(), ErrorDetails> {
        if width == RawWidth::Continuation
            && !matches!(
                self.widths.last(),
                Some(RawWidth::String(_) | RawWidth::Continuation)
            )
        {
            return Err(ErrorDetails::ContinuationWithoutRoot);
        }
        self.widths.push(width);
        Ok(())
    }

    /// Returns the number of variable records.
    pub fn len(&self) -> usize {
        self.widths.len()
    }

    /// Returns true if there are no variable records.
    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    /// Returns the width of the record with 1-based `index`, if it is in
    /// range.
    pub fn get(&self, index: usize) -> Option<RawWidth> {
        self.widths.get(index.checked_sub(1)?).copied()
    }

    /// Returns the number of variable records that are not continuations.
    pub fn n_vars(&self) -> usize {
        self.widths
            .iter()
            .filter(|width| **width != RawWidth::Continuation)
            .count()
    }
}

enum ReaderState {
    Dictionary,
    Done,
}

/// Reads the records in a system file's dictionary in their raw form.
pub struct Reader<'a, S> {
    reader: ChunkReader<S>,
    warn: Box<dyn FnMut(Warning) + 'a>,

    header: FileHeader,
    var_types: VarTypes,

    state: ReaderState,
    has_document: bool,
    first_case_offset: Option<u64>,
}

impl<'a, S> Reader<'a, S>
where
    S: ByteSource,
{
    /// Reads the file header from `reader` and returns a [Reader] positioned
    /// at the first record after it.  Any warnings encountered while reading
    /// the system file will be reported with `warn`.
    pub fn new(mut reader: ChunkReader<S>, mut warn: impl FnMut(Warning) + 'a) -> Result<Self, Error> {
        let header = FileHeader::read(&mut reader, &mut warn)?;
        debug!(
            "{:?}-endian system file, layout code {}, compression {:?}, bias {}",
            header.endian, header.layout_code, header.compression, header.bias
        );
        Ok(Self {
            reader,
            warn: Box::new(warn),
            header,
            var_types: VarTypes::new(),
            state: ReaderState::Dictionary,
            has_document: false,
            first_case_offset: None,
        })
    }

    /// The header parsed when the reader was opened.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Returns the widths of the variable records read so far.
    pub fn var_types(&self) -> &VarTypes {
        &self.var_types
    }

    /// Returns the offset of the first byte of case data, once the whole
    /// dictionary has been read.
    pub fn first_case_offset(&self) -> Option<u64> {
        self.first_case_offset
    }

    /// Returns an iterator over the dictionary's records.
    pub fn records<'b>(&'b mut self) -> Records<'a, 'b, S> {
        Records(self)
    }

    /// Breaks this reader into the underlying reader, positioned just after
    /// the records read so far, the file header, and the warning callback.
    pub fn into_parts(self) -> (ChunkReader<S>, FileHeader, Box<dyn FnMut(Warning) + 'a>) {
        (self.reader, self.header, self.warn)
    }

    fn finish(&mut self) {
        let offset = self.reader.position();
        debug!("dictionary ends, case data starts at offset {offset:#x}");
        self.state = ReaderState::Done;
        self.first_case_offset = Some(offset);
    }
}

/// Reads raw records from a system file's dictionary.
pub struct Records<'a, 'b, S>(&'b mut Reader<'a, S>);

impl<'a, 'b, S> Records<'a, 'b, S>
where
    S: ByteSource,
{
    fn next_inner(&mut self) -> Result<Option<Record>, Error> {
        let this = &mut *self.0;
        let endian = this.header.endian;
        loop {
            if let ReaderState::Done = this.state {
                return Ok(None);
            }
            let offset = this.reader.position();
            let rec_type: u32 = match this.reader.peek_array() {
                Ok(bytes) => endian.parse(bytes),
                Err(error) if error.kind() == ErrorKind::UnexpectedEof => {
                    this.finish();
                    return Ok(None);
                }
                Err(error) => return Err(Error::new(Some(offset..offset + 4), error.into())),
            };
            let record = match rec_type {
                2 => {
                    this.reader.skip(4)?;
                    let record = VariableRecord::read(&mut this.reader, endian, &mut this.warn)?;
                    this.var_types
                        .push(record.width)
                        .map_err(|details| Error::new(Some(record.offsets.clone()), details))?;
                    Some(Record::Variable(record))
                }
                3 => {
                    this.reader.skip(4)?;
                    ValueLabelRecord::read(&mut this.reader, endian, &this.var_types, &mut this.warn)?
                        .map(Record::ValueLabel)
                }
                6 => {
                    if this.has_document {
                        return Err(Error::new(
                            Some(offset..offset + 4),
                            ErrorDetails::DuplicateDocument,
                        ));
                    }
                    this.has_document = true;
                    this.reader.skip(4)?;
                    Some(Record::Document(DocumentRecord::read(&mut this.reader, endian)?))
                }
                7 => {
                    this.reader.skip(4)?;
                    Extension::read(&mut this.reader, endian, &this.var_types, &mut this.warn)?
                }
                999 => {
                    this.reader.skip(4)?;
                    let filler: u32 = endian.parse(this.reader.read_array()?);
                    this.finish();
                    Some(Record::EndOfHeaders(filler))
                }
                _ => {
                    debug!("record type {rec_type} at offset {offset:#x} implicitly ends the dictionary");
                    this.finish();
                    None
                }
            };
            if let Some(record) = record {
                debug!("record type {rec_type} at offset {offset:#x}: {}", record_name(&record));
                return Ok(Some(record));
            }
        }
    }
}

fn record_name(record: &Record) -> &'static str {
    match record {
        Record::Variable(_) => "variable",
        Record::ValueLabel(_) => "value labels",
        Record::Document(_) => "document",
        Record::IntegerInfo(_) => "integer info",
        Record::FloatInfo(_) => "floating point info",
        Record::VarDisplay(_) => "variable display",
        Record::MultipleResponse(_) => "multiple response sets",
        Record::LongNames(_) => "long variable names",
        Record::VeryLongStrings(_) => "very long strings",
        Record::Encoding(_) => "encoding",
        Record::LongStringValueLabels(_) => "long string value labels",
        Record::OtherExtension(_) => "unknown extension",
        Record::EndOfHeaders(_) => "end of dictionary",
    }
}

impl<'a, 'b, S> Iterator for Records<'a, 'b, S>
where
    S: ByteSource,
{
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_inner() {
            Ok(record) => record.map(Ok),
            Err(error) => {
                self.0.state = ReaderState::Done;
                Some(Err(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use binrw::Endian;

    use crate::{
        endian::ToBytes,
        sys::raw::{ErrorDetails, Magic, RawDatum, RawWidth, UntypedDatum, VarTypes},
        variable::{VarType, VarWidth},
    };

    #[test]
    fn raw_widths() {
        assert_eq!(RawWidth::try_from(-1), Ok(RawWidth::Continuation));
        assert_eq!(RawWidth::try_from(0), Ok(RawWidth::Numeric));
        assert_eq!(RawWidth::try_from(255), Ok(RawWidth::String(255)));
        assert_eq!(RawWidth::try_from(256), Err(()));
        assert_eq!(RawWidth::try_from(-2), Err(()));
        assert_eq!(RawWidth::String(9).n_chunks(), Some(2));
        assert_eq!(VarWidth::try_from(RawWidth::String(9)), Ok(VarWidth::String(9)));
        assert_eq!(VarWidth::try_from(RawWidth::Continuation), Err(()));
    }

    #[test]
    fn var_types() {
        let mut var_types = VarTypes::new();
        assert!(matches!(
            var_types.push(RawWidth::Continuation),
            Err(ErrorDetails::ContinuationWithoutRoot)
        ));
        var_types.push(RawWidth::Numeric).unwrap();
        assert!(var_types.push(RawWidth::Continuation).is_err());
        var_types.push(RawWidth::String(20)).unwrap();
        var_types.push(RawWidth::Continuation).unwrap();
        var_types.push(RawWidth::Continuation).unwrap();
        var_types.push(RawWidth::Numeric).unwrap();
        assert_eq!(var_types.len(), 5);
        assert_eq!(var_types.n_vars(), 3);
        assert_eq!(var_types.get(0), None);
        assert_eq!(var_types.get(2), Some(RawWidth::String(20)));
        assert_eq!(var_types.get(3), Some(RawWidth::Continuation));
        assert_eq!(var_types.get(6), None);
    }

    #[test]
    fn magic() {
        assert_eq!(Magic::try_from(*b"$FL2").unwrap(), Magic::Sav);
        assert_eq!(Magic::try_from(*b"$FL3").unwrap(), Magic::Zsav);
        assert_eq!(
            Magic::try_from([0x5b, 0xc6, 0xd3, 0xf2]).unwrap(),
            Magic::Ebcdic
        );
        assert!(matches!(
            Magic::try_from(*b"PK\x03\x04"),
            Err(ErrorDetails::BadMagic(_))
        ));
    }

    #[test]
    fn untyped_datum() {
        for endian in [Endian::Little, Endian::Big] {
            let number = UntypedDatum(endian.to_bytes(1.5f64));
            assert_eq!(
                number.to_raw(VarType::Numeric, endian),
                RawDatum::Number(Some(1.5))
            );
            let sysmis = UntypedDatum(endian.to_bytes(-f64::MAX));
            assert_eq!(sysmis.to_raw(VarType::Numeric, endian), RawDatum::Number(None));
        }
        let string = UntypedDatum(*b"abc     ");
        assert_eq!(
            string.to_raw(VarType::String, Endian::Little),
            RawDatum::String("abc     ".into())
        );
    }
}
