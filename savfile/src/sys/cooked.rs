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

use std::{fs::File, io::Read, path::Path};

use chrono::{NaiveDate, NaiveTime};
use encoding_rs::Encoding;
use log::debug;

use crate::{
    data::Datum,
    dictionary::{Dictionary, FileInfo, Header, ValueLabel, ValueLabelSet},
    format::{Error as FormatError, Format, RawFormat},
    sys::{
        cases::Cases,
        chunk::ChunkReader,
        command::CommandReader,
        raw::{
            self, infer_encoding,
            records::{
                DocumentRecord, EncodingRecord, ExtensionWarning, FileHeader, FloatInfo,
                HeaderWarning, IntegerInfo, LongNameWarning, LongStringValueLabelRecord,
                LongStringValueLabelWarning, RawLongNamesRecord, RawVeryLongStringsRecord,
                TextRecord, ValueLabelRecord, ValueLabelWarning, VarDisplayRecord,
                VariableRecord, VariableWarning, VeryLongStringWarning,
            },
            Decoder, Error, RawWidth, Record, Warning, WarningDetails,
        },
        source::{ByteSource, ReadSource},
    },
    variable::{Alignment, Measure, MissingValues, Segment, VarType, VarWidth, Variable},
};

/// Options for reading a system file.
///
/// ```no_run
/// use savfile::sys::ReaderOptions;
///
/// let system_file = ReaderOptions::new()
///     .with_strict_compression(true)
///     .open_file("survey.sav", |warning| eprintln!("{warning}"))?;
/// for case in system_file.cases {
///     println!("{:?}", case?);
/// }
/// # Ok::<(), savfile::sys::raw::Error>(())
/// ```
#[derive(Copy, Clone, Debug)]
pub struct ReaderOptions {
    /// Character encoding for text in the system file.
    ///
    /// If not set, the character encoding is determined from the file's
    /// contents.
    pub encoding: Option<&'static Encoding>,

    /// Number of bytes to read from the source at a time.
    ///
    /// If not set, files are read a megabyte at a time and other sources a
    /// kilobyte at a time.
    pub chunk_size: Option<usize>,

    /// Whether command codes that do not fit the type of the value being
    /// decompressed are errors (if true) or warnings (if false).
    pub strict_compression: bool,

    /// Whether to report an error if the number of cases differs from the
    /// number in the file header.
    pub check_case_count: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            encoding: None,
            chunk_size: None,
            strict_compression: false,
            check_case_count: true,
        }
    }
}

impl ReaderOptions {
    /// Construct a new `ReaderOptions` with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Causes the file to be read using the specified `encoding`, instead of
    /// the encoding that the file declares.
    pub fn with_encoding(self, encoding: &'static Encoding) -> Self {
        Self {
            encoding: Some(encoding),
            ..self
        }
    }

    /// Reads the source `chunk_size` bytes at a time.
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Self {
            chunk_size: Some(chunk_size),
            ..self
        }
    }

    /// Sets whether unexpected compression codes are errors.
    pub fn with_strict_compression(self, strict_compression: bool) -> Self {
        Self {
            strict_compression,
            ..self
        }
    }

    /// Sets whether to check the number of cases against the file header.
    pub fn with_case_count_check(self, check_case_count: bool) -> Self {
        Self {
            check_case_count,
            ..self
        }
    }

    /// Opens the file at `path`, reporting warnings with `warn`.
    pub fn open_file<'a, P>(
        self,
        path: P,
        warn: impl FnMut(Warning) + 'a,
    ) -> Result<SystemFile<'a>, Error>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path)?;
        self.open(
            Box::new(ReadSource::new(file)),
            ChunkReader::<Box<dyn ByteSource + 'a>>::FILE_CHUNK_SIZE,
            warn,
        )
    }

    /// Opens the file at `path`, logging warnings with [log::warn].
    pub fn open_file_logged<P>(self, path: P) -> Result<SystemFile<'static>, Error>
    where
        P: AsRef<Path>,
    {
        self.open_file(path, log_warning)
    }

    /// Reads a system file from `reader`, reporting warnings with `warn`.
    pub fn open_reader<'a, R>(
        self,
        reader: R,
        warn: impl FnMut(Warning) + 'a,
    ) -> Result<SystemFile<'a>, Error>
    where
        R: Read + 'a,
    {
        self.open_source(ReadSource::new(reader), warn)
    }

    /// Reads a system file from `reader`, logging warnings with [log::warn].
    pub fn open_reader_logged<'a, R>(self, reader: R) -> Result<SystemFile<'a>, Error>
    where
        R: Read + 'a,
    {
        self.open_reader(reader, log_warning)
    }

    /// Reads a system file from `source`, reporting warnings with `warn`.
    pub fn open_source<'a, S>(
        self,
        source: S,
        warn: impl FnMut(Warning) + 'a,
    ) -> Result<SystemFile<'a>, Error>
    where
        S: ByteSource + 'a,
    {
        self.open(
            Box::new(source),
            ChunkReader::<Box<dyn ByteSource + 'a>>::STREAM_CHUNK_SIZE,
            warn,
        )
    }

    fn open<'a>(
        self,
        source: Box<dyn ByteSource + 'a>,
        default_chunk_size: usize,
        warn: impl FnMut(Warning) + 'a,
    ) -> Result<SystemFile<'a>, Error> {
        let chunk_reader = ChunkReader::new(source, self.chunk_size.unwrap_or(default_chunk_size));
        let mut reader = raw::Reader::new(chunk_reader, warn)?;
        let records = reader.records().collect::<Result<Vec<_>, _>>()?;
        let (chunk_reader, file_header, mut warn) = reader.into_parts();
        let first_case_offset = chunk_reader.position();

        let encoding = match self.encoding {
            Some(encoding) => encoding,
            None => infer_encoding(&records, &mut warn)?,
        };
        debug!("decoding text as {}", encoding.name());

        let headers = Headers::new(records, &mut warn);
        let dictionary = headers.decode(file_header, encoding, first_case_offset, &mut warn);

        let expected_cases = self
            .check_case_count
            .then_some(dictionary.header.n_cases)
            .flatten()
            .map(u64::from);
        let command_reader = CommandReader::new(
            chunk_reader,
            dictionary.header.endian,
            dictionary.header.compression,
            dictionary.header.bias,
            self.strict_compression,
        );
        let cases = Cases::new(
            command_reader,
            &dictionary.variables,
            encoding,
            warn,
            expected_cases,
        );
        Ok(SystemFile { dictionary, cases })
    }
}

fn log_warning(warning: Warning) {
    log::warn!("{warning}");
}

/// A system file opened with [ReaderOptions].
#[derive(Debug)]
pub struct SystemFile<'a> {
    /// The system file dictionary.
    pub dictionary: Dictionary,

    /// The data in the system file.
    pub cases: Cases<'a>,
}

impl<'a> SystemFile<'a> {
    /// Returns the individual parts of the [SystemFile].
    pub fn into_parts(self) -> (Dictionary, Cases<'a>) {
        (self.dictionary, self.cases)
    }
}

/// The records in a system file's dictionary, sorted by kind.
#[derive(Clone, Debug, Default)]
struct Headers {
    variable: Vec<VariableRecord>,
    value_label: Vec<ValueLabelRecord>,
    document: Option<DocumentRecord>,
    integer_info: Option<IntegerInfo>,
    float_info: Option<FloatInfo>,
    var_display: Option<VarDisplayRecord>,
    multiple_response: Vec<TextRecord>,
    long_names: Vec<RawLongNamesRecord>,
    very_long_strings: Vec<RawVeryLongStringsRecord>,
    long_string_value_labels: Vec<LongStringValueLabelRecord>,
}

fn take_first<T>(
    vec: Vec<T>,
    record_name: &'static str,
    warn: &mut dyn FnMut(Warning),
) -> Option<T> {
    if vec.len() > 1 {
        warn(Warning::new(None, WarningDetails::MoreThanOne(record_name)));
    }
    vec.into_iter().next()
}

impl Headers {
    fn new(records: Vec<Record>, warn: &mut dyn FnMut(Warning)) -> Self {
        let mut headers = Headers::default();
        let mut document = Vec::new();
        let mut integer_info = Vec::new();
        let mut float_info = Vec::new();
        let mut var_display = Vec::new();
        let mut encoding: Vec<EncodingRecord> = Vec::new();
        let mut n_other = 0;

        for record in records {
            match record {
                Record::Variable(record) => headers.variable.push(record),
                Record::ValueLabel(record) => headers.value_label.push(record),
                Record::Document(record) => document.push(record),
                Record::IntegerInfo(record) => integer_info.push(record),
                Record::FloatInfo(record) => float_info.push(record),
                Record::VarDisplay(record) => var_display.push(record),
                Record::MultipleResponse(record) => headers.multiple_response.push(record),
                Record::LongNames(record) => headers.long_names.push(record),
                Record::VeryLongStrings(record) => headers.very_long_strings.push(record),
                Record::Encoding(record) => encoding.push(record),
                Record::LongStringValueLabels(record) => {
                    headers.long_string_value_labels.push(record)
                }
                Record::OtherExtension(_) => n_other += 1,
                Record::EndOfHeaders(_) => (),
            }
        }
        if n_other > 0 {
            debug!("ignored {n_other} unrecognized extension records");
        }

        headers.document = take_first(document, "document", warn);
        headers.integer_info = take_first(integer_info, "integer info", warn);
        headers.float_info = take_first(float_info, "float info", warn);
        headers.var_display = take_first(var_display, "variable display", warn);
        take_first(encoding, "encoding", warn);
        headers
    }

    fn decode(
        self,
        file_header: FileHeader,
        encoding: &'static Encoding,
        first_case_offset: u64,
        warn: &mut dyn FnMut(Warning),
    ) -> Dictionary {
        let mut decoder = Decoder::new(encoding, warn);
        let endian = file_header.endian;

        let header = decode_header(&file_header, &mut decoder);

        let documents = self
            .document
            .iter()
            .flat_map(|record| record.lines.iter())
            .map(|line| decoder.decode_trimmed(line.as_bytes()))
            .collect();

        if let Some(integer_info) = &self.integer_info {
            if integer_info.floating_point_rep != 1 {
                decoder.warn(Warning::new(
                    None,
                    ExtensionWarning::UnexpectedFloatFormat(integer_info.floating_point_rep),
                ));
            }
            let expected = match endian {
                binrw::Endian::Big => 1,
                binrw::Endian::Little => 2,
            };
            if integer_info.endianness != expected {
                decoder.warn(Warning::new(
                    None,
                    ExtensionWarning::UnexpectedEndianness {
                        actual: integer_info.endianness,
                        expected,
                    },
                ));
            }
        }

        // Logical variables, and the 0-based index of the variable record that
        // starts each one.
        let mut variables = Vec::new();
        let mut root_indexes = Vec::new();
        let var_displays = self
            .var_display
            .map(|record| record.0)
            .unwrap_or_default();
        for (index, record) in self.variable.iter().enumerate() {
            let Ok(width) = VarWidth::try_from(record.width) else {
                continue;
            };
            let n_continuations = self.variable[index + 1..]
                .iter()
                .take_while(|record| record.width == RawWidth::Continuation)
                .count();
            let display = var_displays.get(variables.len()).cloned().unwrap_or_default();
            variables.push(decode_variable(
                record,
                width,
                n_continuations + 1,
                display.measure,
                display.width,
                display.alignment,
                &mut decoder,
            ));
            root_indexes.push(index);
        }

        // Very long strings absorb the segments that follow them.
        let very_long_strings = self
            .very_long_strings
            .iter()
            .flat_map(|record| record.decode(&mut decoder))
            .collect::<Vec<_>>();
        for vls in very_long_strings {
            let Some(index) = variables
                .iter()
                .position(|variable| variable.short_name.eq_ignore_ascii_case(&vls.short_name))
                .filter(|index| variables[*index].width.is_string())
            else {
                decoder.warn(Warning::new(
                    None,
                    VeryLongStringWarning::UnknownVariable(vls.short_name),
                ));
                continue;
            };
            let n_segments = VarWidth::String(vls.length).n_segments();
            if index + n_segments > variables.len() {
                decoder.warn(Warning::new(
                    None,
                    VeryLongStringWarning::NotEnoughSegments {
                        short_name: vls.short_name,
                        width: vls.length,
                        n_segments,
                        available: variables.len() - index,
                    },
                ));
                continue;
            }
            let children = variables
                .drain(index + 1..index + n_segments)
                .flat_map(|child| child.segments)
                .collect::<Vec<_>>();
            root_indexes.drain(index + 1..index + n_segments);
            let head = &mut variables[index];
            head.segments.extend(children);
            head.width = VarWidth::String(vls.length);
        }

        // The weight index counts variable records, so resolve it before
        // renaming anything.
        let weight = file_header.weight_index.and_then(|weight_index| {
            let record_index = weight_index as usize - 1;
            if record_index >= self.variable.len() {
                decoder.warn(Warning::new(
                    Some(0..176),
                    HeaderWarning::WeightIndexOutOfRange {
                        index: weight_index,
                        max_index: self.variable.len(),
                    },
                ));
                return None;
            }
            let Some(index) = root_indexes.iter().position(|root| *root == record_index) else {
                decoder.warn(Warning::new(
                    Some(0..176),
                    HeaderWarning::WeightIndexContinuation(weight_index),
                ));
                return None;
            };
            if variables[index].var_type() == VarType::String {
                decoder.warn(Warning::new(
                    Some(0..176),
                    HeaderWarning::StringWeight(variables[index].short_name.clone()),
                ));
                return None;
            }
            Some(index)
        });

        for long_names in &self.long_names {
            for long_name in long_names.decode(&mut decoder) {
                match variables.iter_mut().find(|variable| {
                    variable
                        .short_name
                        .eq_ignore_ascii_case(&long_name.short_name)
                }) {
                    Some(variable) => variable.name = long_name.long_name,
                    None => decoder.warn(Warning::new(
                        Some(long_names.0.offsets.clone()),
                        LongNameWarning::UnknownShortName(long_name.short_name),
                    )),
                }
            }
        }

        let mut value_labels = Vec::new();
        for record in &self.long_string_value_labels {
            for set in &record.labels {
                let var_name = decoder.decode_trimmed(set.var_name.as_bytes());
                let Some(variable) = variables
                    .iter()
                    .find(|variable| variable.name.eq_ignore_ascii_case(&var_name))
                else {
                    decoder.warn(Warning::new(
                        Some(record.offsets.clone()),
                        LongStringValueLabelWarning::UnknownVariable(var_name),
                    ));
                    continue;
                };
                if variable.var_type() == VarType::Numeric {
                    decoder.warn(Warning::new(
                        Some(record.offsets.clone()),
                        LongStringValueLabelWarning::NumericVariable(var_name),
                    ));
                    continue;
                }
                let name = variable.name.clone();
                let labels = set
                    .labels
                    .iter()
                    .map(|(value, label)| ValueLabel {
                        value: Datum::String(decoder.decode_trimmed(value.as_bytes())),
                        label: decoder.decode(label).into_owned(),
                    })
                    .collect();
                value_labels.push(ValueLabelSet {
                    labels,
                    variables: vec![name],
                });
            }
        }

        for record in &self.value_label {
            let targets = record
                .dict_indexes
                .iter()
                .filter_map(|dict_index| {
                    root_indexes
                        .iter()
                        .position(|root| *root + 1 == *dict_index as usize)
                })
                .collect::<Vec<_>>();
            let Some(first) = targets.first().map(|index| &variables[*index]) else {
                continue;
            };
            let var_type = first.var_type();
            let (targets, others): (Vec<usize>, Vec<usize>) = targets
                .into_iter()
                .partition(|index| variables[*index].var_type() == var_type);
            if !others.is_empty() {
                decoder.warn(Warning::new(
                    Some(record.offsets.clone()),
                    ValueLabelWarning::MixedVarTypes {
                        first: first.name.clone(),
                        var_type,
                        others: others
                            .iter()
                            .map(|index| variables[*index].name.clone())
                            .collect(),
                    },
                ));
            }
            let labels = record
                .labels
                .iter()
                .map(|(value, label)| ValueLabel {
                    value: value.to_raw(var_type, endian).decode(&mut decoder),
                    label: decoder.decode(label).into_owned(),
                })
                .collect();
            value_labels.push(ValueLabelSet {
                labels,
                variables: targets
                    .iter()
                    .map(|index| variables[*index].name.clone())
                    .collect(),
            });
        }

        let mrsets_raw = self
            .multiple_response
            .iter()
            .map(|record| decoder.decode(&record.text).into_owned())
            .collect();

        Dictionary {
            header,
            variables,
            value_labels,
            weight,
            documents,
            file_info: FileInfo {
                integer: self.integer_info,
                float: self.float_info,
            },
            mrsets_raw,
            first_case_offset,
        }
    }
}

fn decode_header(file_header: &FileHeader, decoder: &mut Decoder) -> Header {
    let creation_date = decoder.decode_trimmed(file_header.creation_date.as_bytes());
    let date = NaiveDate::parse_from_str(creation_date.trim(), "%e %b %y")
        .inspect_err(|_| {
            decoder.warn(Warning::new(
                Some(92..101),
                HeaderWarning::InvalidCreationDate(creation_date.clone()),
            ))
        })
        .ok();
    let creation_time = decoder.decode_trimmed(file_header.creation_time.as_bytes());
    let time = NaiveTime::parse_from_str(creation_time.trim(), "%H:%M:%S")
        .inspect_err(|_| {
            decoder.warn(Warning::new(
                Some(101..109),
                HeaderWarning::InvalidCreationTime(creation_time.clone()),
            ))
        })
        .ok();
    let file_label = decoder.decode_trimmed(file_header.file_label.as_bytes());

    Header {
        product: decoder.decode_trimmed(file_header.eye_catcher.as_bytes()),
        layout_code: file_header.layout_code,
        nominal_case_size: file_header.nominal_case_size,
        compression: file_header.compression,
        bias: file_header.bias,
        weight_index: file_header.weight_index,
        n_cases: file_header.n_cases,
        creation: date.zip(time).map(|(date, time)| date.and_time(time)),
        file_label: (!file_label.is_empty()).then_some(file_label),
        endian: file_header.endian,
        encoding: decoder.encoding,
    }
}

fn decode_variable(
    record: &VariableRecord,
    width: VarWidth,
    n_chunks: usize,
    measure: Option<Measure>,
    display_width: Option<u32>,
    alignment: Option<Alignment>,
    decoder: &mut Decoder,
) -> Variable {
    let short_name = decoder.decode_trimmed(record.name.as_bytes());
    let label = record
        .label
        .as_ref()
        .map(|label| decoder.decode_trimmed(label.as_bytes()));
    let missing_values = MissingValues {
        values: record
            .missing_values
            .values
            .iter()
            .map(|value| value.decode(decoder))
            .collect(),
        range: record.missing_values.range,
    };
    let print_format = decode_format(record.print_format, width, |new_format, error| {
        decoder.warn(Warning::new(
            Some(record.offsets.clone()),
            VariableWarning::InvalidPrintFormat {
                variable: short_name.clone(),
                new_format,
                error,
            },
        ))
    });
    let write_format = decode_format(record.write_format, width, |new_format, error| {
        decoder.warn(Warning::new(
            Some(record.offsets.clone()),
            VariableWarning::InvalidWriteFormat {
                variable: short_name.clone(),
                new_format,
                error,
            },
        ))
    });
    let segment_width = match record.width {
        RawWidth::String(width) => width as u16,
        _ => 0,
    };
    Variable {
        name: short_name.clone(),
        segments: vec![Segment {
            short_name: short_name.clone(),
            width: segment_width,
            n_chunks,
        }],
        short_name,
        width,
        label,
        missing_values,
        print_format,
        write_format,
        measure,
        display_width,
        alignment: alignment.unwrap_or(Alignment::default_for_type(width.var_type())),
    }
}

fn decode_format(
    raw: RawFormat,
    width: VarWidth,
    mut warn: impl FnMut(Format, FormatError),
) -> Format {
    Format::try_from(raw)
        .and_then(|format| format.check_type_compatibility(width.var_type()))
        .unwrap_or_else(|error| {
            let new_format = Format::default_for_width(width);
            warn(new_format, error);
            new_format
        })
}

#[cfg(test)]
mod tests {
    use crate::{
        format::{Error as FormatError, Format, RawFormat, Type},
        sys::cooked::decode_format,
        variable::{VarType, VarWidth},
    };

    #[test]
    fn formats() {
        let mut errors = Vec::new();
        assert_eq!(
            decode_format(RawFormat(0x050802), VarWidth::Numeric, |_, e| errors.push(e)),
            Format::F8_2
        );
        assert_eq!(
            decode_format(RawFormat(0x011400), VarWidth::String(20), |_, e| errors.push(e)),
            Format::new(Type::A, 20, 0)
        );
        assert!(errors.is_empty());

        assert_eq!(
            decode_format(RawFormat(0x050802), VarWidth::String(4), |_, e| errors.push(e)),
            Format::new(Type::A, 4, 0)
        );
        assert_eq!(
            decode_format(RawFormat(0x0d0800), VarWidth::Numeric, |_, e| errors.push(e)),
            Format::F8_2
        );
        assert_eq!(
            errors,
            vec![
                FormatError::IncompatibleType {
                    var_type: VarType::String,
                    type_: Type::F
                },
                FormatError::UnknownFormat { value: 13 }
            ]
        );
    }
}
