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

//! Dictionaries.
//!
//! A [Dictionary] is the fully resolved description of a system file: its
//! header, its variables in order, the value labels that apply to them, and
//! the other metadata that the file carries.  It is built once, when a system
//! file is opened, and does not change afterward.

use binrw::Endian;
use chrono::NaiveDateTime;
use encoding_rs::Encoding;
use serde::Serialize;
use unicase::UniCase;

use crate::{
    data::Datum,
    sys::{
        raw::records::{Compression, FloatInfo, IntegerInfo},
        serialize_endian,
    },
    variable::{VarType, Variable},
};

/// Information from a system file's header record, decoded.
#[derive(Clone, Debug, Serialize)]
pub struct Header {
    /// Name of the product that wrote the file, with trailing spaces
    /// removed.
    pub product: String,

    /// Layout code, either 2 or 3.
    pub layout_code: u32,

    /// Number of 8-byte chunks in a case, as claimed by the header.  This is
    /// informational only, and `None` if it is implausible.
    pub nominal_case_size: Option<u32>,

    /// Compression type, if any.
    pub compression: Option<Compression>,

    /// Compression bias, usually 100.0.
    pub bias: f64,

    /// 1-based index of the weight variable's record among all of the
    /// variable records, including string continuations, or `None` if the
    /// file is unweighted.
    pub weight_index: Option<u32>,

    /// Number of cases claimed by the header, if known.
    pub n_cases: Option<u32>,

    /// Creation date and time, if they could be parsed.
    pub creation: Option<NaiveDateTime>,

    /// File label, if the file has a nonblank one.
    pub file_label: Option<String>,

    /// Byte order of the file.
    #[serde(serialize_with = "serialize_endian")]
    pub endian: Endian,

    /// Character encoding used for text in the file.
    pub encoding: &'static Encoding,
}

/// Machine information from a system file's extension records.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FileInfo {
    /// Contents of the integer info record, if present.
    pub integer: Option<IntegerInfo>,

    /// Contents of the floating-point info record, if present.
    pub float: Option<FloatInfo>,
}

/// A value and its label.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValueLabel {
    /// The value being labeled.
    pub value: Datum,

    /// The label.
    pub label: String,
}

/// A set of value labels along with the variables that they apply to.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValueLabelSet {
    /// The labels.
    pub labels: Vec<ValueLabel>,

    /// Names of the variables that the labels apply to.  Never empty.
    pub variables: Vec<String>,
}

impl ValueLabelSet {
    /// Returns the label for `value`, if there is one.
    pub fn get(&self, value: &Datum) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| &label.value == value)
            .map(|label| label.label.as_str())
    }

    /// Returns the type of the values in this set, or `None` if it has no
    /// labels.
    pub fn var_type(&self) -> Option<VarType> {
        self.labels.first().map(|label| label.value.var_type())
    }
}

/// A system file dictionary.
#[derive(Clone, Debug, Serialize)]
pub struct Dictionary {
    /// The file header.
    pub header: Header,

    /// The variables, in the order that their values appear in each case.
    pub variables: Vec<Variable>,

    /// Value label sets.
    pub value_labels: Vec<ValueLabelSet>,

    /// Index into [variables](Self::variables) of the weight variable, if
    /// any.
    pub weight: Option<usize>,

    /// Document lines, with trailing spaces removed.
    pub documents: Vec<String>,

    /// Machine information.
    pub file_info: FileInfo,

    /// Multiple response set definitions, as undecoded text, one entry per
    /// record.
    pub mrsets_raw: Vec<String>,

    /// Offset in the file of the first byte of case data.
    pub first_case_offset: u64,
}

impl Dictionary {
    /// Returns the index in [variables](Self::variables) of the variable named
    /// `name`, compared case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        let name = UniCase::new(name);
        self.variables
            .iter()
            .position(|variable| UniCase::new(variable.name.as_str()) == name)
    }

    /// Returns the variable named `name`, compared case-insensitively.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.index_of(name).map(|index| &self.variables[index])
    }

    /// Returns the weight variable, if any.
    pub fn weight_variable(&self) -> Option<&Variable> {
        self.weight.map(|index| &self.variables[index])
    }

    /// Returns the value label sets that apply to the variable named `name`.
    pub fn value_labels_for<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a ValueLabelSet> + 'a {
        let name = UniCase::new(name);
        self.value_labels.iter().filter(move |set| {
            set.variables
                .iter()
                .any(|variable| UniCase::new(variable.as_str()) == name)
        })
    }

    /// Returns the number of 8-byte chunks in each case.
    pub fn n_chunks(&self) -> usize {
        self.variables.iter().map(Variable::n_chunks).sum()
    }
}
