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

//! Individual pieces of data.
//!
//! [Datum] is the value of one [Variable] in one [Case].  Strings in the file
//! are stored in some character encoding that is not known until the whole
//! dictionary has been read, so readers hold on to them as [ByteString] until
//! then.
//!
//! [Variable]: crate::variable::Variable

// Warn about missing docs, but not for items declared with `#[cfg(test)]`.
#![cfg_attr(not(test), warn(missing_docs))]

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::Index,
};

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::{dictionary::Dictionary, variable::VarType};

/// The system-missing value, as stored in a system file.
pub const SYSMIS: f64 = -f64::MAX;

/// Returns `s` without any trailing ASCII spaces.
pub fn trim_end_spaces(mut s: &[u8]) -> &[u8] {
    while let [rest @ .., b' '] = s {
        s = rest;
    }
    s
}

/// An owned string in an unspecified character encoding.
#[derive(Clone, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub struct ByteString(pub Vec<u8>);

impl ByteString {
    /// Returns the contents as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the number of bytes in the string.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Removes any trailing ASCII spaces.
    pub fn trim_end(&mut self) {
        let len = trim_end_spaces(&self.0).len();
        self.0.truncate(len);
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(source: Vec<u8>) -> Self {
        Self(source)
    }
}

impl From<&[u8]> for ByteString {
    fn from(source: &[u8]) -> Self {
        Self(source.into())
    }
}

impl<const N: usize> From<[u8; N]> for ByteString {
    fn from(source: [u8; N]) -> Self {
        Self(source.into())
    }
}

impl From<&str> for ByteString {
    fn from(source: &str) -> Self {
        Self(source.as_bytes().into())
    }
}

impl Debug for ByteString {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        // Latin-1 makes every byte visible without guessing at an encoding.
        let s: String = self.0.iter().map(|&b| b as char).collect();
        write!(f, "{s:?}")
    }
}

impl Serialize for ByteString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        String::from_utf8_lossy(&self.0).serialize(serializer)
    }
}

/// The value of a variable in a case.
#[derive(Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Datum {
    /// A numeric value.
    Number(
        /// A number, or `None` for the system-missing value.
        Option<f64>,
    ),

    /// A string value, decoded and with trailing spaces removed.
    String(String),
}

impl Debug for Datum {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Datum::Number(Some(number)) => write!(f, "{number:?}"),
            Datum::Number(None) => write!(f, "SYSMIS"),
            Datum::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl Display for Datum {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Datum::Number(Some(number)) => write!(f, "{number}"),
            Datum::Number(None) => write!(f, "."),
            Datum::String(s) => write!(f, "{s}"),
        }
    }
}

impl Datum {
    /// Returns the number inside this datum, or `None` if this is a string.
    /// The inner `None` is the system-missing value.
    pub fn as_number(&self) -> Option<Option<f64>> {
        match self {
            Datum::Number(number) => Some(*number),
            Datum::String(_) => None,
        }
    }

    /// Returns the string inside this datum, or `None` if this is a number.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Datum::Number(_) => None,
            Datum::String(s) => Some(s),
        }
    }

    /// Returns true if this is the system-missing value.
    pub fn is_sysmis(&self) -> bool {
        matches!(self, Datum::Number(None))
    }

    /// Returns the type of this datum.
    pub fn var_type(&self) -> VarType {
        match self {
            Datum::Number(_) => VarType::Numeric,
            Datum::String(_) => VarType::String,
        }
    }
}

impl From<f64> for Datum {
    fn from(number: f64) -> Self {
        Some(number).into()
    }
}

impl From<Option<f64>> for Datum {
    fn from(value: Option<f64>) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// One case, that is, one row of data.
///
/// The values are in the same order as [Dictionary::variables].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Case(pub Vec<Datum>);

impl Case {
    /// Returns the number of values in the case.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the case has no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the values in the case.
    pub fn iter(&self) -> std::slice::Iter<'_, Datum> {
        self.0.iter()
    }

    /// Returns the value of the variable named `name` in `dictionary`.
    pub fn get(&self, dictionary: &Dictionary, name: &str) -> Option<&Datum> {
        self.0.get(dictionary.index_of(name)?)
    }

    /// Returns the case as a map from variable name to value, in dictionary
    /// order.
    pub fn to_map(&self, dictionary: &Dictionary) -> IndexMap<String, Datum> {
        dictionary
            .variables
            .iter()
            .zip(self.0.iter())
            .map(|(variable, datum)| (variable.name.clone(), datum.clone()))
            .collect()
    }

    /// Like [Case::to_map], but leaves out variables whose value is
    /// system-missing.  String values are always included.
    pub fn to_map_without_sysmis(&self, dictionary: &Dictionary) -> IndexMap<String, Datum> {
        dictionary
            .variables
            .iter()
            .zip(self.0.iter())
            .filter(|(_, datum)| !datum.is_sysmis())
            .map(|(variable, datum)| (variable.name.clone(), datum.clone()))
            .collect()
    }
}

impl Index<usize> for Case {
    type Output = Datum;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IntoIterator for Case {
    type Item = Datum;
    type IntoIter = std::vec::IntoIter<Datum>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::data::{trim_end_spaces, ByteString, Datum};

    #[test]
    fn trim() {
        assert_eq!(trim_end_spaces(b"abc  "), b"abc");
        assert_eq!(trim_end_spaces(b"   "), b"");
        assert_eq!(trim_end_spaces(b" a b"), b" a b");

        let mut s = ByteString::from("xyz     ");
        s.trim_end();
        assert_eq!(s, ByteString::from("xyz"));
    }

    #[test]
    fn datum() {
        assert!(Datum::from(None).is_sysmis());
        assert_eq!(Datum::from(2.5).as_number(), Some(Some(2.5)));
        assert_eq!(Datum::from("abc").as_string(), Some("abc"));
        assert_eq!(Datum::from(None).to_string(), ".");
    }
}
