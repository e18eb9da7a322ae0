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

//! Variables.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::Serialize;

use crate::{data::Datum, format::Format};

/// Variable type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum VarType {
    /// A numeric variable.
    Numeric,

    /// A string variable.
    ///
    /// The string width is unspecified; use [VarWidth] for type and width
    /// together.
    String,
}

impl Display for VarType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            VarType::Numeric => write!(f, "numeric"),
            VarType::String => write!(f, "string"),
        }
    }
}

/// A variable's width.
///
/// This is essentially [VarType] plus a width for [VarType::String].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum VarWidth {
    /// A numeric variable.
    Numeric,

    /// A string variable.
    String(
        /// The width of the string variable, in `1..=32767`.
        u16,
    ),
}

impl VarWidth {
    pub const MAX_STRING: u16 = 32767;

    /// Very long strings are stored as a series of segments of this many
    /// bytes each.
    pub const SEGMENT_SIZE: usize = 252;

    pub fn var_type(self) -> VarType {
        match self {
            VarWidth::Numeric => VarType::Numeric,
            VarWidth::String(_) => VarType::String,
        }
    }

    pub fn is_numeric(self) -> bool {
        self == Self::Numeric
    }

    pub fn is_string(self) -> bool {
        !self.is_numeric()
    }

    /// Returns the number of segments that a variable of this width occupies
    /// in a system file.  Strings up to 255 bytes wide always have one segment.
    pub fn n_segments(self) -> usize {
        match self {
            VarWidth::String(width) if width > 255 => {
                (width as usize).div_ceil(Self::SEGMENT_SIZE)
            }
            _ => 1,
        }
    }

    /// Returns the number of 8-byte chunks used for a variable of this width,
    /// or `None` for very long strings, which must first be divided into
    /// segments.
    pub fn n_chunks(self) -> Option<usize> {
        match self {
            VarWidth::Numeric => Some(1),
            VarWidth::String(w) if w <= 255 => Some((w as usize).div_ceil(8)),
            VarWidth::String(_) => None,
        }
    }
}

impl From<VarWidth> for VarType {
    fn from(source: VarWidth) -> Self {
        source.var_type()
    }
}

impl Display for VarWidth {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            VarWidth::Numeric => write!(f, "numeric"),
            VarWidth::String(width) => write!(f, "A{width}"),
        }
    }
}

/// A range of user-missing numeric values.
#[derive(Copy, Clone, Debug, Serialize, PartialEq)]
pub enum MissingValueRange {
    /// `low THRU high`.
    In { low: f64, high: f64 },
    /// `low THRU HIGHEST`.
    From { low: f64 },
    /// `LOWEST THRU high`.
    To { high: f64 },
}

impl MissingValueRange {
    /// Constructs a range from the endpoints stored in a system file, which
    /// use the most negative finite value above [SYSMIS](crate::data::SYSMIS)
    /// and [f64::MAX] to stand for `LOWEST` and `HIGHEST`.
    pub fn new(low: f64, high: f64) -> Self {
        const LOWEST: f64 = f64::MIN.next_up();
        match (low, high) {
            (f64::MIN | LOWEST, _) => Self::To { high },
            (_, f64::MAX) => Self::From { low },
            (_, _) => Self::In { low, high },
        }
    }

    pub fn low(&self) -> Option<f64> {
        match self {
            MissingValueRange::In { low, .. } | MissingValueRange::From { low } => Some(*low),
            MissingValueRange::To { .. } => None,
        }
    }

    pub fn high(&self) -> Option<f64> {
        match self {
            MissingValueRange::In { high, .. } | MissingValueRange::To { high } => Some(*high),
            MissingValueRange::From { .. } => None,
        }
    }

    pub fn contains(&self, number: f64) -> bool {
        match self {
            MissingValueRange::In { low, high } => (*low..=*high).contains(&number),
            MissingValueRange::From { low } => number >= *low,
            MissingValueRange::To { high } => number <= *high,
        }
    }
}

impl Display for MissingValueRange {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self.low() {
            Some(low) => write!(f, "{low}")?,
            None => write!(f, "LOW")?,
        }
        write!(f, " THRU ")?;
        match self.high() {
            Some(high) => write!(f, "{high}"),
            None => write!(f, "HIGH"),
        }
    }
}

/// User-missing values for a variable.
///
/// Numeric variables may have up to three discrete values, a range, or a range
/// plus one discrete value.  String variables may only have discrete values.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MissingValues {
    /// Individual missing values.
    pub values: Vec<Datum>,

    /// Inclusive range, if one was given.
    pub range: Option<MissingValueRange>,
}

impl MissingValues {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.range.is_none()
    }

    /// Returns true if `value` is user-missing.  The system-missing value is
    /// not user-missing.
    pub fn contains(&self, value: &Datum) -> bool {
        if self.values.contains(value) {
            return true;
        }
        match (value, &self.range) {
            (Datum::Number(Some(number)), Some(range)) => range.contains(*number),
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Alignment {
    Left,
    Right,
    Center,
}

impl Alignment {
    /// Decodes an alignment from a variable display record.
    pub fn try_decode(source: u32) -> Result<Self, u32> {
        match source {
            0 => Ok(Self::Left),
            1 => Ok(Self::Right),
            2 => Ok(Self::Center),
            _ => Err(source),
        }
    }

    pub fn default_for_type(var_type: VarType) -> Self {
        match var_type {
            VarType::Numeric => Self::Right,
            VarType::String => Self::Left,
        }
    }
}

/// [Level of measurement](https://en.wikipedia.org/wiki/Level_of_measurement).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Measure {
    /// Categories without order.
    Nominal,

    /// Ordered categories.
    Ordinal,

    /// Interval or ratio measurements.
    Scale,
}

impl Measure {
    /// Decodes a measurement level from a variable display record, in which 0
    /// means that the level is unknown.
    pub fn try_decode(source: u32) -> Result<Option<Self>, u32> {
        match source {
            0 => Ok(None),
            1 => Ok(Some(Self::Nominal)),
            2 => Ok(Some(Self::Ordinal)),
            3 => Ok(Some(Self::Scale)),
            _ => Err(source),
        }
    }
}

/// One segment of a variable's storage in a system file.
///
/// Every variable has at least one segment.  Only very long string variables
/// have more than one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Short name of the physical variable record that starts the segment.
    pub short_name: String,

    /// Width declared in that record: 0 for numeric, otherwise the string
    /// width, at most 255.
    pub width: u16,

    /// Number of 8-byte chunks in the segment: the root record plus its
    /// continuation records.
    pub n_chunks: usize,
}

/// A variable as exposed in a [Dictionary](crate::dictionary::Dictionary).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Variable {
    /// The variable's name: its long name if the file has one, otherwise its
    /// short name.
    pub name: String,

    /// The up-to-8-byte name in the variable record.
    pub short_name: String,

    /// Type and width.  For very long strings, this is the full width
    /// across all segments.
    pub width: VarWidth,

    /// Variable label.
    pub label: Option<String>,

    /// User-missing values.
    pub missing_values: MissingValues,

    /// Format for display.
    pub print_format: Format,

    /// Format for writing data out.
    pub write_format: Format,

    /// Measurement level, if known.
    pub measure: Option<Measure>,

    /// Width of the variable in data views, if specified.
    pub display_width: Option<u32>,

    /// Alignment in data views.
    pub alignment: Alignment,

    /// Storage segments, in file order.
    pub segments: Vec<Segment>,
}

impl Variable {
    pub fn var_type(&self) -> VarType {
        self.width.var_type()
    }

    /// Returns the number of 8-byte chunks that this variable occupies in each
    /// case.
    pub fn n_chunks(&self) -> usize {
        self.segments.iter().map(|segment| segment.n_chunks).sum()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        data::Datum,
        variable::{Alignment, Measure, MissingValueRange, MissingValues, VarWidth},
    };

    #[test]
    fn chunks_and_segments() {
        for (width, chunks, segments) in [
            (VarWidth::Numeric, Some(1), 1),
            (VarWidth::String(1), Some(1), 1),
            (VarWidth::String(8), Some(1), 1),
            (VarWidth::String(9), Some(2), 1),
            (VarWidth::String(255), Some(32), 1),
            (VarWidth::String(256), None, 2),
            (VarWidth::String(504), None, 2),
            (VarWidth::String(505), None, 3),
            (VarWidth::String(2283), None, 10),
        ] {
            assert_eq!(width.n_chunks(), chunks, "{width}");
            assert_eq!(width.n_segments(), segments, "{width}");
        }
    }

    #[test]
    fn missing_value_range() {
        assert_eq!(
            MissingValueRange::new(f64::MIN.next_up(), 5.0),
            MissingValueRange::To { high: 5.0 }
        );
        assert_eq!(
            MissingValueRange::new(1.0, f64::MAX),
            MissingValueRange::From { low: 1.0 }
        );
        let range = MissingValueRange::new(1.0, 3.0);
        assert!(range.contains(1.0) && range.contains(3.0) && !range.contains(3.5));
        assert_eq!(range.to_string(), "1 THRU 3");

        let mv = MissingValues {
            values: vec![Datum::from(9.0)],
            range: Some(range),
        };
        assert!(mv.contains(&Datum::from(2.0)));
        assert!(mv.contains(&Datum::from(9.0)));
        assert!(!mv.contains(&Datum::from(None)));
    }

    #[test]
    fn display_codes() {
        assert_eq!(Measure::try_decode(0), Ok(None));
        assert_eq!(Measure::try_decode(3), Ok(Some(Measure::Scale)));
        assert_eq!(Measure::try_decode(4), Err(4));
        assert_eq!(Alignment::try_decode(2), Ok(Alignment::Center));
        assert_eq!(Alignment::try_decode(7), Err(7));
    }
}
