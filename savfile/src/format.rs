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

//! Display formats.
//!
//! Each variable carries a print format and a write format that say how its
//! values should be shown to a user, e.g. `F8.2` or `DATE11`.  A system file
//! packs a format into a 32-bit word: the type code in bits 16 through 23, the
//! width in bits 8 through 15, and the number of decimal places in bits 0
//! through 7.

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use binrw::BinRead;
use serde::{Serialize, Serializer};
use thiserror::Error as ThisError;

use crate::variable::{VarType, VarWidth};

/// An error decoding a format.
#[derive(Clone, ThisError, Debug, PartialEq, Eq)]
pub enum Error {
    /// Unknown format type code.
    #[error("Unknown format type {value}.")]
    UnknownFormat {
        /// The type code.
        value: u16,
    },

    /// Format type is for the wrong kind of variable.
    #[error("{var_type} variable is not compatible with {type_} format.")]
    IncompatibleType {
        /// The variable's type.
        var_type: VarType,
        /// The format's type.
        type_: Type,
    },
}

/// Custom currency format.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CC {
    A,
    B,
    C,
    D,
    E,
}

/// Format type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    // Basic numeric formats.
    F,
    Comma,
    Dot,
    Dollar,
    Pct,
    E,

    // Custom currency formats.
    CC(CC),

    // Legacy numeric formats.
    N,
    Z,

    // Binary and hexadecimal formats.
    P,
    PK,
    IB,
    PIB,
    PIBHex,
    RB,
    RBHex,

    // Time and date formats.
    Date,
    ADate,
    EDate,
    JDate,
    SDate,
    QYr,
    MoYr,
    WkYr,
    DateTime,
    YmdHms,
    MTime,
    Time,
    DTime,

    // Date component formats.
    WkDay,
    Month,

    // String formats.
    A,
    AHex,
}

impl Type {
    /// Returns the name of this format type, e.g. `"DOLLAR"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F => "F",
            Self::Comma => "COMMA",
            Self::Dot => "DOT",
            Self::Dollar => "DOLLAR",
            Self::Pct => "PCT",
            Self::E => "E",
            Self::CC(CC::A) => "CCA",
            Self::CC(CC::B) => "CCB",
            Self::CC(CC::C) => "CCC",
            Self::CC(CC::D) => "CCD",
            Self::CC(CC::E) => "CCE",
            Self::N => "N",
            Self::Z => "Z",
            Self::P => "P",
            Self::PK => "PK",
            Self::IB => "IB",
            Self::PIB => "PIB",
            Self::PIBHex => "PIBHEX",
            Self::RB => "RB",
            Self::RBHex => "RBHEX",
            Self::Date => "DATE",
            Self::ADate => "ADATE",
            Self::EDate => "EDATE",
            Self::JDate => "JDATE",
            Self::SDate => "SDATE",
            Self::QYr => "QYR",
            Self::MoYr => "MOYR",
            Self::WkYr => "WKYR",
            Self::DateTime => "DATETIME",
            Self::YmdHms => "YMDHMS",
            Self::MTime => "MTIME",
            Self::Time => "TIME",
            Self::DTime => "DTIME",
            Self::WkDay => "WKDAY",
            Self::Month => "MONTH",
            Self::A => "A",
            Self::AHex => "AHEX",
        }
    }

    /// Returns the kind of variable that this format type can display.
    pub fn var_type(self) -> VarType {
        match self {
            Self::A | Self::AHex => VarType::String,
            _ => VarType::Numeric,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<u16> for Type {
    type Error = Error;

    fn try_from(source: u16) -> Result<Self, Self::Error> {
        match source {
            1 => Ok(Self::A),
            2 => Ok(Self::AHex),
            3 => Ok(Self::Comma),
            4 => Ok(Self::Dollar),
            5 => Ok(Self::F),
            6 => Ok(Self::IB),
            7 => Ok(Self::PIBHex),
            8 => Ok(Self::P),
            9 => Ok(Self::PIB),
            10 => Ok(Self::PK),
            11 => Ok(Self::RB),
            12 => Ok(Self::RBHex),
            15 => Ok(Self::Z),
            16 => Ok(Self::N),
            17 => Ok(Self::E),
            20 => Ok(Self::Date),
            21 => Ok(Self::Time),
            22 => Ok(Self::DateTime),
            23 => Ok(Self::ADate),
            24 => Ok(Self::JDate),
            25 => Ok(Self::DTime),
            26 => Ok(Self::WkDay),
            27 => Ok(Self::Month),
            28 => Ok(Self::MoYr),
            29 => Ok(Self::QYr),
            30 => Ok(Self::WkYr),
            31 => Ok(Self::Pct),
            32 => Ok(Self::Dot),
            33 => Ok(Self::CC(CC::A)),
            34 => Ok(Self::CC(CC::B)),
            35 => Ok(Self::CC(CC::C)),
            36 => Ok(Self::CC(CC::D)),
            37 => Ok(Self::CC(CC::E)),
            38 => Ok(Self::EDate),
            39 => Ok(Self::SDate),
            40 => Ok(Self::MTime),
            41 => Ok(Self::YmdHms),
            _ => Err(Error::UnknownFormat { value: source }),
        }
    }
}

impl From<Type> for u16 {
    fn from(source: Type) -> Self {
        match source {
            Type::A => 1,
            Type::AHex => 2,
            Type::Comma => 3,
            Type::Dollar => 4,
            Type::F => 5,
            Type::IB => 6,
            Type::PIBHex => 7,
            Type::P => 8,
            Type::PIB => 9,
            Type::PK => 10,
            Type::RB => 11,
            Type::RBHex => 12,
            Type::Z => 15,
            Type::N => 16,
            Type::E => 17,
            Type::Date => 20,
            Type::Time => 21,
            Type::DateTime => 22,
            Type::ADate => 23,
            Type::JDate => 24,
            Type::DTime => 25,
            Type::WkDay => 26,
            Type::Month => 27,
            Type::MoYr => 28,
            Type::QYr => 29,
            Type::WkYr => 30,
            Type::Pct => 31,
            Type::Dot => 32,
            Type::CC(CC::A) => 33,
            Type::CC(CC::B) => 34,
            Type::CC(CC::C) => 35,
            Type::CC(CC::D) => 36,
            Type::CC(CC::E) => 37,
            Type::EDate => 38,
            Type::SDate => 39,
            Type::MTime => 40,
            Type::YmdHms => 41,
        }
    }
}

pub type Width = u16;
pub type Decimals = u8;

/// A display format: a type, a width, and a number of decimal places.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Format {
    type_: Type,
    w: Width,
    d: Decimals,
}

impl Format {
    /// `F8.2`, the usual default for numeric variables.
    pub const F8_2: Format = Format {
        type_: Type::F,
        w: 8,
        d: 2,
    };

    /// Constructs a new format.
    pub fn new(type_: Type, w: Width, d: Decimals) -> Self {
        Self { type_, w, d }
    }

    pub fn type_(self) -> Type {
        self.type_
    }
    pub fn w(self) -> usize {
        self.w as usize
    }
    pub fn d(self) -> usize {
        self.d as usize
    }

    /// Returns the format to use for a variable of `var_width` that lacks a
    /// usable format of its own.
    pub fn default_for_width(var_width: VarWidth) -> Self {
        match var_width {
            VarWidth::Numeric => Self::F8_2,
            VarWidth::String(w) => Format {
                type_: Type::A,
                w,
                d: 0,
            },
        }
    }

    /// Checks that this format can display a variable of type `var_type`.
    pub fn check_type_compatibility(self, var_type: VarType) -> Result<Self, Error> {
        if self.type_.var_type() == var_type {
            Ok(self)
        } else {
            Err(Error::IncompatibleType {
                var_type,
                type_: self.type_,
            })
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}{}", self.type_, self.w)?;
        if self.type_.var_type() == VarType::Numeric && self.d > 0 {
            write!(f, ".{}", self.d)?;
        }
        Ok(())
    }
}

impl Serialize for Format {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

/// A format packed into 32 bits, as stored in a variable record.
#[derive(Copy, Clone, PartialEq, Eq, Hash, BinRead)]
pub struct RawFormat(
    /// The most-significant 16 bits are the type, the next 8 bits are the
    /// width, and the least-significant 8 bits are the number of decimals.
    pub u32,
);

impl Debug for RawFormat {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match Format::try_from(*self) {
            Ok(format) => write!(f, "{:06x} ({format})", self.0),
            Err(_) => write!(f, "{:06x} (<unknown>)", self.0),
        }
    }
}

impl Serialize for RawFormat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl TryFrom<RawFormat> for Format {
    type Error = Error;

    fn try_from(raw: RawFormat) -> Result<Self, Self::Error> {
        let raw = raw.0;
        let type_ = ((raw >> 16) as u16).try_into()?;
        let w = ((raw >> 8) & 0xff) as Width;
        let d = (raw & 0xff) as Decimals;
        Ok(Self { type_, w, d })
    }
}

impl From<Format> for RawFormat {
    fn from(format: Format) -> Self {
        let type_ = u16::from(format.type_) as u32;
        let w = format.w.min(255) as u32;
        Self((type_ << 16) | (w << 8) | format.d as u32)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        format::{Error, Format, RawFormat, Type},
        variable::{VarType, VarWidth},
    };

    #[test]
    fn packed_format_round_trip() {
        for code in (1..=41u16).filter(|code| ![13, 14, 18, 19].contains(code)) {
            let raw = RawFormat(((code as u32) << 16) | (11 << 8) | 3);
            let format = Format::try_from(raw).unwrap();
            assert_eq!(u16::from(format.type_()), code);
            assert_eq!(format.w(), 11);
            assert_eq!(format.d(), 3);
            assert_eq!(RawFormat::from(format), raw);
        }
    }

    #[test]
    fn reserved_codes() {
        for code in [0u16, 13, 14, 18, 19, 42, 255] {
            assert_eq!(
                Format::try_from(RawFormat((code as u32) << 16 | 0x0800)),
                Err(Error::UnknownFormat { value: code })
            );
        }
    }

    #[test]
    fn display() {
        let f = Format::try_from(RawFormat(0x050802)).unwrap();
        assert_eq!(f, Format::F8_2);
        assert_eq!(f.to_string(), "F8.2");
        let a = Format::try_from(RawFormat(0x011000)).unwrap();
        assert_eq!(a.to_string(), "A16");
        assert_eq!(Format::try_from(RawFormat(0x140b00)).unwrap().type_(), Type::Date);
    }

    #[test]
    fn type_compatibility() {
        assert!(Format::F8_2.check_type_compatibility(VarType::Numeric).is_ok());
        assert!(Format::F8_2.check_type_compatibility(VarType::String).is_err());
        assert_eq!(
            Format::default_for_width(VarWidth::String(20)).to_string(),
            "A20"
        );
    }
}
