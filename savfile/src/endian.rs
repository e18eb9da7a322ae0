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

//! Converting big- and little-endian `[u8]` arrays to and from primitive types.
//!
//! System files are almost always written little-endian, but the byte order is
//! really a property of the file (see [FileHeader](crate::sys::raw::records::FileHeader)),
//! so every multi-byte field is parsed through an [Endian] rather than with a
//! fixed byte order.

use binrw::Endian;

use crate::data::SYSMIS;

/// Converts a primitive type into a big- or little-endian `[u8]` array.
pub trait ToBytes<T, const N: usize> {
    /// Given `value`, returns its bytes.
    fn to_bytes(self, value: T) -> [u8; N];
}

/// Parses a `[u8]` array as a big- or little-endian primitive type.
pub trait FromBytes<T, const N: usize> {
    /// Given `bytes`, returns `T`.
    fn parse(self, bytes: [u8; N]) -> T;
}

macro_rules! endian_conversions {
    ($($type:ty => $n:literal),* $(,)?) => {
        $(
            impl ToBytes<$type, $n> for Endian {
                fn to_bytes(self, value: $type) -> [u8; $n] {
                    match self {
                        Endian::Big => <$type>::to_be_bytes(value),
                        Endian::Little => <$type>::to_le_bytes(value),
                    }
                }
            }

            impl FromBytes<$type, $n> for Endian {
                fn parse(self, bytes: [u8; $n]) -> $type {
                    match self {
                        Endian::Big => <$type>::from_be_bytes(bytes),
                        Endian::Little => <$type>::from_le_bytes(bytes),
                    }
                }
            }
        )*
    };
}

endian_conversions! {
    u8 => 1,
    u16 => 2,
    i32 => 4,
    u32 => 4,
    i64 => 8,
    u64 => 8,
    f64 => 8,
}

/// Parses a number, mapping the system-missing value to `None`.
impl FromBytes<Option<f64>, 8> for Endian {
    fn parse(self, bytes: [u8; 8]) -> Option<f64> {
        let number: f64 = self.parse(bytes);
        (number != SYSMIS).then_some(number)
    }
}

/// Writes `None` as the system-missing value.
impl ToBytes<Option<f64>, 8> for Endian {
    fn to_bytes(self, value: Option<f64>) -> [u8; 8] {
        self.to_bytes(value.unwrap_or(SYSMIS))
    }
}

#[cfg(test)]
mod tests {
    use binrw::Endian;

    use crate::{
        data::SYSMIS,
        endian::{FromBytes, ToBytes},
    };

    #[test]
    fn int32() {
        let bytes = [0x02, 0x00, 0x00, 0x00];
        assert_eq!(FromBytes::<i32, 4>::parse(Endian::Little, bytes), 2);
        assert_eq!(FromBytes::<i32, 4>::parse(Endian::Big, bytes), 0x0200_0000);
        assert_eq!(
            FromBytes::<i32, 4>::parse(Endian::Little, [0xff; 4]),
            -1
        );
    }

    #[test]
    fn float64() {
        // 100.0 as written by every known producer.
        let bytes = [0, 0, 0, 0, 0, 0, 0x59, 0x40];
        assert_eq!(FromBytes::<f64, 8>::parse(Endian::Little, bytes), 100.0);
        assert_eq!(ToBytes::<f64, 8>::to_bytes(Endian::Little, 100.0), bytes);
    }

    #[test]
    fn sysmis() {
        let bytes: [u8; 8] = Endian::Little.to_bytes(SYSMIS);
        assert_eq!(FromBytes::<Option<f64>, 8>::parse(Endian::Little, bytes), None);
        let bytes: [u8; 8] = Endian::Big.to_bytes(Some(1.5));
        assert_eq!(
            FromBytes::<Option<f64>, 8>::parse(Endian::Big, bytes),
            Some(1.5)
        );
    }
}
