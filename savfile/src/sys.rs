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

//! Reading system files.
//!
//! A system file (`.sav`) holds a dictionary of variables followed by case
//! data.  Records the reader does not know are skipped, so files from newer
//! producers still open.
//!
//! Reading proceeds in layers.  A [ByteSource](source::ByteSource) supplies
//! bytes, a [ChunkReader](chunk::ChunkReader) buffers them and allows peeking,
//! [raw] splits the dictionary into records, [ReaderOptions] turns those
//! records into a [Dictionary](crate::dictionary::Dictionary), and [Cases]
//! decodes the data that follows, using a
//! [CommandReader](command::CommandReader) to undo compression.
//!
//! Use [ReaderOptions] to read a system file in the simplest way.

#![cfg_attr(not(test), warn(missing_docs))]

mod cases;
pub use cases::*;
pub mod chunk;
pub mod command;
mod cooked;
pub use cooked::*;
pub mod encoding;
pub mod raw;
pub mod source;

#[cfg(test)]
pub mod sack;


use binrw::Endian;
use serde::Serializer;

pub(crate) fn serialize_endian<S>(endian: &Endian, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match endian {
        Endian::Big => serializer.serialize_unit_variant("Endian", 0, "Big"),
        Endian::Little => serializer.serialize_unit_variant("Endian", 1, "Little"),
    }
}
