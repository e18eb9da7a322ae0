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

//! Character encodings in system files.
//!
//! A system file names its character encoding in one of two ways: by name, in
//! an encoding record, or by Windows code page number, in the integer info
//! record.  Old files often do neither.

use encoding_rs::{
    Encoding, BIG5, EUC_JP, EUC_KR, GB18030, GBK, IBM866, ISO_2022_JP, ISO_8859_10, ISO_8859_13,
    ISO_8859_14, ISO_8859_15, ISO_8859_16, ISO_8859_2, ISO_8859_3, ISO_8859_4, ISO_8859_5,
    ISO_8859_6, ISO_8859_7, ISO_8859_8, KOI8_R, KOI8_U, MACINTOSH, SHIFT_JIS, UTF_8,
    WINDOWS_1250, WINDOWS_1251, WINDOWS_1252, WINDOWS_1253, WINDOWS_1254, WINDOWS_1255,
    WINDOWS_1256, WINDOWS_1257, WINDOWS_1258, WINDOWS_874,
};
use thiserror::Error as ThisError;

/// A problem choosing the character encoding.
#[derive(Clone, ThisError, Debug, PartialEq, Eq)]
pub enum Error {
    /// Neither record names an encoding.
    #[error("This system file does not indicate its own character encoding.  Using {} by default.", default_encoding().name())]
    NoEncoding,

    /// The code page number is not one we know.
    #[error("This system file encodes text strings with unknown code page {0}.")]
    UnknownCodepage(i32),

    /// The encoding record names an encoding we do not know.
    #[error("This system file encodes text strings with unknown encoding {0}.")]
    UnknownEncoding(String),

    /// EBCDIC, which is unsupported.
    #[error("This system file is encoded in EBCDIC, which is not supported.")]
    Ebcdic,
}

/// Returns the encoding used for files that do not specify one.
pub fn default_encoding() -> &'static Encoding {
    WINDOWS_1252
}

/// Returns the encoding for Windows code page `codepage`, if it is one that we
/// know.
pub fn codepage_to_encoding(codepage: i32) -> Option<&'static Encoding> {
    match codepage {
        437 | 1252 | 28591 => Some(WINDOWS_1252),
        866 => Some(IBM866),
        874 => Some(WINDOWS_874),
        932 => Some(SHIFT_JIS),
        936 => Some(GBK),
        949 | 51949 => Some(EUC_KR),
        950 => Some(BIG5),
        1250 => Some(WINDOWS_1250),
        1251 => Some(WINDOWS_1251),
        1253 => Some(WINDOWS_1253),
        1254 => Some(WINDOWS_1254),
        1255 => Some(WINDOWS_1255),
        1256 => Some(WINDOWS_1256),
        1257 => Some(WINDOWS_1257),
        1258 => Some(WINDOWS_1258),
        10000 => Some(MACINTOSH),
        20127 => Some(WINDOWS_1252),
        20866 => Some(KOI8_R),
        21866 => Some(KOI8_U),
        28592 => Some(ISO_8859_2),
        28593 => Some(ISO_8859_3),
        28594 => Some(ISO_8859_4),
        28595 => Some(ISO_8859_5),
        28596 => Some(ISO_8859_6),
        28597 => Some(ISO_8859_7),
        28598 => Some(ISO_8859_8),
        28600 => Some(ISO_8859_10),
        28603 => Some(ISO_8859_13),
        28604 => Some(ISO_8859_14),
        28605 => Some(ISO_8859_15),
        28606 => Some(ISO_8859_16),
        50220 | 50221 | 50222 => Some(ISO_2022_JP),
        51932 => Some(EUC_JP),
        54936 => Some(GB18030),
        65001 => Some(UTF_8),
        _ => None,
    }
}

fn label_to_encoding(label: &str) -> Option<&'static Encoding> {
    if let Some(encoding) = Encoding::for_label(label.trim().as_bytes()) {
        return Some(encoding);
    }
    let lower = label.trim().to_ascii_lowercase();
    let digits = lower
        .strip_prefix("cp")
        .or_else(|| lower.strip_prefix("windows-"))
        .or_else(|| lower.strip_prefix("ibm"))?;
    codepage_to_encoding(digits.parse().ok()?)
}

/// Returns the encoding named by `encoding` (from an encoding record) if that
/// is present, otherwise the one for code page `character_code` (from an
/// integer info record).
pub fn get_encoding(
    encoding: Option<&str>,
    character_code: Option<i32>,
) -> Result<&'static Encoding, Error> {
    if let Some(encoding) = encoding {
        return label_to_encoding(encoding).ok_or_else(|| Error::UnknownEncoding(encoding.into()));
    }
    match character_code {
        Some(1) => Err(Error::Ebcdic),

        // These ostensibly mean "7-bit ASCII" and "8-bit ASCII"[sic], but many
        // files with character code 2 contain text that is clearly not ASCII.
        Some(2 | 3) => Err(Error::NoEncoding),

        Some(4) => Ok(SHIFT_JIS),
        Some(codepage) => codepage_to_encoding(codepage).ok_or(Error::UnknownCodepage(codepage)),
        None => Err(Error::NoEncoding),
    }
}
