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

//! Conversions between SPSS date values and [chrono] dates.
//!
//! A date or date-time variable holds the number of seconds since midnight
//! on 14 Oct 1582, the first day of the Gregorian calendar.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

const EPOCH: NaiveDate = NaiveDate::from_ymd_opt(1582, 10, 14).unwrap();
const EPOCH_DATETIME: NaiveDateTime = EPOCH.and_time(NaiveTime::MIN);

/// Converts `date_time` into seconds since the SPSS epoch.
pub fn date_to_number(date_time: NaiveDateTime) -> f64 {
    (date_time - EPOCH_DATETIME).as_seconds_f64()
}

/// Converts `seconds` since the SPSS epoch into a date and time, rounded to
/// the nearest millisecond.  Returns `None` for values that are not finite
/// (including the system-missing value) or out of range for [NaiveDateTime].
pub fn date_from_number(seconds: f64) -> Option<NaiveDateTime> {
    if !seconds.is_finite() || seconds.abs() > 1e15 {
        return None;
    }
    let delta = TimeDelta::try_milliseconds((seconds * 1000.0).round() as i64)?;
    EPOCH_DATETIME.checked_add_signed(delta)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::{
        calendar::{date_from_number, date_to_number},
        data::SYSMIS,
    };

    fn date_time(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    #[test]
    fn known_values() {
        for (number, expected) in [
            (0.0, date_time(1582, 10, 14, 0, 0, 0)),
            (12219379200.0, date_time(1970, 1, 1, 0, 0, 0)),
            (13548592882.0, date_time(2012, 2, 14, 10, 1, 22)),
            (13560348821.0, date_time(2012, 6, 29, 11, 33, 41)),
            (13797216000.0, date_time(2020, 1, 1, 0, 0, 0)),
        ] {
            assert_eq!(date_from_number(number), Some(expected));
            assert_eq!(date_to_number(expected), number);
        }
    }

    #[test]
    fn fractional_seconds() {
        let date = date_from_number(12219379200.25).unwrap();
        assert_eq!(date.and_utc().timestamp_millis(), 250);
        assert_eq!(date_to_number(date), 12219379200.25);
    }

    #[test]
    fn unrepresentable() {
        assert_eq!(date_from_number(SYSMIS), None);
        assert_eq!(date_from_number(f64::NAN), None);
        assert_eq!(date_from_number(f64::INFINITY), None);
        assert_eq!(date_from_number(-1.0), Some(date_time(1582, 10, 13, 23, 59, 59)));
    }
}
