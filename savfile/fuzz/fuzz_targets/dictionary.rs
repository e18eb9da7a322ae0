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

#![no_main]

use libfuzzer_sys::fuzz_target;
use savfile::sys::ReaderOptions;

fuzz_target!(|data: &[u8]| {
    let options = ReaderOptions::new().with_chunk_size(64);
    if let Ok(system_file) = options.open_reader(data, |_| ()) {
        for case in system_file.cases {
            if case.is_err() {
                break;
            }
        }
    }
});
