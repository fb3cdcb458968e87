// Loft - a model rocket flight computer and telemetry gateway
// Copyright (C) 2017-2018  Loft Project Developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

#[macro_export]
macro_rules! m_to_cm {
    ($x:expr) => (($x * 100.0_f32) as i32);
}

#[macro_export]
macro_rules! mps_to_cmps {
    ($x:expr) => (($x * 100.0_f32) as i16);
}

#[macro_export]
macro_rules! c_to_decic {
    ($x:expr) => (($x * 10.0_f32) as i16);
}

#[macro_export]
macro_rules! deg_to_udeg {
    ($x:expr) => (($x * 1000000.0_f32) as i32);
}

#[macro_export]
macro_rules! run_every {
    ($hz:expr, $counter:expr, $handle:expr, $action:block) => {
        $counter += 1;
        if $counter >= ($handle.get_frequency() as f32 / $hz as f32) as u32 {
            $counter = 0;
            $action;
        }
    }
}
