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

use chrono::prelude::*;

pub mod sim;

/// Latest position solution from the receiver. `valid` is false until the
/// receiver has a usable fix; consumers must zero-fill the GPS block of
/// their packets in that case.
#[derive(PartialEq, Debug, Clone)]
pub struct GnssFix {
    pub valid: bool,
    /// Latitude in degrees, north positive
    pub latitude_deg: f32,
    /// Longitude in degrees, east positive
    pub longitude_deg: f32,
    /// Ground speed in m/s
    pub speed_mps: f32,
    /// True heading in degrees
    pub heading_deg: f32,
    /// Number of SVs used in the fix
    pub satellites: u8,
    /// UTC time of the fix, if the receiver reported one
    pub time: Option<DateTime<UTC>>,
}
