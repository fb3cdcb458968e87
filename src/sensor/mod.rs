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

pub mod baro;
pub mod imu;
pub mod gnss;

use loft::handle::Pushable;
use self::baro::BaroSample;
use self::imu::ImuSample;
use self::gnss::GnssFix;

#[derive(PartialEq, Debug, Clone)]
/// Represents data received from the sensor layer
pub enum SensorData {
    Baro(BaroSample),
    Imu(ImuSample),
    Gnss(GnssFix),
}

/// A type for representing a sensor
pub trait Sensor {
    /// Run the provider, may or may not yield any result
    fn run(&mut self, h: &mut Pushable<SensorData>);
}
