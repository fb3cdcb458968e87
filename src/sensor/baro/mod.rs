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

pub mod sim;

pub const SEA_LEVEL_PRESSURE_PA: f32 = 101325.0;

// International barometric formula constants
const SEA_LEVEL_TEMP_K: f32 = 288.15;
const TEMP_LAPSE_RATE: f32 = 0.0065;
const GAS_CONSTANT: f32 = 8.31447;
const MOLAR_MASS: f32 = 0.0289644;
const GRAVITY: f32 = 9.80665;

#[derive(PartialEq, Debug, Copy, Clone)]
pub struct BaroSample {
    /// Absolute pressure in Pascals
    pub pressure_pa: f32,
    /// Temperature in degrees Celsius
    pub temperature_c: f32,
}

/// Altitude above the reference pressure in meters:
/// `h = (T0 / L) * (1 - (P/P0)^((R*L)/(g*M)))`
pub fn altitude(pressure_pa: f32, reference_pa: f32) -> f32 {
    if reference_pa <= 0.0 || pressure_pa <= 0.0 {
        return 0.0;
    }

    let exponent = (GAS_CONSTANT * TEMP_LAPSE_RATE) / (GRAVITY * MOLAR_MASS);
    let ratio = pressure_pa / reference_pa;

    (SEA_LEVEL_TEMP_K / TEMP_LAPSE_RATE) * (1.0 - ratio.powf(exponent))
}

/// Inverse of `altitude`, used by the simulated barometer and by tests.
pub fn pressure_for_altitude(altitude_m: f32, reference_pa: f32) -> f32 {
    let exponent = (GRAVITY * MOLAR_MASS) / (GAS_CONSTANT * TEMP_LAPSE_RATE);

    reference_pa * (1.0 - TEMP_LAPSE_RATE * altitude_m / SEA_LEVEL_TEMP_K).powf(exponent)
}
