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

//! Scripted barometer: a full flight profile (pad, boost, coast, chute
//! descent, landing) converted back to pressure through the barometric
//! formula. Stands in for the hardware barometer behind the same seam.

use super::*;
use loft::handle::Pushable;
use sensor::{Sensor, SensorData};

const SAMPLE_HZ: u32 = 100;

const GROUND_PRESSURE_PA: f32 = 101325.0;
const GROUND_TEMPERATURE_C: f32 = 25.0;

// Profile timing, milliseconds since boot
const LAUNCH_MS: u32 = 8000;
const BOOST_MS: u32 = 3000;
const BOOST_ACCEL_MPS2: f32 = 60.0;
const DESCENT_RATE_MPS: f32 = 15.0;
const BALLISTIC_G: f32 = 9.80665;

pub struct SimBaroProvider {
    counter: u32,
}

impl SimBaroProvider {
    pub fn new() -> Box<Sensor> {
        info!("using simulated barometer (scripted flight profile)");
        Box::new(SimBaroProvider { counter: 0 })
    }

    fn altitude_at(&self, now_ms: u32) -> f32 {
        if now_ms < LAUNCH_MS {
            return 0.0;
        }

        let t = (now_ms - LAUNCH_MS) as f32 / 1000.0;
        let burn = BOOST_MS as f32 / 1000.0;

        if t < burn {
            return 0.5 * BOOST_ACCEL_MPS2 * t * t;
        }

        let burnout_alt = 0.5 * BOOST_ACCEL_MPS2 * burn * burn;
        let burnout_vel = BOOST_ACCEL_MPS2 * burn;
        let coast = t - burn;
        let apogee_dt = burnout_vel / BALLISTIC_G;

        if coast < apogee_dt {
            return burnout_alt + burnout_vel * coast - 0.5 * BALLISTIC_G * coast * coast;
        }

        let apogee_alt = burnout_alt + 0.5 * burnout_vel * burnout_vel / BALLISTIC_G;
        let fall = coast - apogee_dt;
        let alt = apogee_alt - DESCENT_RATE_MPS * fall;

        if alt > 0.0 {
            alt
        } else {
            0.0
        }
    }
}

impl Sensor for SimBaroProvider {
    fn run(&mut self, h: &mut Pushable<SensorData>) {
        run_every!(SAMPLE_HZ, self.counter, h, {
            let alt = self.altitude_at(h.get_millis());

            h.push_data(SensorData::Baro(BaroSample {
                pressure_pa: pressure_for_altitude(alt, GROUND_PRESSURE_PA),
                temperature_c: GROUND_TEMPERATURE_C - TEMP_LAPSE_RATE * alt,
            }));
        });
    }
}

/// Stationary barometer reporting a fixed ambient pressure, as the
/// gateway's ground reference sensor. Samples at the gateway's 10 Hz
/// ground-read rate.
pub struct FixedBaroProvider {
    counter: u32,
    pressure_pa: f32,
    temperature_c: f32,
}

impl FixedBaroProvider {
    pub fn new(pressure_pa: f32, temperature_c: f32) -> Box<Sensor> {
        Box::new(FixedBaroProvider {
            counter: 0,
            pressure_pa,
            temperature_c,
        })
    }
}

impl Sensor for FixedBaroProvider {
    fn run(&mut self, h: &mut Pushable<SensorData>) {
        run_every!(10, self.counter, h, {
            h.push_data(SensorData::Baro(BaroSample {
                pressure_pa: self.pressure_pa,
                temperature_c: self.temperature_c,
            }));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loft::handle::{BasicHandle, PushableHandle};
    use std::collections::VecDeque;

    #[test]
    fn test_profile_shape() {
        let p = SimBaroProvider { counter: 0 };

        // on the pad
        assert_eq!(p.altitude_at(0), 0.0);
        assert_eq!(p.altitude_at(LAUNCH_MS - 1), 0.0);

        // climbing through boost
        let mid_boost = p.altitude_at(LAUNCH_MS + BOOST_MS / 2);
        let burnout = p.altitude_at(LAUNCH_MS + BOOST_MS);
        assert!(mid_boost > 0.0 && burnout > mid_boost);

        // apogee is above burnout, descent comes back down
        let apogee_ms = LAUNCH_MS + BOOST_MS + 18367;
        assert!(p.altitude_at(apogee_ms) > burnout);
        assert!(p.altitude_at(apogee_ms + 60000) < p.altitude_at(apogee_ms));

        // eventually on the ground and clamped there
        assert_eq!(p.altitude_at(LAUNCH_MS + 600000), 0.0);
    }

    #[test]
    fn test_provider_rate() {
        let mut p = SimBaroProvider::new();
        let mut q = VecDeque::new();

        // 1 kHz loop, 100 Hz provider: one sample per 10 ticks
        for i in 0..100 {
            let mut b = BasicHandle::at(i, 1000);
            let mut h = PushableHandle::new(&mut b, &mut q);
            p.run(&mut h);
        }

        assert_eq!(q.len(), 10);

        match q[0] {
            SensorData::Baro(ref s) => {
                assert!((s.pressure_pa - GROUND_PRESSURE_PA).abs() < 1.0);
            }
            _ => panic!("expected baro sample"),
        }
    }
}
