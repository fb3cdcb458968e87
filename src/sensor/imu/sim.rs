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

use super::*;
use loft::handle::Pushable;
use sensor::{Sensor, SensorData};

const SAMPLE_HZ: u32 = 100;

// Must line up with the simulated barometer's profile
const LAUNCH_MS: u32 = 8000;
const BOOST_MS: u32 = 3000;

pub struct SimImuProvider {
    counter: u32,
}

impl SimImuProvider {
    pub fn new() -> Box<Sensor> {
        Box::new(SimImuProvider { counter: 0 })
    }
}

impl Sensor for SimImuProvider {
    fn run(&mut self, h: &mut Pushable<SensorData>) {
        run_every!(SAMPLE_HZ, self.counter, h, {
            let now = h.get_millis();
            let boosting = now >= LAUNCH_MS && now < LAUNCH_MS + BOOST_MS;

            // 1 g on the pad, ~7 g along the thrust axis during the burn
            let axial_g = if boosting { 7.0 } else { 1.0 };

            h.push_data(SensorData::Imu(ImuSample::from_physical(
                [0.0, 0.0, axial_g],
                [0.0, 0.0, 0.0],
                [0.125, -0.25, 0.5],
            )));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loft::handle::{BasicHandle, PushableHandle};
    use std::collections::VecDeque;

    #[test]
    fn test_boost_window() {
        let mut p = SimImuProvider { counter: 0 };
        let mut q = VecDeque::new();

        for &(t, expected) in &[(0, 1000), (LAUNCH_MS + 100, 7000), (LAUNCH_MS + BOOST_MS + 100, 1000)] {
            q.clear();
            p.counter = 9; // fire on the next tick

            let mut b = BasicHandle::at(t, 1000);
            let mut h = PushableHandle::new(&mut b, &mut q);
            p.run(&mut h);

            match q[0] {
                SensorData::Imu(ref s) => assert_eq!(s.accel_mg[2], expected),
                _ => panic!("expected IMU sample"),
            }
        }
    }
}
