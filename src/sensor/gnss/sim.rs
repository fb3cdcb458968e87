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

const FIX_HZ: u32 = 1;

pub struct SimGnssProvider {
    counter: u32,
}

impl SimGnssProvider {
    pub fn new() -> Box<Sensor> {
        Box::new(SimGnssProvider { counter: 0 })
    }
}

impl Sensor for SimGnssProvider {
    fn run(&mut self, h: &mut Pushable<SensorData>) {
        run_every!(FIX_HZ, self.counter, h, {
            h.push_data(SensorData::Gnss(GnssFix {
                valid: true,
                latitude_deg: 37.750374,
                longitude_deg: -122.52676,
                speed_mps: 0.0,
                heading_deg: 0.0,
                satellites: 9,
                time: Some(UTC.ymd(2018, 6, 2).and_hms(9, 10, 11)),
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
    fn test_sim_gnss_provider() {
        let mut p = SimGnssProvider::new();
        let mut q = VecDeque::<SensorData>::new();

        for _ in 0..1000 {
            let mut b = BasicHandle::at(0, 1000);
            let mut h = PushableHandle::new(&mut b, &mut q);
            p.run(&mut h);
        }

        // 1 Hz provider on a 1 kHz loop
        assert_eq!(q.len(), 1);

        assert_eq!(
            q[0],
            SensorData::Gnss(GnssFix {
                valid: true,
                latitude_deg: 37.750374,
                longitude_deg: -122.52676,
                speed_mps: 0.0,
                heading_deg: 0.0,
                satellites: 9,
                time: Some(UTC.ymd(2018, 6, 2).and_hms(9, 10, 11)),
            })
        );
    }
}
