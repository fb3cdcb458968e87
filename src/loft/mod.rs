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

pub mod handle;

use std::time::{Duration, Instant};
use std::thread::sleep;
use self::handle::BasicHandle;

/// One cooperative node. `step` must not block beyond the wall-clock
/// ceilings of its hardware calls; rate control below the loop frequency
/// is each subsystem's own business.
pub trait Node {
    fn step(&mut self, h: &mut BasicHandle);
}

/// Drive the given nodes at a fixed frequency until the process exits.
/// Nodes sharing one loop (the coupled simulation) are stepped in order
/// within each tick.
pub fn run(nodes: &mut [&mut Node], freq: u16) {
    let interval = Duration::from_millis((1000 / freq) as u64);
    let boot = Instant::now();

    loop {
        let before = Instant::now();

        let mut handle = BasicHandle::new(boot, freq);

        for n in nodes.iter_mut() {
            n.step(&mut handle);
        }

        let elapsed = before.elapsed();

        if elapsed < interval {
            sleep(interval - elapsed);
        } else {
            warn!("loop unable to keep up with the set frequency");
        }
    }
}
