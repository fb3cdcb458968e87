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

use std::time::Instant;
use std::collections::VecDeque;

/// All application timing is expressed in milliseconds since boot, the
/// same time base the flight hardware runs on. The handle is rebuilt once
/// per loop iteration so every subsystem sees one consistent tick.
pub trait Handle {
    fn get_clock(&self) -> Instant;
    fn get_millis(&self) -> u32;
    fn get_frequency(&self) -> u16;
}

pub trait Pushable<D>: Handle {
    fn push_data(&mut self, d: D);
}

pub struct BasicHandle {
    clock: Instant,
    millis: u32,
    freq: u16,
}

impl Handle for BasicHandle {
    fn get_clock(&self) -> Instant {
        self.clock
    }

    fn get_millis(&self) -> u32 {
        self.millis
    }

    fn get_frequency(&self) -> u16 {
        self.freq
    }
}

impl BasicHandle {
    pub fn new(boot: Instant, freq: u16) -> Self {
        let clock = Instant::now();
        let since_boot = clock.duration_since(boot);
        let millis = since_boot.as_secs() * 1000 + (since_boot.subsec_nanos() / 1_000_000) as u64;

        Self {
            clock,
            millis: millis as u32,
            freq,
        }
    }

    /// Build a handle at an explicit tick, for scripted runs.
    pub fn at(millis: u32, freq: u16) -> Self {
        Self {
            clock: Instant::now(),
            millis,
            freq,
        }
    }
}

pub struct PushableHandle<'a, H, D>
    where D: 'a,
          H: 'a + Handle
{
    handle: &'a mut H,
    queue: &'a mut VecDeque<D>,
}

impl<'a, H, D> Handle for PushableHandle<'a, H, D>
    where H: 'a + Handle
{
    fn get_clock(&self) -> Instant {
        self.handle.get_clock()
    }

    fn get_millis(&self) -> u32 {
        self.handle.get_millis()
    }

    fn get_frequency(&self) -> u16 {
        self.handle.get_frequency()
    }
}

impl<'a, H, D> Pushable<D> for PushableHandle<'a, H, D>
    where H: 'a + Handle
{
    fn push_data(&mut self, d: D) {
        self.queue.push_back(d);
    }
}

impl<'a, H, D> PushableHandle<'a, H, D>
    where H: 'a + Handle
{
    pub fn new(handle: &'a mut H, queue: &'a mut VecDeque<D>) -> Self {
        Self { handle, queue }
    }
}
