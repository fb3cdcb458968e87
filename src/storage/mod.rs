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

pub mod mem_flash;
pub mod recorder;
pub mod settings;

use std::rc::Rc;
use std::cell::RefCell;

pub const FLASH_SECTOR_SIZE: usize = 4096;
pub const FLASH_PAGE_SIZE: usize = 256;

/// On-chip NOR flash seam. Erase granularity is the 4 KB sector, program
/// granularity the 256 B page; programming can only clear bits, so a
/// region must be erased (to 0xFF) before it is written.
///
/// Implementations execute erase/program inside their own critical
/// section — interrupts disabled for the duration of the call and
/// restored on every exit path — as the flash controller requires.
pub trait FlashMedium {
    fn capacity(&self) -> usize;

    /// Erase `len` bytes at `offset`; both must be sector-aligned.
    fn erase(&mut self, offset: usize, len: usize) -> bool;

    /// Program up to one page at a page-aligned `offset`.
    fn program(&mut self, offset: usize, data: &[u8]) -> bool;

    /// Random read of any span inside the device.
    fn read(&self, offset: usize, out: &mut [u8]) -> bool;
}

/// The flash device is singular but serves two owners (recorder region,
/// settings sector); a shared handle keeps the driver itself single.
impl<M: FlashMedium> FlashMedium for Rc<RefCell<M>> {
    fn capacity(&self) -> usize {
        self.borrow().capacity()
    }

    fn erase(&mut self, offset: usize, len: usize) -> bool {
        self.borrow_mut().erase(offset, len)
    }

    fn program(&mut self, offset: usize, data: &[u8]) -> bool {
        self.borrow_mut().program(offset, data)
    }

    fn read(&self, offset: usize, out: &mut [u8]) -> bool {
        self.borrow().read(offset, out)
    }
}

/// Fed between long flash operations and once per loop iteration.
pub trait Watchdog {
    fn feed(&mut self);
}

/// Hosted builds have no hardware watchdog.
pub struct NullWatchdog;

impl Watchdog for NullWatchdog {
    fn feed(&mut self) {}
}
