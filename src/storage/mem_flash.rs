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

//! RAM-backed flash with real NOR semantics: erase sets 0xFF, a program
//! can only clear bits. Backs the coupled simulation and the recorder's
//! persistence tests.

use super::*;

/// Matches the 8 MB part the reference hardware carries.
pub const DEFAULT_CAPACITY: usize = 0x80_0000;

pub struct MemFlash {
    data: Vec<u8>,
}

impl MemFlash {
    pub fn new(capacity: usize) -> MemFlash {
        assert!(capacity % FLASH_SECTOR_SIZE == 0);

        MemFlash { data: vec![0xFF; capacity] }
    }

    pub fn shared(capacity: usize) -> Rc<RefCell<MemFlash>> {
        Rc::new(RefCell::new(MemFlash::new(capacity)))
    }
}

impl FlashMedium for MemFlash {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn erase(&mut self, offset: usize, len: usize) -> bool {
        if offset % FLASH_SECTOR_SIZE != 0 || len % FLASH_SECTOR_SIZE != 0 {
            return false;
        }

        if offset + len > self.data.len() {
            return false;
        }

        for b in &mut self.data[offset..offset + len] {
            *b = 0xFF;
        }

        true
    }

    fn program(&mut self, offset: usize, data: &[u8]) -> bool {
        if offset % FLASH_PAGE_SIZE != 0 || data.is_empty() || data.len() > FLASH_PAGE_SIZE {
            return false;
        }

        if offset + data.len() > self.data.len() {
            return false;
        }

        // NOR programming: bits go from 1 to 0, never back
        for (b, d) in self.data[offset..offset + data.len()].iter_mut().zip(data) {
            *b &= *d;
        }

        true
    }

    fn read(&self, offset: usize, out: &mut [u8]) -> bool {
        if offset + out.len() > self.data.len() {
            return false;
        }

        out.copy_from_slice(&self.data[offset..offset + out.len()]);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_erased() {
        let f = MemFlash::new(FLASH_SECTOR_SIZE);
        let mut buf = [0_u8; 16];
        assert!(f.read(100, &mut buf));
        assert_eq!(buf, [0xFF; 16]);
    }

    #[test]
    fn test_program_clears_bits_only() {
        let mut f = MemFlash::new(FLASH_SECTOR_SIZE);

        assert!(f.program(0, &[0xF0, 0x0F]));

        let mut buf = [0_u8; 2];
        f.read(0, &mut buf);
        assert_eq!(buf, [0xF0, 0x0F]);

        // reprogram without erase cannot set bits back to 1
        assert!(f.program(0, &[0xFF, 0xFF]));
        f.read(0, &mut buf);
        assert_eq!(buf, [0xF0, 0x0F]);

        assert!(f.erase(0, FLASH_SECTOR_SIZE));
        f.read(0, &mut buf);
        assert_eq!(buf, [0xFF, 0xFF]);
    }

    #[test]
    fn test_alignment_enforced() {
        let mut f = MemFlash::new(2 * FLASH_SECTOR_SIZE);

        assert!(!f.erase(1, FLASH_SECTOR_SIZE));
        assert!(!f.erase(0, 100));
        assert!(!f.program(7, &[0]));
        assert!(!f.program(0, &[0; 257]));
        assert!(!f.program(0, &[]));

        // out of range
        assert!(!f.erase(2 * FLASH_SECTOR_SIZE, FLASH_SECTOR_SIZE));
        let mut buf = [0_u8; 4];
        assert!(!f.read(2 * FLASH_SECTOR_SIZE - 2, &mut buf));
    }

    #[test]
    fn test_shared_handle() {
        let shared = MemFlash::shared(FLASH_SECTOR_SIZE);
        let mut a: Box<FlashMedium> = Box::new(shared.clone());
        let b: Box<FlashMedium> = Box::new(shared);

        assert!(a.program(0, &[0x42]));

        let mut buf = [0_u8; 1];
        assert!(b.read(0, &mut buf));
        assert_eq!(buf[0], 0x42);
    }
}
