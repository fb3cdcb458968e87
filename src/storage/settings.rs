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

//! Rocket identity persisted in its own sector at the very top of flash:
//! magic, version, rocket id, name, byte-sum checksum. Survives
//! independently of the recorder's index.

use super::*;
use protocol::{get_u32_le, put_u32_le};
use protocol::records::{byte_sum, SETTINGS_MAGIC, STORAGE_VERSION};

pub const ROCKET_NAME_MAX_LEN: usize = 32;

// magic(4) version(4) rocket_id(1) name_len(1) name(32)
const PAYLOAD_LEN: usize = 10 + ROCKET_NAME_MAX_LEN;

#[derive(PartialEq, Debug, Clone)]
pub struct Settings {
    pub rocket_id: u8,
    pub rocket_name: String,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            rocket_id: 0,
            rocket_name: String::new(),
        }
    }
}

pub struct SettingsStore {
    flash: Box<FlashMedium>,
}

impl SettingsStore {
    pub fn new(flash: Box<FlashMedium>) -> SettingsStore {
        SettingsStore { flash }
    }

    fn sector_offset(&self) -> usize {
        self.flash.capacity() - FLASH_SECTOR_SIZE
    }

    /// Read the sector; defaults when the magic, version or checksum do
    /// not hold up.
    pub fn load(&self) -> Settings {
        let mut buf = [0_u8; PAYLOAD_LEN + 4];

        if !self.flash.read(self.sector_offset(), &mut buf) {
            return Settings::default();
        }

        if get_u32_le(&buf, 0) != SETTINGS_MAGIC || get_u32_le(&buf, 4) != STORAGE_VERSION {
            return Settings::default();
        }

        if byte_sum(&buf[..PAYLOAD_LEN]) != get_u32_le(&buf, PAYLOAD_LEN) {
            warn!("settings: checksum mismatch, using defaults");
            return Settings::default();
        }

        let rocket_id = buf[8] & 0x0F;
        let name_len = (buf[9] as usize).min(ROCKET_NAME_MAX_LEN);
        let name = String::from_utf8_lossy(&buf[10..10 + name_len]).into_owned();

        Settings {
            rocket_id,
            rocket_name: name,
        }
    }

    /// Erase-then-program the sector with the given identity.
    pub fn save(&mut self, settings: &Settings) -> bool {
        let mut page = [0xFF_u8; FLASH_PAGE_SIZE];

        put_u32_le(&mut page, 0, SETTINGS_MAGIC);
        put_u32_le(&mut page, 4, STORAGE_VERSION);
        page[8] = settings.rocket_id & 0x0F;

        let name = settings.rocket_name.as_bytes();
        let name_len = name.len().min(ROCKET_NAME_MAX_LEN);
        page[9] = name_len as u8;
        page[10..10 + name_len].copy_from_slice(&name[..name_len]);
        for b in &mut page[10 + name_len..10 + ROCKET_NAME_MAX_LEN] {
            *b = 0;
        }

        let checksum = byte_sum(&page[..PAYLOAD_LEN]);
        put_u32_le(&mut page, PAYLOAD_LEN, checksum);

        let offset = self.sector_offset();

        if !self.flash.erase(offset, FLASH_SECTOR_SIZE) {
            error!("settings: erase failed");
            return false;
        }

        if !self.flash.program(offset, &page) {
            error!("settings: program failed");
            return false;
        }

        info!("settings: saved rocket id {} name {:?}", settings.rocket_id, settings.rocket_name);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::mem_flash::MemFlash;

    #[test]
    fn test_defaults_on_blank_flash() {
        let store = SettingsStore::new(Box::new(MemFlash::new(0x10000)));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut store = SettingsStore::new(Box::new(MemFlash::new(0x10000)));

        let s = Settings {
            rocket_id: 5,
            rocket_name: "Aether II".to_string(),
        };

        assert!(store.save(&s));
        assert_eq!(store.load(), s);
    }

    #[test]
    fn test_rewrite_replaces() {
        let mut store = SettingsStore::new(Box::new(MemFlash::new(0x10000)));

        store.save(&Settings {
            rocket_id: 3,
            rocket_name: "first".to_string(),
        });
        store.save(&Settings {
            rocket_id: 4,
            rocket_name: "second".to_string(),
        });

        let loaded = store.load();
        assert_eq!(loaded.rocket_id, 4);
        assert_eq!(loaded.rocket_name, "second");
    }

    #[test]
    fn test_name_truncated_and_id_masked() {
        let mut store = SettingsStore::new(Box::new(MemFlash::new(0x10000)));

        let long: String = (0..50).map(|_| 'x').collect();
        store.save(&Settings {
            rocket_id: 0x1F,
            rocket_name: long,
        });

        let loaded = store.load();
        assert_eq!(loaded.rocket_id, 0x0F);
        assert_eq!(loaded.rocket_name.len(), ROCKET_NAME_MAX_LEN);
    }

    #[test]
    fn test_corruption_detected() {
        let flash = MemFlash::shared(0x10000);
        let mut store = SettingsStore::new(Box::new(flash.clone()));

        store.save(&Settings {
            rocket_id: 2,
            rocket_name: "ok".to_string(),
        });

        // clear a byte of the stored name without touching the checksum
        let mut page = [0xFF_u8; 16];
        page[11] = 0x00;
        assert!(flash.borrow_mut().program(0x10000 - FLASH_SECTOR_SIZE, &page));

        assert_eq!(store.load(), Settings::default());
    }
}
