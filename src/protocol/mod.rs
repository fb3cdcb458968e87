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

//! Radio wire protocol shared by both nodes. All multi-byte fields are
//! little-endian, on the wire and in flash.

pub mod telemetry;
pub mod records;
pub mod base64;

pub const PACKET_MAGIC: u8 = 0xAF;

// Packet types
pub const PACKET_TELEMETRY: u8 = 0x01;
pub const PACKET_STATUS: u8 = 0x02;
pub const PACKET_COMMAND: u8 = 0x03;
pub const PACKET_ACK: u8 = 0x04;
pub const PACKET_DATA: u8 = 0x05;
pub const PACKET_STORAGE_LIST: u8 = 0x06;
pub const PACKET_STORAGE_DATA: u8 = 0x07;
pub const PACKET_INFO: u8 = 0x08;

// Command ids carried in PACKET_COMMAND
pub const CMD_ARM: u8 = 0x01;
pub const CMD_DISARM: u8 = 0x02;
pub const CMD_STATUS: u8 = 0x03;
pub const CMD_RESET: u8 = 0x04;
pub const CMD_DOWNLOAD: u8 = 0x05;
pub const CMD_PING: u8 = 0x06;
pub const CMD_INFO: u8 = 0x07;
pub const CMD_ORIENTATION_MODE: u8 = 0x08;
pub const CMD_SET_ROCKET_NAME: u8 = 0x09;
pub const CMD_FLASH_LIST: u8 = 0x20;
pub const CMD_FLASH_READ: u8 = 0x21;
pub const CMD_FLASH_DELETE: u8 = 0x22;

/// A command addressed to 0xFF is for every rocket in earshot.
pub const BROADCAST_ROCKET_ID: u8 = 0xFF;

// Telemetry flags byte
pub const FLAG_PYRO1_CONTINUITY: u8 = 0x01;
pub const FLAG_PYRO2_CONTINUITY: u8 = 0x02;
pub const FLAG_SD_LOGGING: u8 = 0x04;
pub const FLAG_LOW_BATTERY: u8 = 0x08;
pub const FLAG_GPS_FIX: u8 = 0x10;
pub const FLAG_SENSOR_OK: u8 = 0x20;
pub const FLAG_LORA_LINK: u8 = 0x40;
pub const FLAG_ORIENTATION_MODE: u8 = 0x80;

/// ACK frame: [magic][type][rssi lo][rssi hi][snr]
pub const ACK_PACKET_LEN: usize = 5;

/// `start_sample` value marking a storage-data packet that carries the
/// flight header instead of samples.
pub const STORAGE_READ_HEADER: u32 = 0xFFFF_FFFF;

const STATE_NAMES: [&'static str; 8] = [
    "idle", "armed", "boost", "coast", "apogee", "descent", "landed", "complete",
];

/// Wire name for a flight state byte.
pub fn state_name(state: u8) -> &'static str {
    if (state as usize) < STATE_NAMES.len() {
        STATE_NAMES[state as usize]
    } else {
        "unknown"
    }
}

pub fn put_u16_le(buf: &mut [u8], offset: usize, v: u16) {
    buf[offset] = v as u8;
    buf[offset + 1] = (v >> 8) as u8;
}

pub fn put_u32_le(buf: &mut [u8], offset: usize, v: u32) {
    buf[offset] = v as u8;
    buf[offset + 1] = (v >> 8) as u8;
    buf[offset + 2] = (v >> 16) as u8;
    buf[offset + 3] = (v >> 24) as u8;
}

pub fn put_i16_le(buf: &mut [u8], offset: usize, v: i16) {
    put_u16_le(buf, offset, v as u16);
}

pub fn put_i32_le(buf: &mut [u8], offset: usize, v: i32) {
    put_u32_le(buf, offset, v as u32);
}

pub fn put_f32_le(buf: &mut [u8], offset: usize, v: f32) {
    put_u32_le(buf, offset, v.to_bits());
}

pub fn get_u16_le(buf: &[u8], offset: usize) -> u16 {
    buf[offset] as u16 | (buf[offset + 1] as u16) << 8
}

pub fn get_u32_le(buf: &[u8], offset: usize) -> u32 {
    buf[offset] as u32 | (buf[offset + 1] as u32) << 8 | (buf[offset + 2] as u32) << 16 |
    (buf[offset + 3] as u32) << 24
}

pub fn get_i16_le(buf: &[u8], offset: usize) -> i16 {
    get_u16_le(buf, offset) as i16
}

pub fn get_i32_le(buf: &[u8], offset: usize) -> i32 {
    get_u32_le(buf, offset) as i32
}

pub fn get_f32_le(buf: &[u8], offset: usize) -> f32 {
    f32::from_bits(get_u32_le(buf, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_round_trip() {
        let mut buf = [0_u8; 8];

        put_u32_le(&mut buf, 0, 0xDEADBEEF);
        assert_eq!(&buf[..4], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(get_u32_le(&buf, 0), 0xDEADBEEF);

        put_i16_le(&mut buf, 4, -2);
        assert_eq!(&buf[4..6], &[0xFE, 0xFF]);
        assert_eq!(get_i16_le(&buf, 4), -2);

        put_i32_le(&mut buf, 0, -100000);
        assert_eq!(get_i32_le(&buf, 0), -100000);

        put_f32_le(&mut buf, 0, 1234.5);
        assert_eq!(get_f32_le(&buf, 0), 1234.5);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(state_name(0), "idle");
        assert_eq!(state_name(4), "apogee");
        assert_eq!(state_name(7), "complete");
        assert_eq!(state_name(8), "unknown");
        assert_eq!(state_name(0xFF), "unknown");
    }
}
