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

//! Packed flight records: the per-sample trace stored in flash and the
//! per-slot header in front of it. Same layouts travel inside
//! storage-data packets during a dump.

use super::*;

pub const FLIGHT_SAMPLE_LEN: usize = 52;
pub const FLIGHT_HEADER_LEN: usize = 72;

// "FGHT", "INDX", "SETT" as the reference stores them
pub const FLIGHT_MAGIC: u32 = 0x54484746;
pub const INDEX_MAGIC: u32 = 0x58444E49;
pub const SETTINGS_MAGIC: u32 = 0x53455454;
pub const STORAGE_VERSION: u32 = 1;

/// Byte-sum checksum used by every persistent structure.
pub fn byte_sum(data: &[u8]) -> u32 {
    data.iter().fold(0_u32, |sum, b| sum.wrapping_add(*b as u32))
}

/// One recorded instant, 52 bytes packed. The four bytes after the state
/// byte are reserved and always zero.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct FlightSample {
    /// Time since launch (ms)
    pub time_ms: u32,
    pub altitude_cm: i32,
    pub velocity_cmps: i16,
    pub pressure_pa: u32,
    pub temperature_dc: i16,
    pub gps_latitude_udeg: i32,
    pub gps_longitude_udeg: i32,
    pub gps_speed_cmps: i16,
    pub gps_heading_ddeg: u16,
    pub gps_satellites: u8,
    pub accel_mg: [i16; 3],
    pub gyro_ddps: [i16; 3],
    pub mag_mgauss: [i16; 3],
    pub state: u8,
}

impl FlightSample {
    pub fn encode(&self) -> [u8; FLIGHT_SAMPLE_LEN] {
        let mut buf = [0_u8; FLIGHT_SAMPLE_LEN];

        put_u32_le(&mut buf, 0, self.time_ms);
        put_i32_le(&mut buf, 4, self.altitude_cm);
        put_i16_le(&mut buf, 8, self.velocity_cmps);
        put_u32_le(&mut buf, 10, self.pressure_pa);
        put_i16_le(&mut buf, 14, self.temperature_dc);
        put_i32_le(&mut buf, 16, self.gps_latitude_udeg);
        put_i32_le(&mut buf, 20, self.gps_longitude_udeg);
        put_i16_le(&mut buf, 24, self.gps_speed_cmps);
        put_u16_le(&mut buf, 26, self.gps_heading_ddeg);
        buf[28] = self.gps_satellites;

        for i in 0..3 {
            put_i16_le(&mut buf, 29 + i * 2, self.accel_mg[i]);
            put_i16_le(&mut buf, 35 + i * 2, self.gyro_ddps[i]);
            put_i16_le(&mut buf, 41 + i * 2, self.mag_mgauss[i]);
        }

        buf[47] = self.state;
        // 48..52 reserved

        buf
    }

    pub fn decode(data: &[u8]) -> Option<FlightSample> {
        if data.len() < FLIGHT_SAMPLE_LEN {
            return None;
        }

        let mut accel_mg = [0_i16; 3];
        let mut gyro_ddps = [0_i16; 3];
        let mut mag_mgauss = [0_i16; 3];

        for i in 0..3 {
            accel_mg[i] = get_i16_le(data, 29 + i * 2);
            gyro_ddps[i] = get_i16_le(data, 35 + i * 2);
            mag_mgauss[i] = get_i16_le(data, 41 + i * 2);
        }

        Some(FlightSample {
            time_ms: get_u32_le(data, 0),
            altitude_cm: get_i32_le(data, 4),
            velocity_cmps: get_i16_le(data, 8),
            pressure_pa: get_u32_le(data, 10),
            temperature_dc: get_i16_le(data, 14),
            gps_latitude_udeg: get_i32_le(data, 16),
            gps_longitude_udeg: get_i32_le(data, 20),
            gps_speed_cmps: get_i16_le(data, 24),
            gps_heading_ddeg: get_u16_le(data, 26),
            gps_satellites: data[28],
            accel_mg,
            gyro_ddps,
            mag_mgauss,
            state: data[47],
        })
    }
}

/// Slot header, 72 bytes packed, written as the first page of a slot.
/// The checksum is the byte sum of everything before it.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct FlightHeader {
    pub magic: u32,
    pub version: u32,
    pub flight_id: u32,
    /// Launch time as a Unix timestamp, 0 when no clock was available
    pub timestamp_unix: u32,
    pub sample_count: u32,
    pub max_altitude_m: f32,
    pub max_velocity_mps: f32,
    pub apogee_time_ms: u32,
    pub flight_time_ms: u32,
    pub ground_pressure_pa: f32,
    pub launch_latitude_udeg: i32,
    pub launch_longitude_udeg: i32,
    pub checksum: u32,
}

const OFF_CHECKSUM: usize = 68; // 48 bytes of fields + 20 reserved

impl FlightHeader {
    pub fn encode(&self) -> [u8; FLIGHT_HEADER_LEN] {
        let mut buf = [0_u8; FLIGHT_HEADER_LEN];

        put_u32_le(&mut buf, 0, self.magic);
        put_u32_le(&mut buf, 4, self.version);
        put_u32_le(&mut buf, 8, self.flight_id);
        put_u32_le(&mut buf, 12, self.timestamp_unix);
        put_u32_le(&mut buf, 16, self.sample_count);
        put_f32_le(&mut buf, 20, self.max_altitude_m);
        put_f32_le(&mut buf, 24, self.max_velocity_mps);
        put_u32_le(&mut buf, 28, self.apogee_time_ms);
        put_u32_le(&mut buf, 32, self.flight_time_ms);
        put_f32_le(&mut buf, 36, self.ground_pressure_pa);
        put_i32_le(&mut buf, 40, self.launch_latitude_udeg);
        put_i32_le(&mut buf, 44, self.launch_longitude_udeg);
        // 48..68 reserved
        put_u32_le(&mut buf, OFF_CHECKSUM, self.checksum);

        buf
    }

    pub fn decode(data: &[u8]) -> Option<FlightHeader> {
        if data.len() < FLIGHT_HEADER_LEN {
            return None;
        }

        Some(FlightHeader {
            magic: get_u32_le(data, 0),
            version: get_u32_le(data, 4),
            flight_id: get_u32_le(data, 8),
            timestamp_unix: get_u32_le(data, 12),
            sample_count: get_u32_le(data, 16),
            max_altitude_m: get_f32_le(data, 20),
            max_velocity_mps: get_f32_le(data, 24),
            apogee_time_ms: get_u32_le(data, 28),
            flight_time_ms: get_u32_le(data, 32),
            ground_pressure_pa: get_f32_le(data, 36),
            launch_latitude_udeg: get_i32_le(data, 40),
            launch_longitude_udeg: get_i32_le(data, 44),
            checksum: get_u32_le(data, OFF_CHECKSUM),
        })
    }

    /// Compute and store the checksum; call once all other fields are
    /// final.
    pub fn seal(&mut self) {
        let buf = self.encode();
        self.checksum = byte_sum(&buf[..OFF_CHECKSUM]);
    }

    pub fn checksum_valid(&self) -> bool {
        let buf = self.encode();
        byte_sum(&buf[..OFF_CHECKSUM]) == self.checksum
    }
}
