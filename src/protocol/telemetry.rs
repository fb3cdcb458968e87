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

/// Exact wire size; the layout below is a contract with the gateway and
/// must not drift.
pub const TELEMETRY_PACKET_LEN: usize = 55;

// Byte offsets inside the packet
const OFF_MAGIC: usize = 0;
const OFF_TYPE: usize = 1;
const OFF_ROCKET_ID: usize = 2;
const OFF_SEQUENCE: usize = 3;
const OFF_TIME: usize = 5;
const OFF_ALTITUDE: usize = 9;
const OFF_VELOCITY: usize = 13;
const OFF_PRESSURE: usize = 15;
const OFF_TEMPERATURE: usize = 19;
const OFF_GPS_LAT: usize = 21;
const OFF_GPS_LON: usize = 25;
const OFF_GPS_SPEED: usize = 29;
const OFF_GPS_HEADING: usize = 31;
const OFF_GPS_SATS: usize = 33;
const OFF_ACCEL: usize = 34;
const OFF_GYRO: usize = 40;
const OFF_MAG: usize = 46;
const OFF_STATE: usize = 52;
const OFF_FLAGS: usize = 53;
const OFF_CRC: usize = 54;

/// CRC-8, polynomial 0x31, initial value 0xFF, over the first 54 bytes.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0xFF_u8, |crc, b| {
        let mut crc = crc ^ *b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
        crc
    })
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct TelemetryPacket {
    pub rocket_id: u8,
    pub sequence: u16,
    /// Mission time in ms, 0 before launch
    pub time_ms: u32,
    pub altitude_cm: i32,
    pub velocity_cmps: i16,
    pub pressure_pa: u32,
    /// Temperature * 10 (0.1 C resolution)
    pub temperature_dc: i16,
    /// Microdegrees (deg * 1e6)
    pub gps_latitude_udeg: i32,
    pub gps_longitude_udeg: i32,
    pub gps_speed_cmps: i16,
    /// Heading * 10 (0-3600)
    pub gps_heading_ddeg: u16,
    pub gps_satellites: u8,
    pub accel_mg: [i16; 3],
    pub gyro_ddps: [i16; 3],
    pub mag_mgauss: [i16; 3],
    pub state: u8,
    pub flags: u8,
}

impl TelemetryPacket {
    pub fn encode(&self) -> [u8; TELEMETRY_PACKET_LEN] {
        let mut buf = [0_u8; TELEMETRY_PACKET_LEN];

        buf[OFF_MAGIC] = PACKET_MAGIC;
        buf[OFF_TYPE] = PACKET_TELEMETRY;
        buf[OFF_ROCKET_ID] = self.rocket_id;
        put_u16_le(&mut buf, OFF_SEQUENCE, self.sequence);
        put_u32_le(&mut buf, OFF_TIME, self.time_ms);
        put_i32_le(&mut buf, OFF_ALTITUDE, self.altitude_cm);
        put_i16_le(&mut buf, OFF_VELOCITY, self.velocity_cmps);
        put_u32_le(&mut buf, OFF_PRESSURE, self.pressure_pa);
        put_i16_le(&mut buf, OFF_TEMPERATURE, self.temperature_dc);
        put_i32_le(&mut buf, OFF_GPS_LAT, self.gps_latitude_udeg);
        put_i32_le(&mut buf, OFF_GPS_LON, self.gps_longitude_udeg);
        put_i16_le(&mut buf, OFF_GPS_SPEED, self.gps_speed_cmps);
        put_u16_le(&mut buf, OFF_GPS_HEADING, self.gps_heading_ddeg);
        buf[OFF_GPS_SATS] = self.gps_satellites;

        for i in 0..3 {
            put_i16_le(&mut buf, OFF_ACCEL + i * 2, self.accel_mg[i]);
            put_i16_le(&mut buf, OFF_GYRO + i * 2, self.gyro_ddps[i]);
            put_i16_le(&mut buf, OFF_MAG + i * 2, self.mag_mgauss[i]);
        }

        buf[OFF_STATE] = self.state;
        buf[OFF_FLAGS] = self.flags;
        buf[OFF_CRC] = crc8(&buf[..OFF_CRC]);

        buf
    }

    /// Validates magic, type, length and CRC; anything off means the
    /// frame is discarded by the caller.
    pub fn decode(data: &[u8]) -> Option<TelemetryPacket> {
        if data.len() < TELEMETRY_PACKET_LEN {
            return None;
        }

        if data[OFF_MAGIC] != PACKET_MAGIC || data[OFF_TYPE] != PACKET_TELEMETRY {
            return None;
        }

        if crc8(&data[..OFF_CRC]) != data[OFF_CRC] {
            return None;
        }

        let mut accel_mg = [0_i16; 3];
        let mut gyro_ddps = [0_i16; 3];
        let mut mag_mgauss = [0_i16; 3];

        for i in 0..3 {
            accel_mg[i] = get_i16_le(data, OFF_ACCEL + i * 2);
            gyro_ddps[i] = get_i16_le(data, OFF_GYRO + i * 2);
            mag_mgauss[i] = get_i16_le(data, OFF_MAG + i * 2);
        }

        Some(TelemetryPacket {
            rocket_id: data[OFF_ROCKET_ID],
            sequence: get_u16_le(data, OFF_SEQUENCE),
            time_ms: get_u32_le(data, OFF_TIME),
            altitude_cm: get_i32_le(data, OFF_ALTITUDE),
            velocity_cmps: get_i16_le(data, OFF_VELOCITY),
            pressure_pa: get_u32_le(data, OFF_PRESSURE),
            temperature_dc: get_i16_le(data, OFF_TEMPERATURE),
            gps_latitude_udeg: get_i32_le(data, OFF_GPS_LAT),
            gps_longitude_udeg: get_i32_le(data, OFF_GPS_LON),
            gps_speed_cmps: get_i16_le(data, OFF_GPS_SPEED),
            gps_heading_ddeg: get_u16_le(data, OFF_GPS_HEADING),
            gps_satellites: data[OFF_GPS_SATS],
            accel_mg,
            gyro_ddps,
            mag_mgauss,
            state: data[OFF_STATE],
            flags: data[OFF_FLAGS],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_packet() -> TelemetryPacket {
        TelemetryPacket {
            rocket_id: 0,
            sequence: 0x0201,
            time_ms: 0x06050403,
            altitude_cm: 2743,         // 27.43 m
            velocity_cmps: -150,       // -1.50 m/s
            pressure_pa: 101000,
            temperature_dc: 255,       // 25.5 C
            gps_latitude_udeg: 37750374,
            gps_longitude_udeg: -122526760,
            gps_speed_cmps: 66,
            gps_heading_ddeg: 1800,
            gps_satellites: 9,
            accel_mg: [1, -1, 1000],
            gyro_ddps: [10, -10, 0],
            mag_mgauss: [120, -340, 450],
            state: 3, // coast
            flags: FLAG_GPS_FIX | FLAG_SENSOR_OK,
        }
    }

    #[test]
    fn test_crc8_known_answer() {
        // CRC-8 poly 0x31 init 0xFF check value
        assert_eq!(crc8(b"123456789"), 0xF7);
        assert_eq!(crc8(&[]), 0xFF);
    }

    #[test]
    fn test_byte_layout() {
        let buf = fixed_packet().encode();

        assert_eq!(buf.len(), 55);

        let expected_prefix: [u8; 54] = [
            0xAF, 0x01, 0x00, // magic, telemetry, rocket id 0
            0x01, 0x02, // sequence
            0x03, 0x04, 0x05, 0x06, // time
            0xB7, 0x0A, 0x00, 0x00, // altitude 2743 cm
            0x6A, 0xFF, // velocity -150 cm/s
            0x88, 0x8A, 0x01, 0x00, // pressure 101000 Pa
            0xFF, 0x00, // temperature 255
            0x66, 0x06, 0x40, 0x02, // latitude 37750374
            0xD8, 0x63, 0xB2, 0xF8, // longitude -122526760
            0x42, 0x00, // gps speed 66
            0x08, 0x07, // heading 1800
            0x09, // satellites
            0x01, 0x00, 0xFF, 0xFF, 0xE8, 0x03, // accel
            0x0A, 0x00, 0xF6, 0xFF, 0x00, 0x00, // gyro
            0x78, 0x00, 0xAC, 0xFE, 0xC2, 0x01, // mag
            0x03, // state
            0x30, // flags
        ];

        assert_eq!(&buf[..54], &expected_prefix[..]);
        assert_eq!(buf[54], crc8(&expected_prefix));
    }

    #[test]
    fn test_decode_round_trip() {
        let p = fixed_packet();
        let buf = p.encode();

        assert_eq!(TelemetryPacket::decode(&buf), Some(p));
    }

    #[test]
    fn test_crc_covers_every_bit() {
        let buf = fixed_packet().encode();
        let crc = buf[54];

        for byte in 0..54 {
            for bit in 0..8 {
                let mut corrupted = buf;
                corrupted[byte] ^= 1 << bit;
                assert!(
                    crc8(&corrupted[..54]) != crc,
                    "bit {} of byte {} did not affect the CRC",
                    bit,
                    byte
                );
            }
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let good = fixed_packet().encode();

        // short
        assert_eq!(TelemetryPacket::decode(&good[..54]), None);

        // wrong magic
        let mut bad = good;
        bad[0] = 0xAE;
        assert_eq!(TelemetryPacket::decode(&bad), None);

        // wrong type
        let mut bad = good;
        bad[1] = PACKET_COMMAND;
        assert_eq!(TelemetryPacket::decode(&bad), None);

        // corrupted payload
        let mut bad = good;
        bad[20] ^= 0x10;
        assert_eq!(TelemetryPacket::decode(&bad), None);
    }
}
