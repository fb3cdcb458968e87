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

//! Protocol translation between the binary radio link and the
//! line-oriented JSON host link. Every emitted line is one record; the
//! record shapes are a contract with the host application.

use serde_json;
use protocol::*;
use protocol::telemetry::TelemetryPacket;
use protocol::records::{FlightHeader, FLIGHT_HEADER_LEN, FLIGHT_SAMPLE_LEN};
use protocol::base64;
use sensor::baro::{altitude, BaroSample, SEA_LEVEL_PRESSURE_PA};
use version;

/// The radio link is declared lost after this long without a frame.
pub const LINK_TIMEOUT_MS: u32 = 5000;

#[derive(Serialize)]
struct TelRecord<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    seq: u16,
    t: u32,
    alt: f32,
    dalt: f32,
    vel: f32,
    pres: u32,
    gpres: f32,
    galt: f32,
    temp: f32,
    lat: f32,
    lon: f32,
    gspd: f32,
    hdg: f32,
    sat: u8,
    gps: bool,
    state: &'a str,
    flags: u8,
    rssi: i16,
    snr: i8,
}

#[derive(Serialize)]
struct LinkRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    status: &'static str,
}

#[derive(Serialize)]
struct AckRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    id: u32,
    ok: bool,
}

#[derive(Serialize)]
struct StatusRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    id: u32,
    connected: bool,
    rx: u32,
    tx: u32,
    rssi: i16,
    snr: i8,
}

#[derive(Serialize)]
struct GwInfoRecord<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: u32,
    version: &'a str,
    build: &'a str,
    protocol: &'a str,
    connected: bool,
    rx: u32,
    tx: u32,
    rssi: i16,
    snr: i8,
    ground_pres: f32,
    ground_temp: f32,
}

#[derive(Serialize)]
struct FcInfoRecord<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    version: &'a str,
    build: &'a str,
    baro: bool,
    lora: bool,
    imu: bool,
    gps: bool,
    state: &'a str,
    samples: u32,
    rocket_id: u8,
    name: &'a str,
}

#[derive(Serialize)]
struct FlashListEntry {
    slot: u8,
    id: u32,
    alt: f32,
    time: u32,
    samples: u32,
}

#[derive(Serialize)]
struct FlashListRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    count: u8,
    flights: Vec<FlashListEntry>,
}

#[derive(Serialize)]
struct FlashDataRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    slot: u8,
    start: u32,
    total: u32,
    count: u8,
    data: String,
}

#[derive(Serialize)]
struct FlashHeaderRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    slot: u8,
    id: u32,
    timestamp: u32,
    samples: u32,
    max_alt: f32,
    max_vel: f32,
    apogee_ms: u32,
    flight_ms: u32,
    ground_pres: f32,
    lat: f32,
    lon: f32,
}

#[derive(Deserialize)]
struct HostCommand {
    cmd: String,
    #[serde(default)]
    id: u32,
    slot: Option<u8>,
    sample: Option<u32>,
    enabled: Option<bool>,
    rocket: Option<u8>,
}

/// What one radio frame turns into: host lines to emit (in order), and
/// optionally an ACK to transmit after them.
#[derive(Debug, Default)]
pub struct FrameResult {
    pub lines: Vec<String>,
    pub ack: Option<[u8; ACK_PACKET_LEN]>,
}

/// What one host line turns into.
#[derive(PartialEq, Debug)]
pub enum HostAction {
    /// Answered locally; emit these lines
    Reply(Vec<String>),
    /// Needs the flight node: transmit, then acknowledge with the
    /// correlation id
    Forward { id: u32, packet: Vec<u8> },
    /// Unparseable; drop
    Ignore,
}

pub struct GatewayProtocol {
    connected: bool,
    last_packet_ms: u32,
    packets_received: u32,
    packets_sent: u32,
    packets_lost: u32,
    last_rssi: i16,
    last_snr: i8,

    ground_pressure_pa: f32,
    ground_temperature_c: f32,
}

fn to_line<T: ::serde::Serialize>(record: &T) -> String {
    // record structs cannot fail to serialize
    serde_json::to_string(record).unwrap()
}

impl GatewayProtocol {
    pub fn new() -> GatewayProtocol {
        GatewayProtocol {
            connected: false,
            last_packet_ms: 0,
            packets_received: 0,
            packets_sent: 0,
            packets_lost: 0,
            last_rssi: 0,
            last_snr: 0,
            ground_pressure_pa: 0.0,
            ground_temperature_c: 0.0,
        }
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn ground_pressure_pa(&self) -> f32 {
        self.ground_pressure_pa
    }

    /// Latch the co-located barometer reading used for differential
    /// altitude.
    pub fn set_ground_baro(&mut self, sample: &BaroSample) {
        self.ground_pressure_pa = sample.pressure_pa;
        self.ground_temperature_c = sample.temperature_c;
    }

    /// Record a successful uplink transmission.
    pub fn mark_sent(&mut self) {
        self.packets_sent += 1;
    }

    pub fn ack_line(&self, id: u32, ok: bool) -> String {
        to_line(&AckRecord {
            kind: "ack",
            id,
            ok,
        })
    }

    pub fn link_status_line(&self, status: &'static str) -> String {
        to_line(&LinkRecord {
            kind: "link",
            status,
        })
    }

    /// Declare the link lost when nothing has been heard for too long.
    pub fn supervise(&mut self, now_ms: u32) -> Option<String> {
        if self.connected && now_ms.wrapping_sub(self.last_packet_ms) > LINK_TIMEOUT_MS {
            self.connected = false;
            info!("gateway: link lost");
            return Some(self.link_status_line("lost"));
        }

        None
    }

    /// Translate one received radio frame. Statistics and link state
    /// update for every frame; only well-formed packets produce records.
    pub fn on_radio_frame(&mut self, payload: &[u8], rssi: i16, snr: i8, now_ms: u32) -> FrameResult {
        let mut result = FrameResult::default();

        self.packets_received += 1;
        self.last_packet_ms = now_ms;
        self.last_rssi = rssi;
        self.last_snr = snr;

        if !self.connected {
            self.connected = true;
            info!("gateway: link established");
            result.lines.push(self.link_status_line("connected"));
        }

        if payload.len() < 3 || payload[0] != PACKET_MAGIC {
            debug!("gateway: invalid frame ({} bytes)", payload.len());
            self.packets_lost += 1;
            return result;
        }

        match payload[1] {
            PACKET_TELEMETRY => {
                match TelemetryPacket::decode(payload) {
                    Some(packet) => {
                        result.lines.push(self.telemetry_line(&packet, rssi, snr));

                        let mut ack = [0_u8; ACK_PACKET_LEN];
                        ack[0] = PACKET_MAGIC;
                        ack[1] = PACKET_ACK;
                        put_i16_le(&mut ack, 2, rssi);
                        ack[4] = snr as u8;
                        result.ack = Some(ack);
                    }
                    None => {
                        debug!("gateway: telemetry frame failed validation");
                        self.packets_lost += 1;
                    }
                }
            }
            PACKET_STORAGE_LIST => {
                if let Some(line) = self.storage_list_line(payload) {
                    result.lines.push(line);
                } else {
                    self.packets_lost += 1;
                }
            }
            PACKET_STORAGE_DATA => {
                if let Some(line) = self.storage_data_line(payload) {
                    result.lines.push(line);
                } else {
                    self.packets_lost += 1;
                }
            }
            PACKET_INFO => {
                if let Some(line) = self.fc_info_line(payload) {
                    result.lines.push(line);
                } else {
                    self.packets_lost += 1;
                }
            }
            PACKET_ACK => {
                // our own ACK echoed back by another gateway; ignore
            }
            other => {
                trace!("gateway: ignoring packet type 0x{:02X}", other);
            }
        }

        result
    }

    fn telemetry_line(&self, p: &TelemetryPacket, rssi: i16, snr: i8) -> String {
        // the gateway's own height above standard sea level
        let galt = altitude(self.ground_pressure_pa, SEA_LEVEL_PRESSURE_PA);

        // vehicle altitude against the gateway's ground pressure; more
        // trustworthy than the vehicle's self-referenced figure when the
        // gateway sits at the launch site
        let dalt = if self.ground_pressure_pa > 0.0 && p.pressure_pa > 0 {
            altitude(p.pressure_pa as f32, self.ground_pressure_pa)
        } else {
            0.0
        };

        to_line(&TelRecord {
            kind: "tel",
            seq: p.sequence,
            t: p.time_ms,
            alt: p.altitude_cm as f32 / 100.0,
            dalt,
            vel: p.velocity_cmps as f32 / 100.0,
            pres: p.pressure_pa,
            gpres: self.ground_pressure_pa,
            galt,
            temp: p.temperature_dc as f32 / 10.0,
            lat: p.gps_latitude_udeg as f32 / 1000000.0,
            lon: p.gps_longitude_udeg as f32 / 1000000.0,
            gspd: p.gps_speed_cmps as f32 / 100.0,
            hdg: p.gps_heading_ddeg as f32 / 10.0,
            sat: p.gps_satellites,
            gps: p.flags & FLAG_GPS_FIX != 0,
            state: state_name(p.state),
            flags: p.flags,
            rssi,
            snr,
        })
    }

    fn storage_list_line(&self, payload: &[u8]) -> Option<String> {
        if payload.len() < 3 {
            return None;
        }

        let count = payload[2];
        let mut flights = Vec::with_capacity(count as usize);
        let mut offset = 3;

        for _ in 0..count {
            if offset + 17 > payload.len() {
                break;
            }

            flights.push(FlashListEntry {
                slot: payload[offset],
                id: get_u32_le(payload, offset + 1),
                alt: get_i32_le(payload, offset + 5) as f32 / 100.0,
                time: get_u32_le(payload, offset + 9),
                samples: get_u32_le(payload, offset + 13),
            });

            offset += 17;
        }

        Some(to_line(&FlashListRecord {
            kind: "flash_list",
            count,
            flights,
        }))
    }

    fn storage_data_line(&self, payload: &[u8]) -> Option<String> {
        if payload.len() < 7 {
            return None;
        }

        let slot = payload[2];
        let start = get_u32_le(payload, 3);

        if start == STORAGE_READ_HEADER {
            // header variant: the packed header follows directly
            if payload.len() < 7 + FLIGHT_HEADER_LEN {
                return None;
            }

            let h = FlightHeader::decode(&payload[7..])?;

            return Some(to_line(&FlashHeaderRecord {
                kind: "flash_header",
                slot,
                id: h.flight_id,
                timestamp: h.timestamp_unix,
                samples: h.sample_count,
                max_alt: h.max_altitude_m,
                max_vel: h.max_velocity_mps,
                apogee_ms: h.apogee_time_ms,
                flight_ms: h.flight_time_ms,
                ground_pres: h.ground_pressure_pa,
                lat: h.launch_latitude_udeg as f32 / 1000000.0,
                lon: h.launch_longitude_udeg as f32 / 1000000.0,
            }));
        }

        if payload.len() < 12 {
            return None;
        }

        let total = get_u32_le(payload, 7);
        let count = payload[11];
        let expected = 12 + count as usize * FLIGHT_SAMPLE_LEN;

        if payload.len() < expected {
            return None;
        }

        Some(to_line(&FlashDataRecord {
            kind: "flash_data",
            slot,
            start,
            total,
            count,
            data: base64::encode(&payload[12..expected]),
        }))
    }

    fn fc_info_line(&self, payload: &[u8]) -> Option<String> {
        let mut offset = 2;

        let take_str = |payload: &[u8], offset: &mut usize| -> Option<String> {
            let len = *payload.get(*offset)? as usize;
            *offset += 1;
            if *offset + len > payload.len() {
                return None;
            }
            let s = String::from_utf8_lossy(&payload[*offset..*offset + len]).into_owned();
            *offset += len;
            Some(s)
        };

        let fc_version = take_str(payload, &mut offset)?;
        let build = take_str(payload, &mut offset)?;

        if offset + 7 > payload.len() {
            return None;
        }

        let hw = payload[offset];
        offset += 1;
        let state = payload[offset];
        offset += 1;
        let samples = get_u32_le(payload, offset);
        offset += 4;
        let rocket_id = payload[offset];
        offset += 1;

        let name = take_str(payload, &mut offset).unwrap_or_else(String::new);

        Some(to_line(&FcInfoRecord {
            kind: "fc_info",
            version: &fc_version,
            build: &build,
            baro: hw & 0x01 != 0,
            lora: hw & 0x02 != 0,
            imu: hw & 0x04 != 0,
            gps: hw & 0x20 != 0,
            state: state_name(state),
            samples,
            rocket_id,
            name: &name,
        }))
    }

    /// Parse one host line and answer it locally or turn it into a
    /// radio command frame addressed at `rocket` (broadcast by default).
    pub fn on_host_line(&mut self, line: &str) -> HostAction {
        let cmd: HostCommand = match serde_json::from_str(line) {
            Ok(c) => c,
            Err(e) => {
                warn!("gateway: unparseable host line: {}", e);
                return HostAction::Ignore;
            }
        };

        let target = cmd.rocket.unwrap_or(BROADCAST_ROCKET_ID);

        let forward = |cmd_id: u8, params: &[u8]| -> HostAction {
            let mut packet = vec![PACKET_MAGIC, PACKET_COMMAND, target, cmd_id];
            packet.extend_from_slice(params);
            HostAction::Forward {
                id: cmd.id,
                packet,
            }
        };

        match cmd.cmd.as_str() {
            "ping" => HostAction::Reply(vec![self.ack_line(cmd.id, true)]),

            "status" => {
                HostAction::Reply(vec![
                    to_line(&StatusRecord {
                        kind: "status",
                        id: cmd.id,
                        connected: self.connected,
                        rx: self.packets_received,
                        tx: self.packets_sent,
                        rssi: self.last_rssi,
                        snr: self.last_snr,
                    }),
                ])
            }

            "gw_info" => {
                HostAction::Reply(vec![
                    to_line(&GwInfoRecord {
                        kind: "gw_info",
                        id: cmd.id,
                        version: version::FIRMWARE_VERSION,
                        build: version::BUILD_STRING,
                        protocol: version::PROTOCOL_VERSION,
                        connected: self.connected,
                        rx: self.packets_received,
                        tx: self.packets_sent,
                        rssi: self.last_rssi,
                        snr: self.last_snr,
                        ground_pres: self.ground_pressure_pa,
                        ground_temp: self.ground_temperature_c,
                    }),
                ])
            }

            "arm" => forward(CMD_ARM, &[]),
            "disarm" => forward(CMD_DISARM, &[]),
            "reset" => forward(CMD_RESET, &[]),
            "download" => forward(CMD_DOWNLOAD, &[]),
            "info" => forward(CMD_INFO, &[]),

            "orientation_mode" => {
                let enabled = cmd.enabled.unwrap_or(false);
                forward(CMD_ORIENTATION_MODE, &[enabled as u8])
            }

            "flash_list" => forward(CMD_FLASH_LIST, &[]),

            "flash_read" => {
                match cmd.slot {
                    Some(slot) => {
                        let mut params = [0_u8; 5];
                        params[0] = slot;
                        put_u32_le(&mut params, 1, cmd.sample.unwrap_or(0));
                        forward(CMD_FLASH_READ, &params)
                    }
                    None => HostAction::Reply(vec![self.ack_line(cmd.id, false)]),
                }
            }

            "flash_delete" => {
                match cmd.slot {
                    Some(slot) => forward(CMD_FLASH_DELETE, &[slot]),
                    None => HostAction::Reply(vec![self.ack_line(cmd.id, false)]),
                }
            }

            other => {
                debug!("gateway: unknown host command {:?}", other);
                HostAction::Reply(vec![self.ack_line(cmd.id, false)])
            }
        }
    }
}
