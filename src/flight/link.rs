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

//! Radio protocol handler, flight side: RX-by-default, TX-on-demand.
//! Owns the telemetry sequence counter and deadlines; the controller is
//! only read when a packet is assembled.

use flight::control::{FlightController, FlightState};
use protocol::*;
use protocol::telemetry::TelemetryPacket;
use protocol::records::{FlightHeader, FLIGHT_HEADER_LEN, FLIGHT_SAMPLE_LEN};
use radio::Radio;
use storage::recorder::{FlightRecorder, MAX_STORED_FLIGHTS};
use storage::settings::{Settings, SettingsStore, ROCKET_NAME_MAX_LEN};
use version;

const TELEMETRY_TX_TIMEOUT_MS: u32 = 200;
const RESPONSE_TX_TIMEOUT_MS: u32 = 500;

const TELEMETRY_INTERVAL_FLIGHT_MS: u32 = 100; // 10 Hz
const TELEMETRY_INTERVAL_ARMED_MS: u32 = 1000; // 1 Hz
const TELEMETRY_INTERVAL_IDLE_MS: u32 = 2000; // 0.5 Hz heartbeat

/// The link-alive flag holds this long past the last gateway ACK.
const ACK_FRESH_MS: u32 = 5000;

/// Samples per storage-data packet: 3 x 52 bytes plus the framing stays
/// well under the 255-byte payload ceiling.
const SAMPLES_PER_PACKET: u32 = 3;

pub struct RadioLink {
    radio: Box<Radio>,
    rocket_id: u8,
    rocket_name: String,

    sequence: u16,
    last_telemetry_ms: u32,

    // Signal quality of our downlink as measured by the gateway,
    // reported back in ACK packets
    gateway_rssi: i16,
    gateway_snr: i8,
    has_ack: bool,
    last_ack_ms: u32,

    sensor_ok: bool,
}

impl RadioLink {
    pub fn new(radio: Box<Radio>, settings: &Settings) -> RadioLink {
        RadioLink {
            radio,
            rocket_id: settings.rocket_id,
            rocket_name: settings.rocket_name.clone(),
            sequence: 0,
            last_telemetry_ms: 0,
            gateway_rssi: 0,
            gateway_snr: 0,
            has_ack: false,
            last_ack_ms: 0,
            sensor_ok: false,
        }
    }

    pub fn set_sensor_ok(&mut self, ok: bool) {
        self.sensor_ok = ok;
    }

    pub fn rocket_id(&self) -> u8 {
        self.rocket_id
    }

    pub fn link_alive(&self, now_ms: u32) -> bool {
        self.has_ack && now_ms.wrapping_sub(self.last_ack_ms) < ACK_FRESH_MS
    }

    /// Telemetry cadence by phase: 10 Hz through the flight, 1 Hz while
    /// armed, a 0.5 Hz heartbeat otherwise. Orientation mode forces the
    /// flight rate for ground testing.
    pub fn should_send_telemetry(&self, c: &FlightController, now_ms: u32) -> bool {
        let interval = match c.state() {
            FlightState::Boost | FlightState::Coast | FlightState::Apogee |
            FlightState::Descent => TELEMETRY_INTERVAL_FLIGHT_MS,
            FlightState::Armed => TELEMETRY_INTERVAL_ARMED_MS,
            _ => {
                if c.orientation_mode() {
                    TELEMETRY_INTERVAL_FLIGHT_MS
                } else {
                    TELEMETRY_INTERVAL_IDLE_MS
                }
            }
        };

        now_ms.wrapping_sub(self.last_telemetry_ms) >= interval
    }

    pub fn mark_telemetry_sent(&mut self, now_ms: u32) {
        self.last_telemetry_ms = now_ms;
        self.sequence = self.sequence.wrapping_add(1);
    }

    fn flags(&self, c: &FlightController, now_ms: u32) -> u8 {
        let mut flags = 0;

        if c.gnss().map_or(false, |f| f.valid) {
            flags |= FLAG_GPS_FIX;
        }
        if self.sensor_ok {
            flags |= FLAG_SENSOR_OK;
        }
        if c.sd_logging_enabled() {
            flags |= FLAG_SD_LOGGING;
        }
        if self.link_alive(now_ms) {
            flags |= FLAG_LORA_LINK;
        }
        if c.orientation_mode() {
            flags |= FLAG_ORIENTATION_MODE;
        }

        flags
    }

    /// Assemble a telemetry packet from the controller's current
    /// estimate. Byte-identical output for byte-identical inputs.
    pub fn build_telemetry_packet(&self, c: &FlightController, now_ms: u32) -> TelemetryPacket {
        let mut p = TelemetryPacket::default();

        p.rocket_id = self.rocket_id;
        p.sequence = self.sequence;

        p.time_ms = if c.launch_time_ms() > 0 {
            c.last_sample_time_ms().wrapping_sub(c.launch_time_ms())
        } else {
            0
        };

        p.altitude_cm = m_to_cm!(c.current_altitude_m());
        p.velocity_cmps = mps_to_cmps!(c.current_velocity_mps());
        p.pressure_pa = c.current_pressure_pa() as u32;
        p.temperature_dc = c_to_decic!(c.current_temperature_c());

        if let Some(fix) = c.gnss() {
            if fix.valid {
                p.gps_latitude_udeg = deg_to_udeg!(fix.latitude_deg);
                p.gps_longitude_udeg = deg_to_udeg!(fix.longitude_deg);
                p.gps_speed_cmps = mps_to_cmps!(fix.speed_mps);
                p.gps_heading_ddeg = (fix.heading_deg * 10.0) as u16;
                p.gps_satellites = fix.satellites;
            }
        }

        if let Some(imu) = c.imu() {
            p.accel_mg = imu.accel_mg;
            p.gyro_ddps = imu.gyro_ddps;
            p.mag_mgauss = imu.mag_mgauss;
        }

        p.state = c.state().as_u8();
        p.flags = self.flags(c, now_ms);

        p
    }

    /// Transmit telemetry when due, then return to RX.
    pub fn tick(&mut self, c: &FlightController, now_ms: u32) {
        if !self.should_send_telemetry(c, now_ms) {
            return;
        }

        let packet = self.build_telemetry_packet(c, now_ms);
        let buf = packet.encode();

        if self.radio.send_blocking(&buf, TELEMETRY_TX_TIMEOUT_MS) {
            self.mark_telemetry_sent(now_ms);
            debug!("link: telemetry seq {} sent", packet.sequence);
        } else {
            debug!("link: telemetry TX failed");
        }

        self.radio.start_receive();
    }

    /// Drain one received frame and dispatch it. Invalid or unaddressed
    /// frames are discarded silently.
    pub fn poll(
        &mut self,
        c: &mut FlightController,
        recorder: &mut FlightRecorder,
        settings: &mut SettingsStore,
        now_ms: u32,
    ) {
        let frame = match self.radio.receive() {
            Some(f) => f,
            None => return,
        };

        if frame.payload.len() < 3 || frame.payload[0] != PACKET_MAGIC {
            trace!("link: discarding invalid frame");
            self.radio.start_receive();
            return;
        }

        match frame.payload[1] {
            PACKET_ACK => {
                if frame.payload.len() >= ACK_PACKET_LEN {
                    self.gateway_rssi = get_i16_le(&frame.payload, 2);
                    self.gateway_snr = frame.payload[4] as i8;
                    self.has_ack = true;
                    self.last_ack_ms = now_ms;
                    trace!(
                        "link: gateway ACK rssi {} snr {}",
                        self.gateway_rssi,
                        self.gateway_snr
                    );
                }
            }
            PACKET_COMMAND => {
                if frame.payload.len() >= 4 {
                    let target = frame.payload[2];

                    if target == self.rocket_id || target == BROADCAST_ROCKET_ID {
                        self.dispatch_command(
                            &frame.payload,
                            frame.rssi,
                            frame.snr,
                            c,
                            recorder,
                            settings,
                            now_ms,
                        );
                    } else {
                        debug!("link: command for rocket {}, ignoring", target);
                    }
                }
            }
            _ => {
                trace!("link: ignoring packet type 0x{:02X}", frame.payload[1]);
            }
        }

        self.radio.start_receive();
    }

    fn dispatch_command(
        &mut self,
        payload: &[u8],
        rssi: i16,
        snr: i8,
        c: &mut FlightController,
        recorder: &mut FlightRecorder,
        settings: &mut SettingsStore,
        now_ms: u32,
    ) {
        let command = payload[3];
        debug!("link: command 0x{:02X}", command);

        match command {
            CMD_ARM => {
                if let Err(e) = c.arm() {
                    warn!("link: arm refused ({:?})", e);
                }
            }
            CMD_DISARM => {
                if let Err(e) = c.disarm() {
                    warn!("link: disarm refused ({:?})", e);
                }
            }
            CMD_RESET => {
                c.reset();
            }
            CMD_DOWNLOAD => {
                if let Err(e) = c.download_complete() {
                    warn!("link: download refused ({:?})", e);
                }
            }
            CMD_PING | CMD_STATUS => {
                // signal quality as measured on this very reception
                self.send_ack(rssi, snr);
            }
            CMD_INFO => {
                self.send_device_info(c);
            }
            CMD_ORIENTATION_MODE => {
                let enabled = payload.len() > 4 && payload[4] != 0;
                c.set_orientation_mode(enabled, now_ms);
            }
            CMD_SET_ROCKET_NAME => {
                if payload.len() > 4 {
                    let raw = &payload[4..];
                    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                    let len = end.min(ROCKET_NAME_MAX_LEN);
                    let name = String::from_utf8_lossy(&raw[..len]).into_owned();

                    let new_settings = Settings {
                        rocket_id: self.rocket_id,
                        rocket_name: name,
                    };

                    if settings.save(&new_settings) {
                        self.rocket_name = settings.load().rocket_name;
                        info!("link: rocket name set to {:?}", self.rocket_name);
                    }
                }
            }
            CMD_FLASH_LIST => {
                self.send_flash_list(recorder);
            }
            CMD_FLASH_READ => {
                if payload.len() >= 9 {
                    let slot = payload[4];
                    let start_sample = get_u32_le(payload, 5);

                    if start_sample == STORAGE_READ_HEADER {
                        self.send_flash_header(recorder, slot);
                    } else {
                        self.send_flash_data(recorder, slot, start_sample);
                    }
                }
            }
            CMD_FLASH_DELETE => {
                if payload.len() >= 5 {
                    let slot = payload[4];

                    if slot == 0xFF {
                        recorder.delete_all_flights();
                    } else if !recorder.delete_flight(slot as usize) {
                        warn!("link: delete refused for slot {}", slot);
                    }
                }
            }
            _ => {
                debug!("link: unknown command 0x{:02X}", command);
            }
        }
    }

    fn send_ack(&mut self, rssi: i16, snr: i8) {
        let mut buf = [0_u8; ACK_PACKET_LEN];
        buf[0] = PACKET_MAGIC;
        buf[1] = PACKET_ACK;
        put_i16_le(&mut buf, 2, rssi);
        buf[4] = snr as u8;

        self.radio.send_blocking(&buf, RESPONSE_TX_TIMEOUT_MS);
    }

    /// Length-prefixed device information: version, build, hardware
    /// bitfield, state, trace sample count, identity.
    fn send_device_info(&mut self, c: &FlightController) {
        let mut buf = Vec::with_capacity(128);

        buf.push(PACKET_MAGIC);
        buf.push(PACKET_INFO);

        let ver = version::FIRMWARE_VERSION.as_bytes();
        buf.push(ver.len() as u8);
        buf.extend_from_slice(ver);

        let build = version::BUILD_STRING.as_bytes();
        buf.push(build.len() as u8);
        buf.extend_from_slice(build);

        let mut hw = 0_u8;
        if self.sensor_ok {
            hw |= 0x01; // barometer
        }
        hw |= 0x02; // radio: we would not be answering otherwise
        if c.imu().is_some() {
            hw |= 0x04;
        }
        if c.gnss().is_some() {
            hw |= 0x20;
        }
        buf.push(hw);

        buf.push(c.state().as_u8());

        let samples = c.trace_len() as u32;
        let mut count = [0_u8; 4];
        put_u32_le(&mut count, 0, samples);
        buf.extend_from_slice(&count);

        buf.push(self.rocket_id);

        let name = self.rocket_name.as_bytes();
        buf.push(name.len() as u8);
        buf.extend_from_slice(name);

        debug!("link: sending device info ({} bytes)", buf.len());
        self.radio.send_blocking(&buf, RESPONSE_TX_TIMEOUT_MS);
    }

    /// One packet summarising every stored flight.
    fn send_flash_list(&mut self, recorder: &FlightRecorder) {
        let mut buf = Vec::with_capacity(128);

        buf.push(PACKET_MAGIC);
        buf.push(PACKET_STORAGE_LIST);
        buf.push(recorder.flight_count() as u8);

        for slot in 0..MAX_STORED_FLIGHTS {
            let header = match recorder.get_header(slot) {
                Some(h) => h,
                None => continue,
            };

            buf.push(slot as u8);

            let mut fields = [0_u8; 16];
            put_u32_le(&mut fields, 0, header.flight_id);
            put_i32_le(&mut fields, 4, m_to_cm!(header.max_altitude_m));
            put_u32_le(&mut fields, 8, header.flight_time_ms);
            put_u32_le(&mut fields, 12, header.sample_count);
            buf.extend_from_slice(&fields);
        }

        debug!("link: sending flash list ({} bytes)", buf.len());
        self.radio.send_blocking(&buf, RESPONSE_TX_TIMEOUT_MS);
    }

    /// Header variant of a dump packet: the start-sample field carries
    /// the sentinel and the packed header follows directly.
    fn send_flash_header(&mut self, recorder: &FlightRecorder, slot: u8) {
        let header = match recorder.get_header(slot as usize) {
            Some(h) => h,
            None => {
                warn!("link: flash header request for invalid slot {}", slot);
                return;
            }
        };

        let mut buf = Vec::with_capacity(7 + FLIGHT_HEADER_LEN);

        buf.push(PACKET_MAGIC);
        buf.push(PACKET_STORAGE_DATA);
        buf.push(slot);

        let mut start = [0_u8; 4];
        put_u32_le(&mut start, 0, STORAGE_READ_HEADER);
        buf.extend_from_slice(&start);

        buf.extend_from_slice(&header.encode());

        debug!("link: sending flash header for slot {}", slot);
        self.radio.send_blocking(&buf, RESPONSE_TX_TIMEOUT_MS);
    }

    /// Up to three packed samples per packet.
    fn send_flash_data(&mut self, recorder: &FlightRecorder, slot: u8, start_sample: u32) {
        let header = match recorder.get_header(slot as usize) {
            Some(h) => h,
            None => {
                warn!("link: flash read request for invalid slot {}", slot);
                return;
            }
        };

        let remaining = if start_sample < header.sample_count {
            header.sample_count - start_sample
        } else {
            0
        };
        let to_send = remaining.min(SAMPLES_PER_PACKET);

        let mut buf = Vec::with_capacity(12 + to_send as usize * FLIGHT_SAMPLE_LEN);

        buf.push(PACKET_MAGIC);
        buf.push(PACKET_STORAGE_DATA);
        buf.push(slot);

        let mut fields = [0_u8; 8];
        put_u32_le(&mut fields, 0, start_sample);
        put_u32_le(&mut fields, 4, header.sample_count);
        buf.extend_from_slice(&fields);

        buf.push(to_send as u8);

        for i in 0..to_send {
            if let Some(sample) = recorder.get_sample(slot as usize, start_sample + i) {
                buf.extend_from_slice(&sample.encode());
            }
        }

        debug!(
            "link: sending flash data slot {} start {} count {}",
            slot,
            start_sample,
            to_send
        );
        self.radio.send_blocking(&buf, RESPONSE_TX_TIMEOUT_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio::loopback::LoopbackRadio;
    use storage::NullWatchdog;
    use storage::mem_flash::MemFlash;
    use storage::settings::SettingsStore;
    use storage::recorder::FlightRecorder;
    use protocol::records::FlightSample;

    struct Rig {
        link: RadioLink,
        ground: LoopbackRadio,
        controller: FlightController,
        recorder: FlightRecorder,
        settings: SettingsStore,
    }

    fn rig() -> Rig {
        let (air, ground) = LoopbackRadio::pair();
        let flash = MemFlash::shared(0x100000);

        let mut recorder =
            FlightRecorder::new(Box::new(flash.clone()), Box::new(NullWatchdog));
        recorder.init();

        let settings_store = SettingsStore::new(Box::new(flash));
        let settings = settings_store.load();

        let mut controller = FlightController::new(6000);
        controller.update_sensors(101325.0, 25.0, 1000);

        Rig {
            link: RadioLink::new(Box::new(air), &settings),
            ground,
            controller,
            recorder,
            settings: settings_store,
        }
    }

    fn command(target: u8, cmd: u8, params: &[u8]) -> Vec<u8> {
        let mut buf = vec![PACKET_MAGIC, PACKET_COMMAND, target, cmd];
        buf.extend_from_slice(params);
        buf
    }

    fn poll(r: &mut Rig, now: u32) {
        r.link.poll(&mut r.controller, &mut r.recorder, &mut r.settings, now);
    }

    #[test]
    fn test_telemetry_cadence_by_phase() {
        let r = rig();

        // idle heartbeat at 0.5 Hz
        assert!(r.link.should_send_telemetry(&r.controller, 2000));
        assert!(!r.link.should_send_telemetry(&r.controller, 1999));

        let mut r = rig();
        r.controller.arm().unwrap();
        assert!(r.link.should_send_telemetry(&r.controller, 1000));
        assert!(!r.link.should_send_telemetry(&r.controller, 999));

        // flight rate after launch detect
        r.controller.update_sensors(101000.0, 25.0, 2000);
        r.controller.update(2000);
        assert_eq!(r.controller.state(), FlightState::Boost);
        r.link.mark_telemetry_sent(2000);
        assert!(!r.link.should_send_telemetry(&r.controller, 2099));
        assert!(r.link.should_send_telemetry(&r.controller, 2100));
    }

    #[test]
    fn test_orientation_mode_forces_flight_rate() {
        let mut r = rig();

        r.link.mark_telemetry_sent(1000);
        assert!(!r.link.should_send_telemetry(&r.controller, 1200));

        r.controller.set_orientation_mode(true, 1000);
        assert!(r.link.should_send_telemetry(&r.controller, 1200));
    }

    #[test]
    fn test_tick_sends_and_sequence_advances() {
        let mut r = rig();

        r.link.tick(&r.controller, 5000);
        r.link.tick(&r.controller, 5001); // not due again yet
        r.link.tick(&r.controller, 7001);

        let first = r.ground.receive().expect("first telemetry frame");
        let second = r.ground.receive().expect("second telemetry frame");
        assert!(r.ground.receive().is_none());

        let p1 = TelemetryPacket::decode(&first.payload).unwrap();
        let p2 = TelemetryPacket::decode(&second.payload).unwrap();

        assert_eq!(p1.sequence, 0);
        assert_eq!(p2.sequence, 1);
        assert_eq!(p1.state, FlightState::Idle.as_u8());
        assert_eq!(p1.pressure_pa, 101325);
    }

    #[test]
    fn test_build_packet_deterministic() {
        let r = rig();

        let a = r.link.build_telemetry_packet(&r.controller, 4000).encode();
        let b = r.link.build_telemetry_packet(&r.controller, 4000).encode();
        assert_eq!(&a[..], &b[..]);
    }

    #[test]
    fn test_command_addressing() {
        let mut r = rig();

        // addressed to another rocket: ignored
        r.ground.send_blocking(&command(7, CMD_ARM, &[]), 100);
        poll(&mut r, 2000);
        assert_eq!(r.controller.state(), FlightState::Idle);

        // broadcast: accepted
        r.ground.send_blocking(&command(BROADCAST_ROCKET_ID, CMD_ARM, &[]), 100);
        poll(&mut r, 2100);
        assert_eq!(r.controller.state(), FlightState::Armed);

        // our id (0 by default): accepted
        r.ground.send_blocking(&command(0, CMD_DISARM, &[]), 100);
        poll(&mut r, 2200);
        assert_eq!(r.controller.state(), FlightState::Idle);
    }

    #[test]
    fn test_garbage_frames_dropped() {
        let mut r = rig();

        r.ground.send_blocking(&[0x55, 0xAA, 0x01, 0x02], 100); // wrong magic
        r.ground.send_blocking(&[PACKET_MAGIC, PACKET_COMMAND], 100); // short
        poll(&mut r, 2000);
        poll(&mut r, 2001);

        assert_eq!(r.controller.state(), FlightState::Idle);
        assert!(r.ground.receive().is_none()); // nothing answered
    }

    #[test]
    fn test_ping_answers_with_rx_signal_quality() {
        let mut r = rig();

        // the ACK must carry what the flight node's receiver measured on
        // the command frame; the loopback radio stamps -60 dBm / 9 dB
        r.ground.send_blocking(&command(0, CMD_PING, &[]), 100);
        poll(&mut r, 3000);

        let ack = r.ground.receive().expect("ACK frame");
        assert_eq!(ack.payload.len(), ACK_PACKET_LEN);
        assert_eq!(ack.payload[0], PACKET_MAGIC);
        assert_eq!(ack.payload[1], PACKET_ACK);
        // loopback default signal is -60 dBm / 9 dB
        assert_eq!(get_i16_le(&ack.payload, 2), -60);
        assert_eq!(ack.payload[4] as i8, 9);
    }

    #[test]
    fn test_ack_ingestion_sets_link_flag() {
        let mut r = rig();

        assert!(!r.link.link_alive(1000));

        let mut ack = [0_u8; ACK_PACKET_LEN];
        ack[0] = PACKET_MAGIC;
        ack[1] = PACKET_ACK;
        put_i16_le(&mut ack, 2, -72);
        ack[4] = 6;
        r.ground.send_blocking(&ack, 100);
        poll(&mut r, 1000);

        assert!(r.link.link_alive(1500));
        assert!(r.link.link_alive(5999));
        assert!(!r.link.link_alive(6000));

        // flag shows up in built packets while fresh
        let p = r.link.build_telemetry_packet(&r.controller, 1500);
        assert!(p.flags & FLAG_LORA_LINK != 0);
    }

    #[test]
    fn test_info_response_layout() {
        let mut r = rig();

        r.ground.send_blocking(&command(0, CMD_INFO, &[]), 100);
        poll(&mut r, 2000);

        let frame = r.ground.receive().expect("info frame");
        let p = &frame.payload;

        assert_eq!(p[0], PACKET_MAGIC);
        assert_eq!(p[1], PACKET_INFO);

        let mut off = 2;
        let ver_len = p[off] as usize;
        off += 1;
        assert_eq!(&p[off..off + ver_len], version::FIRMWARE_VERSION.as_bytes());
        off += ver_len;

        let build_len = p[off] as usize;
        off += 1;
        off += build_len;

        let _hw = p[off];
        off += 1;
        assert_eq!(p[off], FlightState::Idle.as_u8());
        off += 1;
        off += 4; // sample count
        assert_eq!(p[off], 0); // rocket id
        off += 1;
        assert_eq!(p[off], 0); // empty name
    }

    #[test]
    fn test_set_rocket_name_persists() {
        let mut r = rig();

        r.ground.send_blocking(&command(0, CMD_SET_ROCKET_NAME, b"Aether II\0"), 100);
        poll(&mut r, 2000);

        assert_eq!(r.settings.load().rocket_name, "Aether II");
    }

    fn store_flight(r: &mut Rig, samples: u32) -> u32 {
        let id = r.recorder.start_flight(101325.0, 37750374, -122526760, 0);
        for i in 0..samples {
            let mut s = FlightSample::default();
            s.time_ms = i * 100;
            s.altitude_cm = i as i32 * 50;
            r.recorder.log_sample(&s);
        }
        r.recorder.end_flight(500.0, 80.0, 10000, 60000);
        id
    }

    #[test]
    fn test_flash_list_response() {
        let mut r = rig();
        store_flight(&mut r, 10);
        store_flight(&mut r, 20);

        r.ground.send_blocking(&command(0, CMD_FLASH_LIST, &[]), 100);
        poll(&mut r, 2000);

        let frame = r.ground.receive().expect("list frame");
        let p = &frame.payload;

        assert_eq!(p[1], PACKET_STORAGE_LIST);
        assert_eq!(p[2], 2);
        assert_eq!(p.len(), 3 + 2 * 17);

        // first entry: slot 0, flight 1
        assert_eq!(p[3], 0);
        assert_eq!(get_u32_le(p, 4), 1);
        assert_eq!(get_i32_le(p, 8), 50000); // 500 m in cm
        assert_eq!(get_u32_le(p, 12), 60000);
        assert_eq!(get_u32_le(p, 16), 10);

        // second entry: slot 1, flight 2, 20 samples
        assert_eq!(p[20], 1);
        assert_eq!(get_u32_le(p, 21), 2);
        assert_eq!(get_u32_le(p, 33), 20);
    }

    #[test]
    fn test_flash_read_samples() {
        let mut r = rig();
        store_flight(&mut r, 10);

        let mut params = [0_u8; 5];
        params[0] = 0; // slot
        put_u32_le(&mut params, 1, 4); // start sample
        r.ground.send_blocking(&command(0, CMD_FLASH_READ, &params), 100);
        poll(&mut r, 2000);

        let frame = r.ground.receive().expect("data frame");
        let p = &frame.payload;

        assert_eq!(p[1], PACKET_STORAGE_DATA);
        assert_eq!(p[2], 0);
        assert_eq!(get_u32_le(p, 3), 4); // start
        assert_eq!(get_u32_le(p, 7), 10); // total
        assert_eq!(p[11], 3); // chunk
        assert_eq!(p.len(), 12 + 3 * FLIGHT_SAMPLE_LEN);

        let s = FlightSample::decode(&p[12..12 + FLIGHT_SAMPLE_LEN]).unwrap();
        assert_eq!(s.time_ms, 400);
        assert_eq!(s.altitude_cm, 200);
    }

    #[test]
    fn test_flash_read_tail_chunk() {
        let mut r = rig();
        store_flight(&mut r, 10);

        let mut params = [0_u8; 5];
        put_u32_le(&mut params, 1, 9);
        r.ground.send_blocking(&command(0, CMD_FLASH_READ, &params), 100);
        poll(&mut r, 2000);

        let frame = r.ground.receive().unwrap();
        assert_eq!(frame.payload[11], 1);
        assert_eq!(frame.payload.len(), 12 + FLIGHT_SAMPLE_LEN);
    }

    #[test]
    fn test_flash_read_header_sentinel() {
        let mut r = rig();
        store_flight(&mut r, 10);

        let mut params = [0_u8; 5];
        put_u32_le(&mut params, 1, STORAGE_READ_HEADER);
        r.ground.send_blocking(&command(0, CMD_FLASH_READ, &params), 100);
        poll(&mut r, 2000);

        let frame = r.ground.receive().expect("header frame");
        let p = &frame.payload;

        assert_eq!(p[1], PACKET_STORAGE_DATA);
        assert_eq!(get_u32_le(p, 3), STORAGE_READ_HEADER);
        assert_eq!(p.len(), 7 + FLIGHT_HEADER_LEN);

        let h = FlightHeader::decode(&p[7..]).unwrap();
        assert_eq!(h.flight_id, 1);
        assert_eq!(h.sample_count, 10);
        assert!(h.checksum_valid());
    }

    #[test]
    fn test_flash_delete_via_radio() {
        let mut r = rig();
        store_flight(&mut r, 5);
        store_flight(&mut r, 5);
        assert_eq!(r.recorder.flight_count(), 2);

        r.ground.send_blocking(&command(0, CMD_FLASH_DELETE, &[1]), 100);
        poll(&mut r, 2000);
        assert_eq!(r.recorder.flight_count(), 1);

        // 0xFF wipes everything
        store_flight(&mut r, 5);
        r.ground.send_blocking(&command(0, CMD_FLASH_DELETE, &[0xFF]), 100);
        poll(&mut r, 2100);
        assert_eq!(r.recorder.flight_count(), 0);
    }

    #[test]
    fn test_download_command_completes_flight() {
        let mut r = rig();

        // drive the controller to Landed through its public API
        r.controller.arm().unwrap();
        r.controller.update_sensors(101000.0, 25.0, 2000);
        r.controller.update(2000);
        assert_eq!(r.controller.state(), FlightState::Boost);

        let ground = 101325.0_f32;
        let mut t = 2000;
        for i in 0..10 {
            t += 100;
            r.controller.update_sensors(
                ::sensor::baro::pressure_for_altitude(40.0 + 30.0 * i as f32, ground),
                25.0,
                t,
            );
            r.controller.update(t);
        }
        let hold = r.controller.current_altitude_m();
        for _ in 0..40 {
            t += 100;
            r.controller.update_sensors(
                ::sensor::baro::pressure_for_altitude(hold, ground),
                25.0,
                t,
            );
            r.controller.update(t);
        }
        for _ in 0..200 {
            t += 100;
            r.controller.update_sensors(ground, 25.0, t);
            r.controller.update(t);
            if r.controller.state() == FlightState::Landed {
                break;
            }
        }
        assert_eq!(r.controller.state(), FlightState::Landed);

        r.ground.send_blocking(&command(0, CMD_DOWNLOAD, &[]), 100);
        poll(&mut r, t + 100);
        assert_eq!(r.controller.state(), FlightState::Complete);
    }
}
