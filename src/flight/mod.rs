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

//! Flight node: sensors feed the controller, the controller drives the
//! recorder and the radio link, all from one cooperative loop.

pub mod control;
pub mod link;

use std::collections::VecDeque;
use loft::Node;
use loft::handle::{BasicHandle, Handle, PushableHandle};
use sensor::{Sensor, SensorData};
use protocol::records::FlightSample;
use radio::Radio;
use storage::Watchdog;
use storage::recorder::FlightRecorder;
use storage::settings::SettingsStore;
use self::control::{FlightController, FlightState, ORIENTATION_MODE_TIMEOUT_MS};
use self::link::RadioLink;

/// Bound of the in-RAM live trace (ten minutes at the sample rate).
pub const MAX_TRACE_SAMPLES: usize = 6000;

const FLASH_LOG_INTERVAL_MS: u32 = 100; // 10 Hz while recording

pub struct FlightNode {
    sensors: Vec<Box<Sensor>>,
    queue: VecDeque<SensorData>,
    controller: FlightController,
    recorder: FlightRecorder,
    settings: SettingsStore,
    link: RadioLink,
    watchdog: Box<Watchdog>,

    previous_state: FlightState,
    current_flight_id: u32,
    last_flash_log_ms: u32,
}

impl FlightNode {
    pub fn new(
        radio: Box<Radio>,
        mut recorder: FlightRecorder,
        settings_store: SettingsStore,
        watchdog: Box<Watchdog>,
    ) -> FlightNode {
        if !recorder.init() {
            error!("flight: recorder unavailable, flights will not persist");
        }

        let settings = settings_store.load();

        info!(
            "flight: rocket id {} name {:?}, {} flights stored",
            settings.rocket_id,
            settings.rocket_name,
            recorder.flight_count()
        );

        FlightNode {
            sensors: vec![],
            queue: VecDeque::new(),
            controller: FlightController::new(MAX_TRACE_SAMPLES),
            recorder,
            settings: settings_store,
            link: RadioLink::new(radio, &settings),
            watchdog,
            previous_state: FlightState::Idle,
            current_flight_id: 0,
            last_flash_log_ms: 0,
        }
    }

    pub fn link_sensor(&mut self, s: Box<Sensor>) {
        self.sensors.push(s);
    }

    fn run_sensors(&mut self, h: &mut BasicHandle) {
        let mut handle = PushableHandle::new(h, &mut self.queue);

        for s in self.sensors.iter_mut() {
            s.run(&mut handle);
        }
    }

    fn drain_sensor_queue(&mut self, now_ms: u32) {
        while let Some(data) = self.queue.pop_front() {
            match data {
                SensorData::Baro(s) => {
                    self.link.set_sensor_ok(true);
                    self.controller.update_sensors(s.pressure_pa, s.temperature_c, now_ms);
                }
                SensorData::Imu(s) => {
                    self.controller.update_imu(&s, now_ms);
                }
                SensorData::Gnss(fix) => {
                    self.controller.update_gnss(fix);
                }
            }
        }
    }

    /// Recording starts on launch detect and finalises on landing; both
    /// are edges of the phase machine.
    fn handle_recording_transitions(&mut self, now_ms: u32) {
        let state = self.controller.state();
        if state == self.previous_state {
            return;
        }

        if state == FlightState::Boost && self.previous_state == FlightState::Armed {
            let (lat, lon) = match self.controller.gnss() {
                Some(fix) if fix.valid => {
                    (deg_to_udeg!(fix.latitude_deg), deg_to_udeg!(fix.longitude_deg))
                }
                _ => (0, 0),
            };

            self.current_flight_id = self.recorder.start_flight(
                self.controller.ground_pressure_pa(),
                lat,
                lon,
                self.controller.results().timestamp_unix,
            );

            if self.current_flight_id > 0 {
                self.last_flash_log_ms = now_ms;
            } else {
                warn!("flight: could not start recording (storage full?)");
            }
        } else if state == FlightState::Landed && self.previous_state == FlightState::Descent {
            if self.recorder.is_recording() {
                let results = self.controller.results().clone();
                let saved = self.recorder.end_flight(
                    results.max_altitude_m,
                    results.max_velocity_mps,
                    results.apogee_time_ms,
                    results.flight_time_ms,
                );

                if saved {
                    info!("flight: flight {} saved", self.current_flight_id);
                } else {
                    warn!("flight: failed to save flight {}", self.current_flight_id);
                }

                self.current_flight_id = 0;
            }
        }

        self.previous_state = state;
    }

    fn log_flash_sample(&mut self, now_ms: u32) {
        if !self.recorder.is_recording() ||
           now_ms.wrapping_sub(self.last_flash_log_ms) < FLASH_LOG_INTERVAL_MS {
            return;
        }

        self.last_flash_log_ms = now_ms;

        let mut sample = FlightSample::default();
        sample.time_ms = now_ms.wrapping_sub(self.controller.launch_time_ms());
        sample.altitude_cm = m_to_cm!(self.controller.current_altitude_m());
        sample.velocity_cmps = mps_to_cmps!(self.controller.current_velocity_mps());
        sample.pressure_pa = self.controller.current_pressure_pa() as u32;
        sample.temperature_dc = c_to_decic!(self.controller.current_temperature_c());

        if let Some(fix) = self.controller.gnss() {
            if fix.valid {
                sample.gps_latitude_udeg = deg_to_udeg!(fix.latitude_deg);
                sample.gps_longitude_udeg = deg_to_udeg!(fix.longitude_deg);
                sample.gps_speed_cmps = mps_to_cmps!(fix.speed_mps);
                sample.gps_heading_ddeg = (fix.heading_deg * 10.0) as u16;
                sample.gps_satellites = fix.satellites;
            }
        }

        if let Some(imu) = self.controller.imu() {
            sample.accel_mg = imu.accel_mg;
            sample.gyro_ddps = imu.gyro_ddps;
            sample.mag_mgauss = imu.mag_mgauss;
        }

        sample.state = self.controller.state().as_u8();

        self.recorder.log_sample(&sample);
    }
}

impl Node for FlightNode {
    fn step(&mut self, h: &mut BasicHandle) {
        let now_ms = h.get_millis();

        // sensor read, controller estimate
        self.run_sensors(h);
        self.drain_sensor_queue(now_ms);

        // state machine
        self.controller.update(now_ms);
        self.controller.check_orientation_timeout(now_ms, ORIENTATION_MODE_TIMEOUT_MS);

        // recording edges, then the 10 Hz packed log
        self.handle_recording_transitions(now_ms);
        self.log_flash_sample(now_ms);

        // telemetry out, commands in
        self.link.tick(&self.controller, now_ms);
        self.link.poll(&mut self.controller, &mut self.recorder, &mut self.settings, now_ms);

        self.watchdog.feed();
    }
}
