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

//! Flight state machine and sensor fusion. Phases advance monotonically
//! under observation of the barometric estimate and only ever return to
//! Idle by explicit command.

use sensor::baro::altitude;
use sensor::imu::ImuSample;
use sensor::gnss::GnssFix;

// Detection thresholds
pub const LAUNCH_ALTITUDE_THRESHOLD_M: f32 = 10.0;
pub const LAUNCH_VELOCITY_THRESHOLD_MPS: f32 = 10.0;
pub const APOGEE_VELOCITY_THRESHOLD_MPS: f32 = 2.0;
pub const LANDING_VELOCITY_THRESHOLD_MPS: f32 = 1.0;

const APOGEE_DESCEND_COUNT: u8 = 3;
const LANDING_STATIONARY_COUNT: u8 = 50; // 5 seconds at 10 Hz
const BURNOUT_VELOCITY_FRACTION: f32 = 0.95;
const BURNOUT_MIN_ALTITUDE_M: f32 = 20.0;
const LANDING_MAX_ALTITUDE_M: f32 = 10.0;

const VELOCITY_SMOOTHING_ALPHA: f32 = 0.3;

pub const ORIENTATION_MODE_TIMEOUT_MS: u32 = 30000;

#[derive(PartialEq, Eq, PartialOrd, Debug, Copy, Clone)]
pub enum FlightState {
    /// Pre-flight, on pad
    Idle,
    /// Armed, waiting for launch detect
    Armed,
    /// Motor burning, accelerating
    Boost,
    /// Coast phase, decelerating upward
    Coast,
    /// At/near apogee; observable for exactly one tick
    Apogee,
    /// Descending, under chute or ballistic
    Descent,
    /// On ground, flight complete
    Landed,
    /// Flight data downloaded, ready for reset
    Complete,
}

impl FlightState {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match *self {
            FlightState::Idle => "idle",
            FlightState::Armed => "armed",
            FlightState::Boost => "boost",
            FlightState::Coast => "coast",
            FlightState::Apogee => "apogee",
            FlightState::Descent => "descent",
            FlightState::Landed => "landed",
            FlightState::Complete => "complete",
        }
    }

    fn in_flight(&self) -> bool {
        *self >= FlightState::Boost && *self <= FlightState::Landed
    }
}

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum FlightError {
    SensorFail,
    NoGround,
    LoRaFail,
    SdFail,
    AlreadyArmed,
    NotArmed,
    InFlight,
}

impl FlightError {
    /// Wire code; 0 is reserved for "no error".
    pub fn as_u8(&self) -> u8 {
        match *self {
            FlightError::SensorFail => 1,
            FlightError::NoGround => 2,
            FlightError::LoRaFail => 3,
            FlightError::SdFail => 4,
            FlightError::AlreadyArmed => 5,
            FlightError::NotArmed => 6,
            FlightError::InFlight => 7,
        }
    }
}

/// Written once per flight; peaks track their running maxima throughout
/// the flight, not merely at state transitions.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct FlightResults {
    pub flight_id: u32,
    pub timestamp_unix: u32,
    pub sample_count: u32,
    pub max_altitude_m: f32,
    pub apogee_time_ms: u32,
    pub max_velocity_mps: f32,
    pub flight_time_ms: u32,
    pub ground_pressure_pa: f32,
    pub ground_temperature_c: f32,
}

/// Low-rate trace kept in RAM for the live uplink.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct TraceSample {
    pub time_ms: u32,
    pub altitude_m: f32,
    pub velocity_mps: f32,
    pub pressure_pa: f32,
    pub temperature_c: f32,
    pub accel_mg: [i16; 3],
}

pub struct FlightController {
    state: FlightState,
    telemetry_enabled: bool,
    sd_logging_enabled: bool,
    orientation_mode: bool,
    orientation_mode_since_ms: u32,

    // Current estimate
    current_pressure_pa: f32,
    current_temperature_c: f32,
    current_altitude_m: f32,
    current_velocity_mps: f32,
    previous_altitude_m: f32,

    // Ground reference, latched at arming (provisionally at the first
    // valid Idle sample so a pre-arm display reads ~0 m)
    ground_pressure_pa: f32,
    ground_temperature_c: f32,

    // Trace collection
    trace: Vec<TraceSample>,
    max_trace_samples: usize,

    launch_time_ms: u32,
    last_sample_time_ms: u32,

    // Detection counters
    apogee_altitude_m: f32,
    apogee_time_ms: u32,
    descending_count: u8,
    stationary_count: u8,

    // Latest auxiliary sensor state
    imu_available: bool,
    last_imu_time_ms: u32,
    latest_imu: ImuSample,
    latest_fix: Option<GnssFix>,

    results: FlightResults,
}

impl FlightController {
    /// `max_trace_samples` bounds the in-RAM trace buffer.
    pub fn new(max_trace_samples: usize) -> FlightController {
        FlightController {
            state: FlightState::Idle,
            telemetry_enabled: false,
            sd_logging_enabled: false,
            orientation_mode: false,
            orientation_mode_since_ms: 0,
            current_pressure_pa: 0.0,
            current_temperature_c: 0.0,
            current_altitude_m: 0.0,
            current_velocity_mps: 0.0,
            previous_altitude_m: 0.0,
            ground_pressure_pa: 0.0,
            ground_temperature_c: 0.0,
            trace: Vec::with_capacity(max_trace_samples),
            max_trace_samples,
            launch_time_ms: 0,
            last_sample_time_ms: 0,
            apogee_altitude_m: 0.0,
            apogee_time_ms: 0,
            descending_count: 0,
            stationary_count: 0,
            imu_available: false,
            last_imu_time_ms: 0,
            latest_imu: ImuSample::default(),
            latest_fix: None,
            results: FlightResults::default(),
        }
    }

    /// Ingest one barometric sample. Silently a no-op for the altitude
    /// estimate until a ground reference exists.
    pub fn update_sensors(&mut self, pressure_pa: f32, temperature_c: f32, t_ms: u32) {
        self.current_pressure_pa = pressure_pa;
        self.current_temperature_c = temperature_c;

        // First valid pressure in Idle becomes a provisional reference
        // so relative altitude can be shown before arming
        if self.ground_pressure_pa <= 0.0 && pressure_pa > 0.0 && self.state == FlightState::Idle {
            self.ground_pressure_pa = pressure_pa;
            self.ground_temperature_c = temperature_c;
        }

        if self.ground_pressure_pa > 0.0 {
            let previous_altitude = self.current_altitude_m;
            self.current_altitude_m = altitude(pressure_pa, self.ground_pressure_pa);

            let delta_ms = t_ms.wrapping_sub(self.last_sample_time_ms);
            if delta_ms > 0 && self.last_sample_time_ms > 0 {
                let delta_s = delta_ms as f32 / 1000.0;
                let instant = (self.current_altitude_m - previous_altitude) / delta_s;

                self.current_velocity_mps = VELOCITY_SMOOTHING_ALPHA * instant +
                                            (1.0 - VELOCITY_SMOOTHING_ALPHA) *
                                            self.current_velocity_mps;
            }

            self.previous_altitude_m = previous_altitude;
        } else {
            self.current_altitude_m = 0.0;
            self.current_velocity_mps = 0.0;
        }

        self.last_sample_time_ms = t_ms;
    }

    /// Complementary-filter prediction step, reserved for refinement;
    /// today the sample is stashed for packet assembly.
    pub fn update_imu(&mut self, imu: &ImuSample, t_ms: u32) {
        self.imu_available = true;
        self.latest_imu = *imu;
        self.last_imu_time_ms = t_ms;
    }

    pub fn update_gnss(&mut self, fix: GnssFix) {
        self.latest_fix = Some(fix);
    }

    /// Advance the state machine one tick and, in a recording phase,
    /// append to the RAM trace while space remains.
    pub fn update(&mut self, t_ms: u32) {
        let previous_state = self.state;

        match self.state {
            FlightState::Idle => {
                // waiting for arm command
            }

            FlightState::Armed => {
                if self.current_altitude_m > LAUNCH_ALTITUDE_THRESHOLD_M ||
                   self.current_velocity_mps > LAUNCH_VELOCITY_THRESHOLD_MPS {
                    self.state = FlightState::Boost;
                    self.launch_time_ms = t_ms;
                    self.telemetry_enabled = true;
                    self.sd_logging_enabled = true;
                    self.trace.clear();

                    self.results.timestamp_unix = t_ms / 1000;
                    self.results.ground_pressure_pa = self.ground_pressure_pa;
                    self.results.ground_temperature_c = self.ground_temperature_c;
                }
            }

            FlightState::Boost => {
                // Burnout: the first significant velocity decrease
                if self.current_velocity_mps <
                   self.results.max_velocity_mps * BURNOUT_VELOCITY_FRACTION &&
                   self.current_altitude_m > BURNOUT_MIN_ALTITUDE_M {
                    self.state = FlightState::Coast;
                }
            }

            FlightState::Coast => {
                if self.current_velocity_mps <= APOGEE_VELOCITY_THRESHOLD_MPS {
                    self.descending_count += 1;
                    if self.descending_count >= APOGEE_DESCEND_COUNT {
                        self.state = FlightState::Apogee;
                        self.apogee_altitude_m = self.current_altitude_m;
                        self.apogee_time_ms = t_ms.wrapping_sub(self.launch_time_ms);

                        self.results.apogee_time_ms = self.apogee_time_ms;
                        if self.apogee_altitude_m > self.results.max_altitude_m {
                            self.results.max_altitude_m = self.apogee_altitude_m;
                        }
                    }
                } else {
                    self.descending_count = 0;
                }
            }

            FlightState::Apogee => {
                // one tick only
                self.state = FlightState::Descent;
            }

            FlightState::Descent => {
                if self.current_velocity_mps.abs() < LANDING_VELOCITY_THRESHOLD_MPS &&
                   self.current_altitude_m < LANDING_MAX_ALTITUDE_M {
                    self.stationary_count += 1;
                    if self.stationary_count >= LANDING_STATIONARY_COUNT {
                        self.state = FlightState::Landed;

                        self.results.flight_time_ms = t_ms.wrapping_sub(self.launch_time_ms);
                        self.results.sample_count = self.trace.len() as u32;
                    }
                } else {
                    self.stationary_count = 0;
                }
            }

            FlightState::Landed => {
                // waiting for download command
            }

            FlightState::Complete => {
                // ready for re-arm
            }
        }

        // Peaks track throughout the flight
        if self.state >= FlightState::Boost && self.state <= FlightState::Descent {
            if self.current_altitude_m > self.results.max_altitude_m {
                self.results.max_altitude_m = self.current_altitude_m;
            }
            if self.current_velocity_mps > self.results.max_velocity_mps {
                self.results.max_velocity_mps = self.current_velocity_mps;
            }
        }

        if self.state.in_flight() && self.trace.len() < self.max_trace_samples {
            let sample = TraceSample {
                time_ms: t_ms.wrapping_sub(self.launch_time_ms),
                altitude_m: self.current_altitude_m,
                velocity_mps: self.current_velocity_mps,
                pressure_pa: self.current_pressure_pa,
                temperature_c: self.current_temperature_c,
                accel_mg: self.latest_imu.accel_mg,
            };
            self.trace.push(sample);
        }

        if previous_state != self.state {
            info!(
                "flight: {} -> {} at {} ms",
                previous_state.name(),
                self.state.name(),
                t_ms
            );
        }
    }

    /// Latch the ground reference and prepare for launch detection.
    pub fn arm(&mut self) -> Result<(), FlightError> {
        if self.state == FlightState::Armed {
            return Err(FlightError::AlreadyArmed);
        }

        if self.state != FlightState::Idle && self.state != FlightState::Complete {
            return Err(FlightError::InFlight);
        }

        self.ground_pressure_pa = self.current_pressure_pa;
        self.ground_temperature_c = self.current_temperature_c;

        self.trace.clear();
        self.descending_count = 0;
        self.stationary_count = 0;
        self.current_altitude_m = 0.0;
        self.current_velocity_mps = 0.0;

        self.results = FlightResults::default();

        self.state = FlightState::Armed;
        Ok(())
    }

    pub fn disarm(&mut self) -> Result<(), FlightError> {
        if self.state == FlightState::Idle {
            return Err(FlightError::NotArmed);
        }

        if self.state != FlightState::Armed {
            return Err(FlightError::InFlight);
        }

        self.state = FlightState::Idle;
        self.telemetry_enabled = false;
        self.sd_logging_enabled = false;

        Ok(())
    }

    /// Unconditional return to Idle. The ground reference is dropped
    /// with the transient counters; the provisional latch re-applies on
    /// the next valid sample.
    pub fn reset(&mut self) {
        self.state = FlightState::Idle;
        self.telemetry_enabled = false;
        self.sd_logging_enabled = false;
        self.trace.clear();
        self.descending_count = 0;
        self.stationary_count = 0;
        self.ground_pressure_pa = 0.0;
        self.ground_temperature_c = 0.0;
    }

    /// The Download command's effect: a landed flight becomes Complete.
    pub fn download_complete(&mut self) -> Result<(), FlightError> {
        match self.state {
            FlightState::Landed => {
                self.state = FlightState::Complete;
                Ok(())
            }
            s if s.in_flight() || s == FlightState::Armed => Err(FlightError::InFlight),
            _ => Err(FlightError::NotArmed),
        }
    }

    pub fn set_orientation_mode(&mut self, enabled: bool, t_ms: u32) {
        self.orientation_mode = enabled;
        self.orientation_mode_since_ms = t_ms;
    }

    /// Auto-disable the high-rate mode once it has been on too long.
    pub fn check_orientation_timeout(&mut self, t_ms: u32, timeout_ms: u32) {
        if self.orientation_mode &&
           t_ms.wrapping_sub(self.orientation_mode_since_ms) >= timeout_ms {
            info!("flight: orientation mode timed out");
            self.orientation_mode = false;
        }
    }

    // Read-only accessors

    pub fn state(&self) -> FlightState {
        self.state
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn results(&self) -> &FlightResults {
        &self.results
    }

    pub fn orientation_mode(&self) -> bool {
        self.orientation_mode
    }

    pub fn sd_logging_enabled(&self) -> bool {
        self.sd_logging_enabled
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry_enabled
    }

    pub fn ground_pressure_pa(&self) -> f32 {
        self.ground_pressure_pa
    }

    pub fn current_altitude_m(&self) -> f32 {
        self.current_altitude_m
    }

    pub fn current_velocity_mps(&self) -> f32 {
        self.current_velocity_mps
    }

    pub fn current_pressure_pa(&self) -> f32 {
        self.current_pressure_pa
    }

    pub fn current_temperature_c(&self) -> f32 {
        self.current_temperature_c
    }

    pub fn launch_time_ms(&self) -> u32 {
        self.launch_time_ms
    }

    pub fn last_sample_time_ms(&self) -> u32 {
        self.last_sample_time_ms
    }

    pub fn trace_len(&self) -> usize {
        self.trace.len()
    }

    pub fn imu(&self) -> Option<&ImuSample> {
        if self.imu_available {
            Some(&self.latest_imu)
        } else {
            None
        }
    }

    pub fn gnss(&self) -> Option<&GnssFix> {
        self.latest_fix.as_ref()
    }
}
