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

//! Slot-based flight recorder. One flight per 64 KB slot: a header page
//! followed by packed samples. A single index sector is the only
//! authority on which slots hold valid flights; a slot becomes visible
//! when, and only when, its used-bit reaches the index.

use super::*;
use protocol::{get_u32_le, put_u32_le};
use protocol::records::*;

pub const MAX_STORED_FLIGHTS: usize = 7;
pub const FLIGHT_SLOT_SIZE: usize = 0x10000;
pub const MAX_SAMPLES_PER_FLIGHT: usize = 1200;

/// Recorder region at the top of the device: slots, then the index
/// sector 8 KB below the top (the settings sector sits above it).
const STORAGE_REGION_SIZE: usize = 0x80000;

const INDEX_PAYLOAD_LEN: usize = 12 + MAX_STORED_FLIGHTS; // magic, version, next id, slot bytes

pub struct FlightRecorder {
    flash: Box<FlashMedium>,
    watchdog: Box<Watchdog>,
    initialized: bool,
    recording: bool,
    next_flight_id: u32,
    slot_used: [bool; MAX_STORED_FLIGHTS],
    current_slot: Option<usize>,
    header: FlightHeader,
    samples: Vec<FlightSample>,
}

impl FlightRecorder {
    pub fn new(flash: Box<FlashMedium>, watchdog: Box<Watchdog>) -> FlightRecorder {
        FlightRecorder {
            flash,
            watchdog,
            initialized: false,
            recording: false,
            next_flight_id: 1,
            slot_used: [false; MAX_STORED_FLIGHTS],
            current_slot: None,
            header: FlightHeader::default(),
            samples: Vec::with_capacity(MAX_SAMPLES_PER_FLIGHT),
        }
    }

    fn index_offset(&self) -> usize {
        self.flash.capacity() - 2 * FLASH_SECTOR_SIZE
    }

    fn slots_offset(&self) -> usize {
        self.flash.capacity() - STORAGE_REGION_SIZE
    }

    fn slot_offset(&self, slot: usize) -> usize {
        self.slots_offset() + slot * FLIGHT_SLOT_SIZE
    }

    /// Read the index sector; false when no valid index is present.
    fn load_index(&mut self) -> bool {
        let mut buf = [0_u8; INDEX_PAYLOAD_LEN + 4];
        if !self.flash.read(self.index_offset(), &mut buf) {
            return false;
        }

        if get_u32_le(&buf, 0) != INDEX_MAGIC {
            info!("recorder: no valid index (magic mismatch)");
            return false;
        }

        if get_u32_le(&buf, 4) != STORAGE_VERSION {
            warn!("recorder: index version mismatch");
            return false;
        }

        self.next_flight_id = get_u32_le(&buf, 8);

        for i in 0..MAX_STORED_FLIGHTS {
            self.slot_used[i] = buf[12 + i] != 0;
        }

        info!("recorder: loaded index, next flight id {}", self.next_flight_id);
        true
    }

    /// Rewrite the index sector: erase, then program one page. The index
    /// is gone for the instant between the two; finalised slots are not.
    fn save_index(&mut self) -> bool {
        let mut page = [0xFF_u8; FLASH_PAGE_SIZE];

        put_u32_le(&mut page, 0, INDEX_MAGIC);
        put_u32_le(&mut page, 4, STORAGE_VERSION);
        put_u32_le(&mut page, 8, self.next_flight_id);

        for i in 0..MAX_STORED_FLIGHTS {
            page[12 + i] = if self.slot_used[i] { 1 } else { 0 };
        }

        let checksum = byte_sum(&page[..INDEX_PAYLOAD_LEN]);
        put_u32_le(&mut page, INDEX_PAYLOAD_LEN, checksum);

        let offset = self.index_offset();

        if !self.flash.erase(offset, FLASH_SECTOR_SIZE) {
            error!("recorder: index erase failed");
            return false;
        }

        if !self.flash.program(offset, &page) {
            error!("recorder: index program failed");
            return false;
        }

        debug!("recorder: index saved");
        true
    }

    fn find_free_slot(&self) -> Option<usize> {
        (0..MAX_STORED_FLIGHTS).find(|&i| !self.slot_used[i])
    }

    fn write_flight(&mut self, slot: usize) -> bool {
        let slot_offset = self.slot_offset(slot);
        let sample_bytes = self.samples.len() * FLIGHT_SAMPLE_LEN;

        // Erase every sector the header page and samples will touch
        let data_size = FLASH_PAGE_SIZE + sample_bytes;
        let mut sectors = (data_size + FLASH_SECTOR_SIZE - 1) / FLASH_SECTOR_SIZE;
        if sectors > FLIGHT_SLOT_SIZE / FLASH_SECTOR_SIZE {
            sectors = FLIGHT_SLOT_SIZE / FLASH_SECTOR_SIZE;
        }

        debug!(
            "recorder: writing slot {}: {} samples, erasing {} sectors",
            slot,
            self.samples.len(),
            sectors
        );

        for s in 0..sectors {
            if !self.flash.erase(slot_offset + s * FLASH_SECTOR_SIZE, FLASH_SECTOR_SIZE) {
                error!("recorder: erase failed in slot {}", slot);
                return false;
            }
            self.watchdog.feed();
        }

        // Header occupies the first page
        let mut page = [0xFF_u8; FLASH_PAGE_SIZE];
        let header = self.header.encode();
        page[..FLIGHT_HEADER_LEN].copy_from_slice(&header);

        if !self.flash.program(slot_offset, &page) {
            error!("recorder: header program failed in slot {}", slot);
            return false;
        }

        // Samples stream page by page after it
        let mut stream = Vec::with_capacity(sample_bytes);
        for s in &self.samples {
            stream.extend_from_slice(&s.encode());
        }

        let mut offset = slot_offset + FLASH_PAGE_SIZE;
        for chunk in stream.chunks(FLASH_PAGE_SIZE) {
            let mut page = [0xFF_u8; FLASH_PAGE_SIZE];
            page[..chunk.len()].copy_from_slice(chunk);

            if !self.flash.program(offset, &page) {
                error!("recorder: sample program failed in slot {}", slot);
                return false;
            }
            self.watchdog.feed();

            offset += FLASH_PAGE_SIZE;
        }

        true
    }

    /// Load the index, or initialise a fresh one when the sector is
    /// blank or unreadable.
    pub fn init(&mut self) -> bool {
        if !self.load_index() {
            info!("recorder: creating new index");
            self.next_flight_id = 1;
            self.slot_used = [false; MAX_STORED_FLIGHTS];

            if !self.save_index() {
                return false;
            }
        }

        self.initialized = true;

        info!(
            "recorder: {} flights stored, {} slots free, next id {}",
            self.flight_count(),
            self.free_slots(),
            self.next_flight_id
        );

        true
    }

    pub fn flight_count(&self) -> usize {
        self.slot_used.iter().filter(|&&u| u).count()
    }

    pub fn free_slots(&self) -> usize {
        MAX_STORED_FLIGHTS - self.flight_count()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn next_flight_id(&self) -> u32 {
        self.next_flight_id
    }

    /// Begin a recording. Returns the flight id, or 0 when refused
    /// (already recording, storage full, not initialised).
    pub fn start_flight(
        &mut self,
        ground_pressure_pa: f32,
        launch_lat_udeg: i32,
        launch_lon_udeg: i32,
        timestamp_unix: u32,
    ) -> u32 {
        if !self.initialized {
            warn!("recorder: start refused, not initialized");
            return 0;
        }

        if self.recording {
            warn!("recorder: start refused, already recording");
            return 0;
        }

        let slot = match self.find_free_slot() {
            Some(s) => s,
            None => {
                warn!("recorder: start refused, no free slots");
                return 0;
            }
        };

        self.current_slot = Some(slot);

        self.header = FlightHeader::default();
        self.header.magic = FLIGHT_MAGIC;
        self.header.version = STORAGE_VERSION;
        self.header.flight_id = self.next_flight_id;
        self.header.timestamp_unix = timestamp_unix;
        self.header.ground_pressure_pa = ground_pressure_pa;
        self.header.launch_latitude_udeg = launch_lat_udeg;
        self.header.launch_longitude_udeg = launch_lon_udeg;

        self.samples.clear();
        self.recording = true;

        info!("recorder: started flight {} in slot {}", self.next_flight_id, slot);
        self.next_flight_id
    }

    /// Append one sample to the RAM buffer. No wrap: a full buffer
    /// refuses further samples until the flight ends.
    pub fn log_sample(&mut self, sample: &FlightSample) -> bool {
        if !self.recording {
            return false;
        }

        if self.samples.len() >= MAX_SAMPLES_PER_FLIGHT {
            return false;
        }

        self.samples.push(sample.clone());
        true
    }

    /// Finalise: fill the header, burn header + samples into the slot,
    /// and only then publish the slot through the index.
    pub fn end_flight(
        &mut self,
        max_altitude_m: f32,
        max_velocity_mps: f32,
        apogee_time_ms: u32,
        flight_time_ms: u32,
    ) -> bool {
        if !self.recording {
            return false;
        }

        let slot = match self.current_slot {
            Some(s) => s,
            None => return false,
        };

        self.header.sample_count = self.samples.len() as u32;
        self.header.max_altitude_m = max_altitude_m;
        self.header.max_velocity_mps = max_velocity_mps;
        self.header.apogee_time_ms = apogee_time_ms;
        self.header.flight_time_ms = flight_time_ms;
        self.header.seal();

        info!(
            "recorder: ending flight {} with {} samples, max alt {:.1} m",
            self.header.flight_id,
            self.samples.len(),
            max_altitude_m
        );

        let success = self.write_flight(slot);

        if success {
            self.slot_used[slot] = true;
            self.next_flight_id += 1;
            self.save_index();
        }

        self.recording = false;
        self.current_slot = None;

        success
    }

    /// Header of a stored flight; the slot must be marked used and carry
    /// the flight magic.
    pub fn get_header(&self, slot: usize) -> Option<FlightHeader> {
        if !self.initialized || slot >= MAX_STORED_FLIGHTS || !self.slot_used[slot] {
            return None;
        }

        let mut buf = [0_u8; FLIGHT_HEADER_LEN];
        if !self.flash.read(self.slot_offset(slot), &mut buf) {
            return None;
        }

        let header = FlightHeader::decode(&buf)?;

        if header.magic != FLIGHT_MAGIC {
            warn!("recorder: invalid magic in slot {}", slot);
            return None;
        }

        Some(header)
    }

    /// One packed sample of a stored flight, bounds-checked against the
    /// header's count.
    pub fn get_sample(&self, slot: usize, sample_index: u32) -> Option<FlightSample> {
        let header = self.get_header(slot)?;

        if sample_index >= header.sample_count {
            return None;
        }

        let offset = self.slot_offset(slot) + FLASH_PAGE_SIZE +
                     sample_index as usize * FLIGHT_SAMPLE_LEN;

        let mut buf = [0_u8; FLIGHT_SAMPLE_LEN];
        if !self.flash.read(offset, &mut buf) {
            return None;
        }

        FlightSample::decode(&buf)
    }

    /// Erase the whole slot and drop it from the index.
    pub fn delete_flight(&mut self, slot: usize) -> bool {
        if !self.initialized || slot >= MAX_STORED_FLIGHTS || !self.slot_used[slot] {
            return false;
        }

        info!("recorder: deleting flight in slot {}", slot);

        let offset = self.slot_offset(slot);
        if !self.flash.erase(offset, FLIGHT_SLOT_SIZE) {
            return false;
        }

        self.slot_used[slot] = false;
        self.save_index()
    }

    /// Delete every stored flight; returns how many went.
    pub fn delete_all_flights(&mut self) -> usize {
        if !self.initialized {
            return 0;
        }

        let mut deleted = 0;

        for slot in 0..MAX_STORED_FLIGHTS {
            if !self.slot_used[slot] {
                continue;
            }

            let offset = self.slot_offset(slot);
            if self.flash.erase(offset, FLIGHT_SLOT_SIZE) {
                self.slot_used[slot] = false;
                deleted += 1;
            }
            self.watchdog.feed();
        }

        self.save_index();

        info!("recorder: deleted {} flights", deleted);
        deleted
    }

    /// Linear scan of used slots for a flight id.
    pub fn find_by_flight_id(&self, flight_id: u32) -> Option<usize> {
        if !self.initialized {
            return None;
        }

        (0..MAX_STORED_FLIGHTS).find(|&slot| {
            match self.get_header(slot) {
                Some(h) => h.flight_id == flight_id,
                None => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::mem_flash::MemFlash;

    const TEST_CAPACITY: usize = 0x100000; // 1 MB is plenty for 7 slots + index

    fn test_recorder() -> FlightRecorder {
        FlightRecorder::new(Box::new(MemFlash::new(TEST_CAPACITY)), Box::new(NullWatchdog))
    }

    fn sample_at(i: u32) -> FlightSample {
        let mut s = FlightSample::default();
        s.time_ms = i * 100;
        s.altitude_cm = (i as i32) * 37;
        s.velocity_cmps = (i % 3000) as i16;
        s.pressure_pa = 101325 - i;
        s.state = 2;
        s
    }

    fn record_flight(r: &mut FlightRecorder, n: u32) -> u32 {
        let id = r.start_flight(101325.0, 37750374, -122526760, 1527930611);
        assert!(id > 0);

        for i in 0..n {
            assert!(r.log_sample(&sample_at(i)));
        }

        assert!(r.end_flight(1922.9, 180.0, 21360, 149500));
        id
    }

    #[test]
    fn test_cold_boot_no_history() {
        let mut r = test_recorder();

        assert!(r.init());
        assert_eq!(r.flight_count(), 0);
        assert_eq!(r.free_slots(), MAX_STORED_FLIGHTS);
        assert_eq!(r.next_flight_id(), 1);
    }

    #[test]
    fn test_round_trip() {
        let mut r = test_recorder();
        r.init();

        let id = record_flight(&mut r, 600);
        assert_eq!(id, 1);
        assert_eq!(r.flight_count(), 1);

        let h = r.get_header(0).unwrap();
        assert_eq!(h.flight_id, 1);
        assert_eq!(h.sample_count, 600);
        assert_eq!(h.ground_pressure_pa, 101325.0);
        assert_eq!(h.launch_latitude_udeg, 37750374);
        assert!(h.checksum_valid());

        for i in 0..600 {
            assert_eq!(r.get_sample(0, i).unwrap(), sample_at(i));
        }

        // bounds-checked against the header
        assert_eq!(r.get_sample(0, 600), None);
    }

    #[test]
    fn test_persistence_across_power_cycle() {
        let flash = MemFlash::shared(TEST_CAPACITY);

        let mut r = FlightRecorder::new(Box::new(flash.clone()), Box::new(NullWatchdog));
        r.init();
        record_flight(&mut r, 42);
        drop(r);

        // same flash image, fresh recorder
        let mut r2 = FlightRecorder::new(Box::new(flash), Box::new(NullWatchdog));
        assert!(r2.init());
        assert_eq!(r2.flight_count(), 1);
        assert_eq!(r2.next_flight_id(), 2);

        let h = r2.get_header(0).unwrap();
        assert_eq!(h.sample_count, 42);
        assert!(h.checksum_valid());

        for i in 0..42 {
            assert_eq!(r2.get_sample(0, i).unwrap(), sample_at(i));
        }
    }

    #[test]
    fn test_buffer_bounds() {
        let mut r = test_recorder();
        r.init();

        assert!(r.start_flight(101325.0, 0, 0, 0) > 0);

        for i in 0..MAX_SAMPLES_PER_FLIGHT as u32 {
            assert!(r.log_sample(&sample_at(i)));
        }

        // full: refused, no wrap
        assert!(!r.log_sample(&sample_at(9999)));
        assert!(!r.log_sample(&sample_at(10000)));

        assert!(r.end_flight(100.0, 50.0, 1000, 2000));

        let h = r.get_header(0).unwrap();
        assert_eq!(h.sample_count, MAX_SAMPLES_PER_FLIGHT as u32);

        let last = r.get_sample(0, MAX_SAMPLES_PER_FLIGHT as u32 - 1).unwrap();
        assert_eq!(last, sample_at(MAX_SAMPLES_PER_FLIGHT as u32 - 1));
    }

    #[test]
    fn test_refusals() {
        let mut r = test_recorder();

        // not initialised
        assert_eq!(r.start_flight(101325.0, 0, 0, 0), 0);

        r.init();

        // not recording
        assert!(!r.log_sample(&sample_at(0)));
        assert!(!r.end_flight(0.0, 0.0, 0, 0));

        // double start
        assert!(r.start_flight(101325.0, 0, 0, 0) > 0);
        assert_eq!(r.start_flight(101325.0, 0, 0, 0), 0);
    }

    #[test]
    fn test_storage_full() {
        let mut r = test_recorder();
        r.init();

        for i in 0..MAX_STORED_FLIGHTS as u32 {
            assert_eq!(record_flight(&mut r, 5), i + 1);
        }

        assert_eq!(r.free_slots(), 0);
        assert_eq!(r.start_flight(101325.0, 0, 0, 0), 0);
    }

    #[test]
    fn test_delete_and_reuse() {
        let mut r = test_recorder();
        r.init();

        record_flight(&mut r, 10);
        record_flight(&mut r, 20);

        assert!(r.delete_flight(0));
        assert_eq!(r.flight_count(), 1);
        assert_eq!(r.get_header(0), None);
        assert!(!r.delete_flight(0)); // already empty

        // lowest free slot is reused, ids keep counting
        let id = record_flight(&mut r, 5);
        assert_eq!(id, 3);
        assert_eq!(r.get_header(0).unwrap().flight_id, 3);
        assert_eq!(r.get_header(1).unwrap().flight_id, 2);
    }

    #[test]
    fn test_delete_all() {
        let mut r = test_recorder();
        r.init();

        record_flight(&mut r, 10);
        record_flight(&mut r, 10);
        record_flight(&mut r, 10);

        assert_eq!(r.delete_all_flights(), 3);
        assert_eq!(r.flight_count(), 0);
        assert_eq!(r.next_flight_id(), 4);
    }

    #[test]
    fn test_find_by_flight_id() {
        let mut r = test_recorder();
        r.init();

        record_flight(&mut r, 10); // id 1, slot 0
        record_flight(&mut r, 10); // id 2, slot 1
        r.delete_flight(0);
        record_flight(&mut r, 10); // id 3, slot 0

        assert_eq!(r.find_by_flight_id(2), Some(1));
        assert_eq!(r.find_by_flight_id(3), Some(0));
        assert_eq!(r.find_by_flight_id(1), None);
        assert_eq!(r.find_by_flight_id(99), None);
    }

    #[test]
    fn test_unpublished_slot_is_invisible() {
        let flash = MemFlash::shared(TEST_CAPACITY);

        let mut r = FlightRecorder::new(Box::new(flash.clone()), Box::new(NullWatchdog));
        r.init();

        // a recording that never reaches end_flight leaves no trace in
        // the index, even across a power cycle
        assert!(r.start_flight(101325.0, 0, 0, 0) > 0);
        for i in 0..50 {
            r.log_sample(&sample_at(i));
        }
        drop(r);

        let mut r2 = FlightRecorder::new(Box::new(flash), Box::new(NullWatchdog));
        r2.init();
        assert_eq!(r2.flight_count(), 0);
        assert_eq!(r2.get_header(0), None);
    }
}
